//! Test-case extraction and language detection for code answers.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::Language;
use crate::traits::TestCase;

/// Matches `# test: <input> -> <expected>` style comments (also `//`,
/// `example:` / `input:` labels and `=>` arrows).
fn test_comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)^[ \t]*(?:#|//)[ \t]*(?:test|example|input)[ \t]*:[ \t]*(.*?)[ \t]*(?:->|=>)[ \t]*(.*?)[ \t]*$",
        )
        .expect("test comment regex is valid")
    })
}

/// Extract `(input, expected)` pairs from the model answer's comments.
pub fn extract_test_cases(model_answer: &str) -> Vec<TestCase> {
    test_comment_regex()
        .captures_iter(model_answer)
        .filter_map(|caps| {
            let expected = caps.get(2)?.as_str().trim();
            if expected.is_empty() {
                return None;
            }
            Some(TestCase {
                input: caps.get(1).map_or("", |m| m.as_str()).trim().to_string(),
                expected: Some(expected.to_string()),
            })
        })
        .collect()
}

/// Guess the language of a code answer from telltale keywords.
pub fn detect_language(code: &str) -> Language {
    const PYTHON: &[&str] = &["def ", "import ", "print(", "if __name__", "elif "];
    const JAVASCRIPT: &[&str] = &["function ", "console.log", "const ", "let ", "=>"];
    const JAVA: &[&str] = &["public class", "System.out", "public static void"];
    const CPP: &[&str] = &["#include", "using namespace", "cout <<", "std::"];

    let hits = |needles: &[&str]| needles.iter().filter(|n| code.contains(*n)).count();
    // Java/C++ markers are unambiguous; check them before the looser ones.
    if hits(JAVA) > 0 {
        return Language::Java;
    }
    if hits(CPP) > 0 {
        return Language::Cpp;
    }
    if hits(JAVASCRIPT) > hits(PYTHON) {
        return Language::JavaScript;
    }
    Language::Python
}

/// Names of top-level Python functions, in definition order.
pub fn python_function_names(code: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?m)^def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("def regex is valid")
    });
    re.captures_iter(code)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Pick the function the test inputs should be passed to.
///
/// Prefer the model answer's first public function if the student defined
/// one with the same name, otherwise the student's first public function.
/// `None` means the program is run as a script with input on stdin.
pub fn entry_point(student: &str, model_answer: &str) -> Option<String> {
    let is_public = |name: &String| !name.starts_with('_') && name != "main";
    let student_fns: Vec<String> = python_function_names(student)
        .into_iter()
        .filter(is_public)
        .collect();
    python_function_names(model_answer)
        .into_iter()
        .filter(is_public)
        .find(|name| student_fns.contains(name))
        .or_else(|| student_fns.into_iter().next())
}
