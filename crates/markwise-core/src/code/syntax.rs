//! Syntax checking and structural features of code answers.
//!
//! Python is parsed with tree-sitter. Other languages fall back to a
//! delimiter-balance check and keyword matching.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, Context, Result};
use tree_sitter::{Node, Tree};

use crate::model::Language;

/// Outcome of a syntax check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxCheck {
    Valid,
    Invalid { message: String },
}

fn parse_python(code: &str) -> Result<Tree> {
    let mut parser = tree_sitter::Parser::new();
    let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
    parser
        .set_language(&language)
        .context("failed to load Python grammar")?;
    parser
        .parse(code, None)
        .ok_or_else(|| anyhow!("tree-sitter returned no tree"))
}

/// Depth-first, pre-order list of nodes.
fn descendants(root: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        out.push(node);
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    out
}

/// Check that the code parses.
pub fn check_syntax(code: &str, language: Language) -> SyntaxCheck {
    match language {
        Language::Python => check_python(code),
        _ => check_delimiters(code),
    }
}

fn check_python(code: &str) -> SyntaxCheck {
    let tree = match parse_python(code) {
        Ok(tree) => tree,
        Err(e) => {
            return SyntaxCheck::Invalid {
                message: format!("{e:#}"),
            }
        }
    };
    let root = tree.root_node();
    if !root.has_error() {
        return SyntaxCheck::Valid;
    }

    let first = descendants(root)
        .into_iter()
        .find(|n| n.is_error() || n.is_missing());
    let message = match first {
        Some(node) => {
            let pos = node.start_position();
            let (line, column) = (pos.row + 1, pos.column + 1);
            if node.is_missing() {
                format!("line {line}, column {column}: missing `{}`", node.kind())
            } else {
                let snippet: String = node
                    .utf8_text(code.as_bytes())
                    .unwrap_or("")
                    .lines()
                    .next()
                    .unwrap_or("")
                    .chars()
                    .take(40)
                    .collect();
                format!("line {line}, column {column}: invalid syntax near `{snippet}`")
            }
        }
        None => "invalid syntax".to_string(),
    };
    SyntaxCheck::Invalid { message }
}

/// Balanced (), [], {} outside string literals and line comments.
fn check_delimiters(code: &str) -> SyntaxCheck {
    let mut stack: Vec<(char, usize)> = Vec::new();
    for (line_no, line) in code.lines().enumerate() {
        let mut chars = line.chars().peekable();
        let mut in_string: Option<char> = None;
        while let Some(c) = chars.next() {
            if let Some(quote) = in_string {
                if c == '\\' {
                    chars.next();
                } else if c == quote {
                    in_string = None;
                }
                continue;
            }
            match c {
                '"' | '\'' | '`' => in_string = Some(c),
                '/' if chars.peek() == Some(&'/') => break,
                '(' | '[' | '{' => stack.push((c, line_no + 1)),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match stack.pop() {
                        Some((open, _)) if open == expected => {}
                        _ => {
                            return SyntaxCheck::Invalid {
                                message: format!("line {}: unmatched `{c}`", line_no + 1),
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
    match stack.pop() {
        Some((open, line)) => SyntaxCheck::Invalid {
            message: format!("line {line}: unclosed `{open}`"),
        },
        None => SyntaxCheck::Valid,
    }
}

/// Counts of structural constructs, keyed by feature name.
pub type Features = BTreeMap<&'static str, u32>;

/// Structural features used for logic comparison.
pub fn structural_features(code: &str, language: Language) -> Features {
    if language == Language::Python {
        if let Ok(features) = python_features(code) {
            return features;
        }
    }
    keyword_features(code)
}

fn python_features(code: &str) -> Result<Features> {
    let tree = parse_python(code)?;
    let source = code.as_bytes();
    let mut features = Features::new();
    let mut bump = |name: &'static str| *features.entry(name).or_insert(0) += 1;

    for node in descendants(tree.root_node()) {
        match node.kind() {
            "for_statement" => bump("for_loop"),
            "while_statement" => bump("while_loop"),
            "if_statement" | "conditional_expression" => bump("conditional"),
            "function_definition" => {
                bump("function_definition");
                if is_recursive(node, source) {
                    bump("recursion");
                }
            }
            "return_statement" => bump("return"),
            "list_comprehension" | "generator_expression" | "dictionary_comprehension"
            | "set_comprehension" => bump("comprehension"),
            "try_statement" => bump("exception_handling"),
            "class_definition" => bump("class_definition"),
            "lambda" => bump("lambda"),
            _ => {}
        }
    }
    Ok(features)
}

/// A function that calls itself by name somewhere in its body.
fn is_recursive(function: Node<'_>, source: &[u8]) -> bool {
    let Some(name) = function
        .child_by_field_name("name")
        .and_then(|n| n.utf8_text(source).ok())
    else {
        return false;
    };
    let Some(body) = function.child_by_field_name("body") else {
        return false;
    };
    descendants(body).into_iter().any(|n| {
        n.kind() == "call"
            && n.child_by_field_name("function")
                .and_then(|f| f.utf8_text(source).ok())
                == Some(name)
    })
}

fn keyword_features(code: &str) -> Features {
    let mut features = Features::new();
    let count = |needle: &str| code.matches(needle).count() as u32;
    let mut put = |name: &'static str, n: u32| {
        if n > 0 {
            features.insert(name, n);
        }
    };
    put("for_loop", count("for ") + count("for("));
    put("while_loop", count("while ") + count("while("));
    put("conditional", count("if ") + count("if("));
    put("return", count("return"));
    put("exception_handling", count("try ") + count("try{"));
    put("class_definition", count("class "));
    put("function_definition", count("function ") + count("def "));
    features
}

/// Weighted Jaccard similarity of two feature multisets, in [0, 1].
/// Two empty sets are identical.
pub fn feature_similarity(a: &Features, b: &Features) -> f64 {
    let mut min_sum = 0u32;
    let mut max_sum = 0u32;
    let keys: BTreeSet<&&str> = a.keys().chain(b.keys()).collect();
    for key in keys {
        let x = a.get(key).copied().unwrap_or(0);
        let y = b.get(key).copied().unwrap_or(0);
        min_sum += x.min(y);
        max_sum += x.max(y);
    }
    if max_sum == 0 {
        1.0
    } else {
        min_sum as f64 / max_sum as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_python_parses() {
        let code = "def add(a, b):\n    return a + b\n";
        assert_eq!(check_syntax(code, Language::Python), SyntaxCheck::Valid);
    }

    #[test]
    fn invalid_python_reports_location() {
        let code = "def add(a, b)\n    return a + b\n";
        match check_syntax(code, Language::Python) {
            SyntaxCheck::Invalid { message } => assert!(message.contains("line"), "{message}"),
            SyntaxCheck::Valid => panic!("expected a syntax error"),
        }
    }

    #[test]
    fn delimiter_check_for_other_languages() {
        assert_eq!(
            check_syntax("function f() { return [1, 2]; }", Language::JavaScript),
            SyntaxCheck::Valid
        );
        assert!(matches!(
            check_syntax("int main() { return 0;", Language::Cpp),
            SyntaxCheck::Invalid { .. }
        ));
        assert_eq!(
            check_syntax("String s = \"(\"; // )", Language::Java),
            SyntaxCheck::Valid
        );
    }

    #[test]
    fn python_features_detect_recursion() {
        let code = "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\n";
        let f = structural_features(code, Language::Python);
        assert_eq!(f.get("recursion"), Some(&1));
        assert_eq!(f.get("conditional"), Some(&1));
        assert_eq!(f.get("return"), Some(&2));
        assert_eq!(f.get("for_loop"), None);
    }

    #[test]
    fn iterative_and_recursive_differ() {
        let recursive = "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\n";
        let iterative = "def fact(n):\n    r = 1\n    for i in range(2, n + 1):\n        r *= i\n    return r\n";
        let a = structural_features(recursive, Language::Python);
        let b = structural_features(iterative, Language::Python);
        let sim = feature_similarity(&a, &b);
        assert!(sim > 0.0 && sim < 1.0, "similarity = {sim}");
        assert_eq!(feature_similarity(&a, &a), 1.0);
    }

    #[test]
    fn empty_feature_sets_are_identical() {
        assert_eq!(feature_similarity(&Features::new(), &Features::new()), 1.0);
    }
}
