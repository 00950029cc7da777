//! Style heuristics for code answers.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::Language;

/// Style score in [0, 100] plus short notes for feedback.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleReport {
    pub score: f64,
    pub notes: Vec<String>,
}

/// 40 points for consistent indentation, 20 for comments, 40 for
/// identifiers that follow the language's naming convention.
pub fn assess_style(code: &str, language: Language) -> StyleReport {
    let mut notes = Vec::new();

    let indentation = indentation_consistency(code);
    if indentation < 1.0 {
        notes.push("indentation is inconsistent (mixed tabs/spaces or odd widths)".to_string());
    }

    let has_comments = code.lines().any(|l| {
        let t = l.trim_start();
        t.starts_with('#') && !t.starts_with("#include") || t.starts_with("//") || t.starts_with("/*")
    }) || code.contains("\"\"\"");
    if !has_comments {
        notes.push("no comments explaining the approach".to_string());
    }

    let naming = naming_conformance(code, language);
    if naming < 1.0 {
        notes.push(match language {
            Language::Python => "some names are not snake_case".to_string(),
            _ => "some names are not camelCase".to_string(),
        });
    }

    let score = 40.0 * indentation + if has_comments { 20.0 } else { 0.0 } + 40.0 * naming;
    StyleReport { score, notes }
}

/// Fraction of indented lines that agree with the dominant indent style.
fn indentation_consistency(code: &str) -> f64 {
    let mut tabs = 0u32;
    let mut spaces_even = 0u32;
    let mut spaces_odd = 0u32;
    for line in code.lines().filter(|l| !l.trim().is_empty()) {
        let indent: String = line.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
        if indent.is_empty() {
            continue;
        }
        if indent.contains('\t') && indent.contains(' ') {
            spaces_odd += 1;
        } else if indent.contains('\t') {
            tabs += 1;
        } else if indent.len() % 2 == 0 {
            spaces_even += 1;
        } else {
            spaces_odd += 1;
        }
    }
    let total = tabs + spaces_even + spaces_odd;
    if total == 0 {
        return 1.0;
    }
    tabs.max(spaces_even) as f64 / total as f64
}

fn identifier_regex(language: Language) -> &'static Regex {
    static PY: OnceLock<Regex> = OnceLock::new();
    static OTHER: OnceLock<Regex> = OnceLock::new();
    match language {
        Language::Python => PY.get_or_init(|| {
            Regex::new(r"(?m)(?:^\s*def\s+([A-Za-z_]\w*)|^\s*([A-Za-z_]\w*)\s*=[^=])")
                .expect("python identifier regex is valid")
        }),
        _ => OTHER.get_or_init(|| {
            Regex::new(
                r"(?:function\s+([A-Za-z_$][\w$]*)|(?:let|const|var|int|long|double|float|boolean|bool|String|auto)\s+([A-Za-z_$][\w$]*))",
            )
            .expect("identifier regex is valid")
        }),
    }
}

fn is_snake_case(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        || name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn is_camel_case(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_lowercase() || c == '_' || c == '$')
        && !name.contains('_')
        || name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Fraction of declared names following the convention; 1.0 if none.
fn naming_conformance(code: &str, language: Language) -> f64 {
    let names: Vec<&str> = identifier_regex(language)
        .captures_iter(code)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)).map(|m| m.as_str()))
        .collect();
    if names.is_empty() {
        return 1.0;
    }
    let good = names
        .iter()
        .filter(|n| match language {
            Language::Python => is_snake_case(n),
            _ => is_camel_case(n),
        })
        .count();
    good as f64 / names.len() as f64
}
