//! The `markwise profiles` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use markwise_core::profile::Subject;
use markwise_providers::load_config_from;

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let resolver = config.profile_resolver()?;

    let mut table = Table::new();
    table.set_header(vec![
        "Subject",
        "Semantic",
        "Keyword",
        "Structure",
        "Coverage",
        "Description",
    ]);
    for subject in Subject::ALL {
        let w = resolver.weights(subject);
        let name = if config.profiles.contains_key(&subject) {
            format!("{subject} *")
        } else {
            subject.to_string()
        };
        table.add_row(vec![
            Cell::new(name),
            Cell::new(format!("{:.2}", w.semantic)),
            Cell::new(format!("{:.2}", w.keyword)),
            Cell::new(format!("{:.2}", w.structure)),
            Cell::new(format!("{:.2}", w.comprehensiveness)),
            Cell::new(subject.description()),
        ]);
    }
    println!("{table}");
    if !config.profiles.is_empty() {
        println!("* overridden in config");
    }
    Ok(())
}
