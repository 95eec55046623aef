//! Output rendering

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use enovates_modbus::{Access, FieldKind, RecordGroup, ENO_ONE};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

impl OutputFormat {
    pub fn render<T: Serialize>(&self, value: &T) -> Result<String> {
        Ok(match self {
            OutputFormat::Yaml => serde_yaml::to_string(value)?,
            OutputFormat::Json => serde_json::to_string_pretty(value)?,
        })
    }

    pub fn print<T: Serialize>(&self, value: &T) -> Result<()> {
        let text = self.render(value)?;
        println!("{}", text.trim_end());
        Ok(())
    }
}

fn kind_label(kind: &FieldKind) -> String {
    match kind {
        FieldKind::Uint16 => "u16".to_string(),
        FieldKind::Int32Be { signed: true } => "i32".to_string(),
        FieldKind::Int32Be { signed: false } => "u32".to_string(),
        FieldKind::PaddedString { registers } => format!("string[{}]", registers * 2),
        FieldKind::BitField => "bool".to_string(),
        FieldKind::EnumU16 => "enum".to_string(),
    }
}

/// Register table grouped by record
pub fn print_register_table() {
    for group in RecordGroup::ALL {
        let span = match ENO_ONE.span(group) {
            Ok(span) => span.to_string(),
            Err(e) => format!("invalid: {}", e),
        };
        println!("{} {}", format!("{:?}", group).bright_cyan(), span.dimmed());
        for field in ENO_ONE.group_fields(group) {
            let access = match field.access {
                Access::ReadOnly => "R ".normal(),
                Access::ReadWrite => "RW".yellow(),
            };
            println!(
                "  {:>5}  {:<2}  {:<10}  {}",
                field.address,
                access,
                kind_label(&field.kind),
                field.name
            );
        }
    }
}
