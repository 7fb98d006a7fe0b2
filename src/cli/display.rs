//! Terminal table rendering for CLI commands.

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Table};
use console::style;

use crate::domain::models::Record;

/// Render records as a status table.
pub fn record_table(records: &[Record]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["id", "type", "title", "state", "parent"]);
    for record in records {
        let state = record
            .state
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        table.add_row(vec![
            Cell::new(&record.id),
            Cell::new(record.record_type.as_str()),
            Cell::new(&record.title),
            Cell::new(state),
            Cell::new(record.parent.as_deref().unwrap_or("-")),
        ]);
    }
    table
}

pub fn ok(message: &str) -> String {
    format!("{} {message}", style("ok").green().bold())
}

pub fn warn(message: &str) -> String {
    format!("{} {message}", style("warn").yellow().bold())
}
