//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod load;
pub mod status;

use crate::sink::TablePreview;

/// Render rows as a bordered table
pub fn format_as_table(preview: &TablePreview) -> String {
    use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(&preview.columns);

    for row in &preview.rows {
        table.add_row(row);
    }

    format!("{}\n", table)
}
