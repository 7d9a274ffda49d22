use std::fmt::Write;

use crate::store::file::Sheet;
use crate::store::schema::Column;

/// Plain-text table of one sheet, padded to the sheet's column widths.
pub fn render_sheet(sheet: &Sheet) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}]", sheet.name);

    let mut line = String::new();
    for col in Column::ALL {
        let w = sheet.widths[col.index()] as usize;
        let _ = write!(line, "{:<w$}", col.header());
    }
    let _ = writeln!(out, "{}", line.trim_end());
    let total: usize = sheet.widths.iter().map(|w| *w as usize).sum();
    let _ = writeln!(out, "{}", "-".repeat(total.saturating_sub(1)));

    for row in &sheet.rows {
        line.clear();
        for col in Column::ALL {
            let w = sheet.widths[col.index()] as usize;
            let cell = row[col.index()].to_string();
            let _ = write!(line, "{cell:<w$}");
        }
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}
