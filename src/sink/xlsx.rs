//! Excel workbook writer.

use std::io::Write;

use rust_xlsxwriter::{Format, Workbook};

use super::SinkError;

const SHEET_NAME: &str = "Exhibitors";

/// Excel's per-cell character limit.
const MAX_CELL_CHARS: usize = 32_767;

fn cell(value: &str) -> std::borrow::Cow<'_, str> {
    if value.chars().count() > MAX_CELL_CHARS {
        value.chars().take(MAX_CELL_CHARS).collect::<String>().into()
    } else {
        value.into()
    }
}

pub(super) fn write(
    out: &mut dyn Write,
    columns: &[String],
    rows: &[Vec<&str>],
) -> Result<(), SinkError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;
    for (col, name) in columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, name.as_str(), &header)?;
    }
    for (idx, row) in rows.iter().enumerate() {
        let r = idx as u32 + 1;
        for (col, value) in row.iter().enumerate() {
            if !value.is_empty() {
                sheet.write_string(r, col as u16, cell(value).as_ref())?;
            }
        }
    }
    sheet.set_freeze_panes(1, 0)?;
    sheet.autofit();

    let buffer = workbook.save_to_buffer()?;
    out.write_all(&buffer)?;
    Ok(())
}
