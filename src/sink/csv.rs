//! Delimited text writer (csv and tsv).

use std::io::Write;

use super::SinkError;

pub(super) fn write(
    out: &mut dyn Write,
    delimiter: u8,
    columns: &[String],
    rows: &[Vec<&str>],
) -> Result<(), SinkError> {
    let mut writer = ::csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(out);
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
