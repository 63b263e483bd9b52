//! JSON writer: an array of objects keyed by column, in column order.

use std::io::Write;

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::SinkError;

struct Row<'a> {
    columns: &'a [String],
    values: &'a [&'a str],
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

pub(super) fn write(
    out: &mut dyn Write,
    columns: &[String],
    rows: &[Vec<&str>],
) -> Result<(), SinkError> {
    let rows: Vec<Row<'_>> = rows
        .iter()
        .map(|values| Row {
            columns,
            values: values.as_slice(),
        })
        .collect();
    serde_json::to_writer_pretty(&mut *out, &rows)?;
    out.write_all(b"\n")?;
    Ok(())
}
