//! Exhibitor record model.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Missing-value sentinel used when no other is configured.
pub const DEFAULT_MISSING_VALUE: &str = "";

/// Extracted `(column, value)` pairs in extraction order.
pub type FieldValues = Vec<(String, String)>;

/// Column vocabulary shared by the built-in sites.
pub mod columns {
    pub const ORDER: &str = "Order";
    pub const PAGE: &str = "Page";
    pub const POSITION: &str = "Position";
    pub const COMPANY: &str = "Company Name";
    pub const BOOTH: &str = "Booth Number";
    pub const HALL: &str = "Hall";
    pub const COUNTRY: &str = "Country";
    pub const CITY: &str = "City";
    pub const ADDRESS: &str = "Address";
    pub const WEBSITE: &str = "Website";
    pub const LINKEDIN: &str = "LinkedIn";
    pub const FACEBOOK: &str = "Facebook";
    pub const INSTAGRAM: &str = "Instagram";
    pub const YOUTUBE: &str = "YouTube";
    pub const TWITTER: &str = "Twitter";
    pub const PHONE: &str = "Phone";
    pub const EMAIL: &str = "Email";
    pub const DESCRIPTION: &str = "Description";
    pub const LOGO: &str = "Logo";
    pub const DETAIL_URL: &str = "URL";

    /// Ordinal columns that lead every record.
    pub const ORDINALS: [&str; 3] = [ORDER, PAGE, POSITION];
}

/// One exhibitor row.
///
/// Columns are fixed when the record is created from the site's column list;
/// every column is present and holds either an extracted value or the
/// missing-value sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExhibitorRecord {
    fields: Vec<(String, String)>,
}

impl ExhibitorRecord {
    /// Create a record with every column set to `missing`.
    pub fn with_columns<I, S>(columns: I, missing: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut record = Self::default();
        for column in columns {
            let column = column.as_ref();
            if record.position(column).is_none() {
                record
                    .fields
                    .push((column.to_string(), missing.to_string()));
            }
        }
        record
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.fields.iter().position(|(name, _)| name == column)
    }

    /// Set a column, appending it if the record does not have it yet.
    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(column) {
            Some(idx) => self.fields[idx].1 = value,
            None => self.fields.push((column.to_string(), value)),
        }
    }

    /// Get the value of a column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.position(column).map(|idx| self.fields[idx].1.as_str())
    }

    /// Whether a column is absent or holds the missing-value sentinel.
    pub fn is_missing(&self, column: &str, missing: &str) -> bool {
        self.get(column).map_or(true, |v| v == missing)
    }

    /// Merge detail values into this record.
    ///
    /// A detail value replaces the existing one only when it is not the
    /// sentinel, so a detail page lacking a field keeps the listing value.
    pub fn merge(&mut self, values: FieldValues, missing: &str) {
        for (column, value) in values {
            if value == missing && !self.is_missing(&column, missing) {
                continue;
            }
            self.set(&column, value);
        }
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Values in column order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, value)| value.as_str())
    }

    /// Values projected onto an explicit column list, using `missing` for
    /// columns this record does not carry.
    pub fn row<'a>(&'a self, columns: &'a [String], missing: &'a str) -> Vec<&'a str> {
        columns
            .iter()
            .map(|c| self.get(c).unwrap_or(missing))
            .collect()
    }

    /// Deduplication key over the given columns.
    pub fn key(&self, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .map(|c| self.get(c).unwrap_or_default().trim().to_lowercase())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for ExhibitorRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
