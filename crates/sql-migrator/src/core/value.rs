//! Row representation for catalog and ad-hoc queries.
//!
//! Drivers return every cell as text (catalog queries cast to a string type),
//! which keeps the row type independent of the engine's wire types. Parsing a
//! catalog row into schema types happens in pure functions over [`Record`], so
//! those functions are testable without a database.

use serde::{Serialize, Serializer};
use std::sync::Arc;

/// A result row: shared column names plus nullable text cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Option<String>>,
}

impl Record {
    pub fn new(columns: Arc<[String]>, values: Vec<Option<String>>) -> Self {
        Self { columns, values }
    }

    /// Build a record from `(column, value)` pairs. Mostly used in tests.
    pub fn from_pairs(pairs: &[(&str, Option<&str>)]) -> Self {
        let columns: Arc<[String]> = pairs.iter().map(|(c, _)| c.to_string()).collect();
        let values = pairs.iter().map(|(_, v)| v.map(str::to_string)).collect();
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cell by column name, matched case-insensitively. NULL yields `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|i| self.values.get(i))
            .and_then(|v| v.as_deref())
    }

    pub fn get_at(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(|v| v.as_deref())
    }

    /// Cell as an owned string, empty when NULL or missing.
    pub fn text(&self, name: &str) -> String {
        self.get(name).unwrap_or_default().to_string()
    }

    /// Non-empty cell as an owned string.
    pub fn opt_text(&self, name: &str) -> Option<String> {
        self.get(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        let raw = self.get(name)?.trim();
        raw.parse::<i64>()
            .ok()
            .or_else(|| raw.parse::<f64>().ok().map(|f| f as i64))
    }

    /// Truthy cell: `1`, `true`, `yes`, `y` (any case).
    pub fn get_bool(&self, name: &str) -> bool {
        matches!(
            self.get(name).map(|v| v.trim().to_ascii_lowercase()).as_deref(),
            Some("1" | "true" | "yes" | "y")
        )
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_is_case_insensitive() {
        let row = Record::from_pairs(&[("COLUMN_NAME", Some("id")), ("is_nullable", None)]);
        assert_eq!(row.get("column_name"), Some("id"));
        assert_eq!(row.get("IS_NULLABLE"), None);
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_numeric_and_bool_accessors() {
        let row = Record::from_pairs(&[
            ("a", Some("42")),
            ("b", Some("10.0")),
            ("c", Some("YES")),
            ("d", Some("0")),
        ]);
        assert_eq!(row.get_i64("a"), Some(42));
        assert_eq!(row.get_i64("b"), Some(10));
        assert!(row.get_bool("c"));
        assert!(!row.get_bool("d"));
    }

    #[test]
    fn test_opt_text_skips_blank() {
        let row = Record::from_pairs(&[("a", Some("  ")), ("b", Some("x"))]);
        assert_eq!(row.opt_text("a"), None);
        assert_eq!(row.opt_text("b"), Some("x".to_string()));
    }

    #[test]
    fn test_serializes_as_map() {
        let row = Record::from_pairs(&[("title", Some("t1")), ("batch", None)]);
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["title"], "t1");
        assert!(json["batch"].is_null());
    }
}
