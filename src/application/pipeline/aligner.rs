//! Multi-ticker alignment.
//!
//! Records are partitioned by ticker and every field is prefixed
//! `{ticker}_{field}`. The primary ticker's partition is the backbone: each of
//! its rows is joined with the row of every other ticker whose same base field
//! equals the backbone's key value. Only reserved keys survive; reserved keys
//! with no source are zero-filled and flagged invalid.

use crate::domain::dataset::{AlignedRecord, AlignedValue};
use crate::domain::market::{FieldValue, RawObservation};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

type PrefixedRow = BTreeMap<String, FieldValue>;

/// Strips an optional `{primary_ticker}_` prefix from the key field name.
pub fn base_key_field<'a>(primary_ticker: &str, key: &'a str) -> &'a str {
    key.strip_prefix(primary_ticker)
        .and_then(|rest| rest.strip_prefix('_'))
        .unwrap_or(key)
}

pub fn align(
    records: &[RawObservation],
    primary_ticker: &str,
    primary_key: &str,
    reserved_keys: &[String],
) -> Vec<AlignedRecord> {
    let key_field = base_key_field(primary_ticker, primary_key);

    // Partition preserving first-seen ticker order and row order
    let mut order: Vec<&str> = Vec::new();
    let mut partitions: HashMap<&str, Vec<&RawObservation>> = HashMap::new();
    for record in records {
        let ticker = record.ticker.as_str();
        if !partitions.contains_key(ticker) {
            order.push(ticker);
        }
        partitions.entry(ticker).or_default().push(record);
    }

    let Some(backbone) = partitions.get(primary_ticker) else {
        debug!("Primary ticker {} has no records", primary_ticker);
        return Vec::new();
    };

    // One hash index per secondary ticker, keyed on the join field
    let indexes: Vec<(&str, HashMap<String, &RawObservation>)> = order
        .iter()
        .filter(|t| **t != primary_ticker)
        .map(|ticker| {
            let mut index = HashMap::new();
            for row in &partitions[ticker] {
                if let Some(v) = row.field(key_field) {
                    // First occurrence wins on duplicate keys
                    index.entry(v.join_key()).or_insert(*row);
                }
            }
            (*ticker, index)
        })
        .collect();

    backbone
        .iter()
        .map(|row| {
            let mut merged = prefixed(row);
            if let Some(key_value) = row.field(key_field) {
                let join = key_value.join_key();
                for (_, index) in &indexes {
                    if let Some(other) = index.get(&join) {
                        merged.extend(prefixed(other));
                    }
                }
            }
            reserve(merged, reserved_keys)
        })
        .collect()
}

fn prefixed(row: &RawObservation) -> PrefixedRow {
    row.field_names()
        .into_iter()
        .filter_map(|name| {
            let value = row.field(&name)?;
            Some((format!("{}_{}", row.ticker, name), value))
        })
        .collect()
}

fn reserve(mut merged: PrefixedRow, reserved_keys: &[String]) -> AlignedRecord {
    let fields = reserved_keys
        .iter()
        .map(|key| {
            let cell = match merged.remove(key) {
                Some(value) => AlignedValue::present(value),
                None => AlignedValue::filled(),
            };
            (key.clone(), cell)
        })
        .collect();
    AlignedRecord { fields }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn bar(ticker: &str, d: u32, close: f64) -> RawObservation {
        RawObservation::new(ticker, day(d), close, close, close, close, 100.0)
    }

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_base_key_field() {
        assert_eq!(base_key_field("A", "A_date"), "date");
        assert_eq!(base_key_field("A", "date"), "date");
        assert_eq!(base_key_field("AB", "A_date"), "A_date");
    }

    #[test]
    fn test_missing_secondary_row_is_zero_filled() {
        let records = vec![bar("A", 1, 10.0), bar("A", 2, 11.0), bar("B", 1, 20.0)];
        let out = align(&records, "A", "date", &keys(&["A_close", "B_close"]));

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("B_close").unwrap().value, FieldValue::Number(20.0));
        let filled = out[1].get("B_close").unwrap();
        assert_eq!(filled.value, FieldValue::Number(0.0));
        assert!(!filled.valid);
        assert!(out[1].get("A_close").unwrap().valid);
    }

    #[test]
    fn test_every_secondary_ticker_is_merged() {
        let records = vec![bar("A", 1, 1.0), bar("B", 1, 2.0), bar("C", 1, 3.0)];
        let out = align(
            &records,
            "A",
            "A_date",
            &keys(&["A_close", "B_close", "C_close"]),
        );
        assert!(out[0].is_fully_valid());
        assert_eq!(out[0].get("C_close").unwrap().value, FieldValue::Number(3.0));
    }

    #[test]
    fn test_unknown_primary_yields_empty() {
        let records = vec![bar("A", 1, 1.0)];
        assert!(align(&records, "Z", "date", &keys(&["A_close"])).is_empty());
    }

    #[test]
    fn test_non_reserved_keys_are_dropped() {
        let records = vec![bar("A", 1, 1.0)];
        let out = align(&records, "A", "date", &keys(&["A_close"]));
        assert_eq!(out[0].keys().cloned().collect::<Vec<_>>(), keys(&["A_close"]));
    }
}
