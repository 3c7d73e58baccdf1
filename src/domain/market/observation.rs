use super::interval::Interval;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Prefix reserved for factor outputs
pub const FACTOR_KEY_PREFIX: &str = "$f_";

/// Fields every observation carries, in presentation order
pub const BASE_FIELDS: &[&str] = &[
    "ticker", "date", "interval", "open", "high", "low", "close", "volume",
];

/// Scalar value of a named field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    /// Canonical text used for exact-match joins across tickers
    pub fn join_key(&self) -> String {
        match self {
            FieldValue::Number(v) => format!("n:{}", v),
            FieldValue::Text(s) => format!("s:{}", s),
        }
    }

    pub fn zero() -> Self {
        FieldValue::Number(0.0)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// One bar of one instrument. Indicator and factor columns live in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub ticker: String,
    pub date: NaiveDate,
    #[serde(default, alias = "type")]
    pub interval: Interval,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl RawObservation {
    pub fn new(
        ticker: impl Into<String>,
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            date,
            interval: Interval::Daily,
            open,
            high,
            low,
            close,
            volume,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: f64) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Looks up a base or extra field by name.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "ticker" => Some(FieldValue::Text(self.ticker.clone())),
            "date" => Some(FieldValue::Text(self.date.format("%Y-%m-%d").to_string())),
            "interval" => Some(FieldValue::Text(self.interval.to_string())),
            _ => self.number(name).map(FieldValue::Number),
        }
    }

    /// Looks up a numeric field by name.
    pub fn number(&self, name: &str) -> Option<f64> {
        match name {
            "open" => Some(self.open),
            "high" => Some(self.high),
            "low" => Some(self.low),
            "close" => Some(self.close),
            "volume" => Some(self.volume),
            _ => self.extra.get(name).copied(),
        }
    }

    /// Every field name this record exposes: base fields first, then extras in key order.
    pub fn field_names(&self) -> Vec<String> {
        BASE_FIELDS
            .iter()
            .map(|s| s.to_string())
            .chain(self.extra.keys().cloned())
            .collect()
    }

    /// Whether every numeric field, base or extra, is finite.
    pub fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .chain(self.extra.values())
            .all(|v| v.is_finite())
    }

    /// Names of the factor columns attached to this record.
    pub fn factor_keys(&self) -> Vec<&str> {
        self.extra
            .keys()
            .filter(|k| k.starts_with(FACTOR_KEY_PREFIX))
            .map(String::as_str)
            .collect()
    }
}
