//! Positional access to the JSON arrays both exchanges put on the wire.
//!
//! Numbers arrive either as JSON numbers (Bitfinex) or as strings (Kraken), so every
//! numeric accessor accepts both.

use crate::{Error, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

pub struct Fields<'a> {
    values: &'a [Value],
}

impl<'a> Fields<'a> {
    pub fn new(value: &'a Value) -> Result<Fields<'a>> {
        value
            .as_array()
            .map(|values| Fields { values })
            .ok_or_else(|| Error::MalformedMessage(format!("expected an array, got {value}")))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `None` for both missing and `null` entries.
    pub fn get(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index).filter(|v| !v.is_null())
    }

    pub fn decimal(&self, index: usize) -> Result<Decimal> {
        self.opt_decimal(index)?.ok_or_else(|| missing(index))
    }

    pub fn opt_decimal(&self, index: usize) -> Result<Option<Decimal>> {
        self.get(index).map(to_decimal).transpose()
    }

    pub fn u64(&self, index: usize) -> Result<u64> {
        self.opt_u64(index)?.ok_or_else(|| missing(index))
    }

    pub fn opt_u64(&self, index: usize) -> Result<Option<u64>> {
        self.get(index).map(to_u64).transpose()
    }

    pub fn str(&self, index: usize) -> Result<&'a str> {
        self.opt_str(index).ok_or_else(|| missing(index))
    }

    pub fn opt_str(&self, index: usize) -> Option<&'a str> {
        self.get(index).and_then(Value::as_str)
    }
}

pub fn to_decimal(value: &Value) -> Result<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => return Err(Error::MalformedMessage(format!("not a number: {other}"))),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| Error::MalformedMessage(format!("not a decimal: {text}")))
}

pub fn to_u64(value: &Value) -> Result<u64> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    to_decimal(value)?
        .trunc()
        .to_u64()
        .ok_or_else(|| Error::MalformedMessage(format!("not an unsigned integer: {value}")))
}

fn missing(index: usize) -> Error {
    Error::MalformedMessage(format!("missing field {index}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(json!(30000.5), "30000.5")]
    #[test_case(json!("0.1"), "0.1")]
    #[test_case(json!(1e-8), "0.00000001")]
    #[test_case(json!(-2), "-2")]
    fn parse_decimal(value: Value, expected: &str) {
        assert_eq!(to_decimal(&value).unwrap(), Decimal::from_str(expected).unwrap());
    }

    #[test_case(json!(1574694720000u64), 1574694720000)]
    #[test_case(json!("1534614057"), 1534614057)]
    #[test_case(json!("1534614057.321597"), 1534614057)]
    fn parse_u64(value: Value, expected: u64) {
        assert_eq!(to_u64(&value).unwrap(), expected);
    }

    #[test]
    fn nulls_read_as_absent() {
        let raw = json!([1, null, "2.5"]);
        let fields = Fields::new(&raw).unwrap();
        assert_eq!(fields.opt_decimal(1).unwrap(), None);
        assert_eq!(fields.decimal(2).unwrap(), Decimal::from_str("2.5").unwrap());
        assert!(fields.decimal(7).is_err());
    }

    #[test]
    fn objects_are_not_fields() {
        assert!(Fields::new(&json!({"a": 1})).is_err());
    }
}
