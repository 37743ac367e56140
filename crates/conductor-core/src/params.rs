//! Flat run parameters and typed extraction.
//!
//! Parameters arrive as a flat `name -> JSON value` map, from the CLI
//! (`--param stage=1-7`), from a profile in `.conductor/config.yaml`, or from a
//! schedule. [`ParamReader`] pulls typed values out of the map, applying
//! defaults and recording which names were consumed so leftovers can be
//! reported.

use crate::error::{CoreError, Result};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Flat parameter set. Ordered so that everything derived from it is
/// deterministic.
pub type Params = BTreeMap<String, Value>;

/// Parse a `key=value` pair. The value is read as JSON when it parses as JSON
/// and kept as a plain string otherwise, so `medicine_count=20` yields a
/// number and `stage=1-7` a string.
pub fn parse_assignment(raw: &str) -> Option<(String, Value)> {
    let (key, value) = raw.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = serde_json::from_str::<Value>(value.trim())
        .unwrap_or_else(|_| Value::String(value.to_string()));
    Some((key.to_string(), value))
}

/// A closed set of string values a parameter may take.
pub trait ParamEnum: Sized + Copy + 'static {
    fn variants() -> &'static [Self];
    fn as_str(&self) -> &'static str;
}

pub struct ParamReader<'a> {
    params: &'a Params,
    consumed: BTreeSet<&'a str>,
}

impl<'a> ParamReader<'a> {
    pub fn new(params: &'a Params) -> Self {
        Self {
            params,
            consumed: BTreeSet::new(),
        }
    }

    /// `null` counts as absent.
    fn take(&mut self, key: &str) -> Option<&'a Value> {
        let (name, value) = self.params.get_key_value(key)?;
        self.consumed.insert(name.as_str());
        match value {
            Value::Null => None,
            v => Some(v),
        }
    }

    /// Free text. Numbers are accepted and rendered, since stage names such as
    /// `7` easily arrive as JSON numbers.
    pub fn text(&mut self, key: &str, default: &str) -> Result<String> {
        match self.take(key) {
            None => Ok(default.to_string()),
            Some(Value::String(s)) => Ok(s.trim().to_string()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(_) => Err(invalid_type(key, "string")),
        }
    }

    pub fn int(&mut self, key: &str, default: i64) -> Result<i64> {
        match self.take(key) {
            None => Ok(default),
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| invalid_type(key, "integer")),
            Some(_) => Err(invalid_type(key, "integer")),
        }
    }

    /// A non-negative integer that fits the engine's 32-bit fields.
    pub fn count(&mut self, key: &str, default: u32) -> Result<u32> {
        match self.take(key) {
            None => Ok(default),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| invalid_type(key, "non-negative integer")),
            Some(_) => Err(invalid_type(key, "non-negative integer")),
        }
    }

    pub fn flag(&mut self, key: &str, default: bool) -> Result<bool> {
        match self.take(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(invalid_type(key, "boolean")),
        }
    }

    /// One of the values of `T`, matched case-insensitively.
    pub fn choice<T: ParamEnum>(&mut self, key: &str, default: T) -> Result<T> {
        let raw = match self.take(key) {
            None => return Ok(default),
            Some(Value::String(s)) => s.trim(),
            Some(_) => return Err(invalid_type(key, "string")),
        };
        T::variants()
            .iter()
            .copied()
            .find(|v| v.as_str().eq_ignore_ascii_case(raw))
            .ok_or_else(|| CoreError::InvalidValue {
                field: key.to_string(),
                value: raw.to_string(),
                allowed: T::variants()
                    .iter()
                    .map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// A list given either as a JSON array of strings or as one
    /// `;`-separated string. Blank items are dropped.
    pub fn list(&mut self, key: &str, default: &[&str]) -> Result<Vec<String>> {
        match self.take(key) {
            None => Ok(default.iter().map(|s| s.to_string()).collect()),
            Some(Value::String(s)) => Ok(split_list(s)),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.trim().to_string()),
                    _ => Err(invalid_type(key, "list of strings")),
                })
                .filter(|item| !matches!(item, Ok(s) if s.is_empty()))
                .collect(),
            Some(_) => Err(invalid_type(key, "list of strings")),
        }
    }

    /// Infrastructure room selection. Room names become
    /// `{"Room": name, "IsEnabled": true}`; objects pass through unchanged.
    /// `None` keeps whatever room list the engine already has.
    pub fn rooms(&mut self, key: &str) -> Result<Option<Vec<Value>>> {
        let items: Vec<Value> = match self.take(key) {
            None => return Ok(None),
            Some(Value::String(s)) => split_list(s).into_iter().map(Value::String).collect(),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => return Err(invalid_type(key, "list of rooms")),
        };
        items
            .into_iter()
            .map(|item| match item {
                Value::String(room) => Ok(serde_json::json!({ "Room": room, "IsEnabled": true })),
                obj @ Value::Object(_) => Ok(obj),
                _ => Err(invalid_type(key, "list of rooms")),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Parameter names present in the map that nothing read.
    pub fn unconsumed(&self) -> Vec<String> {
        self.params
            .keys()
            .filter(|k| !self.consumed.contains(k.as_str()))
            .cloned()
            .collect()
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid_type(field: &str, expected: &'static str) -> CoreError {
    CoreError::InvalidType {
        field: field.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parse_assignment_prefers_json() {
        assert_eq!(
            parse_assignment("medicine_count=20"),
            Some(("medicine_count".into(), json!(20)))
        );
        assert_eq!(
            parse_assignment("stage=1-7"),
            Some(("stage".into(), json!("1-7")))
        );
        assert_eq!(
            parse_assignment("mall_shopping=false"),
            Some(("mall_shopping".into(), json!(false)))
        );
        assert_eq!(parse_assignment("no-equals"), None);
        assert_eq!(parse_assignment("=5"), None);
    }

    #[test]
    fn int_rejects_strings_and_floats() {
        let p = params(json!({"a": "20", "b": 2.5, "c": 7}));
        let mut r = ParamReader::new(&p);
        let err = r.int("a", 0).unwrap_err();
        assert_eq!(err.field(), Some("a"));
        assert!(err.to_string().contains("integer"));
        assert!(r.int("b", 0).is_err());
        assert_eq!(r.int("c", 0).unwrap(), 7);
        assert_eq!(r.int("missing", -1).unwrap(), -1);
    }

    #[test]
    fn count_rejects_negative() {
        let p = params(json!({"medicine_count": -3}));
        let err = ParamReader::new(&p).count("medicine_count", 0).unwrap_err();
        assert!(matches!(err, CoreError::InvalidType { ref field, .. } if field == "medicine_count"));
    }

    #[test]
    fn flag_requires_boolean() {
        let p = params(json!({"x": "true"}));
        assert!(ParamReader::new(&p).flag("x", false).is_err());
    }

    #[test]
    fn text_accepts_numbers() {
        let p = params(json!({"stage": 7}));
        assert_eq!(ParamReader::new(&p).text("stage", "1-7").unwrap(), "7");
    }

    #[test]
    fn null_falls_back_to_default() {
        let p = params(json!({"stage": null}));
        let mut r = ParamReader::new(&p);
        assert_eq!(r.text("stage", "1-7").unwrap(), "1-7");
        assert!(r.unconsumed().is_empty());
    }

    #[test]
    fn list_accepts_both_shapes() {
        let p = params(json!({
            "a": "碳; 家具;;加急许可",
            "b": ["x", " y ", ""],
            "c": 3,
        }));
        let mut r = ParamReader::new(&p);
        assert_eq!(r.list("a", &[]).unwrap(), vec!["碳", "家具", "加急许可"]);
        assert_eq!(r.list("b", &[]).unwrap(), vec!["x", "y"]);
        assert!(r.list("c", &[]).is_err());
        assert_eq!(r.list("d", &["招聘许可"]).unwrap(), vec!["招聘许可"]);
    }

    #[test]
    fn rooms_normalize_names() {
        let p = params(json!({
            "infrast_rooms": ["Mfg", {"Room": "Trade", "IsEnabled": false}]
        }));
        let rooms = ParamReader::new(&p).rooms("infrast_rooms").unwrap().unwrap();
        assert_eq!(rooms[0], json!({"Room": "Mfg", "IsEnabled": true}));
        assert_eq!(rooms[1], json!({"Room": "Trade", "IsEnabled": false}));
    }

    #[test]
    fn unconsumed_lists_unread_names() {
        let p = params(json!({"stage": "1-7", "typo_param": 1}));
        let mut r = ParamReader::new(&p);
        r.text("stage", "").unwrap();
        assert_eq!(r.unconsumed(), vec!["typo_param".to_string()]);
    }
}
