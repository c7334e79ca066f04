//! Field readers that record a violation instead of failing.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;

use super::{Violation, ViolationKind};
use crate::parser::parse_timestamp;

/// One JSON object under validation, with its path for violation reports.
pub(super) struct Record<'a, 'v> {
    obj: &'v Map<String, Value>,
    path: String,
    out: &'a mut Vec<Violation>,
}

impl<'a, 'v> Record<'a, 'v> {
    /// Wraps `value` if it is an object; otherwise records a type violation.
    pub fn new(value: &'v Value, path: String, out: &'a mut Vec<Violation>) -> Option<Self> {
        match value {
            Value::Object(obj) => Some(Self { obj, path, out }),
            _ => {
                out.push(Violation::new(path, ViolationKind::WrongType { expected: "object" }));
                None
            }
        }
    }

    fn field_path(&self, key: &str) -> String {
        format!("{}.{key}", self.path)
    }

    fn push(&mut self, key: &str, kind: ViolationKind) {
        let path = self.field_path(key);
        self.out.push(Violation::new(path, kind));
    }

    /// Non-null value at `key`, recording a hard violation when absent and required.
    fn get(&mut self, key: &str, required: bool) -> Option<&'v Value> {
        let obj: &'v Map<String, Value> = self.obj;
        match obj.get(key) {
            None | Some(Value::Null) => {
                if required {
                    self.push(key, ViolationKind::MissingField);
                }
                None
            }
            Some(v) => Some(v),
        }
    }

    /// Records a soft violation when a recommended optional field is absent.
    pub fn recommend(&mut self, key: &str) {
        if matches!(self.obj.get(key), None | Some(Value::Null)) {
            self.push(key, ViolationKind::MissingRecommended);
        }
    }

    fn wrong_type(&mut self, key: &str, expected: &'static str) {
        self.push(key, ViolationKind::WrongType { expected });
    }

    fn string_at(&mut self, key: &str, required: bool) -> Option<String> {
        let v = self.get(key, required)?;
        match v.as_str() {
            Some(s) => Some(s.to_string()),
            None => {
                self.wrong_type(key, "string");
                None
            }
        }
    }

    pub fn req_str(&mut self, key: &str) -> Option<String> {
        self.string_at(key, true)
    }

    pub fn opt_str(&mut self, key: &str) -> Option<String> {
        self.string_at(key, false)
    }

    /// Identifier fields must be non-empty strings.
    pub fn req_id(&mut self, key: &str) -> Option<String> {
        let v = self.get(key, true)?;
        match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::String(_) => {
                self.push(
                    key,
                    ViolationKind::InvalidFormat {
                        value: String::new(),
                        expected: "non-empty id",
                    },
                );
                None
            }
            _ => {
                self.wrong_type(key, "string");
                None
            }
        }
    }

    fn number_at(&mut self, key: &str, required: bool) -> Option<f64> {
        let v = self.get(key, required)?;
        match v.as_f64() {
            Some(n) => Some(n),
            None => {
                self.wrong_type(key, "number");
                None
            }
        }
    }

    /// A number within `[min, max]`.
    pub fn req_ranged(&mut self, key: &str, min: f64, max: f64, expected: &'static str) -> Option<f64> {
        let n = self.number_at(key, true)?;
        if (min..=max).contains(&n) {
            Some(n)
        } else {
            self.push(
                key,
                ViolationKind::OutOfRange {
                    value: n.to_string(),
                    expected,
                },
            );
            None
        }
    }

    fn count_at(&mut self, key: &str, required: bool) -> Option<u32> {
        let v = self.get(key, required)?;
        match v.as_i64() {
            Some(n) if (0..=i64::from(u32::MAX)).contains(&n) => Some(n as u32),
            Some(n) => {
                self.push(
                    key,
                    ViolationKind::OutOfRange {
                        value: n.to_string(),
                        expected: "non-negative integer",
                    },
                );
                None
            }
            None => {
                self.wrong_type(key, "integer");
                None
            }
        }
    }

    pub fn req_count(&mut self, key: &str) -> Option<u32> {
        self.count_at(key, true)
    }

    pub fn opt_count(&mut self, key: &str) -> Option<u32> {
        self.count_at(key, false)
    }

    /// An integer within `[min, max]`, e.g. calendar months.
    pub fn int_in(
        &mut self,
        key: &str,
        min: i64,
        max: i64,
        required: bool,
        expected: &'static str,
    ) -> Option<i64> {
        let v = self.get(key, required)?;
        match v.as_i64() {
            Some(n) if (min..=max).contains(&n) => Some(n),
            Some(n) => {
                self.push(
                    key,
                    ViolationKind::OutOfRange {
                        value: n.to_string(),
                        expected,
                    },
                );
                None
            }
            None => {
                self.wrong_type(key, "integer");
                None
            }
        }
    }

    /// Non-negative monetary amount, as a number or a decimal string.
    pub fn req_amount(&mut self, key: &str) -> Option<f64> {
        let v = self.get(key, true)?;
        let n = match v {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => n,
                _ => {
                    self.push(
                        key,
                        ViolationKind::InvalidFormat {
                            value: s.clone(),
                            expected: "decimal amount",
                        },
                    );
                    return None;
                }
            },
            _ => {
                self.wrong_type(key, "number");
                return None;
            }
        };
        if n < 0.0 {
            self.push(
                key,
                ViolationKind::OutOfRange {
                    value: n.to_string(),
                    expected: "non-negative amount",
                },
            );
            return None;
        }
        Some(n)
    }

    /// Bit flag: `0`/`1`, or a JSON boolean as published by GBFS 2.x.
    pub fn req_bit(&mut self, key: &str) -> Option<bool> {
        let v = self.get(key, true)?;
        match v {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => {
                    self.push(
                        key,
                        ViolationKind::OutOfRange {
                            value: n.to_string(),
                            expected: "0 or 1",
                        },
                    );
                    None
                }
            },
            _ => {
                self.wrong_type(key, "0 or 1");
                None
            }
        }
    }

    fn timestamp_at(&mut self, key: &str, required: bool) -> Option<DateTime<Utc>> {
        let v = self.get(key, required)?;
        match parse_timestamp(v) {
            Some(t) => Some(t),
            None => {
                self.push(
                    key,
                    ViolationKind::InvalidFormat {
                        value: v.to_string(),
                        expected: "POSIX timestamp",
                    },
                );
                None
            }
        }
    }

    pub fn req_timestamp(&mut self, key: &str) -> Option<DateTime<Utc>> {
        self.timestamp_at(key, true)
    }

    pub fn opt_timestamp(&mut self, key: &str) -> Option<DateTime<Utc>> {
        self.timestamp_at(key, false)
    }

    /// `HH:MM:SS`, hours up to 47 for service running past midnight.
    pub fn req_service_time(&mut self, key: &str) -> Option<String> {
        let s = self.req_str(key)?;
        if is_service_time(&s) {
            Some(s)
        } else {
            self.push(
                key,
                ViolationKind::InvalidFormat {
                    value: s,
                    expected: "HH:MM:SS",
                },
            );
            None
        }
    }

    /// Array of JSON values at `key`. Absent optional arrays read as empty.
    pub fn array(&mut self, key: &str, required: bool) -> Option<&'v Vec<Value>> {
        let v = self.get(key, required)?;
        match v.as_array() {
            Some(items) => Some(items),
            None => {
                self.wrong_type(key, "array");
                None
            }
        }
    }

    /// Array of strings at `key`. Absent optional arrays read as empty.
    pub fn str_array(&mut self, key: &str, required: bool) -> Option<Vec<String>> {
        let Some(items) = self.array(key, required) else {
            return (!required).then(Vec::new);
        };
        let mut out = Vec::with_capacity(items.len());
        let mut ok = true;
        for (i, item) in items.iter().enumerate() {
            match item.as_str() {
                Some(s) => out.push(s.to_string()),
                None => {
                    ok = false;
                    self.push(&format!("{key}[{i}]"), ViolationKind::WrongType { expected: "string" });
                }
            }
        }
        ok.then_some(out)
    }

    /// Array of literals from a closed set. Every unknown literal is recorded.
    pub fn enum_array<E>(
        &mut self,
        key: &str,
        required: bool,
        parse: fn(&str) -> Option<E>,
        allowed: &'static [&'static str],
    ) -> Option<Vec<E>> {
        let items = self.str_array(key, required)?;
        let mut out = Vec::with_capacity(items.len());
        let mut ok = true;
        for (i, item) in items.into_iter().enumerate() {
            match parse(&item) {
                Some(e) => out.push(e),
                None => {
                    ok = false;
                    self.push(
                        &format!("{key}[{i}]"),
                        ViolationKind::InvalidEnum {
                            value: item,
                            allowed,
                        },
                    );
                }
            }
        }
        ok.then_some(out)
    }

    /// Single literal from a closed set.
    pub fn req_enum<E>(
        &mut self,
        key: &str,
        parse: fn(&str) -> Option<E>,
        allowed: &'static [&'static str],
    ) -> Option<E> {
        let s = self.req_str(key)?;
        match parse(&s) {
            Some(e) => Some(e),
            None => {
                self.push(key, ViolationKind::InvalidEnum { value: s, allowed });
                None
            }
        }
    }

    /// Reads each object of the array at `key` with `read`.
    ///
    /// Returns `None` if any element failed; absent optional arrays read as empty.
    pub fn each<T>(
        &mut self,
        key: &str,
        required: bool,
        mut read: impl FnMut(&mut Record<'_, 'v>) -> Option<T>,
    ) -> Option<Vec<T>> {
        let Some(items) = self.array(key, required) else {
            return (!required).then(Vec::new);
        };
        let mut parsed = Vec::with_capacity(items.len());
        let mut complete = true;
        for (i, item) in items.iter().enumerate() {
            let path = format!("{}.{key}[{i}]", self.path);
            match Record::new(item, path, self.out).and_then(|mut r| read(&mut r)) {
                Some(value) => parsed.push(value),
                None => complete = false,
            }
        }
        complete.then_some(parsed)
    }

    /// Records a duplicate-id violation for every repeat of `id_key` in the array at `key`.
    pub fn unique_ids(&mut self, key: &str, id_key: &str) {
        let obj: &'v Map<String, Value> = self.obj;
        let Some(items) = obj.get(key).and_then(Value::as_array) else {
            return;
        };
        let mut seen = HashSet::new();
        for (i, item) in items.iter().enumerate() {
            let Some(id) = item.get(id_key).and_then(Value::as_str) else {
                continue;
            };
            if !seen.insert(id) {
                self.out.push(Violation::new(
                    format!("{}.{key}[{i}].{id_key}", self.path),
                    ViolationKind::DuplicateId { id: id.to_string() },
                ));
            }
        }
    }

    /// Records a violation against a field of this record.
    pub fn report(&mut self, key: &str, kind: ViolationKind) {
        self.push(key, kind);
    }

    /// Records a violation against the record as a whole.
    pub fn flag(&mut self, kind: ViolationKind) {
        self.out.push(Violation::new(self.path.clone(), kind));
    }
}

fn is_service_time(s: &str) -> bool {
    let parts: Vec<&str> = s.split(':').collect();
    let [h, m, sec] = parts.as_slice() else {
        return false;
    };
    let two_digits = |p: &str| p.len() == 2 && p.bytes().all(|b| b.is_ascii_digit());
    if !(two_digits(h) && two_digits(m) && two_digits(sec)) {
        return false;
    }
    let (Ok(h), Ok(m), Ok(sec)) = (h.parse::<u8>(), m.parse::<u8>(), sec.parse::<u8>()) else {
        return false;
    };
    h <= 47 && m <= 59 && sec <= 59
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_time_format() {
        assert!(is_service_time("06:00:00"));
        assert!(is_service_time("25:30:00"));
        assert!(!is_service_time("6:00:00"));
        assert!(!is_service_time("06:60:00"));
        assert!(!is_service_time("48:00:00"));
        assert!(!is_service_time("06:00"));
    }
}
