//! JSON envelope parser for GBFS feed documents.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::error::FetchError;
use crate::model::FeedEnvelope;

/// A feed envelope whose `data` has not been validated yet.
pub type RawEnvelope = FeedEnvelope<Value>;

/// Decodes a `{last_updated, ttl, version?, data}` document from raw bytes.
///
/// `last_updated` may be POSIX seconds or an RFC 3339 string; `fetched_at`
/// is stamped with the current time.
///
/// # Errors
///
/// Returns [`FetchError::Parse`] if the bytes are not JSON or the envelope
/// fields are missing or of the wrong kind.
pub fn parse_envelope(bytes: &[u8]) -> Result<RawEnvelope, FetchError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| FetchError::Parse(format!("invalid JSON: {e}")))?;

    let Value::Object(mut obj) = value else {
        return Err(FetchError::Parse("envelope is not a JSON object".into()));
    };

    let last_updated = obj
        .get("last_updated")
        .ok_or_else(|| FetchError::Parse("missing last_updated".into()))
        .and_then(|v| {
            parse_timestamp(v)
                .ok_or_else(|| FetchError::Parse(format!("invalid last_updated: {v}")))
        })?;

    let ttl = obj
        .get("ttl")
        .ok_or_else(|| FetchError::Parse("missing ttl".into()))
        .and_then(|v| {
            v.as_u64()
                .ok_or_else(|| FetchError::Parse(format!("invalid ttl: {v}")))
        })?;

    let version = match obj.get("version") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => return Err(FetchError::Parse(format!("invalid version: {other}"))),
    };

    let data = match obj.remove("data") {
        Some(data @ Value::Object(_)) => data,
        Some(_) => return Err(FetchError::Parse("data is not a JSON object".into())),
        None => return Err(FetchError::Parse("missing data".into())),
    };

    Ok(FeedEnvelope {
        last_updated,
        ttl,
        version,
        data,
        fetched_at: Utc::now(),
    })
}

/// Reads a GBFS timestamp: non-negative POSIX seconds or an RFC 3339 string.
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let secs = n.as_i64()?;
            if secs < 0 {
                return None;
            }
            Utc.timestamp_opt(secs, 0).single()
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_envelope() {
        let env = parse_envelope(br#"{"last_updated": 1700000000, "ttl": 60, "data": {}}"#)
            .unwrap();
        assert_eq!(env.last_updated.timestamp(), 1700000000);
        assert_eq!(env.ttl, 60);
        assert_eq!(env.version, None);
        assert!(env.data.is_object());
    }

    #[test]
    fn test_parse_rfc3339_and_version() {
        let env = parse_envelope(
            br#"{"last_updated": "2023-11-14T22:13:20Z", "ttl": 0, "version": "2.3", "data": {"stations": []}}"#,
        )
        .unwrap();
        assert_eq!(env.last_updated.timestamp(), 1700000000);
        assert_eq!(env.ttl, 0);
        assert_eq!(env.version.as_deref(), Some("2.3"));
    }

    #[test]
    fn test_parse_invalid_bytes() {
        let result = parse_envelope(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(FetchError::Parse(_))));
    }

    #[test]
    fn test_parse_rejects_bad_envelope() {
        for body in [
            r#"[]"#,
            r#"{"ttl": 60, "data": {}}"#,
            r#"{"last_updated": 1, "data": {}}"#,
            r#"{"last_updated": 1, "ttl": -5, "data": {}}"#,
            r#"{"last_updated": -1, "ttl": 5, "data": {}}"#,
            r#"{"last_updated": 1, "ttl": 5}"#,
            r#"{"last_updated": 1, "ttl": 5, "data": []}"#,
        ] {
            assert!(
                matches!(parse_envelope(body.as_bytes()), Err(FetchError::Parse(_))),
                "accepted {body}"
            );
        }
    }
}
