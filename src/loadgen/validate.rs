//! Lenient response-body acceptance.
//!
//! The simulator's response shape may vary, so the check is permissive by
//! design: any body that parses as a non-empty JSON object passes, with or
//! without a delay-identifying field. Do not tighten this; a strict schema
//! would fail the run on harmless shape drift instead of measuring it.

use serde_json::Value;

/// Outcome of the body check, with a reason for the report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyVerdict {
    pub valid: bool,
    pub reason: &'static str,
}

impl BodyVerdict {
    fn valid(reason: &'static str) -> Self {
        Self {
            valid: true,
            reason,
        }
    }

    fn invalid(reason: &'static str) -> Self {
        Self {
            valid: false,
            reason,
        }
    }
}

/// Check raw response bytes against the lenient acceptance rule.
pub fn validate_body(bytes: &[u8]) -> BodyVerdict {
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(_) => return BodyVerdict::invalid("body is not valid JSON"),
    };

    let Some(object) = value.as_object() else {
        return BodyVerdict::invalid("body is not a JSON object");
    };

    if object.contains_key("delay")
        || object.contains_key("milliseconds")
        || object.contains_key("ms")
    {
        return BodyVerdict::valid("delay field present");
    }

    if !object.is_empty() {
        return BodyVerdict::valid("non-empty object");
    }

    BodyVerdict::invalid("empty object")
}
