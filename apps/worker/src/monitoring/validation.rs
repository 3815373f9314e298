//! Sanity checks applied to raw check records before they may be probed.
//!
//! Every field of the record is validated on its own. Malformed optional
//! fields fall back to their defaults, while a single malformed required
//! field rejects the whole record.

use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{Check, CheckState, Method, Protocol};

pub const CHECK_ID_LENGTH: usize = 20;
pub const PHONE_LENGTH: usize = 10;
pub const MIN_TIMEOUT_SECONDS: u64 = 1;
pub const MAX_TIMEOUT_SECONDS: u64 = 5;

/// Required fields of a check record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    Id,
    UserPhone,
    Protocol,
    Url,
    Method,
    SuccessCodes,
    TimeoutSeconds,
}

impl RequiredField {
    pub const ALL: [RequiredField; 7] = [
        RequiredField::Id,
        RequiredField::UserPhone,
        RequiredField::Protocol,
        RequiredField::Url,
        RequiredField::Method,
        RequiredField::SuccessCodes,
        RequiredField::TimeoutSeconds,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            RequiredField::Id => "id",
            RequiredField::UserPhone => "userPhone",
            RequiredField::Protocol => "protocol",
            RequiredField::Url => "url",
            RequiredField::Method => "method",
            RequiredField::SuccessCodes => "successCodes",
            RequiredField::TimeoutSeconds => "timeoutSeconds",
        }
    }
}

impl std::fmt::Display for RequiredField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Why a record was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("check record is not a JSON object")]
    NotAnObject,
    #[error("check record has invalid fields: {}", join_fields(.0))]
    InvalidFields(Vec<RequiredField>),
}

fn join_fields(fields: &[RequiredField]) -> String {
    fields.iter().map(RequiredField::key).collect::<Vec<_>>().join(", ")
}

const STATE_KEY: &str = "state";
const LAST_CHECKED_KEY: &str = "lastChecked";

/// Parse a raw record into a [`Check`] or reject it.
pub fn validate_check_data(raw: &Value) -> Result<Check, ValidationError> {
    let Some(record) = raw.as_object() else {
        return Err(ValidationError::NotAnObject);
    };

    let id = trimmed_with_length(record.get("id"), CHECK_ID_LENGTH);
    let user_phone = trimmed_with_length(record.get("userPhone"), PHONE_LENGTH);
    let protocol = parse_protocol(record.get("protocol"));
    let url = non_empty_trimmed(record.get("url"));
    let method = parse_method(record.get("method"));
    let success_codes = parse_success_codes(record.get("successCodes"));
    let timeout_seconds = parse_timeout(record.get("timeoutSeconds"));

    // Optional fields fall back to their defaults
    let state = parse_state(record.get(STATE_KEY)).unwrap_or_default();
    let last_checked = parse_last_checked(record.get(LAST_CHECKED_KEY));

    match (id, user_phone, protocol, url, method, success_codes, timeout_seconds) {
        (
            Some(id),
            Some(user_phone),
            Some(protocol),
            Some(url),
            Some(method),
            Some(success_codes),
            Some(timeout_seconds),
        ) => Ok(Check {
            id,
            user_phone,
            protocol,
            url,
            method,
            success_codes,
            timeout_seconds,
            state,
            last_checked,
            extra: unknown_fields(record),
        }),
        (id, user_phone, protocol, url, method, success_codes, timeout_seconds) => {
            let present = [
                id.is_some(),
                user_phone.is_some(),
                protocol.is_some(),
                url.is_some(),
                method.is_some(),
                success_codes.is_some(),
                timeout_seconds.is_some(),
            ];
            let invalid = RequiredField::ALL
                .into_iter()
                .zip(present)
                .filter_map(|(field, ok)| (!ok).then_some(field))
                .collect();
            Err(ValidationError::InvalidFields(invalid))
        }
    }
}

fn trimmed_with_length(value: Option<&Value>, length: usize) -> Option<String> {
    let trimmed = value?.as_str()?.trim();
    (trimmed.chars().count() == length).then(|| trimmed.to_string())
}

fn non_empty_trimmed(value: Option<&Value>) -> Option<String> {
    let trimmed = value?.as_str()?.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_protocol(value: Option<&Value>) -> Option<Protocol> {
    match value?.as_str()? {
        "http" => Some(Protocol::Http),
        "https" => Some(Protocol::Https),
        _ => None,
    }
}

fn parse_method(value: Option<&Value>) -> Option<Method> {
    match value?.as_str()? {
        "get" => Some(Method::Get),
        "post" => Some(Method::Post),
        "put" => Some(Method::Put),
        "delete" => Some(Method::Delete),
        _ => None,
    }
}

fn parse_state(value: Option<&Value>) -> Option<CheckState> {
    match value?.as_str()? {
        "up" => Some(CheckState::Up),
        "down" => Some(CheckState::Down),
        _ => None,
    }
}

/// Integral JSON number, accepting `2.0` as well as `2`
fn as_integer(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64).then_some(f as i64)
}

fn parse_success_codes(value: Option<&Value>) -> Option<Vec<u16>> {
    let items = value?.as_array()?;
    if items.is_empty() {
        return None;
    }
    items.iter().map(|item| as_integer(item).and_then(|code| u16::try_from(code).ok())).collect()
}

fn parse_timeout(value: Option<&Value>) -> Option<u64> {
    let seconds = u64::try_from(as_integer(value?)?).ok()?;
    (MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&seconds).then_some(seconds)
}

fn parse_last_checked(value: Option<&Value>) -> Option<i64> {
    let ms = value?.as_f64()?;
    (ms > 0.0).then_some(ms as i64)
}

fn unknown_fields(record: &Map<String, Value>) -> Map<String, Value> {
    record
        .iter()
        .filter(|(key, _)| {
            let key = key.as_str();
            key != STATE_KEY && key != LAST_CHECKED_KEY && RequiredField::ALL.iter().all(|f| f.key() != key)
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
