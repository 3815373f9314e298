use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Liveness state of a check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Up,
    #[default]
    Down,
}

impl std::fmt::Display for CheckState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckState::Up => write!(f, "up"),
            CheckState::Down => write!(f, "down"),
        }
    }
}

/// Scheme used to reach the probe target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP method issued by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Delete => "delete",
        }
    }

    pub fn to_http(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated check definition.
///
/// Values of this type are immutable snapshots taken at validation time.
/// The outcome processor derives a new value via [`Check::observed`] instead
/// of mutating the snapshot in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    pub id: String,
    pub user_phone: String,
    pub protocol: Protocol,
    pub url: String,
    pub method: Method,
    pub success_codes: Vec<u16>,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub state: CheckState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<i64>,

    /// Fields owned by the CRUD layer, written back untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Check {
    /// Full target URL including the scheme
    pub fn target(&self) -> String {
        format!("{}://{}", self.protocol, self.url)
    }

    /// Whether a response code counts as "up" for this check
    pub fn is_success_code(&self, code: u16) -> bool {
        self.success_codes.contains(&code)
    }

    /// Copy of this check carrying a new state and probe time
    pub fn observed(&self, state: CheckState, checked_at_ms: i64) -> Self {
        Self { state, last_checked: Some(checked_at_ms), ..self.clone() }
    }
}

/// Classification of a failed probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeErrorKind {
    Transport,
    Timeout,
}

/// Error half of a [`CheckOutcome`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeError {
    pub kind: ProbeErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Result of a single probe attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub error: Option<ProbeError>,
    pub response_code: Option<u16>,
}

impl CheckOutcome {
    /// A response was received, whatever its status
    pub fn response(status_code: u16) -> Self {
        Self { error: None, response_code: Some(status_code) }
    }

    /// Connection, DNS, reset or request-building failure
    pub fn transport(detail: impl Into<String>) -> Self {
        Self {
            error: Some(ProbeError { kind: ProbeErrorKind::Transport, detail: Some(detail.into()) }),
            response_code: None,
        }
    }

    /// The probe exceeded its timeout
    pub fn timeout() -> Self {
        Self { error: Some(ProbeError { kind: ProbeErrorKind::Timeout, detail: None }), response_code: None }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(&self.error, Some(ProbeError { kind: ProbeErrorKind::Timeout, .. }))
    }
}

/// One line of a check's audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Check snapshot as it was when the probe was issued
    pub check: Check,
    pub outcome: CheckOutcome,
    pub state: CheckState,
    pub alert_sent: bool,
    pub time_ms: i64,
}
