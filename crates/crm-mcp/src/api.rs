use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const STATUS_VALUES: &[&str] = &["open", "in-progress", "resolved", "closed"];
pub const PRIORITY_VALUES: &[&str] = &["low", "medium", "high", "urgent"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl RecordStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "in-progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in-progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl RecordPriority {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub issue: String,
    pub status: RecordStatus,
    pub priority: RecordPriority,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CustomerRecord {
    /// Column order of the customer sheet; `to_row` must stay in sync.
    pub const COLUMNS: [&'static str; 8] = [
        "name",
        "email",
        "phone",
        "issue",
        "status",
        "priority",
        "created_at",
        "notes",
    ];

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.email.clone(),
            self.phone.clone().unwrap_or_default(),
            self.issue.clone(),
            self.status.as_str().to_string(),
            self.priority.as_str().to_string(),
            self.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.notes.clone().unwrap_or_default(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowReference {
    pub spreadsheet_id: String,
    pub updated_range: String,
    pub updated_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTypeQuery {
    pub organization: String,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventType {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub scheduling_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownTool,
    MissingField,
    InvalidEnumValue,
    TypeMismatch,
    BackendUnavailable,
    RateLimited,
    AuthFailure,
    BackendError,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownTool => "unknown_tool",
            Self::MissingField => "missing_field",
            Self::InvalidEnumValue => "invalid_enum_value",
            Self::TypeMismatch => "type_mismatch",
            Self::BackendUnavailable => "backend_unavailable",
            Self::RateLimited => "rate_limited",
            Self::AuthFailure => "auth_failure",
            Self::BackendError => "backend_error",
        }
    }

    /// Default retry flag for the kind, as set by [`ToolFailure::new`].
    ///
    /// Callers must decide on retries from [`ToolFailure::retryable`], not from
    /// the kind: a `BackendUnavailable` failure for a backend that has no
    /// configuration at all is reported with `retryable: false`.
    pub fn retryable(self) -> bool {
        matches!(self, Self::BackendUnavailable | Self::RateLimited)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Authoritative retry hint. Starts as the kind default.
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ToolFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.retryable(),
            field: None,
            retry_after_secs: None,
        }
    }

    pub fn for_field(kind: FailureKind, field: &str, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.to_string()),
            ..Self::new(kind, message)
        }
    }

    /// Marks a failure that retrying cannot fix, whatever its kind.
    pub fn permanent(self) -> Self {
        Self {
            retryable: false,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success { payload: serde_json::Value },
    Failure(ToolFailure),
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn failure(&self) -> Option<&ToolFailure> {
        match self {
            Self::Failure(f) => Some(f),
            Self::Success { .. } => None,
        }
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Success { payload } => Some(payload),
            Self::Failure(_) => None,
        }
    }

    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failure(f) => f.kind.as_str(),
        }
    }
}
