use crate::adapters::{
    AdapterError, CalendlyAdapter, SchedulingBackend, SheetsAdapter, SpreadsheetBackend,
    http_client,
};
use crate::api::{
    CustomerRecord, EventTypeQuery, FailureKind, RecordPriority, RecordStatus, ToolCall,
    ToolFailure, ToolResult,
};
use crate::config::{
    CALENDLY_API_TOKEN_ENV, CALENDLY_ORGANIZATION_ENV, GatewayConfig, SHEETS_ACCESS_TOKEN_ENV,
    SPREADSHEET_ID_ENV,
};
use crate::credential::{CredentialDescriptor, scrub};
use crate::registry::{AdapterRef, FieldSpec, FieldType, Operation, RegistryError, ToolDefinition, ToolRegistry};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Clone, Default)]
pub struct Backends {
    pub spreadsheet: Option<Arc<dyn SpreadsheetBackend>>,
    pub scheduling: Option<Arc<dyn SchedulingBackend>>,
}

/// Routes validated tool calls to their backend. Holds no mutable state, so
/// one instance serves any number of concurrent calls.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    backends: Backends,
    timeout: Duration,
    secrets: Vec<CredentialDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
enum ArgValue {
    Str(String),
    Bool(bool),
}

#[derive(Debug, Default)]
struct ValidatedArgs {
    values: BTreeMap<&'static str, ArgValue>,
}

impl ValidatedArgs {
    fn str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    fn bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ArgValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    fn required_str(&self, name: &str) -> Result<String, ToolFailure> {
        self.str(name).map(str::to_string).ok_or_else(|| {
            ToolFailure::for_field(
                FailureKind::MissingField,
                name,
                format!("missing required field `{name}`"),
            )
        })
    }
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, backends: Backends, timeout: Duration) -> Self {
        Self {
            registry,
            backends,
            timeout,
            secrets: vec![],
        }
    }

    /// Credentials scrubbed from every outgoing failure message.
    pub fn with_secrets(mut self, secrets: impl IntoIterator<Item = CredentialDescriptor>) -> Self {
        self.secrets.extend(secrets);
        self
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, BuildError> {
        let registry = Arc::new(ToolRegistry::builtin()?);
        let client = http_client(config.backend_timeout)?;
        let backends = Backends {
            spreadsheet: config.spreadsheet().map(|c| {
                Arc::new(SheetsAdapter::new(c.clone(), client.clone())) as Arc<dyn SpreadsheetBackend>
            }),
            scheduling: config.scheduling().map(|c| {
                Arc::new(CalendlyAdapter::new(
                    c.clone(),
                    client.clone(),
                    config.max_event_type_pages,
                )) as Arc<dyn SchedulingBackend>
            }),
        };
        Ok(Self::new(registry, backends, config.backend_timeout)
            .with_secrets(config.credentials().into_iter().cloned()))
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let started = Instant::now();
        let result = self.dispatch_inner(call).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            ToolResult::Success { .. } => {
                tracing::info!(tool = %call.name, outcome = "success", elapsed_ms, "tool dispatched");
            }
            ToolResult::Failure(f) if f.kind.retryable() || f.kind == FailureKind::AuthFailure => {
                tracing::warn!(tool = %call.name, outcome = f.kind.as_str(), retryable = f.retryable, elapsed_ms, message = %f.message, "tool failed");
            }
            ToolResult::Failure(f) => {
                tracing::info!(tool = %call.name, outcome = f.kind.as_str(), elapsed_ms, "tool rejected");
            }
        }
        result
    }

    async fn dispatch_inner(&self, call: &ToolCall) -> ToolResult {
        let def = match self.registry.lookup(&call.name) {
            Ok(def) => def,
            Err(err) => {
                let available: Vec<&str> =
                    self.registry.definitions().map(|d| d.name.as_str()).collect();
                return ToolResult::Failure(ToolFailure::new(
                    FailureKind::UnknownTool,
                    format!("{err} (available: {})", available.join(", ")),
                ));
            }
        };
        let args = match validate_arguments(def, &call.arguments) {
            Ok(args) => args,
            Err(failure) => return ToolResult::Failure(failure),
        };
        match self.invoke(def, args).await {
            Ok(result) | Err(result) => result,
        }
    }

    async fn invoke(&self, def: &ToolDefinition, args: ValidatedArgs) -> Result<ToolResult, ToolResult> {
        match def.operation {
            Operation::AppendRecord => {
                let record = customer_record(&args).map_err(ToolResult::Failure)?;
                let backend = self
                    .backends
                    .spreadsheet
                    .as_ref()
                    .ok_or_else(|| not_configured(def.adapter))?;
                Ok(self.bounded(backend.append_record(&record)).await)
            }
            Operation::ListEventTypes => {
                let backend = self
                    .backends
                    .scheduling
                    .as_ref()
                    .ok_or_else(|| not_configured(def.adapter))?;
                let organization = args
                    .str("organization")
                    .or_else(|| backend.default_organization())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ToolResult::Failure(ToolFailure::for_field(
                            FailureKind::MissingField,
                            "organization",
                            "missing required field `organization` (no default organization configured)",
                        ))
                    })?;
                let query = EventTypeQuery {
                    organization,
                    active: args.bool("active"),
                };
                Ok(self.bounded(backend.list_event_types(&query)).await)
            }
        }
    }

    async fn bounded<T: Serialize>(
        &self,
        call: impl Future<Output = Result<T, AdapterError>>,
    ) -> ToolResult {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => match serde_json::to_value(value) {
                Ok(payload) => ToolResult::Success { payload },
                Err(e) => ToolResult::Failure(ToolFailure::new(
                    FailureKind::BackendError,
                    format!("failed to encode backend result: {e}"),
                )),
            },
            Ok(Err(err)) => ToolResult::Failure(self.classify(err)),
            Err(_) => ToolResult::Failure(ToolFailure::new(
                FailureKind::BackendUnavailable,
                format!(
                    "backend call timed out after {} ms",
                    self.timeout.as_millis()
                ),
            )),
        }
    }

    fn classify(&self, err: AdapterError) -> ToolFailure {
        let message = scrub(&err.to_string(), &self.secrets);
        match err {
            AdapterError::Unavailable { .. } => {
                ToolFailure::new(FailureKind::BackendUnavailable, message)
            }
            AdapterError::Auth { .. } => ToolFailure::new(FailureKind::AuthFailure, message),
            AdapterError::RateLimited {
                retry_after_secs, ..
            } => ToolFailure {
                retry_after_secs,
                ..ToolFailure::new(FailureKind::RateLimited, message)
            },
            AdapterError::Backend { .. } => ToolFailure::new(FailureKind::BackendError, message),
        }
    }
}

fn not_configured(adapter: AdapterRef) -> ToolResult {
    let hint = match adapter {
        AdapterRef::Spreadsheet => format!("set {SPREADSHEET_ID_ENV} and {SHEETS_ACCESS_TOKEN_ENV}"),
        AdapterRef::Scheduling => {
            format!("set {CALENDLY_API_TOKEN_ENV} and {CALENDLY_ORGANIZATION_ENV}")
        }
    };
    ToolResult::Failure(
        ToolFailure::new(
            FailureKind::BackendUnavailable,
            format!("{} backend is not configured ({hint})", adapter.as_str()),
        )
        .permanent(),
    )
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn missing(field: &FieldSpec) -> ToolFailure {
    ToolFailure::for_field(
        FailureKind::MissingField,
        field.name,
        format!("missing required field `{}`", field.name),
    )
}

/// Checks every field in schema order; the first violation wins. Unknown
/// argument keys are ignored.
fn validate_arguments(def: &ToolDefinition, arguments: &Value) -> Result<ValidatedArgs, ToolFailure> {
    let empty = Map::new();
    let obj = match arguments {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(ToolFailure::for_field(
                FailureKind::TypeMismatch,
                "arguments",
                format!("arguments must be a JSON object, got {}", json_type(other)),
            ));
        }
    };

    let mut out = ValidatedArgs::default();
    for field in &def.input_schema {
        let Some(value) = obj.get(field.name).filter(|v| !v.is_null()) else {
            if field.required {
                return Err(missing(field));
            }
            continue;
        };
        match (field.ty, value) {
            (FieldType::String, Value::String(s)) => {
                let s = s.trim();
                if s.is_empty() {
                    if field.required {
                        return Err(missing(field));
                    }
                    continue;
                }
                let normalized = match field.allowed_values {
                    Some(allowed) => {
                        let lowered = s.to_ascii_lowercase();
                        if !allowed.iter().any(|a| *a == lowered) {
                            return Err(ToolFailure::for_field(
                                FailureKind::InvalidEnumValue,
                                field.name,
                                format!(
                                    "invalid value {s:?} for field `{}`; allowed: {}",
                                    field.name,
                                    allowed.join(", ")
                                ),
                            ));
                        }
                        lowered
                    }
                    None => s.to_string(),
                };
                out.values.insert(field.name, ArgValue::Str(normalized));
            }
            (FieldType::Boolean, Value::Bool(b)) => {
                out.values.insert(field.name, ArgValue::Bool(*b));
            }
            (ty, other) => {
                return Err(ToolFailure::for_field(
                    FailureKind::TypeMismatch,
                    field.name,
                    format!(
                        "field `{}` must be a {}, got {}",
                        field.name,
                        ty.as_str(),
                        json_type(other)
                    ),
                ));
            }
        }
    }

    for key in obj.keys() {
        if !def.input_schema.iter().any(|f| f.name == key) {
            tracing::debug!(tool = %def.name, field = %key, "ignoring unknown argument");
        }
    }
    Ok(out)
}

fn customer_record(args: &ValidatedArgs) -> Result<CustomerRecord, ToolFailure> {
    let status_raw = args.required_str("status")?;
    let priority_raw = args.required_str("priority")?;
    let status = RecordStatus::parse(&status_raw).ok_or_else(|| {
        ToolFailure::for_field(
            FailureKind::InvalidEnumValue,
            "status",
            format!("invalid value {status_raw:?} for field `status`"),
        )
    })?;
    let priority = RecordPriority::parse(&priority_raw).ok_or_else(|| {
        ToolFailure::for_field(
            FailureKind::InvalidEnumValue,
            "priority",
            format!("invalid value {priority_raw:?} for field `priority`"),
        )
    })?;
    Ok(CustomerRecord {
        name: args.required_str("name")?,
        email: args.required_str("email")?,
        phone: args.str("phone").map(str::to_string),
        issue: args.required_str("issue")?,
        status,
        priority,
        notes: args.str("notes").map(str::to_string),
        created_at: chrono::Utc::now(),
    })
}
