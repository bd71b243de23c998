use crate::credential::CredentialDescriptor;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "CRM_MCP_CONFIG";
pub const CREDENTIALS_PATH_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const SPREADSHEET_ID_ENV: &str = "GOOGLE_SHEETS_SPREADSHEET_ID";
pub const SHEETS_ACCESS_TOKEN_ENV: &str = "GOOGLE_SHEETS_ACCESS_TOKEN";
pub const SHEETS_RANGE_ENV: &str = "GOOGLE_SHEETS_RANGE";
pub const SHEETS_API_BASE_URL_ENV: &str = "GOOGLE_SHEETS_API_BASE_URL";
pub const CALENDLY_API_TOKEN_ENV: &str = "CALENDLY_API_TOKEN";
pub const CALENDLY_ORGANIZATION_ENV: &str = "CALENDLY_ORGANIZATION_URI";
pub const CALENDLY_BASE_URL_ENV: &str = "CALENDLY_BASE_URL";
pub const BACKEND_TIMEOUT_ENV: &str = "CRM_MCP_BACKEND_TIMEOUT_MS";
pub const MAX_PAGES_ENV: &str = "CRM_MCP_MAX_EVENT_TYPE_PAGES";

pub const DEFAULT_SHEET_RANGE: &str = "Sheet1!A:H";
pub const DEFAULT_SHEETS_API_BASE_URL: &str = "https://sheets.googleapis.com";
pub const DEFAULT_CALENDLY_BASE_URL: &str = "https://api.calendly.com";
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_EVENT_TYPE_PAGES: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {path}: {message}")]
    ParseFile { path: PathBuf, message: String },
    #[error("failed to read service account credentials: {path}: {source}")]
    ReadCredentials {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse service account credentials JSON: {path}: {message}")]
    ParseCredentials { path: PathBuf, message: String },
    #[error(
        "{section} backend is partially configured; missing: {} (fix: set the variables or remove the partial settings)",
        .missing.join(", ")
    )]
    Incomplete {
        section: &'static str,
        missing: Vec<&'static str>,
    },
    #[error("invalid value for {key}: {value:?} ({message})")]
    InvalidValue {
        key: &'static str,
        value: String,
        message: &'static str,
    },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::ReadFile { .. } => "config.read_failed",
            ConfigError::ParseFile { .. } => "config.parse_failed",
            ConfigError::ReadCredentials { .. } => "config.credentials_read_failed",
            ConfigError::ParseCredentials { .. } => "config.credentials_parse_failed",
            ConfigError::Incomplete { .. } => "config.missing_env",
            ConfigError::InvalidValue { .. } => "config.invalid_value",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpreadsheetConfig {
    pub credentials_path: Option<PathBuf>,
    pub spreadsheet_id: String,
    pub project_id: Option<String>,
    pub service_account_email: Option<String>,
    pub access_token: CredentialDescriptor,
    pub sheet_range: String,
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    pub api_token: CredentialDescriptor,
    pub organization_uri: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub enum AdapterConfig {
    Spreadsheet(SpreadsheetConfig),
    Scheduling(SchedulingConfig),
}

impl AdapterConfig {
    pub fn credentials(&self) -> Vec<&CredentialDescriptor> {
        match self {
            AdapterConfig::Spreadsheet(c) => vec![&c.access_token],
            AdapterConfig::Scheduling(c) => vec![&c.api_token],
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub adapters: Vec<AdapterConfig>,
    pub backend_timeout: Duration,
    pub max_event_type_pages: u32,
    pub config_file: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            adapters: vec![],
            backend_timeout: Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS),
            max_event_type_pages: DEFAULT_MAX_EVENT_TYPE_PAGES,
            config_file: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    backend_timeout_ms: Option<u64>,
    max_event_type_pages: Option<u32>,
    #[serde(default)]
    spreadsheet: FileSpreadsheet,
    #[serde(default)]
    scheduling: FileScheduling,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSpreadsheet {
    credentials_path: Option<String>,
    spreadsheet_id: Option<String>,
    access_token: Option<String>,
    range: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileScheduling {
    api_token: Option<String>,
    organization_uri: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    project_id: Option<String>,
    client_email: Option<String>,
}

struct Resolved {
    value: String,
    label: String,
}

struct Sources<'a, F> {
    lookup: F,
    file: Option<(&'a Path, &'a FileConfig)>,
}

impl<F: Fn(&str) -> Option<String>> Sources<'_, F> {
    fn get(&self, env_key: &str, from_file: impl Fn(&FileConfig) -> Option<&String>) -> Option<Resolved> {
        if let Some(value) = (self.lookup)(env_key).filter(|v| !v.trim().is_empty()) {
            return Some(Resolved {
                value: value.trim().to_string(),
                label: format!("env {env_key}"),
            });
        }
        let (path, file) = self.file?;
        from_file(file)
            .filter(|v| !v.trim().is_empty())
            .map(|v| Resolved {
                value: v.trim().to_string(),
                label: format!("file {}", path.display()),
            })
    }
}

impl GatewayConfig {
    /// Reads the process environment, layered over the TOML file named by
    /// `CRM_MCP_CONFIG` when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let lookup = |k: &str| std::env::var(k).ok();
        match lookup(CONFIG_PATH_ENV).filter(|s| !s.trim().is_empty()) {
            Some(path) => {
                let path = PathBuf::from(path.trim());
                let file = load_file(&path)?;
                Self::resolve(Sources {
                    lookup,
                    file: Some((&path, &file)),
                })
            }
            None => Self::resolve(Sources { lookup, file: None }),
        }
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Self::resolve(Sources { lookup, file: None })
    }

    pub fn from_lookup_and_file(
        lookup: impl Fn(&str) -> Option<String>,
        path: &Path,
    ) -> Result<Self, ConfigError> {
        let file = load_file(path)?;
        Self::resolve(Sources {
            lookup,
            file: Some((path, &file)),
        })
    }

    fn resolve<F: Fn(&str) -> Option<String>>(src: Sources<'_, F>) -> Result<Self, ConfigError> {
        let mut adapters = vec![];
        if let Some(sheets) = resolve_spreadsheet(&src)? {
            adapters.push(AdapterConfig::Spreadsheet(sheets));
        }
        if let Some(scheduling) = resolve_scheduling(&src)? {
            adapters.push(AdapterConfig::Scheduling(scheduling));
        }

        let backend_timeout_ms = match src.get(BACKEND_TIMEOUT_ENV, |_| None) {
            Some(r) => parse_positive(BACKEND_TIMEOUT_ENV, &r.value)?,
            None => src
                .file
                .and_then(|(_, f)| f.backend_timeout_ms)
                .unwrap_or(DEFAULT_BACKEND_TIMEOUT_MS),
        };
        let max_event_type_pages = match src.get(MAX_PAGES_ENV, |_| None) {
            Some(r) => parse_positive(MAX_PAGES_ENV, &r.value)?,
            None => src
                .file
                .and_then(|(_, f)| f.max_event_type_pages)
                .map(u64::from)
                .unwrap_or(u64::from(DEFAULT_MAX_EVENT_TYPE_PAGES)),
        };
        if backend_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: BACKEND_TIMEOUT_ENV,
                value: "0".to_string(),
                message: "must be greater than zero",
            });
        }
        let max_event_type_pages =
            u32::try_from(max_event_type_pages).map_err(|_| ConfigError::InvalidValue {
                key: MAX_PAGES_ENV,
                value: max_event_type_pages.to_string(),
                message: "too large",
            })?;
        if max_event_type_pages == 0 {
            return Err(ConfigError::InvalidValue {
                key: MAX_PAGES_ENV,
                value: "0".to_string(),
                message: "must be greater than zero",
            });
        }

        Ok(Self {
            adapters,
            backend_timeout: Duration::from_millis(backend_timeout_ms),
            max_event_type_pages,
            config_file: src.file.map(|(p, _)| p.to_path_buf()),
        })
    }

    pub fn spreadsheet(&self) -> Option<&SpreadsheetConfig> {
        self.adapters.iter().find_map(|a| match a {
            AdapterConfig::Spreadsheet(c) => Some(c),
            AdapterConfig::Scheduling(_) => None,
        })
    }

    pub fn scheduling(&self) -> Option<&SchedulingConfig> {
        self.adapters.iter().find_map(|a| match a {
            AdapterConfig::Scheduling(c) => Some(c),
            AdapterConfig::Spreadsheet(_) => None,
        })
    }

    pub fn credentials(&self) -> Vec<&CredentialDescriptor> {
        self.adapters.iter().flat_map(AdapterConfig::credentials).collect()
    }
}

fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|e| ConfigError::ParseFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn parse_positive(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        message: "expected a non-negative integer",
    })
}

fn resolve_spreadsheet<F: Fn(&str) -> Option<String>>(
    src: &Sources<'_, F>,
) -> Result<Option<SpreadsheetConfig>, ConfigError> {
    let credentials_path = src.get(CREDENTIALS_PATH_ENV, |f| f.spreadsheet.credentials_path.as_ref());
    let spreadsheet_id = src.get(SPREADSHEET_ID_ENV, |f| f.spreadsheet.spreadsheet_id.as_ref());
    let access_token = src.get(SHEETS_ACCESS_TOKEN_ENV, |f| f.spreadsheet.access_token.as_ref());
    if credentials_path.is_none() && spreadsheet_id.is_none() && access_token.is_none() {
        return Ok(None);
    }
    let (spreadsheet_id, access_token) = match (spreadsheet_id, access_token) {
        (Some(id), Some(token)) => (id, token),
        (id, token) => {
            let mut missing = vec![];
            if id.is_none() {
                missing.push(SPREADSHEET_ID_ENV);
            }
            if token.is_none() {
                missing.push(SHEETS_ACCESS_TOKEN_ENV);
            }
            return Err(ConfigError::Incomplete {
                section: "spreadsheet",
                missing,
            });
        }
    };

    let credentials_path = credentials_path.map(|r| PathBuf::from(r.value));
    let key = match &credentials_path {
        Some(path) => Some(read_service_account(path)?),
        None => None,
    };
    let (project_id, service_account_email) = match key {
        Some(k) => (k.project_id, k.client_email),
        None => (None, None),
    };

    Ok(Some(SpreadsheetConfig {
        credentials_path,
        spreadsheet_id: spreadsheet_id.value,
        project_id,
        service_account_email,
        access_token: CredentialDescriptor::new(access_token.value, access_token.label),
        sheet_range: src
            .get(SHEETS_RANGE_ENV, |f| f.spreadsheet.range.as_ref())
            .map(|r| r.value)
            .unwrap_or_else(|| DEFAULT_SHEET_RANGE.to_string()),
        api_base_url: src
            .get(SHEETS_API_BASE_URL_ENV, |f| f.spreadsheet.api_base_url.as_ref())
            .map(|r| r.value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE_URL.to_string()),
    }))
}

fn resolve_scheduling<F: Fn(&str) -> Option<String>>(
    src: &Sources<'_, F>,
) -> Result<Option<SchedulingConfig>, ConfigError> {
    let api_token = src.get(CALENDLY_API_TOKEN_ENV, |f| f.scheduling.api_token.as_ref());
    let organization = src.get(CALENDLY_ORGANIZATION_ENV, |f| {
        f.scheduling.organization_uri.as_ref()
    });
    match (api_token, organization) {
        (None, None) => Ok(None),
        (Some(token), Some(org)) => Ok(Some(SchedulingConfig {
            api_token: CredentialDescriptor::new(token.value, token.label),
            organization_uri: org.value,
            base_url: src
                .get(CALENDLY_BASE_URL_ENV, |f| f.scheduling.base_url.as_ref())
                .map(|r| r.value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_CALENDLY_BASE_URL.to_string()),
        })),
        (token, _) => Err(ConfigError::Incomplete {
            section: "scheduling",
            missing: vec![if token.is_none() {
                CALENDLY_API_TOKEN_ENV
            } else {
                CALENDLY_ORGANIZATION_ENV
            }],
        }),
    }
}

fn read_service_account(path: &Path) -> Result<ServiceAccountKey, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadCredentials {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::ParseCredentials {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
