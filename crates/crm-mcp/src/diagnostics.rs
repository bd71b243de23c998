use crate::config::{GatewayConfig, SchedulingConfig, SpreadsheetConfig};
use crate::credential::CredentialDescriptor;
use std::fmt;

const NOT_CONFIGURED: &str = "not configured";

/// Human-readable configuration report. Credentials appear only in masked
/// form, followed by where they were read from.
pub fn describe(config: &GatewayConfig) -> String {
    Report(config).to_string()
}

/// Display form of the configuration report rendered by [`describe`].
pub struct Report<'a>(pub &'a GatewayConfig);

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.0;
        writeln!(f, "crm-mcp {}", env!("CARGO_PKG_VERSION"))?;
        writeln!(
            f,
            "config file: {}",
            config
                .config_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none (environment only)".to_string())
        )?;
        writeln!(f, "backend timeout: {} ms", config.backend_timeout.as_millis())?;
        writeln!(f, "max event type pages: {}", config.max_event_type_pages)?;

        match config.spreadsheet() {
            Some(sheets) => spreadsheet_section(f, sheets)?,
            None => writeln!(f, "spreadsheet: {NOT_CONFIGURED}")?,
        }
        match config.scheduling() {
            Some(scheduling) => scheduling_section(f, scheduling),
            None => writeln!(f, "scheduling: {NOT_CONFIGURED}"),
        }
    }
}

fn credential_line(c: &CredentialDescriptor) -> String {
    format!("{} (from {})", c.masked(), c.source_label())
}

fn or_unknown(v: Option<&str>) -> &str {
    v.unwrap_or("unknown")
}

fn spreadsheet_section(f: &mut fmt::Formatter<'_>, c: &SpreadsheetConfig) -> fmt::Result {
    writeln!(f, "spreadsheet:")?;
    writeln!(f, "  spreadsheet id: {}", c.spreadsheet_id)?;
    writeln!(f, "  range: {}", c.sheet_range)?;
    writeln!(f, "  api base url: {}", c.api_base_url)?;
    writeln!(
        f,
        "  credentials file: {}",
        c.credentials_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none".to_string())
    )?;
    writeln!(f, "  project id: {}", or_unknown(c.project_id.as_deref()))?;
    writeln!(
        f,
        "  service account: {}",
        or_unknown(c.service_account_email.as_deref())
    )?;
    writeln!(f, "  access token: {}", credential_line(&c.access_token))
}

fn scheduling_section(f: &mut fmt::Formatter<'_>, c: &SchedulingConfig) -> fmt::Result {
    writeln!(f, "scheduling:")?;
    writeln!(f, "  organization: {}", c.organization_uri)?;
    writeln!(f, "  base url: {}", c.base_url)?;
    writeln!(f, "  api token: {}", credential_line(&c.api_token))
}
