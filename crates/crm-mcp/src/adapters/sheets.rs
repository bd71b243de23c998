use super::{AdapterError, SpreadsheetBackend, status_error, transport_error};
use crate::api::{CustomerRecord, RowReference};
use crate::config::SpreadsheetConfig;
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

const BACKEND: &str = "spreadsheet";

pub struct SheetsAdapter {
    client: reqwest::Client,
    config: SpreadsheetConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    spreadsheet_id: Option<String>,
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: Option<String>,
    updated_rows: Option<u64>,
}

impl SheetsAdapter {
    pub fn new(config: SpreadsheetConfig, client: reqwest::Client) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &SpreadsheetConfig {
        &self.config
    }

    fn append_url(&self) -> Result<Url, AdapterError> {
        let invalid = |message: String| AdapterError::Backend {
            backend: BACKEND,
            status: None,
            message,
        };
        let mut url = Url::parse(&self.config.api_base_url)
            .map_err(|e| invalid(format!("invalid sheets api base url: {e}")))?;
        let append_segment = format!("{}:append", self.config.sheet_range);
        url.path_segments_mut()
            .map_err(|_| invalid("sheets api base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend([
                "v4",
                "spreadsheets",
                self.config.spreadsheet_id.as_str(),
                "values",
                append_segment.as_str(),
            ]);
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");
        Ok(url)
    }
}

#[async_trait]
impl SpreadsheetBackend for SheetsAdapter {
    async fn append_record(&self, record: &CustomerRecord) -> Result<RowReference, AdapterError> {
        let url = self.append_url()?;
        let token = &self.config.access_token;
        let body = serde_json::json!({
            "majorDimension": "ROWS",
            "values": [record.to_row()],
        });

        tracing::debug!(spreadsheet_id = %self.config.spreadsheet_id, range = %self.config.sheet_range, "appending customer row");
        let resp = self
            .client
            .post(url)
            .bearer_auth(token.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(BACKEND, &e, token))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let text = resp
            .text()
            .await
            .map_err(|e| transport_error(BACKEND, &e, token))?;
        if !status.is_success() {
            return Err(status_error(BACKEND, status, &headers, &text, token));
        }

        let parsed: AppendResponse =
            serde_json::from_str(&text).map_err(|e| AdapterError::Backend {
                backend: BACKEND,
                status: Some(status.as_u16()),
                message: format!("unexpected append response: {e}"),
            })?;
        let updates = parsed.updates.ok_or_else(|| AdapterError::Backend {
            backend: BACKEND,
            status: Some(status.as_u16()),
            message: "append response has no `updates` section".to_string(),
        })?;
        let updated_range = updates.updated_range.ok_or_else(|| AdapterError::Backend {
            backend: BACKEND,
            status: Some(status.as_u16()),
            message: "append response has no `updatedRange`".to_string(),
        })?;

        Ok(RowReference {
            spreadsheet_id: parsed
                .spreadsheet_id
                .unwrap_or_else(|| self.config.spreadsheet_id.clone()),
            updated_range,
            updated_rows: updates.updated_rows.unwrap_or(1),
        })
    }
}
