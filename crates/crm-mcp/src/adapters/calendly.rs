use super::{AdapterError, SchedulingBackend, status_error, transport_error};
use crate::api::{EventType, EventTypeQuery};
use crate::config::SchedulingConfig;
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

const BACKEND: &str = "scheduling";
const PAGE_SIZE: &str = "100";

pub struct CalendlyAdapter {
    client: reqwest::Client,
    config: SchedulingConfig,
    max_pages: u32,
}

#[derive(Debug, Deserialize)]
struct EventTypePage {
    #[serde(default)]
    collection: Vec<WireEventType>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next_page: Option<String>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireEventType {
    uri: String,
    name: Option<String>,
    slug: Option<String>,
    #[serde(default)]
    active: bool,
    duration: Option<u32>,
    kind: Option<String>,
    scheduling_url: Option<String>,
    description_plain: Option<String>,
}

impl From<WireEventType> for EventType {
    fn from(w: WireEventType) -> Self {
        EventType {
            uri: w.uri,
            name: w.name.unwrap_or_default(),
            slug: w.slug,
            active: w.active,
            duration_minutes: w.duration,
            kind: w.kind,
            scheduling_url: w.scheduling_url,
            description: w.description_plain,
        }
    }
}

enum NextPage {
    Token(String),
    Url(Url),
}

impl CalendlyAdapter {
    pub fn new(config: SchedulingConfig, client: reqwest::Client, max_pages: u32) -> Self {
        Self {
            client,
            config,
            max_pages: max_pages.max(1),
        }
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    fn base_url(&self) -> Result<Url, AdapterError> {
        Url::parse(&self.config.base_url).map_err(|e| AdapterError::Backend {
            backend: BACKEND,
            status: None,
            message: format!("invalid scheduling base url: {e}"),
        })
    }

    fn first_page_url(&self, query: &EventTypeQuery) -> Result<Url, AdapterError> {
        let mut url = self.base_url()?;
        url.path_segments_mut()
            .map_err(|_| AdapterError::Backend {
                backend: BACKEND,
                status: None,
                message: "scheduling base url cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .push("event_types");
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("organization", &query.organization)
                .append_pair("count", PAGE_SIZE);
            if let Some(active) = query.active {
                pairs.append_pair("active", if active { "true" } else { "false" });
            }
        }
        Ok(url)
    }

    /// Follow-up pages go to `next_page` only when it stays on the configured
    /// origin; the bearer token is never sent anywhere else.
    fn next_page_url(&self, first: &Url, next: NextPage) -> Result<Url, AdapterError> {
        match next {
            NextPage::Token(token) => {
                let mut url = first.clone();
                url.query_pairs_mut().append_pair("page_token", &token);
                Ok(url)
            }
            NextPage::Url(url) => {
                if url.origin() != first.origin() {
                    return Err(AdapterError::Backend {
                        backend: BACKEND,
                        status: None,
                        message: format!(
                            "pagination points at a foreign origin: {}",
                            url.origin().ascii_serialization()
                        ),
                    });
                }
                Ok(url)
            }
        }
    }

    async fn fetch_page(&self, url: Url) -> Result<EventTypePage, AdapterError> {
        let token = &self.config.api_token;
        let resp = self
            .client
            .get(url)
            .bearer_auth(token.expose())
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
        serde_json::from_str(&text).map_err(|e| AdapterError::Backend {
            backend: BACKEND,
            status: Some(status.as_u16()),
            message: format!("unexpected event_types response: {e}"),
        })
    }
}

#[async_trait]
impl SchedulingBackend for CalendlyAdapter {
    async fn list_event_types(
        &self,
        query: &EventTypeQuery,
    ) -> Result<Vec<EventType>, AdapterError> {
        let first = self.first_page_url(query)?;
        let mut url = first.clone();
        let mut out = Vec::new();
        for page_no in 1..=self.max_pages {
            let page = self.fetch_page(url).await?;
            tracing::debug!(page = page_no, items = page.collection.len(), "fetched event types page");
            out.extend(page.collection.into_iter().map(EventType::from));

            let next = page.pagination.and_then(|p| {
                match (p.next_page_token.filter(|t| !t.is_empty()), p.next_page) {
                    (Some(token), _) => Some(Ok(NextPage::Token(token))),
                    (None, Some(next)) if !next.is_empty() => Some(
                        Url::parse(&next)
                            .map(NextPage::Url)
                            .map_err(|e| AdapterError::Backend {
                                backend: BACKEND,
                                status: None,
                                message: format!("invalid next_page url: {e}"),
                            }),
                    ),
                    _ => None,
                }
            });
            match next {
                None => return Ok(out),
                Some(next) => url = self.next_page_url(&first, next?)?,
            }
        }
        Err(AdapterError::Backend {
            backend: BACKEND,
            status: None,
            message: format!(
                "event type listing did not finish within {} pages",
                self.max_pages
            ),
        })
    }

    fn default_organization(&self) -> Option<&str> {
        Some(self.config.organization_uri.as_str())
    }
}
