//! Management console API integration
//!
//! Wraps the three console endpoints a sorting run needs: listing the sites
//! agents may be moved to, listing the agents of one site, and the
//! move-to-site action. [`ConsoleApi`] is the seam the pipeline depends on;
//! [`ConsoleClient`] is the HTTP implementation.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{Result, SorterError};

/// Prefix of every console API route
pub const API_PREFIX: &str = "/web/api/v2.1";

const SITES_PATH: &str = "/sites";
const AGENTS_PATH: &str = "/agents";
const MOVE_PATH: &str = "/agents/actions/move-to-site";

/// A site agents can be moved to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSite {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
}

/// A managed agent as listed by the console
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    /// Display name, the subject of pattern matching
    #[serde(rename = "computerName")]
    pub name: String,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Console ids are JSON strings; numeric ids are accepted and stringified
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    data: T,
    #[serde(default)]
    pagination: Option<Pagination>,
}

impl<T> Page<T> {
    fn next_cursor(&self) -> Option<&str> {
        self.pagination
            .as_ref()
            .and_then(|p| p.next_cursor.as_deref())
            .filter(|cursor| !cursor.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct SitesData {
    sites: Vec<RemoteSite>,
}

/// Operations a sorting run performs against the console
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsoleApi: Send + Sync {
    /// Sites eligible as move targets
    async fn list_move_sites(&self) -> Result<Vec<RemoteSite>>;

    /// Agents currently assigned to the given site
    async fn list_agents(&self, site_id: &str) -> Result<Vec<Endpoint>>;

    /// Move the given agents into the target site
    async fn move_to_site(&self, target_site_id: &str, agent_ids: &[String]) -> Result<()>;
}

/// HTTP client for the console API
#[derive(Debug, Clone)]
pub struct ConsoleClient {
    http: reqwest::Client,
    base_url: String,
    page_size: u32,
}

impl ConsoleClient {
    /// Create a client authenticated with the configured API token
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("ApiToken {}", settings.env.api_token))
            .map_err(|_| SorterError::config("API_TOKEN contains characters not allowed in a header"))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(settings.rules.request_timeout())
            .user_agent(concat!("sitesorter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| SorterError::Transport {
                action: "create the console client",
                source,
            })?;

        Ok(Self {
            http,
            base_url: format!("{}{}", settings.env.console_url, API_PREFIX),
            page_size: settings.rules.api.page_size,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch every page of a cursor-paginated listing
    async fn get_all_pages<T>(
        &self,
        action: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();

        loop {
            let mut params: Vec<(&str, String)> = query.to_vec();
            params.push(("limit", self.page_size.to_string()));
            if let Some(cursor) = &cursor {
                params.push(("cursor", cursor.clone()));
            }

            let response = self
                .http
                .get(self.url(path))
                .query(&params)
                .send()
                .await
                .map_err(|source| SorterError::Transport { action, source })?;

            let page: Page<T> = Self::decode(action, response).await?;
            let next = page.next_cursor().map(str::to_string);
            pages.push(page.data);

            match next {
                Some(next) if !seen_cursors.insert(next.clone()) => {
                    warn!("Console returned cursor {} again, stopping pagination", next);
                    break;
                }
                Some(next) => {
                    debug!("Fetching next page of {}", path);
                    cursor = Some(next);
                }
                None => break,
            }
        }

        Ok(pages)
    }

    async fn decode<T: DeserializeOwned>(action: &'static str, response: reqwest::Response) -> Result<T> {
        let response = Self::check_status(action, response).await?;
        response
            .json::<T>()
            .await
            .map_err(|source| SorterError::Transport { action, source })
    }

    async fn check_status(
        action: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(SorterError::Api {
            action,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ConsoleApi for ConsoleClient {
    async fn list_move_sites(&self) -> Result<Vec<RemoteSite>> {
        debug!("Fetching move-eligible sites");

        let pages: Vec<SitesData> = self
            .get_all_pages(
                "retrieve sites from the console",
                SITES_PATH,
                &[("availableMoveSites", "true".to_string())],
            )
            .await?;

        let sites: Vec<RemoteSite> = pages.into_iter().flat_map(|p| p.sites).collect();
        info!("Console returned {} move-eligible sites", sites.len());
        Ok(sites)
    }

    async fn list_agents(&self, site_id: &str) -> Result<Vec<Endpoint>> {
        debug!("Fetching agents of site {}", site_id);

        let pages: Vec<Vec<Endpoint>> = self
            .get_all_pages(
                "retrieve agents from the console",
                AGENTS_PATH,
                &[("filteredSiteIds", site_id.to_string())],
            )
            .await?;

        let agents: Vec<Endpoint> = pages.into_iter().flatten().collect();
        info!("Console returned {} agents for site {}", agents.len(), site_id);
        Ok(agents)
    }

    async fn move_to_site(&self, target_site_id: &str, agent_ids: &[String]) -> Result<()> {
        const ACTION: &str = "move agents";

        let body = json!({
            "data": { "targetSiteId": target_site_id },
            "filter": { "ids": agent_ids },
        });

        let response = self
            .http
            .post(self.url(MOVE_PATH))
            .json(&body)
            .send()
            .await
            .map_err(|source| SorterError::Transport {
                action: ACTION,
                source,
            })?;

        Self::check_status(ACTION, response).await?;
        debug!("Moved {} agents to site {}", agent_ids.len(), target_site_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_deserializes_string_and_numeric_ids() {
        let agents: Vec<Endpoint> = serde_json::from_str(
            r#"[{"id": "1234567890123", "computerName": "CFR001", "osName": "Windows"},
                {"id": 10, "computerName": "FR01"}]"#,
        )
        .unwrap();

        assert_eq!(agents[0], Endpoint::new("1234567890123", "CFR001"));
        assert_eq!(agents[1], Endpoint::new("10", "FR01"));
    }

    #[test]
    fn test_sites_page_parsing() {
        let page: Page<SitesData> = serde_json::from_str(
            r#"{"data": {"allSites": {}, "sites": [{"id": "1", "name": "France", "state": "active"}]},
                "pagination": {"nextCursor": null, "totalItems": 1}}"#,
        )
        .unwrap();

        assert_eq!(page.data.sites.len(), 1);
        assert_eq!(page.data.sites[0].name, "France");
        assert!(page.next_cursor().is_none());
    }

    #[test]
    fn test_page_cursor() {
        let page: Page<Vec<Endpoint>> =
            serde_json::from_str(r#"{"data": [], "pagination": {"nextCursor": "abc"}}"#).unwrap();
        assert_eq!(page.next_cursor(), Some("abc"));

        let page: Page<Vec<Endpoint>> = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(page.next_cursor().is_none());

        let page: Page<Vec<Endpoint>> =
            serde_json::from_str(r#"{"data": [], "pagination": {"nextCursor": ""}}"#).unwrap();
        assert!(page.next_cursor().is_none());
    }
}
