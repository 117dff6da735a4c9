//! # HTTP Transport
//!
//! The remote API seam used by event channels and the boot sequence.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         HTTP Transport                                  │
//! │                                                                         │
//! │  EventChannel ──► VaultApi::share_events(share, event_id)              │
//! │                         │                                               │
//! │                         ▼                                               │
//! │                 ┌───────────────┐   x-pm-uid / Bearer (SessionProvider)│
//! │                 │ HttpTransport │   x-pm-appversion                    │
//! │                 │   (reqwest)   │   per-request timeout                │
//! │                 └───────┬───────┘                                       │
//! │                         │                                               │
//! │          2xx ──► typed body                                            │
//! │          non-2xx ──► SyncError::Api { status, Code, Error }            │
//! │          timeout ──► SyncError::Timeout                                │
//! │          I/O ──► SyncError::Http                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tests replace [`HttpTransport`] with an in-memory [`VaultApi`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use vault_core::log_id;

use crate::config::ApiSettings;
use crate::crypto::SessionProvider;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{
    ApiErrorBody, EncryptedItem, EncryptedShare, ItemsResponse, LatestEventIdResponse,
    ShareEventList, ShareEventResponse, SharesResponse,
};

// =============================================================================
// API Trait
// =============================================================================

/// Remote endpoints the replica runtime needs.
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Events of `share_id` after `event_id`.
    async fn share_events(&self, share_id: &str, event_id: &str) -> SyncResult<ShareEventList>;

    /// Current watermark of `share_id`.
    async fn latest_event_id(&self, share_id: &str) -> SyncResult<String>;

    /// Every share the user can access.
    async fn fetch_shares(&self) -> SyncResult<Vec<EncryptedShare>>;

    /// Every item revision of `share_id`, all pages.
    async fn fetch_items(&self, share_id: &str) -> SyncResult<Vec<EncryptedItem>>;
}

// =============================================================================
// Endpoints
// =============================================================================

pub fn share_events_path(share_id: &str, event_id: &str) -> String {
    format!("pass/v1/share/{}/event/{}", share_id, event_id)
}

pub fn latest_event_path(share_id: &str) -> String {
    format!("pass/v1/share/{}/event", share_id)
}

pub fn shares_path() -> String {
    "pass/v1/share".to_string()
}

pub fn items_path(share_id: &str) -> String {
    format!("pass/v1/share/{}/item", share_id)
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// [`VaultApi`] over HTTPS.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    app_version: String,
    timeout: Duration,
    session: Arc<dyn SessionProvider>,
}

impl HttpTransport {
    pub fn new(settings: &ApiSettings, session: Arc<dyn SessionProvider>) -> SyncResult<Self> {
        let timeout = Duration::from_secs(settings.request_timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(HttpTransport {
            client,
            base_url: normalize_base_url(&settings.base_url)?,
            app_version: settings.app_version.clone(),
            timeout,
            session,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> SyncResult<T> {
        let url = self.base_url.join(path)?;
        debug!(%url, "GET");

        let mut request = self
            .client
            .get(url)
            .query(query)
            .header("x-pm-appversion", &self.app_version);

        if let Some(credentials) = self.session.credentials() {
            request = request
                .header("x-pm-uid", credentials.uid)
                .bearer_auth(credentials.access_token);
        }

        let response = request.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.json::<ApiErrorBody>().await.unwrap_or_default();
            return Err(SyncError::Api {
                status: status.as_u16(),
                code: body.code,
                message: body.error,
            });
        }

        response.json::<T>().await.map_err(|e| self.map_error(e))
    }

    fn map_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout.as_secs())
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl VaultApi for HttpTransport {
    async fn share_events(&self, share_id: &str, event_id: &str) -> SyncResult<ShareEventList> {
        let response: ShareEventResponse =
            self.get(&share_events_path(share_id, event_id), &[]).await?;
        Ok(response.events)
    }

    async fn latest_event_id(&self, share_id: &str) -> SyncResult<String> {
        let response: LatestEventIdResponse = self.get(&latest_event_path(share_id), &[]).await?;
        Ok(response.event_id)
    }

    async fn fetch_shares(&self) -> SyncResult<Vec<EncryptedShare>> {
        let response: SharesResponse = self.get(&shares_path(), &[]).await?;
        Ok(response.shares)
    }

    async fn fetch_items(&self, share_id: &str) -> SyncResult<Vec<EncryptedItem>> {
        let path = items_path(share_id);
        let mut items = Vec::new();
        let mut since: Option<String> = None;

        loop {
            let query: Vec<(&str, &str)> = since.as_deref().map(|t| ("Since", t)).into_iter().collect();
            let page: ItemsResponse = self.get(&path, &query).await?;
            let page = page.items;

            if page.revisions_data.is_empty() {
                break;
            }
            items.extend(page.revisions_data);

            match page.last_token {
                Some(token) if (items.len() as u64) < page.total => since = Some(token),
                _ => break,
            }
        }

        debug!(share_id = %log_id(share_id), count = items.len(), "Fetched items");
        Ok(items)
    }
}

/// Parses `base_url` and ensures it ends with `/` so endpoint paths join
/// under it instead of replacing its last segment.
pub fn normalize_base_url(base_url: &str) -> SyncResult<Url> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(share_events_path("s1", "e1"), "pass/v1/share/s1/event/e1");
        assert_eq!(latest_event_path("s1"), "pass/v1/share/s1/event");
        assert_eq!(items_path("s1"), "pass/v1/share/s1/item");
    }

    #[test]
    fn test_base_url_keeps_prefix() {
        let base = normalize_base_url("https://vault.example.com/api").unwrap();
        let url = base.join(&share_events_path("s1", "e1")).unwrap();
        assert_eq!(url.as_str(), "https://vault.example.com/api/pass/v1/share/s1/event/e1");

        let base = normalize_base_url("https://vault.example.com/api/").unwrap();
        assert_eq!(base.as_str(), "https://vault.example.com/api/");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(normalize_base_url("::nope").unwrap_err().is_config_error());
    }
}
