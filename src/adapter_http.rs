//! Adapter for JSON search APIs.
//!
//! Issues `GET {base_url}{search_path}?q=..&since=..&until=..&limit=..`
//! with a bearer token and expects `{"items": [ItemRecord, ...]}` back.
//!
//! Failure mapping:
//! - HTTP 401/403 → `AuthFailure`
//! - HTTP 429 → `RateLimited`
//! - HTTP 5xx, timeouts, connection errors → `TransientNetwork`
//! - Other 4xx, undecodable bodies → `Permanent`
//!
//! The `x-ratelimit-remaining` header of each response (requests left in
//! the current window) feeds [`remaining_quota`](SourceAdapter::remaining_quota).
//! An exhausted window is reported until `x-ratelimit-reset` passes. Without
//! a reset time it is reported once, so the next run tries the API again.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use crate::adapter::{FetchRequest, ItemRecord, SourceAdapter};
use crate::config::HttpAdapterConfig;
use crate::error::{FailureKind, FetchError};
use crate::models::FetchedItem;

const QUOTA_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

// Reset values at or above this are epoch seconds, below it a delay.
const EPOCH_RESET_THRESHOLD: i64 = 1_000_000_000;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<ItemRecord>,
}

pub struct HttpAdapter {
    name: String,
    description: String,
    config: HttpAdapterConfig,
    client: reqwest::Client,
    token: RwLock<Option<String>>,
    quota: AtomicI64,
    /// Epoch seconds when the quota window resets, `-1` when unknown.
    quota_reset: AtomicI64,
}

impl HttpAdapter {
    pub fn new(name: String, config: HttpAdapterConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let description = format!("JSON search API at {}", config.base_url);
        Ok(Self {
            name,
            description,
            config,
            client,
            token: RwLock::new(None),
            quota: AtomicI64::new(-1),
            quota_reset: AtomicI64::new(-1),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.search_path
        )
    }

    fn requires_auth(&self) -> bool {
        self.config.credentials_env.is_some()
    }

    fn current_token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    fn record_quota(&self, headers: &reqwest::header::HeaderMap) {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        if let Some(remaining) = header(QUOTA_HEADER).and_then(parse_quota) {
            let reset = header(RESET_HEADER)
                .and_then(|v| parse_reset(v, Utc::now().timestamp()))
                .unwrap_or(-1);
            self.quota_reset.store(reset, Ordering::SeqCst);
            self.quota.store(remaining, Ordering::SeqCst);
        }
    }
}

/// Some APIs report the remaining quota as a float (`"59.0"`).
fn parse_quota(value: &str) -> Option<i64> {
    let value = value.trim();
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|f| f.max(0.0) as i64))
}

/// Epoch seconds of the window reset. Accepts a delay in seconds or an
/// epoch timestamp, integer or float.
fn parse_reset(value: &str, now: i64) -> Option<i64> {
    let secs = value.trim().parse::<f64>().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let secs = secs.ceil() as i64;
    if secs >= EPOCH_RESET_THRESHOLD {
        Some(secs)
    } else {
        Some(now.saturating_add(secs))
    }
}

/// Failure kind for a non-success status.
pub fn classify_status(status: StatusCode) -> FailureKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureKind::AuthFailure,
        StatusCode::TOO_MANY_REQUESTS => FailureKind::RateLimited,
        s if s.is_server_error() => FailureKind::TransientNetwork,
        _ => FailureKind::Permanent,
    }
}

fn classify_transport(err: &reqwest::Error) -> FailureKind {
    if err.is_decode() || err.is_builder() {
        FailureKind::Permanent
    } else {
        FailureKind::TransientNetwork
    }
}

#[async_trait]
impl SourceAdapter for HttpAdapter {
    fn source_id(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn adapter_type(&self) -> &str {
        "http"
    }

    async fn authenticate(&self, credentials: &str) -> Result<(), FetchError> {
        let token = credentials.trim();
        if token.is_empty() {
            return Err(FetchError::auth("empty bearer token"));
        }
        let mut slot = self
            .token
            .write()
            .map_err(|_| FetchError::permanent("token lock poisoned"))?;
        *slot = Some(token.to_string());
        Ok(())
    }

    async fn is_available(&self) -> bool {
        !self.requires_auth() || self.current_token().is_some()
    }

    fn remaining_quota(&self) -> i64 {
        let remaining = self.quota.load(Ordering::SeqCst);
        if remaining != 0 {
            return remaining;
        }
        let reset = self.quota_reset.load(Ordering::SeqCst);
        if reset >= 0 && Utc::now().timestamp() < reset {
            return 0;
        }
        if reset < 0 {
            // No reset time: report the exhausted window once.
            return match self
                .quota
                .compare_exchange(0, -1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => 0,
                Err(current) => current,
            };
        }
        self.quota.store(-1, Ordering::SeqCst);
        -1
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<FetchedItem>, FetchError> {
        let token = self.current_token();
        if self.requires_auth() && token.is_none() {
            return Err(FetchError::auth("not authenticated"));
        }

        let query = [
            ("q", request.keywords.join(" OR ")),
            ("since", request.date_range.start().to_string()),
            ("until", request.date_range.end().to_string()),
            ("limit", request.max_results.to_string()),
        ];

        let mut builder = self.client.get(self.endpoint()).query(&query);
        if let Some(token) = &token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::new(classify_transport(&e), e.to_string()))?;

        self.record_quota(response.headers());

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::new(
                classify_status(status),
                format!("{} returned {}: {}", self.name, status, body.trim()),
            ));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| FetchError::new(classify_transport(&e), e.to_string()))?;

        let collected_at = Utc::now();
        let mut items: Vec<FetchedItem> = parsed
            .items
            .into_iter()
            .map(|r| r.into_item(collected_at))
            .collect();
        items.truncate(request.max_results);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(credentials_env: Option<&str>) -> HttpAdapter {
        HttpAdapter::new(
            "reddit".to_string(),
            HttpAdapterConfig {
                base_url: "https://api.example.org/".to_string(),
                search_path: "/v1/search".to_string(),
                credentials_env: credentials_env.map(String::from),
                timeout_secs: 5,
            },
        )
        .unwrap()
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            FailureKind::AuthFailure
        );
        assert_eq!(classify_status(StatusCode::FORBIDDEN), FailureKind::AuthFailure);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            FailureKind::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            FailureKind::TransientNetwork
        );
        assert_eq!(classify_status(StatusCode::NOT_FOUND), FailureKind::Permanent);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), FailureKind::Permanent);
    }

    #[test]
    fn quota_header_parsing() {
        assert_eq!(parse_quota("42"), Some(42));
        assert_eq!(parse_quota(" 59.0 "), Some(59));
        assert_eq!(parse_quota("-3.5"), Some(0));
        assert_eq!(parse_quota("lots"), None);
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> reqwest::header::HeaderMap {
        let mut map = reqwest::header::HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, reqwest::header::HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn reset_header_parsing() {
        assert_eq!(parse_reset("60", 1_700_000_000), Some(1_700_000_060));
        assert_eq!(parse_reset("59.2", 1_700_000_000), Some(1_700_000_060));
        assert_eq!(parse_reset("1700000500", 1_700_000_000), Some(1_700_000_500));
        assert_eq!(parse_reset("-1", 1_700_000_000), None);
        assert_eq!(parse_reset("soon", 1_700_000_000), None);
    }

    #[test]
    fn exhausted_quota_holds_until_reset() {
        let api = adapter(None);
        api.record_quota(&headers(&[(QUOTA_HEADER, "0"), (RESET_HEADER, "3600")]));
        assert_eq!(api.remaining_quota(), 0);
        assert_eq!(api.remaining_quota(), 0);
    }

    #[test]
    fn exhausted_quota_clears_once_reset_passed() {
        let api = adapter(None);
        api.record_quota(&headers(&[(QUOTA_HEADER, "0"), (RESET_HEADER, "1000000000")]));
        assert_eq!(api.remaining_quota(), -1);
    }

    #[test]
    fn exhausted_quota_without_reset_is_reported_once() {
        let api = adapter(None);
        api.record_quota(&headers(&[(QUOTA_HEADER, "0")]));
        assert_eq!(api.remaining_quota(), 0);
        assert_eq!(api.remaining_quota(), -1);

        api.record_quota(&headers(&[(QUOTA_HEADER, "12")]));
        assert_eq!(api.remaining_quota(), 12);
    }

    #[test]
    fn endpoint_joins_base_and_path() {
        assert_eq!(adapter(None).endpoint(), "https://api.example.org/v1/search");
    }

    #[tokio::test]
    async fn availability_follows_authentication() {
        let open = adapter(None);
        assert!(open.is_available().await);
        assert_eq!(open.remaining_quota(), -1);

        let guarded = adapter(Some("REDDIT_TOKEN"));
        assert!(!guarded.is_available().await);
        let err = guarded.authenticate("   ").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::AuthFailure);
        guarded.authenticate("tok").await.unwrap();
        assert!(guarded.is_available().await);
    }

    #[tokio::test]
    async fn fetch_without_token_is_auth_failure() {
        let guarded = adapter(Some("REDDIT_TOKEN"));
        let request = FetchRequest {
            keywords: vec!["flood".to_string()],
            date_range: crate::models::DateRange::parse("2024-09-01", "2024-09-02").unwrap(),
            max_results: 10,
        };
        let err = guarded.fetch(&request).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::AuthFailure);
    }
}
