//! # HTTP Target Provider
//!
//! Client for a REST key/value API organised in scopes.
//!
//! ## Endpoints
//!
//! - `GET    /v1/scopes/{scope}/entries` - list the entries of a scope
//! - `POST   /v1/scopes/{scope}/entries` - create an entry (`{"key", "value"}`)
//! - `PUT    /v1/scopes/{scope}/entries/{key}` - replace an entry value (`{"value"}`)
//! - `DELETE /v1/scopes/{scope}/entries/{key}` - delete an entry
//!
//! Create and update fall through to each other on `409`/`404` so that both
//! are upserts. Deleting an absent entry (`404`) succeeds.
//!
//! ## Error Classification
//!
//! `400`, `404` (unknown scope) and `422` are permanent. Everything else,
//! including connection errors and timeouts, is transient.

use super::{Observation, ProviderError, TargetProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info_span, Instrument};

/// HTTP target provider
#[derive(Clone)]
pub struct HttpTargetProvider {
    http_client: Client,
    base_url: Url,
    token: Option<String>,
}

impl std::fmt::Debug for HttpTargetProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTargetProvider")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

/// Request body for creating an entry
#[derive(Debug, Serialize)]
struct CreateEntryRequest<'a> {
    key: &'a str,
    value: &'a str,
}

/// Request body for replacing an entry value
#[derive(Debug, Serialize)]
struct UpdateEntryRequest<'a> {
    value: &'a str,
}

/// One entry as returned by the list endpoint
#[derive(Debug, Deserialize)]
struct EntryResponse {
    key: String,
    value: String,
}

/// Response of the list endpoint
#[derive(Debug, Deserialize)]
struct ListEntriesResponse {
    #[serde(default)]
    entries: Vec<EntryResponse>,
}

/// Error payload returned by the API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

impl HttpTargetProvider {
    /// Create a new provider for the API rooted at `endpoint`
    ///
    /// # Errors
    /// Returns an error if the endpoint is not a valid base URL or the HTTP
    /// client cannot be built
    pub fn new(endpoint: &str, token: Option<String>, request_timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(endpoint)
            .with_context(|| format!("Invalid target endpoint URL: {endpoint}"))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow::anyhow!(
                "Target endpoint '{endpoint}' cannot be used as a base URL"
            ));
        }

        // Create HTTP client with rustls (already configured in Cargo.toml)
        let http_client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url,
            token,
        })
    }

    /// URL of the entry collection of `scope`
    ///
    /// The scope is sent as a single percent-encoded path segment.
    fn entries_url(&self, scope: &str) -> Result<Url, ProviderError> {
        self.url_for(&["v1", "scopes", scope, "entries"])
    }

    fn entry_url(&self, scope: &str, key: &str) -> Result<Url, ProviderError> {
        self.url_for(&["v1", "scopes", scope, "entries", key])
    }

    fn url_for(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ProviderError::Permanent(format!(
                    "Target endpoint '{}' cannot be used as a base URL",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Build HTTP request with authentication headers
    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self
            .http_client
            .request(method, url)
            .header("Accept", "application/json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<Response, ProviderError> {
        request
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("Failed to {action}: {e}")))
    }

    async fn post_entry(&self, scope: &str, key: &str, value: &str) -> Result<Response, ProviderError> {
        let url = self.entries_url(scope)?;
        let request = self
            .request(Method::POST, url)
            .json(&CreateEntryRequest { key, value });
        self.send(request, "create entry").await
    }

    async fn put_entry(&self, scope: &str, key: &str, value: &str) -> Result<Response, ProviderError> {
        let url = self.entry_url(scope, key)?;
        let request = self
            .request(Method::PUT, url)
            .json(&UpdateEntryRequest { value });
        self.send(request, "update entry").await
    }

    /// Turn an unsuccessful response into a classified error
    async fn error_from_response(response: Response, action: &str) -> ProviderError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_status(status, &body, action)
    }

    fn observation(&self, scope: &str, items: BTreeMap<String, String>) -> Observation {
        let mut attributes = BTreeMap::new();
        attributes.insert("endpoint".to_string(), self.base_url.to_string());
        if let Ok(url) = self.entries_url(scope) {
            attributes.insert("scopeUrl".to_string(), url.to_string());
        }
        Observation { items, attributes }
    }
}

/// Classify an unsuccessful HTTP status
fn classify_status(status: StatusCode, body: &str, action: &str) -> ProviderError {
    // Prefer the API's own message when the body is a structured error
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.trim().to_string());
    let message = format!("Failed to {action}: HTTP {} {}", status.as_u16(), detail)
        .trim_end()
        .to_string();

    match status {
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            ProviderError::Permanent(message)
        }
        _ => ProviderError::Transient(message),
    }
}

#[async_trait]
impl TargetProvider for HttpTargetProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn create(&self, scope: &str, key: &str, value: &str) -> Result<(), ProviderError> {
        let span = info_span!("target.entry.create", scope = scope, entry.key = key);
        async move {
            let response = self.post_entry(scope, key, value).await?;
            match response.status() {
                status if status.is_success() => Ok(()),
                StatusCode::CONFLICT => {
                    debug!("Entry {} already exists in scope {}, updating", key, scope);
                    let response = self.put_entry(scope, key, value).await?;
                    if response.status().is_success() {
                        Ok(())
                    } else {
                        Err(Self::error_from_response(response, "update existing entry").await)
                    }
                }
                _ => Err(Self::error_from_response(response, "create entry").await),
            }
        }
        .instrument(span)
        .await
    }

    async fn update(&self, scope: &str, key: &str, value: &str) -> Result<(), ProviderError> {
        let span = info_span!("target.entry.update", scope = scope, entry.key = key);
        async move {
            let response = self.put_entry(scope, key, value).await?;
            match response.status() {
                status if status.is_success() => Ok(()),
                StatusCode::NOT_FOUND => {
                    debug!("Entry {} missing from scope {}, creating", key, scope);
                    let response = self.post_entry(scope, key, value).await?;
                    if response.status().is_success() {
                        Ok(())
                    } else {
                        Err(Self::error_from_response(response, "create missing entry").await)
                    }
                }
                _ => Err(Self::error_from_response(response, "update entry").await),
            }
        }
        .instrument(span)
        .await
    }

    async fn delete(&self, scope: &str, key: &str) -> Result<(), ProviderError> {
        let span = info_span!("target.entry.delete", scope = scope, entry.key = key);
        async move {
            let url = self.entry_url(scope, key)?;
            let response = self
                .send(self.request(Method::DELETE, url), "delete entry")
                .await?;
            match response.status() {
                status if status.is_success() => Ok(()),
                StatusCode::NOT_FOUND => {
                    debug!("Entry {} already absent from scope {}", key, scope);
                    Ok(())
                }
                _ => Err(Self::error_from_response(response, "delete entry").await),
            }
        }
        .instrument(span)
        .await
    }

    async fn observe(&self, scope: &str) -> Result<Observation, ProviderError> {
        let span = tracing::debug_span!("target.scope.observe", scope = scope);
        async move {
            let url = self.entries_url(scope)?;
            let response = self
                .send(self.request(Method::GET, url), "list entries")
                .await?;
            match response.status() {
                status if status.is_success() => {
                    let list: ListEntriesResponse = response.json().await.map_err(|e| {
                        ProviderError::Transient(format!("Failed to parse entry list: {e}"))
                    })?;
                    let items = list
                        .entries
                        .into_iter()
                        .map(|entry| (entry.key, entry.value))
                        .collect();
                    Ok(self.observation(scope, items))
                }
                // A scope that has never held an entry does not exist yet
                StatusCode::NOT_FOUND => Ok(self.observation(scope, BTreeMap::new())),
                _ => Err(Self::error_from_response(response, "list entries").await),
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(endpoint: &str) -> HttpTargetProvider {
        HttpTargetProvider::new(endpoint, None, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        assert!(HttpTargetProvider::new("not a url", None, Duration::from_secs(5)).is_err());
        assert!(HttpTargetProvider::new("mailto:ops@example.com", None, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_entry_urls_encode_scope_as_one_segment() {
        let provider = provider("http://target.local:8080");
        assert_eq!(
            provider.entries_url("payments/prod").unwrap().as_str(),
            "http://target.local:8080/v1/scopes/payments%2Fprod/entries"
        );
        assert_eq!(
            provider.entry_url("payments", "DB_HOST").unwrap().as_str(),
            "http://target.local:8080/v1/scopes/payments/entries/DB_HOST"
        );
    }

    #[test]
    fn test_entry_urls_keep_base_path() {
        let provider = provider("https://gateway.example.com/kv/");
        assert_eq!(
            provider.entries_url("team-a").unwrap().as_str(),
            "https://gateway.example.com/kv/v1/scopes/team-a/entries"
        );
    }

    #[test]
    fn test_classify_permanent_statuses() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::NOT_FOUND,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            let error = classify_status(status, "", "create entry");
            assert!(error.is_permanent(), "{status} should be permanent");
        }
    }

    #[test]
    fn test_classify_transient_statuses() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
        ] {
            let error = classify_status(status, "", "create entry");
            assert!(!error.is_permanent(), "{status} should be transient");
        }
    }

    #[test]
    fn test_classify_uses_structured_message() {
        let error = classify_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"value too large"}"#,
            "update entry",
        );
        assert_eq!(
            error,
            ProviderError::Permanent("Failed to update entry: HTTP 422 value too large".to_string())
        );
    }

    #[test]
    fn test_observation_attributes() {
        let provider = provider("http://target.local:8080");
        let observation = provider.observation("team-a", BTreeMap::new());
        assert_eq!(
            observation.attributes.get("scopeUrl").map(String::as_str),
            Some("http://target.local:8080/v1/scopes/team-a/entries")
        );
        assert_eq!(
            observation.attributes.get("endpoint").map(String::as_str),
            Some("http://target.local:8080/")
        );
    }

    #[test]
    fn test_debug_hides_token() {
        let provider = HttpTargetProvider::new(
            "http://target.local",
            Some("s3cr3t".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        let rendered = format!("{provider:?}");
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("authenticated: true"));
    }
}
