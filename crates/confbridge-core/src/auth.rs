use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::errors::ConfError;

/// App credentials for one token fetch.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub app_key: String,
    pub app_secret: String,
    pub ttl_seconds: u32,
}

impl TokenRequest {
    pub fn new(
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
        ttl_seconds: u32,
    ) -> Result<Self, ConfError> {
        let app_key = app_key.into();
        let app_secret = app_secret.into();
        if app_key.trim().is_empty() || app_secret.trim().is_empty() {
            return Err(ConfError::InvalidArgument(
                "app key and secret must not be empty".into(),
            ));
        }
        if ttl_seconds == 0 {
            return Err(ConfError::InvalidArgument("token ttl must be positive".into()));
        }
        Ok(Self {
            app_key,
            app_secret,
            ttl_seconds,
        })
    }
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("app_key", &self.app_key)
            .field("app_secret", &"<redacted>")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

/// Turns app credentials into an access token.
pub trait TokenFetcher: Send + Sync {
    fn fetch(&self, request: TokenRequest) -> BoxFuture<'static, Result<String, ConfError>>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Client-credentials grant against an HTTP auth endpoint.
pub struct HttpTokenFetcher {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTokenFetcher {
    pub fn new(endpoint: &str) -> Result<Self, ConfError> {
        let endpoint = Self::parse_endpoint(endpoint)?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn parse_endpoint(endpoint: &str) -> Result<Url, ConfError> {
        let url = Url::parse(endpoint.trim())
            .map_err(|e| ConfError::InvalidArgument(format!("invalid auth endpoint: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfError::InvalidArgument(format!(
                "unsupported auth endpoint scheme '{other}'"
            ))),
        }
    }

    /// Extract the token from the endpoint's JSON body.
    pub fn parse_token_response(body: &str) -> Result<String, ConfError> {
        let data: TokenResponse = serde_json::from_str(body)
            .map_err(|e| ConfError::Auth(format!("invalid token response: {e}")))?;
        if data.access_token.is_empty() {
            return Err(ConfError::Auth("token response carried an empty token".into()));
        }
        Ok(data.access_token)
    }
}

impl TokenFetcher for HttpTokenFetcher {
    fn fetch(&self, request: TokenRequest) -> BoxFuture<'static, Result<String, ConfError>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            tracing::info!(%endpoint, ttl = request.ttl_seconds, "requesting access token");

            let resp = client
                .post(endpoint)
                .basic_auth(&request.app_key, Some(&request.app_secret))
                .form(&[
                    ("grant_type", "client_credentials".to_string()),
                    ("expires_in", request.ttl_seconds.to_string()),
                ])
                .send()
                .await
                .map_err(|e| ConfError::Http(e.to_string()))?;

            if !resp.status().is_success() {
                return Err(ConfError::Auth(format!(
                    "auth endpoint returned status {}",
                    resp.status()
                )));
            }

            let body = resp.text().await.map_err(|e| ConfError::Http(e.to_string()))?;
            Self::parse_token_response(&body)
        })
    }
}

struct PendingToken {
    id: Uuid,
    request: TokenRequest,
}

/// Tracks the single in-flight token fetch.
///
/// A request equal to the in-flight one is coalesced. A different one
/// supersedes it, and whatever the superseded fetch produces is dropped.
#[derive(Default)]
pub struct CredentialProvider {
    fetcher: Option<Arc<dyn TokenFetcher>>,
    pending: Option<PendingToken>,
}

impl CredentialProvider {
    pub fn new(fetcher: Option<Arc<dyn TokenFetcher>>) -> Self {
        Self {
            fetcher,
            pending: None,
        }
    }

    pub fn set_fetcher(&mut self, fetcher: Arc<dyn TokenFetcher>) {
        self.fetcher = Some(fetcher);
    }

    pub fn fetcher(&self) -> Option<Arc<dyn TokenFetcher>> {
        self.fetcher.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Register `request` as the in-flight fetch. `None` means an identical
    /// fetch is already running and nothing new should start.
    pub fn begin(&mut self, request: TokenRequest) -> Option<Uuid> {
        if let Some(pending) = &self.pending {
            if pending.request == request {
                tracing::debug!(request_id = %pending.id, "token fetch already in flight");
                return None;
            }
            tracing::debug!(request_id = %pending.id, "token fetch superseded");
        }
        let id = Uuid::new_v4();
        self.pending = Some(PendingToken { id, request });
        Some(id)
    }

    /// Settle the fetch `id`. Returns false for a stale (superseded) id.
    pub fn settle(&mut self, id: Uuid) -> bool {
        match &self.pending {
            Some(pending) if pending.id == id => {
                self.pending = None;
                true
            }
            _ => {
                tracing::debug!(request_id = %id, "dropping result of stale token fetch");
                false
            }
        }
    }
}
