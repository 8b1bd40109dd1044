//! Google Indexing API client authenticated with a service-account key.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, Url};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::model::{
    AssertionClaims, NotificationType, ServiceAccountKey, TokenResponse, UrlNotification,
};
use super::{IndexingConnector, IndexingError, IndexingNotifier};

pub const INDEXING_SCOPE: &str = "https://www.googleapis.com/auth/indexing";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_PUBLISH_URL: &str = "https://indexing.googleapis.com/v3/urlNotifications:publish";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Holds the raw credential document; parsing, signing and the token
/// exchange all happen in [`IndexingConnector::connect`] so that any of
/// them failing abandons only the indexing stage of that run.
#[derive(Clone)]
pub struct GoogleIndexingConnector {
    http: Client,
    credential_json: String,
    token_url: Option<String>,
    publish_url: Url,
}

impl fmt::Debug for GoogleIndexingConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleIndexingConnector")
            .field("token_url", &self.token_url)
            .field("publish_url", &self.publish_url.as_str())
            .finish_non_exhaustive()
    }
}

impl GoogleIndexingConnector {
    pub fn new(credential_json: String, timeout: Duration) -> Result<Self, IndexingError> {
        Self::with_endpoints(credential_json, timeout, None, None)
    }

    /// `token_url` overrides the key's `token_uri`; `publish_url` overrides
    /// the public Indexing API endpoint.
    pub fn with_endpoints(
        credential_json: String,
        timeout: Duration,
        token_url: Option<String>,
        publish_url: Option<String>,
    ) -> Result<Self, IndexingError> {
        let publish_url = Url::parse(publish_url.as_deref().unwrap_or(DEFAULT_PUBLISH_URL))?;
        let http = Client::builder()
            .user_agent(concat!("publish-pipeline/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            credential_json,
            token_url,
            publish_url,
        })
    }

    fn parse_key(&self) -> Result<ServiceAccountKey, IndexingError> {
        let key: ServiceAccountKey = serde_json::from_str(&self.credential_json)
            .map_err(|e| IndexingError::Credential(e.to_string()))?;
        if key.client_email.trim().is_empty() {
            return Err(IndexingError::Credential("client_email is empty".into()));
        }
        Ok(key)
    }

    fn token_url_for(&self, key: &ServiceAccountKey) -> String {
        self.token_url
            .clone()
            .or_else(|| key.token_uri.clone())
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string())
    }

    async fn fetch_access_token(&self) -> Result<String, IndexingError> {
        let key = self.parse_key()?;
        let token_url = self.token_url_for(&key);
        let assertion = sign_assertion(&key, &token_url, Utc::now().timestamp())?;

        debug!(%token_url, client_email = %key.client_email, "exchanging assertion for token");
        let res = self
            .http
            .post(&token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(IndexingError::Token(format!("{}: {}", status, body)));
        }
        let token: TokenResponse = res
            .json()
            .await
            .map_err(|e| IndexingError::Token(format!("invalid token response: {e}")))?;
        if token.access_token.is_empty() {
            return Err(IndexingError::Token("empty access_token".into()));
        }
        info!(
            expires_in = token.expires_in,
            token_type = token.token_type.as_deref().unwrap_or("Bearer"),
            "indexing client authenticated"
        );
        Ok(token.access_token)
    }
}

#[async_trait]
impl IndexingConnector for GoogleIndexingConnector {
    async fn connect(&self) -> Result<Arc<dyn IndexingNotifier>, IndexingError> {
        let access_token = self.fetch_access_token().await?;
        Ok(Arc::new(GoogleIndexingClient {
            http: self.http.clone(),
            publish_url: self.publish_url.clone(),
            access_token,
        }))
    }
}

/// Sign the RS256 JWT used in the service-account token exchange.
pub fn sign_assertion(
    key: &ServiceAccountKey,
    audience: &str,
    issued_at: i64,
) -> Result<String, IndexingError> {
    let claims = AssertionClaims {
        iss: key.client_email.clone(),
        scope: INDEXING_SCOPE.to_string(),
        aud: audience.to_string(),
        iat: issued_at,
        exp: issued_at + ASSERTION_LIFETIME_SECS,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    Ok(encode(&header, &claims, &encoding_key)?)
}

/// Authenticated notifier valid for one pipeline run.
#[derive(Clone)]
pub struct GoogleIndexingClient {
    http: Client,
    publish_url: Url,
    access_token: String,
}

impl fmt::Debug for GoogleIndexingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleIndexingClient")
            .field("publish_url", &self.publish_url.as_str())
            .finish_non_exhaustive()
    }
}

impl GoogleIndexingClient {
    pub fn new(access_token: String, publish_url: Url) -> Self {
        Self {
            http: Client::new(),
            publish_url,
            access_token,
        }
    }

    pub fn build_request(&self, page_url: &Url) -> Result<reqwest::Request, IndexingError> {
        let body = UrlNotification {
            url: page_url.to_string(),
            kind: NotificationType::UrlUpdated,
        };
        Ok(self
            .http
            .post(self.publish_url.clone())
            .bearer_auth(&self.access_token)
            .json(&body)
            .build()?)
    }
}

#[async_trait]
impl IndexingNotifier for GoogleIndexingClient {
    async fn notify_updated(&self, url: &Url) -> Result<(), IndexingError> {
        let request = self.build_request(url)?;
        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(IndexingError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(%url, "indexing notification accepted");
        Ok(())
    }
}
