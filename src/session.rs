use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::protocol::{auth_request_body, parse_auth_response, upstream_message};
use crate::{Error, Result};

/// A token this close to expiry is already treated as expired.
pub const REFRESH_SKEW_SECS: i64 = 60;

pub const DEFAULT_AUTH_URL: &str = "https://cognito-idp.ap-southeast-2.amazonaws.com/";
pub const DEFAULT_CLIENT_ID: &str = "6e1lu9fchv82uefiarsp0290v9";

const COGNITO_TARGET: &str = "AWSCognitoIdentityProviderService.InitiateAuth";

pub(crate) fn epoch_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub token: String,
    pub expires_at: i64,
}

impl AuthSession {
    pub fn is_usable_at(&self, now: i64) -> bool {
        self.expires_at > now + REFRESH_SKEW_SECS
    }

    pub fn header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Trades configured credentials for a bearer token.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn exchange(&self) -> Result<AuthSession>;
}

/// Cognito `InitiateAuth` with the `USER_PASSWORD_AUTH` flow.
pub struct CognitoExchange {
    http: reqwest::Client,
    url: String,
    client_id: String,
    username: String,
    password: String,
}

impl CognitoExchange {
    pub fn new(
        http: reqwest::Client,
        url: impl Into<String>,
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            client_id: client_id.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl CredentialExchange for CognitoExchange {
    async fn exchange(&self) -> Result<AuthSession> {
        let body = auth_request_body(&self.client_id, &self.username, &self.password);
        debug!(url = %self.url, user = %self.username, "initiating auth");

        let resp = self
            .http
            .post(&self.url)
            .header("X-Amz-Target", COGNITO_TARGET)
            .header(CONTENT_TYPE, "application/x-amz-json-1.1")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| Error::Authentication(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Authentication(e.to_string()))?;

        if !status.is_success() {
            let message = upstream_message(&text).unwrap_or_else(|| format!("http {status}"));
            return Err(Error::Authentication(message));
        }
        parse_auth_response(&text, epoch_now())
    }
}

/// A pre-issued token, handed out as-is.
pub struct StaticExchange {
    session: AuthSession,
}

impl StaticExchange {
    pub fn new(token: impl Into<String>, expires_at: i64) -> Self {
        Self {
            session: AuthSession {
                token: token.into(),
                expires_at,
            },
        }
    }
}

#[async_trait]
impl CredentialExchange for StaticExchange {
    async fn exchange(&self) -> Result<AuthSession> {
        Ok(self.session.clone())
    }
}

/// Owns the process-wide bearer token.
///
/// The session lock is held across the credential exchange, so callers that
/// find the token stale at the same moment share one exchange instead of
/// racing their own.
pub struct SessionCache {
    exchange: Arc<dyn CredentialExchange>,
    session: Mutex<Option<AuthSession>>,
}

impl SessionCache {
    pub fn new(exchange: Arc<dyn CredentialExchange>) -> Self {
        Self {
            exchange,
            session: Mutex::new(None),
        }
    }

    /// `Authorization` header value for the next request.
    pub async fn auth_header(&self) -> Result<String> {
        let mut session = self.session.lock().await;
        if let Some(current) = session.as_ref()
            && current.is_usable_at(epoch_now())
        {
            return Ok(current.header());
        }

        info!("refreshing authentication token");
        let fresh = match self.exchange.exchange().await {
            Ok(fresh) => fresh,
            Err(e) => {
                error!(error = %e, "credential exchange failed");
                return Err(match e {
                    Error::Authentication(_) => e,
                    other => Error::Authentication(other.to_string()),
                });
            }
        };
        info!(expires_at = fresh.expires_at, "authentication token refreshed");
        let header = fresh.header();
        *session = Some(fresh);
        Ok(header)
    }

    /// Drop the cached token; the next call exchanges credentials again.
    pub async fn invalidate(&self) {
        debug!("invalidating authentication token");
        *self.session.lock().await = None;
    }

    pub async fn current(&self) -> Option<AuthSession> {
        self.session.lock().await.clone()
    }
}
