use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::gateway::{classify_transport_error, http_client};
use crate::config::ZohoConfig;
use crate::error::ZohoError;
use crate::model::token::AccessToken;
use crate::util::text::preview;

/// An access token together with where it came from. Never persisted.
#[derive(Clone)]
pub struct Credential {
    access_token: AccessToken,
    obtained_at: DateTime<Utc>,
    source_refresh_token: String,
}

impl Credential {
    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    pub fn obtained_at(&self) -> DateTime<Utc> {
        self.obtained_at
    }

    fn minted_from(&self, refresh_token: &str) -> bool {
        self.source_refresh_token == refresh_token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &self.access_token)
            .field("obtained_at", &self.obtained_at)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
}

/// Mints access tokens from the long-lived refresh token.
pub struct CredentialManager {
    client: reqwest::Client,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    retry_backoff: Duration,
    preview_limit: usize,
    current: RwLock<Option<Credential>>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

impl CredentialManager {
    pub fn new(config: &ZohoConfig) -> Self {
        Self {
            client: http_client(config.request_timeout_secs.map(Duration::from_secs)),
            token_url: format!("{}/oauth/v2/token", config.accounts_url.trim_end_matches('/')),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
            retry_backoff: Duration::from_millis(config.token_retry_backoff_ms),
            preview_limit: config.preview_limit,
            current: RwLock::new(None),
        }
    }

    #[cfg(test)]
    fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn secrets(&self) -> Result<(&str, &str, &str), ZohoError> {
        let mut missing = Vec::new();
        if present(&self.client_id).is_none() {
            missing.push("ZOHO_CLIENT_ID");
        }
        if present(&self.client_secret).is_none() {
            missing.push("ZOHO_CLIENT_SECRET");
        }
        if present(&self.refresh_token).is_none() {
            missing.push("ZOHO_REFRESH_TOKEN");
        }
        match (
            present(&self.client_id),
            present(&self.client_secret),
            present(&self.refresh_token),
        ) {
            (Some(id), Some(secret), Some(refresh)) => Ok((id, secret, refresh)),
            _ => Err(ZohoError::MissingConfiguration { missing }),
        }
    }

    /// Exchange the refresh token for a fresh access token and cache it.
    /// A transient network failure is retried once after the backoff.
    pub async fn acquire(&self) -> Result<Credential, ZohoError> {
        let (client_id, client_secret, refresh_token) = self.secrets()?;

        let credential = match self.exchange(client_id, client_secret, refresh_token).await {
            Err(err @ ZohoError::TransientNetwork { .. }) => {
                warn!(error = %err, "token exchange failed, retrying once");
                tokio::time::sleep(self.retry_backoff).await;
                self.exchange(client_id, client_secret, refresh_token).await?
            }
            other => other?,
        };

        info!(token = %credential.access_token.masked(), "access token refreshed");
        *self.current.write().await = Some(credential.clone());
        Ok(credential)
    }

    pub async fn current(&self) -> Option<Credential> {
        self.current.read().await.clone()
    }

    /// Cached token, acquiring one when none is held.
    pub async fn current_or_acquire(&self) -> Result<AccessToken, ZohoError> {
        let refresh_token = self.secrets()?.2;
        if let Some(credential) = self.current().await {
            if credential.minted_from(refresh_token) {
                return Ok(credential.access_token);
            }
        }
        Ok(self.acquire().await?.access_token)
    }

    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }

    async fn exchange(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<Credential, ZohoError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, &self.token_url))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e, &self.token_url))?;

        let parsed: TokenResponse = serde_json::from_str(text.trim()).map_err(|_| {
            ZohoError::MalformedUpstreamResponse {
                status: status.as_u16(),
                preview: preview(&text, self.preview_limit),
            }
        })?;

        if let Some(token) = parsed.access_token.filter(|t| !t.is_empty()) {
            return Ok(Credential {
                access_token: AccessToken::new(token),
                obtained_at: Utc::now(),
                source_refresh_token: refresh_token.to_string(),
            });
        }

        let code = parsed
            .error
            .or(parsed.message)
            .unwrap_or_else(|| format!("HTTP {status} without an access token"));
        let hint = match code.as_str() {
            "invalid_grant" => {
                "refresh token expired or revoked: generate a new one from the Zoho Developer Console"
            }
            "invalid_client" => "Check ZOHO_CLIENT_ID and ZOHO_CLIENT_SECRET",
            _ => "Check your Zoho OAuth client id, client secret and refresh token",
        };
        let reason = match parsed.error_description {
            Some(desc) => format!("{code} ({desc})"),
            None => code,
        };
        warn!(%reason, "token exchange rejected");
        Err(ZohoError::Auth {
            reason,
            hint: hint.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn config(accounts_url: &str) -> ZohoConfig {
        ZohoConfig {
            client_id: Some("1000.CLIENT".into()),
            client_secret: Some("client-secret".into()),
            refresh_token: Some("1000.refresh".into()),
            accounts_url: accounts_url.into(),
            token_retry_backoff_ms: 0,
            ..ZohoConfig::default()
        }
    }

    #[tokio::test]
    async fn exchanges_refresh_token_for_access_token() {
        let server = MockServer::start();
        let token = server.mock(|when, then| {
            when.method(POST)
                .path("/oauth/v2/token")
                .body_includes("grant_type=refresh_token")
                .body_includes("refresh_token=1000.refresh")
                .body_includes("client_id=1000.CLIENT");
            then.status(200).json_body(json!({
                "access_token": "1000.access",
                "expires_in": 3600,
                "token_type": "Bearer"
            }));
        });

        let manager = CredentialManager::new(&config(&server.base_url()));
        let credential = manager.acquire().await.unwrap();
        assert_eq!(credential.access_token().secret(), "1000.access");
        assert!(credential.obtained_at() <= Utc::now());
        assert!(manager.current().await.is_some());
        token.assert_calls(1);
    }

    #[tokio::test]
    async fn cached_token_is_reused_until_invalidated() {
        let server = MockServer::start();
        let token = server.mock(|when, then| {
            when.method(POST).path("/oauth/v2/token");
            then.status(200).json_body(json!({ "access_token": "1000.access" }));
        });

        let manager = CredentialManager::new(&config(&server.base_url()));
        manager.current_or_acquire().await.unwrap();
        manager.current_or_acquire().await.unwrap();
        token.assert_calls(1);

        manager.invalidate().await;
        manager.current_or_acquire().await.unwrap();
        token.assert_calls(2);
    }

    #[tokio::test]
    async fn invalid_grant_is_an_auth_error_with_expiry_hint() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth/v2/token");
            then.status(200).json_body(json!({ "error": "invalid_grant" }));
        });

        let manager = CredentialManager::new(&config(&server.base_url()));
        match manager.acquire().await {
            Err(ZohoError::Auth { reason, hint }) => {
                assert_eq!(reason, "invalid_grant");
                assert!(hint.contains("refresh token expired"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(manager.current().await.is_none());
    }

    #[tokio::test]
    async fn missing_secrets_fail_without_calling_upstream() {
        let server = MockServer::start();
        let token = server.mock(|when, then| {
            when.method(POST).path("/oauth/v2/token");
            then.status(200).json_body(json!({ "access_token": "x" }));
        });

        let mut cfg = config(&server.base_url());
        cfg.client_secret = None;
        cfg.refresh_token = Some("   ".into());
        let manager = CredentialManager::new(&cfg);
        match manager.acquire().await {
            Err(ZohoError::MissingConfiguration { missing }) => {
                assert_eq!(missing, vec!["ZOHO_CLIENT_SECRET", "ZOHO_REFRESH_TOKEN"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        token.assert_calls(0);
    }

    #[tokio::test]
    async fn non_json_token_response_is_malformed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth/v2/token");
            then.status(500).body("<html>Service Unavailable</html>");
        });

        let manager = CredentialManager::new(&config(&server.base_url()));
        match manager.acquire().await {
            Err(ZohoError::MalformedUpstreamResponse { status, preview }) => {
                assert_eq!(status, 500);
                assert!(preview.contains("Service Unavailable"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_is_retried_once() {
        let server = MockServer::start();
        let token = server.mock(|when, then| {
            when.method(POST).path("/oauth/v2/token");
            then.status(200)
                .delay(Duration::from_millis(800))
                .json_body(json!({ "access_token": "late" }));
        });

        let manager = CredentialManager::new(&config(&server.base_url()))
            .with_client(http_client(Some(Duration::from_millis(100))));
        let err = manager.acquire().await.unwrap_err();
        assert!(matches!(err, ZohoError::TransientNetwork { .. }), "{err:?}");
        token.assert_calls(2);
    }

    #[test]
    fn credential_debug_hides_refresh_token() {
        let credential = Credential {
            access_token: AccessToken::new("1000.access-token"),
            obtained_at: Utc::now(),
            source_refresh_token: "1000.very-secret-refresh".into(),
        };
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("very-secret-refresh"));
        assert!(!rendered.contains("access-token"));
    }
}
