use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;
use vm_core::error::SignInError;
use vm_core::session::{Identity, Session, SessionChange, SessionContext, SessionEventKind, SessionHub};
use vm_core::traits::AuthProvider;

use crate::{ensure_success, with_auth, RestClient};

/// `AuthProvider` over the backend's password-grant auth API.
pub struct RestAuthProvider {
    client: RestClient,
    hub: SessionHub,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: Uuid,
    email: Option<String>,
}

impl RestAuthProvider {
    pub fn new(client: RestClient) -> Self {
        Self {
            client,
            hub: SessionHub::default(),
        }
    }
}

/// Maps a failed token request's status onto the sign-in error kinds.
fn classify_sign_in_status(status: StatusCode, body: String) -> SignInError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::UNPROCESSABLE_ENTITY => {
            SignInError::InvalidCredentials
        }
        _ => SignInError::Unavailable(format!("HTTP {status}: {body}")),
    }
}

impl TokenResponse {
    fn into_session(self, fallback_identifier: &str) -> Session {
        let identity = Identity {
            id: self.user.id,
            identifier: self
                .user
                .email
                .unwrap_or_else(|| fallback_identifier.to_string()),
        };
        let expires_at = self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs));
        Session::new(identity, self.access_token, expires_at)
    }
}

#[async_trait]
impl AuthProvider for RestAuthProvider {
    async fn get_session(&self) -> anyhow::Result<SessionChange> {
        let snapshot = self.hub.snapshot();
        match &snapshot.session {
            Some(session) if session.is_expired(Utc::now()) => {
                tracing::info!(identifier = %session.identity.identifier, "session expired");
                Ok(self.hub.publish(SessionEventKind::SignedOut, None))
            }
            _ => Ok(snapshot),
        }
    }

    #[tracing::instrument(skip(self, secret))]
    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<SessionChange, SignInError> {
        let url = self
            .client
            .url("/auth/v1/token?grant_type=password")
            .map_err(|e| SignInError::Unavailable(e.to_string()))?;
        let response = self
            .client
            .client
            .post(url)
            .json(&PasswordGrant {
                email: identifier,
                password: secret,
            })
            .send()
            .await
            .map_err(|e| SignInError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_sign_in_status(status, body));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| SignInError::Unavailable(format!("unexpected token response: {e}")))?;
        let session = token.into_session(identifier);
        Ok(self.hub.publish(SessionEventKind::SignedIn, Some(session)))
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn sign_out(&self, ctx: &SessionContext) -> anyhow::Result<SessionChange> {
        if ctx.session().is_some() {
            let request = self.client.client.post(self.client.url("/auth/v1/logout")?);
            let response = with_auth(request, &self.client, ctx)?.send().await?;
            ensure_success(response).await?;
        }
        Ok(self.hub.publish(SessionEventKind::SignedOut, None))
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.hub.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn rejected_credentials_are_distinguished_from_outages() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            assert_eq!(
                classify_sign_in_status(status, String::new()),
                SignInError::InvalidCredentials
            );
        }
        assert!(matches!(
            classify_sign_in_status(StatusCode::SERVICE_UNAVAILABLE, "down".into()),
            SignInError::Unavailable(msg) if msg.contains("503") && msg.contains("down")
        ));
    }

    #[test]
    fn token_response_becomes_session() {
        let token: TokenResponse = serde_json::from_str(
            r#"{
                "access_token": "jwt",
                "token_type": "bearer",
                "expires_in": 3600,
                "refresh_token": "r",
                "user": { "id": "00000000-0000-0000-0000-000000000001", "email": "agent@villa.test" }
            }"#,
        )
        .unwrap();
        let session = token.into_session("ignored");
        assert_eq!(session.identity.identifier, "agent@villa.test");
        assert_eq!(session.access_token(), "jwt");
        assert!(!session.is_expired(Utc::now()));
        assert!(session.is_expired(Utc::now() + Duration::hours(2)));
    }

    #[tokio::test]
    async fn anonymous_sign_out_only_publishes_locally() {
        let client = RestClient::new("http://127.0.0.1:9", &SecretString::from("k")).unwrap();
        let auth = RestAuthProvider::new(client);
        let change = auth.sign_out(&SessionContext::anonymous()).await.unwrap();
        assert_eq!(change.kind, SessionEventKind::SignedOut);
        assert_eq!(auth.get_session().await.unwrap(), change);
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() {
        let client = RestClient::new("http://127.0.0.1:9", &SecretString::from("k")).unwrap();
        let auth = RestAuthProvider::new(client);
        let err = auth.sign_in("agent@villa.test", "pw").await.unwrap_err();
        assert!(matches!(err, SignInError::Network(_)));
    }
}
