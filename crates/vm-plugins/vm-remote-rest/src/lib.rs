//! # vm-remote-rest
//!
//! Talks to the hosted backend: a PostgREST-style row API under
//! `/rest/v1` and a GoTrue-style auth API under `/auth/v1`. Row visibility
//! is enforced remotely by the caller's bearer token.

mod auth;
mod store;
#[cfg(test)]
mod test_server;

pub use auth::RestAuthProvider;
pub use store::RestVillaStore;

use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Response;
use secrecy::{ExposeSecret, SecretString};
use vm_core::session::SessionContext;

const API_KEY_HEADER: &str = "apikey";

/// HTTP client preconfigured with the backend's access key.
#[derive(Clone)]
pub struct RestClient {
    endpoint: String,
    client: reqwest::Client,
    anon_bearer: HeaderValue,
}

impl RestClient {
    pub fn new(endpoint_url: &str, access_key: &SecretString) -> anyhow::Result<Self> {
        let key = access_key.expose_secret();

        let mut api_key = HeaderValue::from_str(key).context("access key is not a valid header value")?;
        api_key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, api_key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            endpoint: endpoint_url.trim_end_matches('/').to_string(),
            client,
            anon_bearer: bearer(key)?,
        })
    }

    /// The session's token, or the access key for anonymous callers.
    fn authorization(&self, ctx: &SessionContext) -> anyhow::Result<HeaderValue> {
        match ctx.bearer_token() {
            Some(token) => bearer(token),
            None => Ok(self.anon_bearer.clone()),
        }
    }

    fn url(&self, path: &str) -> anyhow::Result<reqwest::Url> {
        reqwest::Url::parse(&format!("{}{path}", self.endpoint))
            .with_context(|| format!("invalid backend url {}{path}", self.endpoint))
    }
}

fn bearer(token: &str) -> anyhow::Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .context("token is not a valid header value")?;
    value.set_sensitive(true);
    Ok(value)
}

/// Turns a non-success response into an error carrying status and body.
async fn ensure_success(response: Response) -> anyhow::Result<Response> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("HTTP {}: {}", status, body);
    }
    Ok(response)
}

pub(crate) fn with_auth(
    request: reqwest::RequestBuilder,
    client: &RestClient,
    ctx: &SessionContext,
) -> anyhow::Result<reqwest::RequestBuilder> {
    Ok(request.header(AUTHORIZATION, client.authorization(ctx)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_core::session::{Identity, Session};

    fn client() -> RestClient {
        RestClient::new("https://demo.example.co/", &SecretString::from("anon-key")).unwrap()
    }

    #[test]
    fn strips_trailing_slash_and_builds_urls() {
        let url = client().url("/rest/v1/villas").unwrap();
        assert_eq!(url.as_str(), "https://demo.example.co/rest/v1/villas");
    }

    #[test]
    fn anonymous_requests_use_the_access_key() {
        let client = client();
        let anon = client.authorization(&SessionContext::anonymous()).unwrap();
        assert_eq!(anon.to_str().unwrap(), "Bearer anon-key");
        assert!(anon.is_sensitive());

        let ctx = SessionContext::authenticated(Session::new(
            Identity {
                id: uuid::Uuid::now_v7(),
                identifier: "agent@villa.test".into(),
            },
            "user-jwt",
            None,
        ));
        assert_eq!(client.authorization(&ctx).unwrap().to_str().unwrap(), "Bearer user-jwt");
    }
}
