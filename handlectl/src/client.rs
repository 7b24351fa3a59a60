//! HTTP client for the Handle server's JSON REST API.

use handle_core::api::{
    HandlePage, ModifyResponse, ModifyValuesRequest, SessionAuthorized, SessionCreated,
};
use handle_core::{HandleError, HandleId, Result};
use reqwest::{Client, Identity, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// Normalize a server URL by removing trailing slashes.
fn normalize_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Percent-encode each segment of a postfix, keeping `/` separators.
fn encode_postfix(postfix: &str) -> String {
    postfix
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// `Authorization` header value for an established session.
fn session_auth(session_id: &str) -> String {
    format!("Handle sessionId=\"{}\"", session_id)
}

/// Map a 404 on a handle endpoint to [`HandleError::NotFound`].
fn not_found_as(err: HandleError, id: &HandleId) -> HandleError {
    match err {
        HandleError::Http { status: 404, .. } => HandleError::NotFound(id.to_string()),
        other => other,
    }
}

/// Map any failure of the session handshake to [`HandleError::Auth`].
fn auth_failure(err: HandleError) -> HandleError {
    match err {
        HandleError::Http {
            status, endpoint, ..
        } => HandleError::Auth(format!("{} rejected with HTTP {}", endpoint, status)),
        HandleError::Transport { endpoint, reason } => {
            HandleError::Auth(format!("{} failed: {}", endpoint, reason))
        }
        other => other,
    }
}

/// HTTP client for the `/api/sessions` and `/api/handles` endpoints.
///
/// Requests are sent one at a time and never retried: a failed request is
/// surfaced to the caller as-is. The client certificate, when given, is
/// presented on every TLS connection; the server only requires it for the
/// session authorization `PUT`.
#[derive(Debug, Clone)]
pub struct HandleClient {
    client: Client,
    base_url: String,
}

impl HandleClient {
    /// Create a client for `server_url`.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Config`] if the HTTP client cannot be built,
    /// for instance when the identity is rejected by the TLS backend.
    pub fn new(server_url: &str, timeout_secs: u64, identity: Option<Identity>) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("handlectl/", env!("CARGO_PKG_VERSION")));

        if let Some(identity) = identity {
            builder = builder.identity(identity);
        }

        let client = builder
            .build()
            .map_err(|e| HandleError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: normalize_url(server_url),
        })
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request, mapping transport failures.
    async fn send(request: RequestBuilder, endpoint: &str) -> Result<Response> {
        request.send().await.map_err(|e| HandleError::Transport {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    /// Check the status and return the raw body.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Http`] for any non-success status and
    /// [`HandleError::Transport`] if the body cannot be read.
    async fn response_text(response: Response, endpoint: &str) -> Result<String> {
        let status = response.status();
        let text = response.text().await.map_err(|e| HandleError::Transport {
            endpoint: endpoint.to_string(),
            reason: format!("failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(HandleError::Http {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
                body: text,
            });
        }

        Ok(text)
    }

    /// Check the status and deserialize the JSON body.
    async fn handle_response<T: DeserializeOwned>(response: Response, endpoint: &str) -> Result<T> {
        let text = Self::response_text(response, endpoint).await?;

        serde_json::from_str(&text).map_err(|e| {
            HandleError::Parse(format!("Failed to parse JSON response from {}: {}", endpoint, e))
        })
    }

    /// Create a new, unauthenticated session.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Auth`] if the server rejects the request.
    pub async fn create_session(&self) -> Result<SessionCreated> {
        let url = format!("{}/api/sessions", self.base_url);
        let endpoint = "POST sessions";

        let response = Self::send(self.client.post(&url), endpoint)
            .await
            .map_err(auth_failure)?;
        Self::handle_response(response, endpoint)
            .await
            .map_err(auth_failure)
    }

    /// Authorize a session with the client certificate.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Auth`] if the server rejects the certificate.
    pub async fn authorize_session(&self, session_id: &str) -> Result<SessionAuthorized> {
        let url = format!("{}/api/sessions/this", self.base_url);
        let endpoint = "PUT sessions/this";
        let auth = format!("Handle clientCert=\"true\", sessionId=\"{}\"", session_id);

        let request = self
            .client
            .put(&url)
            .header(reqwest::header::AUTHORIZATION, auth);
        let response = Self::send(request, endpoint)
            .await
            .map_err(auth_failure)?;
        Self::handle_response(response, endpoint)
            .await
            .map_err(auth_failure)
    }

    /// Destroy a session. Expects `204 No Content`.
    pub async fn delete_session(&self, session_id: &str) -> Result<StatusCode> {
        let url = format!("{}/api/sessions/this", self.base_url);
        let endpoint = "DELETE sessions/this";

        let request = self
            .client
            .delete(&url)
            .header(reqwest::header::AUTHORIZATION, session_auth(session_id));
        let response = Self::send(request, endpoint).await?;
        let status = response.status();
        Self::response_text(response, endpoint).await?;

        Ok(status)
    }

    /// Retrieve the full record of a single handle.
    ///
    /// The body is returned untyped, field order and unknown fields intact,
    /// so it can be logged and stored exactly as the server sent it.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::NotFound`] if the handle does not exist.
    pub async fn get_handle(&self, session_id: &str, id: &HandleId) -> Result<Value> {
        let url = format!(
            "{}/api/handles/{}/{}",
            self.base_url,
            urlencoding::encode(&id.prefix),
            encode_postfix(&id.postfix)
        );
        let endpoint = &format!("GET handles/{}", id);

        let request = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, session_auth(session_id));
        let response = Self::send(request, endpoint).await?;
        let text = Self::response_text(response, endpoint)
            .await
            .map_err(|e| not_found_as(e, id))?;

        serde_json::from_str(&text).map_err(|e| {
            HandleError::Parse(format!("Failed to parse JSON response from {}: {}", endpoint, e))
        })
    }

    /// Retrieve one page of bare handle identifiers for `prefix`.
    ///
    /// A `page_size` of zero returns only the total count. Both values are
    /// always sent: the server treats a missing one as a request for every
    /// handle, which times out for large prefixes.
    pub async fn get_page(
        &self,
        session_id: &str,
        prefix: &str,
        page: u64,
        page_size: u64,
    ) -> Result<HandlePage> {
        let url = format!(
            "{}/api/handles?prefix={}&page={}&pageSize={}",
            self.base_url,
            urlencoding::encode(prefix),
            page,
            page_size
        );
        let endpoint = "GET handles";

        debug!("Getting handles; page={}; size={}", page, page_size);
        let started = Instant::now();

        let request = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, session_auth(session_id));
        let response = Self::send(request, endpoint).await?;
        let result = Self::handle_response(response, endpoint).await;

        debug!("Got handles; time={:.3}", started.elapsed().as_secs_f64());
        result
    }

    /// Replace the listed values of an existing handle.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::NotFound`] if the handle does not exist yet.
    pub async fn modify_values(
        &self,
        session_id: &str,
        id: &HandleId,
        body: &ModifyValuesRequest,
    ) -> Result<ModifyResponse> {
        let url = format!(
            "{}/api/handles/{}/{}?index=various",
            self.base_url,
            urlencoding::encode(&id.prefix),
            encode_postfix(&id.postfix)
        );
        let endpoint = &format!("PUT handles/{}", id);

        let request = self
            .client
            .put(&url)
            .header(reqwest::header::AUTHORIZATION, session_auth(session_id))
            .json(body);
        let response = Self::send(request, endpoint).await?;
        let text = Self::response_text(response, endpoint)
            .await
            .map_err(|e| not_found_as(e, id))?;

        serde_json::from_str(&text).map_err(|e| {
            HandleError::Parse(format!("Failed to parse JSON response from {}: {}", endpoint, e))
        })
    }
}
