//! Session lifecycle and the session-scoped handle queries.
//!
//! A run opens exactly one [`Session`]: `POST /api/sessions` creates it and
//! `PUT /api/sessions/this` authorizes it with the client certificate.
//! [`Session::close`] consumes the session, so it cannot be closed twice, and
//! [`Session::run_guarded`] closes it whatever the outcome of the work.

use handle_core::api::{HandlePage, ModifyResponse, ModifyValuesRequest};
use handle_core::{HandleError, HandleId, Result, SessionInfo};
use reqwest::Identity;
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tracing::{debug, error, info, warn};

use crate::client::HandleClient;

/// PEM certificate and private key used to authorize a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub certfile: PathBuf,
    pub keyfile: PathBuf,
}

impl Credentials {
    pub fn new(certfile: impl Into<PathBuf>, keyfile: impl Into<PathBuf>) -> Self {
        Self {
            certfile: certfile.into(),
            keyfile: keyfile.into(),
        }
    }

    /// Read both PEM files into a TLS client identity.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Config`] if either file is missing, unreadable,
    /// or not a usable PEM certificate/key pair.
    pub fn load_identity(&self) -> Result<Identity> {
        let key = read_pem(&self.keyfile, "private key")?;
        let cert = read_pem(&self.certfile, "certificate")?;

        let mut pem = cert;
        pem.push(b'\n');
        pem.extend_from_slice(&key);

        Identity::from_pem(&pem).map_err(|e| {
            HandleError::Config(format!(
                "Invalid certificate `{}` or private key `{}`: {}",
                self.certfile.display(),
                self.keyfile.display(),
                e
            ))
        })
    }
}

fn read_pem(path: &Path, what: &str) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(HandleError::Config(format!(
            "Failed to find {} `{}`",
            what,
            path.display()
        )));
    }
    debug!("Using {} `{}`", what, path.display());

    std::fs::read(path).map_err(|e| {
        HandleError::Config(format!("Failed to read {} `{}`: {}", what, path.display(), e))
    })
}

/// An authorized server session.
#[derive(Debug)]
pub struct Session {
    client: HandleClient,
    info: SessionInfo,
}

impl Session {
    /// Open and authorize a session on `server_url`.
    ///
    /// # Errors
    ///
    /// - [`HandleError::Config`] if the certificate or key is missing or
    ///   invalid; no request is sent in that case.
    /// - [`HandleError::Auth`] if the server rejects the session request or
    ///   its authorization.
    pub async fn open(server_url: &str, credentials: &Credentials, timeout_secs: u64) -> Result<Self> {
        let identity = credentials.load_identity()?;
        let client = HandleClient::new(server_url, timeout_secs, Some(identity))?;
        Self::open_with(client).await
    }

    /// Open and authorize a session using an already configured client.
    pub async fn open_with(client: HandleClient) -> Result<Self> {
        debug!("Creating new session; server={}", client.base_url());
        let created = client.create_session().await?;
        let session_id = created.session_id;

        debug!("Authorizing sessionId {}", session_id);
        let authorized = match client.authorize_session(&session_id).await {
            Ok(authorized) => authorized,
            Err(e) => {
                discard(&client, &session_id).await;
                return Err(e);
            }
        };

        if !authorized.authenticated {
            discard(&client, &session_id).await;
            return Err(HandleError::Auth(format!(
                "Session {} was not authenticated by the server",
                session_id
            )));
        }

        // Logged to file as well, to allow deleting a leaked session by hand
        info!(
            "Got authorized session; sessionId={}; id={}",
            session_id,
            authorized.id.as_deref().unwrap_or("unknown")
        );

        Ok(Self {
            client,
            info: SessionInfo {
                id: session_id,
                authenticated: true,
            },
        })
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Delete the session on the server.
    ///
    /// Best effort: a failure is logged and otherwise ignored.
    pub async fn close(self) {
        debug!("Deleting sessionId {}", self.info.id);
        match self.client.delete_session(&self.info.id).await {
            Ok(status) => debug!("Got {}", status),
            Err(e) => warn!("Failed to delete sessionId {}: {}", self.info.id, e),
        }
    }

    /// Run `work` with this session, then close it.
    ///
    /// `work` races against `interrupt`; when `interrupt` completes first the
    /// work is dropped and [`HandleError::Interrupted`] is returned. Errors
    /// are logged here. The session is closed exactly once in every case.
    pub async fn run_guarded<F, T, I>(self, work: F, interrupt: I) -> Result<T>
    where
        F: for<'a> FnOnce(&'a Session) -> Pin<Box<dyn Future<Output = Result<T>> + 'a>>,
        I: Future<Output = ()>,
    {
        let outcome = {
            let work = work(&self);
            tokio::select! {
                result = work => result,
                _ = interrupt => Err(HandleError::Interrupted),
            }
        };

        match &outcome {
            Err(HandleError::Interrupted) => info!("Interrupted by user"),
            Err(e) => error!("{}", e),
            Ok(_) => {}
        }

        self.close().await;
        outcome
    }

    /// Fetch the full record of `<prefix>/<postfix>`.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::NotFound`] if the handle does not exist.
    pub async fn get_handle(&self, id: &HandleId) -> Result<Value> {
        debug!("Getting handle; prefix={}; postfix={}", id.prefix, id.postfix);
        let record = self.client.get_handle(&self.info.id, id).await?;

        // One-line JSON keeps the log parseable
        info!("Got handle; handle={}", serde_json::to_string(&record)?);
        Ok(record)
    }

    /// Fetch one page of bare identifiers for `prefix`.
    pub async fn get_page(&self, prefix: &str, page: u64, page_size: u64) -> Result<HandlePage> {
        self.client
            .get_page(&self.info.id, prefix, page, page_size)
            .await
    }

    /// Count the handles of `prefix`, including special ones such as `ADMIN`.
    pub async fn count(&self, prefix: &str) -> Result<u64> {
        let stats = self.get_page(prefix, 0, 0).await?;
        info!("prefix={}; count={}", stats.prefix, stats.total_count);
        Ok(stats.total_count)
    }

    /// Turn the existing handle `alias` into an `HS_ALIAS` of `target`.
    ///
    /// Index 1 is replaced; the target is not checked for existence.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::NotFound`] if `alias` does not exist yet.
    pub async fn rewrite_to_alias(
        &self,
        alias: &HandleId,
        target: &HandleId,
    ) -> Result<ModifyResponse> {
        info!(
            "Rewriting handle to become alias; prefix={}; alias={}; target={}",
            alias.prefix, alias.postfix, target.postfix
        );

        let body = ModifyValuesRequest::alias_to(target);
        let response = self
            .client
            .modify_values(&self.info.id, alias, &body)
            .await?;

        debug!(
            "Rewrote handle; url=https://hdl.handle.net/{}; responseCode={}",
            alias, response.response_code
        );
        Ok(response)
    }
}

/// Delete a session that failed authorization.
async fn discard(client: &HandleClient, session_id: &str) {
    if let Err(e) = client.delete_session(session_id).await {
        warn!("Failed to delete unauthorized sessionId {}: {}", session_id, e);
    }
}
