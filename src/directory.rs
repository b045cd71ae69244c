// SPDX-License-Identifier: Apache-2.0
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use futures::future::LocalBoxFuture;
use ldap3::{LdapConnAsync, LdapConnSettings, LdapError};
use rustls::ClientConfig;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::LdapConfig;
use crate::tls::directory_client_config;

#[derive(Debug, Error)]
pub enum AuthError {
    /// A simple bind with an empty password is an unauthenticated bind
    #[error("a password is required, unauthenticated binds are not accepted")]
    EmptySecret,
    #[error("failed to prepare TLS for the directory connection")]
    Tls(#[source] rustls::Error),
    #[error(transparent)]
    Ldap(#[from] LdapError),
}

impl AuthError {
    /// Full error text including every underlying cause
    pub fn diagnostic(&self) -> String {
        let mut text = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            text.push_str("\n  caused by: ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        text
    }
}

/// Turn typed username into the identity used for the bind.
///
/// Names that already carry a domain (`user@realm` or `DOMAIN\user`) are used unchanged;
/// anything else gets the default domain prefixed.
pub fn bind_identity(username: &str, default_domain: &str) -> String {
    if username.contains('@') || username.contains('\\') {
        username.to_string()
    } else {
        format!("{}\\{}", default_domain, username)
    }
}

/// Seam between the portal handlers and the directory
pub trait Authenticator: Send + Sync {
    /// One bind attempt; `Ok` only when the directory accepted the credentials
    fn authenticate<'a>(&'a self, bind_identity: &'a str, secret: &'a str) -> LocalBoxFuture<'a, Result<(), AuthError>>;
}

/// Authenticates by performing a simple bind against the directory service
#[derive(Debug, Clone)]
pub struct DirectoryAuthenticator {
    host: String,
    port: u16,
    bind_timeout: Option<Duration>,
    tls: Option<Arc<ClientConfig>>,
}

impl DirectoryAuthenticator {
    pub fn new(config: &LdapConfig) -> Result<Self, AuthError> {
        let tls = if config.use_ssl {
            if config.allow_untrusted_certificates {
                warn!("Directory TLS accepts certificates that only validate against their own chain");
            }
            Some(directory_client_config(config.allow_untrusted_certificates).map_err(AuthError::Tls)?)
        } else {
            None
        };

        Ok(Self {
            host: config.host.trim().to_string(),
            port: config.port,
            bind_timeout: config.bind_timeout_secs.map(Duration::from_secs),
            tls,
        })
    }

    pub fn url(&self) -> String {
        let scheme = if self.tls.is_some() { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Connect, bind once and disconnect. The connection never outlives the call.
    #[instrument(skip(self, secret), fields(directory = %self.url()))]
    pub async fn bind(&self, bind_identity: &str, secret: &str) -> Result<(), AuthError> {
        if secret.is_empty() {
            return Err(AuthError::EmptySecret);
        }

        let mut settings = LdapConnSettings::new();
        if let Some(timeout) = self.bind_timeout {
            settings = settings.set_conn_timeout(timeout);
        }
        if let Some(tls) = &self.tls {
            settings = settings.set_config(tls.clone());
        }

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.url()).await?;
        actix_web::rt::spawn(async move {
            if let Err(e) = conn.drive().await {
                debug!(error = %e, "Directory connection closed with error");
            }
        });

        if let Some(timeout) = self.bind_timeout {
            ldap.with_timeout(timeout);
        }
        let outcome = ldap
            .simple_bind(bind_identity, secret)
            .await
            .and_then(|result| result.success())
            .map(|_| ())
            .map_err(AuthError::from);

        if let Err(e) = ldap.unbind().await {
            debug!(error = %e, "Directory unbind failed");
        }

        if outcome.is_ok() {
            info!(identity = %bind_identity, "Directory bind succeeded");
        }
        outcome
    }
}

impl Authenticator for DirectoryAuthenticator {
    fn authenticate<'a>(&'a self, bind_identity: &'a str, secret: &'a str) -> LocalBoxFuture<'a, Result<(), AuthError>> {
        Box::pin(self.bind(bind_identity, secret))
    }
}
