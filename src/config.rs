// SPDX-License-Identifier: Apache-2.0
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, instrument};

/// Environment variable pointing at the TOML configuration file
pub const CONFIG_PATH_ENV: &str = "PORTALGATE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/gateway.toml";

pub const PORTAL_HOST_ENV: &str = "PORTALGATE_PORTAL_HOST";
pub const EXTERNAL_PORT_ENV: &str = "PORTALGATE_EXTERNAL_PORT";
pub const COOKIE_DOMAIN_ENV: &str = "PORTALGATE_COOKIE_DOMAIN";
pub const LISTEN_ENV: &str = "PORTALGATE_LISTEN";
pub const STATIC_DIR_ENV: &str = "PORTALGATE_STATIC_DIR";
pub const LDAP_HOST_ENV: &str = "PORTALGATE_LDAP_HOST";
pub const LDAP_PORT_ENV: &str = "PORTALGATE_LDAP_PORT";
pub const LDAP_USE_SSL_ENV: &str = "PORTALGATE_LDAP_USE_SSL";
pub const LDAP_DOMAIN_ENV: &str = "PORTALGATE_LDAP_DOMAIN";
pub const LDAP_ALLOW_UNTRUSTED_ENV: &str = "PORTALGATE_LDAP_ALLOW_UNTRUSTED_CERTS";
pub const LDAP_BIND_TIMEOUT_ENV: &str = "PORTALGATE_LDAP_BIND_TIMEOUT_SECS";

/// Name of the session cookie unless overridden in the config file
pub const DEFAULT_COOKIE_NAME: &str = "GatewaySession";
const DEFAULT_EXTERNAL_PORT: u16 = 88;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config from {origin}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
    #[error("{0} must be set")]
    Missing(String),
    #[error("at least one protected app must be configured")]
    NoApps,
    #[error("hostname {0:?} is configured more than once")]
    DuplicateHost(String),
    #[error("hostname {host:?} is not under cookie domain {domain:?}, the session cookie would never reach it")]
    OutsideCookieDomain { host: String, domain: String },
}

/// Complete gateway configuration, loaded once at startup and never mutated afterwards
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub gateway: GatewaySettings,
    pub ldap: LdapConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Internal bind address of the listener
    pub listen: String,
    pub portal_host: String,
    /// Externally published port, used for redirect URLs and chooser links
    pub external_port: u16,
    pub cookie_name: String,
    /// Domain attribute of the session cookie. Must cover the portal and every app host.
    pub cookie_domain: Option<String>,
    /// Served under `/assets` on the portal host when the directory exists
    pub static_dir: PathBuf,
    pub upstream_timeout_secs: u64,
    pub portal_title: String,
    pub apps: Vec<AppConfig>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            portal_host: String::new(),
            external_port: DEFAULT_EXTERNAL_PORT,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_domain: None,
            static_dir: PathBuf::from("wwwroot"),
            upstream_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
            portal_title: "Applications Portal".to_string(),
            apps: vec![
                AppConfig::new("app1", "http://app1:80/", "Shuttle Reservation", "/Default.aspx"),
                AppConfig::new("app2", "http://app2:80/", "Workstation Reservation", "/"),
            ],
        }
    }
}

/// One protected backend application
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    /// Client-visible hostname routed to this app
    #[serde(default)]
    pub host: String,
    /// Single upstream base URL
    pub upstream: String,
    /// Fixed Host header sent upstream; defaults to `name`
    #[serde(default)]
    pub host_header: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_landing_path")]
    pub landing_path: String,
}

fn default_landing_path() -> String {
    "/".to_string()
}

impl AppConfig {
    fn new(name: &str, upstream: &str, title: &str, landing_path: &str) -> Self {
        Self {
            name: name.to_string(),
            host: String::new(),
            upstream: upstream.to_string(),
            host_header: name.to_string(),
            title: title.to_string(),
            landing_path: landing_path.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LdapConfig {
    pub host: String,
    pub port: u16,
    pub use_ssl: bool,
    /// Prefix for usernames typed without a domain separator
    pub domain: String,
    /// Accept certificates that only validate after rebuilding the chain from the presented certificates
    pub allow_untrusted_certificates: bool,
    /// No timeout when unset
    pub bind_timeout_secs: Option<u64>,
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 389,
            use_ssl: false,
            domain: String::new(),
            allow_untrusted_certificates: true,
            bind_timeout_secs: None,
        }
    }
}

impl GatewayConfig {
    /// Parse a TOML document and fill in defaults, without consulting the environment
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse_document(text, "inline document")
    }

    fn parse_document(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let mut config: GatewayConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })?;
        config.fill_defaults();
        Ok(config)
    }

    fn fill_defaults(&mut self) {
        for app in &mut self.gateway.apps {
            if app.host_header.trim().is_empty() {
                app.host_header = app.name.clone();
            }
            if app.title.trim().is_empty() {
                app.title = app.name.clone();
            }
        }
    }

    /// Apply environment-style overrides. `lookup` returns the raw value for a key, if set.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(PORTAL_HOST_ENV) {
            self.gateway.portal_host = v;
        }
        for (index, app) in self.gateway.apps.iter_mut().enumerate() {
            if let Some(v) = lookup(&format!("PORTALGATE_APP{}_HOST", index + 1)) {
                app.host = v;
            }
        }
        if let Some(v) = lookup(EXTERNAL_PORT_ENV) {
            self.gateway.external_port = parse_value(EXTERNAL_PORT_ENV, &v)?;
        }
        if let Some(v) = lookup(COOKIE_DOMAIN_ENV) {
            self.gateway.cookie_domain = Some(v).filter(|d| !d.trim().is_empty());
        }
        if let Some(v) = lookup(LISTEN_ENV) {
            self.gateway.listen = v;
        }
        if let Some(v) = lookup(STATIC_DIR_ENV) {
            self.gateway.static_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(LDAP_HOST_ENV) {
            self.ldap.host = v;
        }
        if let Some(v) = lookup(LDAP_PORT_ENV) {
            self.ldap.port = parse_value(LDAP_PORT_ENV, &v)?;
        }
        if let Some(v) = lookup(LDAP_USE_SSL_ENV) {
            self.ldap.use_ssl = parse_bool(LDAP_USE_SSL_ENV, &v)?;
        }
        if let Some(v) = lookup(LDAP_DOMAIN_ENV) {
            self.ldap.domain = v;
        }
        if let Some(v) = lookup(LDAP_ALLOW_UNTRUSTED_ENV) {
            self.ldap.allow_untrusted_certificates = parse_bool(LDAP_ALLOW_UNTRUSTED_ENV, &v)?;
        }
        if let Some(v) = lookup(LDAP_BIND_TIMEOUT_ENV) {
            self.ldap.bind_timeout_secs = Some(parse_value(LDAP_BIND_TIMEOUT_ENV, &v)?);
        }
        Ok(())
    }

    /// Reject configurations the gateway cannot safely serve
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.portal_host.trim().is_empty() {
            return Err(ConfigError::Missing("gateway.portal_host".to_string()));
        }
        if self.gateway.apps.is_empty() {
            return Err(ConfigError::NoApps);
        }
        for (index, app) in self.gateway.apps.iter().enumerate() {
            if app.host.trim().is_empty() {
                return Err(ConfigError::Missing(format!("host of app {} ({})", index + 1, app.name)));
            }
            if app.upstream.trim().is_empty() {
                return Err(ConfigError::Missing(format!("upstream of app {}", app.name)));
            }
        }

        let mut seen = HashSet::new();
        let hosts = std::iter::once(&self.gateway.portal_host)
            .chain(self.gateway.apps.iter().map(|app| &app.host));
        for host in hosts {
            if !seen.insert(host.trim().to_ascii_lowercase()) {
                return Err(ConfigError::DuplicateHost(host.clone()));
            }
        }

        if self.gateway.cookie_name.trim().is_empty() {
            return Err(ConfigError::Missing("gateway.cookie_name".to_string()));
        }
        let domain = match self.gateway.cookie_domain.as_deref().map(str::trim) {
            Some(d) if !d.trim_start_matches('.').is_empty() => d,
            _ => return Err(ConfigError::Missing("gateway.cookie_domain".to_string())),
        };
        let hosts = std::iter::once(&self.gateway.portal_host)
            .chain(self.gateway.apps.iter().map(|app| &app.host));
        for host in hosts {
            if !within_cookie_domain(host.trim(), domain) {
                return Err(ConfigError::OutsideCookieDomain {
                    host: host.clone(),
                    domain: domain.to_string(),
                });
            }
        }
        if self.ldap.host.trim().is_empty() {
            return Err(ConfigError::Missing("ldap.host".to_string()));
        }
        if self.ldap.domain.trim().is_empty() {
            return Err(ConfigError::Missing("ldap.domain".to_string()));
        }
        Ok(())
    }
}

/// Whether a browser sends a cookie scoped to `domain` to `host`
fn within_cookie_domain(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    host == domain || host.strip_suffix(domain.as_str()).is_some_and(|rest| rest.ends_with('.'))
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Load the configuration file (if present), apply environment overrides and validate
#[instrument]
pub fn load() -> Result<GatewayConfig, ConfigError> {
    let path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!(path = %path.display(), "Loading gateway configuration file");
            GatewayConfig::parse_document(&text, &path.display().to_string())?
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No configuration file, using defaults and environment");
            GatewayConfig::default()
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };

    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
