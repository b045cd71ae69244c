// SPDX-License-Identifier: Apache-2.0
use actix_web::dev::RequestHead;
use actix_web::http::header;

use crate::config::GatewayConfig;

/// What the gateway knows about the host a request was sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostClass {
    Portal,
    ProtectedApp,
    Unrecognized,
}

/// Case-insensitive exact match of request hosts against the configured names
#[derive(Debug, Clone)]
pub struct HostClassifier {
    portal: String,
    apps: Vec<String>,
}

impl HostClassifier {
    pub fn new(portal: &str, apps: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            portal: portal.trim().to_string(),
            apps: apps.into_iter().map(|h| h.as_ref().trim().to_string()).collect(),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            &config.gateway.portal_host,
            config.gateway.apps.iter().map(|app| app.host.as_str()),
        )
    }

    /// Classify a Host header value; any `:port` suffix is ignored.
    pub fn classify(&self, host_header: &str) -> HostClass {
        let host = strip_port(host_header);
        if host.eq_ignore_ascii_case(&self.portal) {
            HostClass::Portal
        } else if self.apps.iter().any(|app| host.eq_ignore_ascii_case(app)) {
            HostClass::ProtectedApp
        } else {
            HostClass::Unrecognized
        }
    }

    pub fn is_portal(&self, host_header: &str) -> bool {
        self.classify(host_header) == HostClass::Portal
    }
}

/// Drop a trailing `:port` from a Host header value, keeping IPv6 literals intact.
pub fn strip_port(host: &str) -> &str {
    let host = host.trim();
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Host the client addressed: the Host header, or the URI authority for HTTP/2 requests.
pub fn request_host(head: &RequestHead) -> Option<&str> {
    head.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| head.uri.authority().map(|a| a.as_str()))
}
