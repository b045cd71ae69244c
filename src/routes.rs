// SPDX-License-Identifier: Apache-2.0
use crate::config::GatewayConfig;
use crate::host::strip_port;

/// One protected host and the single upstream it is forwarded to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub name: String,
    pub host: String,
    /// Upstream base URL without a trailing slash
    pub upstream: String,
    /// Host header value sent upstream in place of the client-visible host
    pub host_header: String,
}

impl RouteEntry {
    /// Every path on the host maps onto the upstream base
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.upstream, path, q),
            _ => format!("{}{}", self.upstream, path),
        }
    }
}

/// Static host-to-upstream mapping, built once at startup
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let entries = config
            .gateway
            .apps
            .iter()
            .map(|app| RouteEntry {
                name: app.name.clone(),
                host: app.host.trim().to_string(),
                upstream: app.upstream.trim().trim_end_matches('/').to_string(),
                host_header: app.host_header.clone(),
            })
            .collect();
        Self { entries }
    }

    pub fn lookup(&self, host_header: &str) -> Option<&RouteEntry> {
        let host = strip_port(host_header);
        self.entries.iter().find(|e| e.host.eq_ignore_ascii_case(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        let mut config = GatewayConfig::default();
        config.gateway.apps[0].host = "app1.example".to_string();
        config.gateway.apps[1].host = "app2.example".to_string();
        RouteTable::from_config(&config)
    }

    #[test]
    fn each_host_maps_to_one_upstream() {
        let table = table();
        let app1 = table.lookup("APP1.example:88").unwrap();
        assert_eq!(app1.upstream, "http://app1:80");
        assert_eq!(app1.host_header, "app1");
        assert_eq!(table.lookup("app2.example").unwrap().name, "app2");
        assert!(table.lookup("portal.example").is_none());
    }

    #[test]
    fn upstream_url_keeps_path_and_query() {
        let table = table();
        let app1 = table.lookup("app1.example").unwrap();
        assert_eq!(app1.upstream_url("/Default.aspx", None), "http://app1:80/Default.aspx");
        assert_eq!(
            app1.upstream_url("/Login", Some("ReturnUrl=%2F")),
            "http://app1:80/Login?ReturnUrl=%2F"
        );
        assert_eq!(app1.upstream_url("/", Some("")), "http://app1:80/");
    }
}
