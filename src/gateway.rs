// SPDX-License-Identifier: Apache-2.0
use crate::config::GatewayConfig;
use crate::host::HostClassifier;
use crate::routes::RouteTable;
use crate::session::SessionCodec;

/// Read-only state shared by every worker for the life of the process
#[derive(Debug, Clone)]
pub struct Gateway {
    pub config: GatewayConfig,
    pub hosts: HostClassifier,
    pub routes: RouteTable,
    pub session: SessionCodec,
}

impl Gateway {
    /// Expects a configuration that already passed `GatewayConfig::validate`
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            hosts: HostClassifier::from_config(&config),
            routes: RouteTable::from_config(&config),
            session: SessionCodec::from_config(&config),
            config,
        }
    }

    pub fn portal_host(&self) -> &str {
        self.config.gateway.portal_host.trim()
    }

    pub fn external_port(&self) -> u16 {
        self.config.gateway.external_port
    }

    /// Absolute URL on the portal as the client reaches it
    pub fn portal_url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.portal_host(), self.external_port(), path)
    }
}
