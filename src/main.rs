// SPDX-License-Identifier: Apache-2.0
use actix_web::{web, HttpServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use portalgate::config;
use portalgate::directory::{Authenticator, DirectoryAuthenticator};
use portalgate::gateway::Gateway;
use portalgate::logging::init_from_env;
use portalgate::server::build_app;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    init_from_env("portalgate");

    info!("Starting portalgate");

    // Nothing listens until the configuration is complete
    let config = config::load().map_err(|e| {
        error!(error = %e, "Invalid gateway configuration");
        std::io::Error::other(e)
    })?;

    let authenticator = DirectoryAuthenticator::new(&config.ldap).map_err(|e| {
        error!(error = %e.diagnostic(), "Cannot prepare directory authenticator");
        std::io::Error::other(e)
    })?;

    if config.ldap.bind_timeout_secs.is_none() {
        warn!("No directory bind timeout configured, a stalled directory blocks the login request");
    }
    info!(
        portal = %config.gateway.portal_host,
        apps = ?config.gateway.apps.iter().map(|a| a.host.as_str()).collect::<Vec<_>>(),
        directory = %authenticator.url(),
        external_port = config.gateway.external_port,
        "Gateway configured"
    );

    let listen = config.gateway.listen.clone();
    let gateway = web::Data::new(Gateway::new(config));
    let authenticator: Arc<dyn Authenticator> = Arc::new(authenticator);
    let authenticator = web::Data::from(authenticator);

    info!(listen = %listen, "Listening");
    HttpServer::new(move || build_app(gateway.clone(), authenticator.clone()))
        .bind(listen)?
        .client_request_timeout(Duration::from_secs(60))
        .run()
        .await
}
