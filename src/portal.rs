// SPDX-License-Identifier: Apache-2.0
use actix_files::Files;
use actix_web::http::{header, StatusCode};
use actix_web::{guard, web, Error, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::directory::{bind_identity, Authenticator};
use crate::gateway::Gateway;
use crate::host::request_host;
use crate::pages::{render, AppLink, ChooserPage, LoginFailedPage, LoginPage};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginQuery {
    next: String,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: String,
}

/// Register the portal routes, reachable only through the portal host
pub fn configure(cfg: &mut web::ServiceConfig, gateway: &Gateway) {
    let hosts = gateway.hosts.clone();
    let mut scope = web::scope("")
        .guard(guard::fn_guard(move |ctx| {
            request_host(ctx.head()).is_some_and(|h| hosts.is_portal(h))
        }))
        .route("/", web::get().to(index))
        .service(
            web::resource("/login")
                .route(web::get().to(login_form))
                .route(web::post().to(login_submit)),
        )
        .route("/logout", web::get().to(logout));

    let static_dir = &gateway.config.gateway.static_dir;
    if static_dir.is_dir() {
        scope = scope.service(Files::new("/assets", static_dir));
    }
    cfg.service(scope);
}

/// Application chooser
pub async fn index(gateway: web::Data<Gateway>) -> Result<HttpResponse, Error> {
    let settings = &gateway.config.gateway;
    let apps = settings
        .apps
        .iter()
        .map(|app| AppLink {
            title: &app.title,
            href: format!("http://{}:{}{}", app.host.trim(), settings.external_port, app.landing_path),
        })
        .collect();

    render(
        &ChooserPage {
            title: &settings.portal_title,
            apps,
        },
        StatusCode::OK,
    )
}

/// Login form, or straight back to the chooser when a session already exists
pub async fn login_form(req: HttpRequest, gateway: web::Data<Gateway>) -> Result<HttpResponse, Error> {
    if gateway.session.is_logged_in(&req) {
        return Ok(HttpResponse::Found()
            .insert_header((header::LOCATION, gateway.portal_url("/")))
            .finish());
    }

    // A malformed query string only loses the return destination
    let next = web::Query::<LoginQuery>::from_query(req.query_string())
        .map(|q| q.into_inner().next)
        .unwrap_or_default();

    render(
        &LoginPage {
            title: &gateway.config.gateway.portal_title,
            domain: &gateway.config.ldap.domain,
            next: &next,
        },
        StatusCode::OK,
    )
}

/// One bind attempt per submission; the session cookie is issued only on success
#[instrument(skip(form, gateway, authenticator), fields(username = %form.username.trim()))]
pub async fn login_submit(
    form: web::Form<LoginForm>,
    gateway: web::Data<Gateway>,
    authenticator: web::Data<dyn Authenticator>,
) -> Result<HttpResponse, Error> {
    let form = form.into_inner();
    let identity = bind_identity(form.username.trim(), gateway.config.ldap.domain.trim());

    if let Err(e) = authenticator.authenticate(&identity, &form.password).await {
        warn!(identity = %identity, error = %e, "Directory bind failed");
        let diagnostic = e.diagnostic();
        return render(
            &LoginFailedPage {
                identity: &identity,
                diagnostic: &diagnostic,
            },
            StatusCode::UNAUTHORIZED,
        );
    }

    info!(identity = %identity, "Login succeeded");
    // `next` is followed as given, including destinations outside the gateway
    let location = if form.next.trim().is_empty() {
        gateway.portal_url("/")
    } else {
        form.next
    };

    let mut response = HttpResponse::Found();
    gateway.session.issue(&mut response, &identity);
    Ok(response.insert_header((header::LOCATION, location)).finish())
}

/// Clear the session cookie; harmless without a session
pub async fn logout(gateway: web::Data<Gateway>) -> HttpResponse {
    let mut response = HttpResponse::Found();
    gateway.session.revoke(&mut response);
    response.insert_header((header::LOCATION, "/login")).finish()
}
