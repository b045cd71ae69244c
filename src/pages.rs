// SPDX-License-Identifier: Apache-2.0
//! Page data for the portal templates. Values are HTML-escaped by the templates.
use actix_web::http::StatusCode;
use actix_web::{error, Error, HttpResponse};
use askama::Template;
use tracing::error;

pub struct AppLink<'a> {
    pub title: &'a str,
    pub href: String,
}

#[derive(Template)]
#[template(path = "chooser.html")]
pub struct ChooserPage<'a> {
    pub title: &'a str,
    pub apps: Vec<AppLink<'a>>,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginPage<'a> {
    pub title: &'a str,
    pub domain: &'a str,
    /// Destination after a successful login, carried as a hidden field
    pub next: &'a str,
}

#[derive(Template)]
#[template(path = "login_failed.html")]
pub struct LoginFailedPage<'a> {
    pub identity: &'a str,
    pub diagnostic: &'a str,
}

/// Render a page into an HTML response with the given status
pub fn render<T: Template>(page: &T, status: StatusCode) -> Result<HttpResponse, Error> {
    let body = page.render().map_err(|e| {
        error!(error = %e, "Failed to render page");
        error::ErrorInternalServerError(e)
    })?;
    Ok(HttpResponse::build(status)
        .content_type("text/html; charset=utf-8")
        .body(body))
}
