// SPDX-License-Identifier: Apache-2.0
//! Per-request gate decisions.
//!
//! Each stage is a plain function over a [`GateRequest`]. Stages run in the order of [`STAGES`];
//! a stage may adjust the request path (seen by later stages and by routing) or short-circuit
//! with a response. There is no state carried between requests.
use std::borrow::Cow;

use actix_web::HttpResponse;
use actix_web::http::header;
use tracing::{debug, info};

use crate::gateway::Gateway;
use crate::host::HostClass;

/// The parts of a request the gate looks at
#[derive(Debug, Clone)]
pub struct GateRequest<'a> {
    pub class: HostClass,
    /// Host as the client sent it, without the port
    pub host: &'a str,
    pub path: Cow<'a, str>,
    pub query: &'a str,
    pub logged_in: bool,
    original_path: &'a str,
}

impl<'a> GateRequest<'a> {
    pub fn new(class: HostClass, host: &'a str, path: &'a str, query: &'a str, logged_in: bool) -> Self {
        Self {
            class,
            host,
            path: Cow::Borrowed(path),
            query,
            logged_in,
            original_path: path,
        }
    }

    /// The new path if a stage changed it
    pub fn rewritten_path(&self) -> Option<&str> {
        (self.path != self.original_path).then_some(self.path.as_ref())
    }
}

#[derive(Debug)]
pub enum Verdict {
    Continue,
    ShortCircuit(HttpResponse),
}

pub type Stage = fn(&mut GateRequest<'_>, &Gateway) -> Verdict;

/// Gate stages in execution order
pub const STAGES: [(&str, Stage); 2] = [
    ("portal_login_alias", portal_login_alias),
    ("session_gate", session_gate),
];

/// Run every stage until one short-circuits
pub fn evaluate(req: &mut GateRequest<'_>, gateway: &Gateway) -> Verdict {
    for (name, stage) in STAGES {
        if let Verdict::ShortCircuit(response) = stage(req, gateway) {
            debug!(stage = name, status = %response.status(), "Gate short-circuited request");
            return Verdict::ShortCircuit(response);
        }
    }
    Verdict::Continue
}

/// `/Login` is served as `/login` on the portal. Other hosts keep their own `/Login`.
pub fn portal_login_alias(req: &mut GateRequest<'_>, _gateway: &Gateway) -> Verdict {
    if req.class == HostClass::Portal && req.path == "/Login" {
        debug!("Rewriting /Login to /login on portal host");
        req.path = Cow::Borrowed("/login");
    }
    Verdict::Continue
}

/// Protected apps require a session; everything else passes.
pub fn session_gate(req: &mut GateRequest<'_>, gateway: &Gateway) -> Verdict {
    if req.class != HostClass::ProtectedApp || req.logged_in {
        return Verdict::Continue;
    }

    let location = login_redirect_url(gateway, req.host, &req.path, req.query);
    info!(host = %req.host, path = %req.path, "Unauthenticated request to protected app, redirecting to login");
    Verdict::ShortCircuit(
        HttpResponse::Found()
            .insert_header((header::LOCATION, location))
            .finish(),
    )
}

/// Absolute URL the client used, rebuilt with the externally published port
pub fn original_url(host: &str, port: u16, path: &str, query: &str) -> String {
    if query.is_empty() {
        format!("http://{}:{}{}", host, port, path)
    } else {
        format!("http://{}:{}{}?{}", host, port, path, query)
    }
}

/// Portal login URL carrying the original destination in `next`
pub fn login_redirect_url(gateway: &Gateway, host: &str, path: &str, query: &str) -> String {
    let return_to = original_url(host, gateway.external_port(), path, query);
    format!("{}?next={}", gateway.portal_url("/login"), urlencoding::encode(&return_to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    fn gateway() -> Gateway {
        let mut config = GatewayConfig::default();
        config.gateway.portal_host = "portal.example".to_string();
        config.gateway.apps[0].host = "app1.example".to_string();
        config.gateway.apps[1].host = "app2.example".to_string();
        config.ldap.host = "dc01.example".to_string();
        config.ldap.domain = "CORP".to_string();
        Gateway::new(config)
    }

    fn location(verdict: &Verdict) -> &str {
        match verdict {
            Verdict::ShortCircuit(resp) => resp.headers().get(header::LOCATION).unwrap().to_str().unwrap(),
            Verdict::Continue => panic!("expected a redirect"),
        }
    }

    #[test]
    fn anonymous_app_request_redirects_to_portal_login() {
        let gw = gateway();
        let mut req = GateRequest::new(HostClass::ProtectedApp, "app1.example", "/Default.aspx", "", false);
        let verdict = evaluate(&mut req, &gw);
        assert_eq!(
            location(&verdict),
            "http://portal.example:88/login?next=http%3A%2F%2Fapp1.example%3A88%2FDefault.aspx"
        );
        if let Verdict::ShortCircuit(resp) = verdict {
            assert_eq!(resp.status(), actix_web::http::StatusCode::FOUND);
        }
    }

    #[test]
    fn redirect_preserves_query_string() {
        let gw = gateway();
        let mut req = GateRequest::new(HostClass::ProtectedApp, "App2.Example", "/book", "day=mon&x=1", false);
        let verdict = evaluate(&mut req, &gw);
        let loc = location(&verdict);
        let next = loc.split_once("next=").unwrap().1;
        assert_eq!(
            urlencoding::decode(next).unwrap(),
            "http://App2.Example:88/book?day=mon&x=1"
        );
    }

    #[test]
    fn logged_in_app_request_continues() {
        let gw = gateway();
        let mut req = GateRequest::new(HostClass::ProtectedApp, "app1.example", "/", "", true);
        assert!(matches!(evaluate(&mut req, &gw), Verdict::Continue));
    }

    #[test]
    fn portal_and_unknown_hosts_are_never_gated() {
        let gw = gateway();
        let mut portal = GateRequest::new(HostClass::Portal, "portal.example", "/", "", false);
        assert!(matches!(evaluate(&mut portal, &gw), Verdict::Continue));
        let mut unknown = GateRequest::new(HostClass::Unrecognized, "elsewhere", "/secret", "", false);
        assert!(matches!(evaluate(&mut unknown, &gw), Verdict::Continue));
        assert!(unknown.rewritten_path().is_none());
    }

    #[test]
    fn login_alias_only_applies_to_portal() {
        let gw = gateway();
        let mut portal = GateRequest::new(HostClass::Portal, "portal.example", "/Login", "", false);
        evaluate(&mut portal, &gw);
        assert_eq!(portal.rewritten_path(), Some("/login"));

        let mut app = GateRequest::new(HostClass::ProtectedApp, "app1.example", "/Login", "", true);
        evaluate(&mut app, &gw);
        assert!(app.rewritten_path().is_none());

        let mut exact = GateRequest::new(HostClass::Portal, "portal.example", "/LOGIN", "", false);
        evaluate(&mut exact, &gw);
        assert!(exact.rewritten_path().is_none());
    }

    #[test]
    fn anonymous_app_login_path_redirect_keeps_original_casing() {
        let gw = gateway();
        let mut req = GateRequest::new(HostClass::ProtectedApp, "app1.example", "/Login", "", false);
        let verdict = evaluate(&mut req, &gw);
        assert!(location(&verdict).ends_with("app1.example%3A88%2FLogin"));
    }
}
