// SPDX-License-Identifier: Apache-2.0
use actix_web::cookie::{Cookie, SameSite};
use actix_web::{HttpRequest, HttpResponseBuilder};
use tracing::debug;

use crate::config::GatewayConfig;

/// Reads, issues and clears the gateway session cookie.
///
/// The cookie value is the bind identity that authenticated. It is neither signed nor encrypted,
/// and it is never checked against the directory again: a non-blank value is the whole session.
#[derive(Debug, Clone)]
pub struct SessionCodec {
    name: String,
    domain: Option<String>,
}

impl SessionCodec {
    pub fn new(name: impl Into<String>, domain: Option<String>) -> Self {
        Self {
            name: name.into(),
            domain,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.gateway.cookie_name.clone(),
            config.gateway.cookie_domain.clone(),
        )
    }

    /// The credential carried by the request, if any
    pub fn credential(&self, req: &HttpRequest) -> Option<String> {
        req.cookie(&self.name).map(|c| c.value().to_string())
    }

    pub fn is_logged_in(&self, req: &HttpRequest) -> bool {
        has_session(self.credential(req).as_deref())
    }

    /// Session cookie for a successful bind. Not marked secure so it survives the plaintext listener.
    pub fn session_cookie(&self, bind_identity: &str) -> Cookie<'static> {
        let mut builder = Cookie::build(self.name.clone(), bind_identity.to_string())
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(false);
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        builder.finish()
    }

    /// Expired, empty cookie for the same name, domain and path
    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut builder = Cookie::build(self.name.clone(), "").path("/");
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        let mut cookie = builder.finish();
        cookie.make_removal();
        cookie
    }

    pub fn issue(&self, response: &mut HttpResponseBuilder, bind_identity: &str) {
        debug!(cookie = %self.name, "Issuing session cookie");
        response.cookie(self.session_cookie(bind_identity));
    }

    pub fn revoke(&self, response: &mut HttpResponseBuilder) {
        debug!(cookie = %self.name, "Revoking session cookie");
        response.cookie(self.removal_cookie());
    }
}

/// A session is present iff the cookie value is non-blank
pub fn has_session(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::HttpResponse;
    use actix_web::test::TestRequest;

    fn codec() -> SessionCodec {
        SessionCodec::new("GatewaySession", Some("example.com".to_string()))
    }

    #[test]
    fn blank_values_are_not_sessions() {
        assert!(!has_session(None));
        assert!(!has_session(Some("")));
        assert!(!has_session(Some("   ")));
        assert!(has_session(Some("CORP\\alice")));
    }

    #[test]
    fn reads_session_from_request_cookie() {
        let codec = codec();
        let req = TestRequest::default()
            .cookie(Cookie::new("GatewaySession", "alice@example"))
            .to_http_request();
        assert!(codec.is_logged_in(&req));
        assert_eq!(codec.credential(&req).as_deref(), Some("alice@example"));

        let other = TestRequest::default()
            .cookie(Cookie::new("SomethingElse", "alice"))
            .to_http_request();
        assert!(!codec.is_logged_in(&other));
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = codec().session_cookie("CORP\\alice");
        assert_eq!(cookie.name(), "GatewaySession");
        assert_eq!(cookie.value(), "CORP\\alice");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_ne!(cookie.secure(), Some(true));
        assert!(cookie.max_age().is_none());
        assert!(cookie.expires().is_none());
    }

    #[test]
    fn host_only_cookie_without_domain() {
        let cookie = SessionCodec::new("GatewaySession", None).session_cookie("alice");
        assert!(cookie.domain().is_none());
    }

    #[test]
    fn revoke_expires_cookie_for_same_scope() {
        let codec = codec();
        let mut builder = HttpResponse::Found();
        codec.revoke(&mut builder);
        let response = builder.finish();
        let cookie = response.cookies().next().unwrap();
        assert_eq!(cookie.name(), "GatewaySession");
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.max_age(), Some(actix_web::cookie::time::Duration::ZERO));
    }
}
