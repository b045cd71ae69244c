// SPDX-License-Identifier: Apache-2.0
use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::cookie::Cookie;
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App, HttpRequest, HttpResponse, HttpServer};
use futures::future::LocalBoxFuture;

use portalgate::config::GatewayConfig;
use portalgate::directory::{AuthError, Authenticator};
use portalgate::gateway::Gateway;
use portalgate::server::build_app;

struct RejectAll;

impl Authenticator for RejectAll {
    fn authenticate<'a>(&'a self, _: &'a str, _: &'a str) -> LocalBoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async { Err(AuthError::EmptySecret) })
    }
}

/// Upstream that reports what it received
async fn echo(req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    let report = format!(
        "host={}\nuri={}\ncookie={}\nforwarded-host={}\nbody={}",
        header("host"),
        req.uri(),
        header("cookie"),
        header("x-forwarded-host"),
        String::from_utf8_lossy(&body),
    );
    HttpResponse::Ok()
        .append_header((header::SET_COOKIE, "a=1; Path=/"))
        .append_header((header::SET_COOKIE, "b=2; Path=/"))
        .body(report)
}

fn start_upstream() -> SocketAddr {
    let server = HttpServer::new(|| App::new().default_service(web::to(echo)))
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .unwrap();
    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    addr
}

fn gateway(upstream: SocketAddr) -> web::Data<Gateway> {
    let config = GatewayConfig::from_toml_str(&format!(
        r#"
        [gateway]
        portal_host = "portal.corp.example"
        cookie_domain = "corp.example"

        [[gateway.apps]]
        name = "app1"
        host = "app1.corp.example"
        upstream = "http://{upstream}/"
        host_header = "legacy-app1"

        [[gateway.apps]]
        name = "app2"
        host = "app2.corp.example"
        upstream = "http://127.0.0.1:9/"

        [ldap]
        host = "dc01.example"
        domain = "CORP"
        "#
    ))
    .unwrap();
    config.validate().unwrap();
    web::Data::new(Gateway::new(config))
}

fn authenticator() -> web::Data<dyn Authenticator> {
    let auth: Arc<dyn Authenticator> = Arc::new(RejectAll);
    web::Data::from(auth)
}

async fn body_text<B: actix_web::body::MessageBody>(resp: actix_web::dev::ServiceResponse<B>) -> String {
    String::from_utf8(test::read_body(resp).await.to_vec()).unwrap()
}

#[actix_web::test]
async fn any_session_value_is_forwarded_with_fixed_host_header() {
    let upstream = start_upstream();
    let app = test::init_service(build_app(gateway(upstream), authenticator())).await;

    let req = test::TestRequest::get()
        .uri("/Default.aspx?week=3")
        .insert_header((header::HOST, "app1.corp.example:88"))
        .cookie(Cookie::new("GatewaySession", "not-a-real-identity"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_text(resp).await;
    assert!(body.contains("host=legacy-app1\n"), "{}", body);
    assert!(body.contains("uri=/Default.aspx?week=3\n"), "{}", body);
    assert!(body.contains("GatewaySession=not-a-real-identity"), "{}", body);
    assert!(body.contains("forwarded-host=app1.corp.example:88\n"), "{}", body);
}

#[actix_web::test]
async fn app_login_path_reaches_upstream_untouched() {
    let upstream = start_upstream();
    let app = test::init_service(build_app(gateway(upstream), authenticator())).await;

    let req = test::TestRequest::get()
        .uri("/Login")
        .insert_header((header::HOST, "app1.corp.example"))
        .cookie(Cookie::new("GatewaySession", "CORP\\alice"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("uri=/Login\n"));
}

#[actix_web::test]
async fn request_body_is_streamed_upstream() {
    let upstream = start_upstream();
    let app = test::init_service(build_app(gateway(upstream), authenticator())).await;

    let req = test::TestRequest::post()
        .uri("/api/book")
        .insert_header((header::HOST, "app1.corp.example"))
        .insert_header((header::CONTENT_TYPE, "text/plain"))
        .cookie(Cookie::new("GatewaySession", "CORP\\alice"))
        .set_payload("seat=12")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.ends_with("body=seat=12"));
}

#[actix_web::test]
async fn body_is_streamed_for_any_method() {
    let upstream = start_upstream();
    let app = test::init_service(build_app(gateway(upstream), authenticator())).await;

    let req = test::TestRequest::delete()
        .uri("/api/book/7")
        .insert_header((header::HOST, "app1.corp.example"))
        .insert_header((header::CONTENT_TYPE, "application/x-www-form-urlencoded"))
        .cookie(Cookie::new("GatewaySession", "CORP\\alice"))
        .set_payload("reason=cancelled")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains("uri=/api/book/7\n"), "{}", body);
    assert!(body.ends_with("body=reason=cancelled"), "{}", body);
}

#[actix_web::test]
async fn repeated_upstream_headers_are_kept() {
    let upstream = start_upstream();
    let app = test::init_service(build_app(gateway(upstream), authenticator())).await;

    let req = test::TestRequest::get()
        .uri("/")
        .insert_header((header::HOST, "app1.corp.example"))
        .cookie(Cookie::new("GatewaySession", "CORP\\alice"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let set_cookies: Vec<_> = resp.headers().get_all(header::SET_COOKIE).collect();
    assert_eq!(set_cookies.len(), 2);
}

#[actix_web::test]
async fn unreachable_upstream_is_bad_gateway() {
    let upstream = start_upstream();
    let app = test::init_service(build_app(gateway(upstream), authenticator())).await;

    let req = test::TestRequest::get()
        .uri("/")
        .insert_header((header::HOST, "app2.corp.example"))
        .cookie(Cookie::new("GatewaySession", "CORP\\alice"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}
