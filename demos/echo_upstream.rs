// SPDX-License-Identifier: Apache-2.0
//! Stand-in for a legacy backend. It answers every path with the Host header it was
//! given, so the fixed host token the gateway sends can be checked by eye.
//!
//! cargo run --example echo_upstream -- 127.0.0.1:7860 app1
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer, Responder, http::header};

async fn echo(req: HttpRequest, expected_host: web::Data<String>) -> impl Responder {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    // Legacy apps refuse requests addressed to any other name
    if !host.eq_ignore_ascii_case(expected_host.as_str()) {
        return HttpResponse::BadRequest().body(format!("Bad Request - Invalid Hostname: {}", host));
    }

    let user = req
        .cookie("GatewaySession")
        .map(|c| c.value().to_string())
        .unwrap_or_default();

    HttpResponse::Ok().content_type("text/html; charset=utf-8").body(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>{host}</title></head>
<body>
    <h1>{host}</h1>
    <p>Path: {path}</p>
    <p>Session: {user}</p>
</body>
</html>
"#,
        host = host,
        path = req.uri(),
        user = user,
    ))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let mut args = std::env::args().skip(1);
    let listen = args.next().unwrap_or_else(|| "127.0.0.1:7860".to_string());
    let expected_host = args.next().unwrap_or_else(|| "app1".to_string());

    println!("Starting echo upstream on http://{} (Host: {})", listen, expected_host);

    let expected_host = web::Data::new(expected_host);
    HttpServer::new(move || {
        App::new()
            .app_data(expected_host.clone())
            .default_service(web::to(echo))
    })
    .bind(listen)?
    .workers(2)
    .run()
    .await
}
