// SPDX-License-Identifier: Apache-2.0
use actix_web::{
    web, HttpRequest, HttpResponse, Error,
    http::header::{self, HeaderMap},
};
use std::time::Duration;
use futures::TryStreamExt;
use tracing::{error, debug, instrument};

use crate::gateway::Gateway;
use crate::host::{request_host, strip_port};
use crate::routes::RouteEntry;

/// Request headers that only describe the client connection
fn is_hop_by_hop(name: &header::HeaderName) -> bool {
    *name == header::CONNECTION
        || *name == header::CONTENT_LENGTH
        || *name == header::TRANSFER_ENCODING
        || *name == header::TE
        || *name == header::TRAILER
        || *name == header::UPGRADE
        || *name == header::PROXY_AUTHORIZATION
        || name.as_str().eq_ignore_ascii_case("keep-alive")
        || name.as_str().eq_ignore_ascii_case("proxy-connection")
}

/// Whether the client declared a request body, whatever the method
fn has_body(headers: &HeaderMap) -> bool {
    if headers.contains_key(header::TRANSFER_ENCODING) {
        return true;
    }
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .is_some_and(|len| len > 0)
}

/// Default service: forward to the upstream mapped to the request host, 404 for unmapped hosts.
///
/// The gate has already run, so protected hosts only get here with a session.
pub async fn forward(req: HttpRequest, payload: web::Payload, gateway: web::Data<Gateway>) -> Result<HttpResponse, Error> {
    let host = request_host(req.head()).map(strip_port).unwrap_or_default();
    match gateway.routes.lookup(host) {
        Some(route) => {
            let timeout = Duration::from_secs(gateway.config.gateway.upstream_timeout_secs);
            proxy_request(&req, payload, route, timeout).await
        }
        None => {
            debug!(host = %host, path = %req.path(), "No route for host");
            Ok(HttpResponse::NotFound().finish())
        }
    }
}

/// Proxy a request to the route's upstream, streaming bodies in both directions
#[instrument(skip(req, payload, route), fields(method = %req.method(), path = %req.uri().path(), upstream = %route.upstream))]
pub async fn proxy_request(req: &HttpRequest, payload: web::Payload, route: &RouteEntry, timeout: Duration) -> Result<HttpResponse, Error> {
    let forwarded_url = route.upstream_url(req.uri().path(), req.uri().query());
    debug!(forwarded_url = %forwarded_url, "Proxying request");

    let connector = awc::Connector::new()
        .timeout(Duration::from_secs(10))
        .conn_keep_alive(Duration::from_secs(15))
        .disconnect_timeout(Duration::from_secs(2));

    let client = awc::ClientBuilder::new()
        .timeout(timeout)
        .connector(connector)
        .finish();

    let mut forwarded_req = client
        .request(req.method().clone(), forwarded_url)
        .no_decompress();

    // Everything except Host and hop-by-hop headers goes through, cookies included
    for (header_name, header_value) in req.headers().iter().filter(|(h, _)| **h != header::HOST && !is_hop_by_hop(h)) {
        forwarded_req = forwarded_req.append_header((header_name.clone(), header_value.clone()));
    }

    // Legacy backends validate Host, so they get their fixed token instead of the public name
    forwarded_req = forwarded_req.insert_header((header::HOST, route.host_header.as_str()));

    if let Some(original_host) = req.headers().get(header::HOST).cloned() {
        forwarded_req = forwarded_req.insert_header(("X-Forwarded-Host", original_host));
    }
    forwarded_req = forwarded_req.insert_header(("X-Forwarded-Proto", req.connection_info().scheme().to_string()));
    if let Some(peer) = req.peer_addr() {
        forwarded_req = forwarded_req.insert_header(("X-Forwarded-For", peer.ip().to_string()));
    }

    // Only attach a body stream when the client sent one, otherwise some upstreams
    // wait for a body that never arrives.
    let forwarded_req = if has_body(req.headers()) {
        forwarded_req.send_stream(payload)
    } else {
        forwarded_req.send()
    };

    let forwarded_res = forwarded_req.await.map_err(|e| {
        error!(error = %e, upstream = %route.upstream, "Forwarding error to upstream");
        actix_web::error::ErrorBadGateway(e)
    })?;

    debug!(status = %forwarded_res.status(), "Received response from upstream");

    let mut client_res = HttpResponse::build(forwarded_res.status());

    // append keeps repeated headers such as Set-Cookie
    for (header_name, header_value) in forwarded_res.headers().iter().filter(|(h, _)|
        *h != header::CONNECTION &&
        *h != header::CONTENT_LENGTH &&
        *h != header::TRANSFER_ENCODING
    ) {
        client_res.append_header((header_name.clone(), header_value.clone()));
    }

    let stream = forwarded_res.map_err(|e| {
        error!(error = %e, "Upstream body stream error");
        actix_web::error::ErrorBadGateway(e)
    });
    Ok(client_res.streaming(stream))
}
