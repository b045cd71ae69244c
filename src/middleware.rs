// SPDX-License-Identifier: Apache-2.0
use actix_web::{dev::{Service, ServiceRequest, ServiceResponse, Transform}, web, Error};
use actix_web::body::EitherBody;
use actix_web::http::uri::{PathAndQuery, Uri};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::task::{Context, Poll};
use tracing::{debug, warn, instrument};
use std::rc::Rc;

use crate::gate::{evaluate, GateRequest, Verdict};
use crate::gateway::Gateway;
use crate::host::{request_host, strip_port};

/// Runs the gate stages on every request before routing
pub struct GateMiddleware {
    gateway: web::Data<Gateway>,
}

impl GateMiddleware {
    pub fn new(gateway: web::Data<Gateway>) -> Self {
        GateMiddleware { gateway }
    }
}

impl<S, B> Transform<S, ServiceRequest> for GateMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = GateMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(GateMiddlewareService {
            service: Rc::new(service),
            gateway: self.gateway.clone(),
        })
    }
}

pub struct GateMiddlewareService<S> {
    service: Rc<S>,
    gateway: web::Data<Gateway>,
}

impl<S, B> Service<ServiceRequest> for GateMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    #[instrument(name = "gate_middleware", skip(self, req), fields(path = %req.path(), method = %req.method()))]
    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        let host = request_host(req.head()).map(strip_port).unwrap_or_default().to_owned();
        let path = req.path().to_owned();
        let query = req.query_string().to_owned();
        let logged_in = self.gateway.session.is_logged_in(req.request());
        let class = self.gateway.hosts.classify(&host);

        let mut gate_req = GateRequest::new(class, &host, &path, &query, logged_in);
        let verdict = evaluate(&mut gate_req, &self.gateway);
        let rewritten = gate_req.rewritten_path().map(str::to_owned);

        match verdict {
            Verdict::Continue => {
                debug!(host = %host, class = ?class, logged_in, "Gate allows request");
                if let Some(new_path) = rewritten {
                    rewrite_path(&mut req, &new_path);
                }
                let fut = service.call(req);
                Box::pin(async move {
                    let res = fut.await?;
                    Ok(res.map_into_left_body())
                })
            }
            Verdict::ShortCircuit(response) => {
                // Return early without reaching routing or the proxy
                let (request, _) = req.into_parts();
                Box::pin(async move {
                    Ok(ServiceResponse::new(request, response).map_into_right_body())
                })
            }
        }
    }
}

/// Replace the request path before routing, keeping the query string
fn rewrite_path(req: &mut ServiceRequest, new_path: &str) {
    let path_and_query = match req.uri().query() {
        Some(q) => format!("{}?{}", new_path, q),
        None => new_path.to_owned(),
    };
    let mut parts = req.uri().clone().into_parts();
    parts.path_and_query = match path_and_query.parse::<PathAndQuery>() {
        Ok(pq) => Some(pq),
        Err(e) => {
            warn!(error = %e, path = %new_path, "Cannot rewrite request path");
            return;
        }
    };
    match Uri::from_parts(parts) {
        Ok(uri) => {
            req.match_info_mut().get_mut().update(&uri);
            req.head_mut().uri = uri;
        }
        Err(e) => warn!(error = %e, path = %new_path, "Cannot rebuild request URI"),
    }
}
