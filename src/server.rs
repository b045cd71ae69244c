// SPDX-License-Identifier: Apache-2.0
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{web, App, Error};
use tracing_actix_web::TracingLogger;

use crate::directory::Authenticator;
use crate::gateway::Gateway;
use crate::middleware::GateMiddleware;
use crate::{portal, proxy};

/// Assemble the gateway application: request tracing, then the gate, then portal routes,
/// with everything else falling through to the proxy.
pub fn build_app(
    gateway: web::Data<Gateway>,
    authenticator: web::Data<dyn Authenticator>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    let routes_for = gateway.clone();
    App::new()
        .app_data(gateway.clone())
        .app_data(authenticator)
        .configure(|cfg| portal::configure(cfg, &routes_for))
        .default_service(web::to(proxy::forward))
        .wrap(GateMiddleware::new(gateway))
        .wrap(TracingLogger::default())
}
