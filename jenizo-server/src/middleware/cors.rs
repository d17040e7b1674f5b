use std::borrow::Cow;
use std::future::{ready, Ready};

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{
        header::{self, HeaderValue},
        Method,
    },
    Error, HttpResponse, ResponseError,
};
use futures::future::LocalBoxFuture;

use crate::{env, handlers::error::HttpErrorResponse};

pub const CORS_ALLOWED_METHODS_VALUE: &str = "GET, POST, OPTIONS";
pub const CORS_ALLOWED_HEADERS_VALUE: &str = "Content-Type, Authorization";
pub const CORS_REJECTED_MSG: &str = "Not allowed by CORS";

/// CORS middleware that validates origins and sets appropriate headers.
///
/// Requests without an `Origin` header (server-to-server, curl) pass through untouched. An
/// origin is allowed if it exactly matches a configured origin or if its host (scheme and
/// path removed) matches the host of one. Disallowed origins are answered with a 403 and
/// never reach the handler.
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self {
            allowed_origins: env::CONF.allowed_origins.clone(),
        }
    }
}

impl CorsMiddleware {
    pub fn with_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_origins: origins.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for CorsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = CorsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        let allowed_hosts = self
            .allowed_origins
            .iter()
            .map(|origin| origin_host(origin).to_owned())
            .collect();

        ready(Ok(CorsMiddlewareService {
            service,
            allowed_origins: self.allowed_origins.clone(),
            allowed_hosts,
        }))
    }
}

pub struct CorsMiddlewareService<S> {
    service: S,
    allowed_origins: Vec<String>,
    allowed_hosts: Vec<String>,
}

impl<S> CorsMiddlewareService<S> {
    fn is_allowed(&self, origin: &str) -> bool {
        if self.allowed_origins.iter().any(|o| o == origin) {
            return true;
        }

        let host = origin_host(origin);
        !host.is_empty() && self.allowed_hosts.iter().any(|h| h == host)
    }
}

impl<S, B> Service<ServiceRequest> for CorsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let origin = req.headers().get(header::ORIGIN).cloned();
        let is_preflight = req.method() == Method::OPTIONS;

        let allowed_origin = match origin {
            None => None,
            Some(origin) => {
                let origin_str = origin.to_str().unwrap_or_default();

                if !self.is_allowed(origin_str) {
                    log::warn!("Blocked request from disallowed origin: {origin_str}");

                    let res = HttpErrorResponse::OriginDisallowed(Cow::Borrowed(
                        CORS_REJECTED_MSG,
                    ))
                    .error_response();
                    let res = req.into_response(res).map_into_boxed_body();
                    return Box::pin(async move { Ok(res) });
                }

                Some(origin)
            }
        };

        if is_preflight {
            let mut res = HttpResponse::NoContent();

            res.insert_header((
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(CORS_ALLOWED_METHODS_VALUE),
            ));
            res.insert_header((
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(CORS_ALLOWED_HEADERS_VALUE),
            ));
            res.insert_header((
                header::ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from_static("86400"),
            ));

            if let Some(origin) = allowed_origin {
                res.insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, origin));
                res.insert_header((header::VARY, HeaderValue::from_static("Origin")));
            }

            let res = req.into_response(res.finish()).map_into_boxed_body();
            return Box::pin(async move { Ok(res) });
        }

        let http_req = req.request().clone();
        let req_fut = self.service.call(req);

        Box::pin(async move {
            // Errors from inner middleware (the limiter's 429) still need CORS headers
            let mut res = match req_fut.await {
                Ok(res) => res.map_into_boxed_body(),
                Err(e) => ServiceResponse::new(http_req, e.error_response()),
            };

            if let Some(origin) = allowed_origin {
                res.headers_mut()
                    .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
                res.headers_mut()
                    .insert(header::VARY, HeaderValue::from_static("Origin"));
            }

            Ok(res)
        })
    }
}

/// `https://app.example.com:8443/path` -> `app.example.com:8443`
fn origin_host(origin: &str) -> &str {
    let without_scheme = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
        .unwrap_or(origin);

    match without_scheme.find('/') {
        Some(pos) => &without_scheme[..pos],
        None => without_scheme,
    }
}
