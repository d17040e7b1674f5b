use std::{
    borrow::Cow,
    collections::HashMap,
    future::{ready, Ready},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Mutex,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use futures::future::LocalBoxFuture;
use tokio::sync::RwLock;

use crate::handlers::error::{HttpErrorResponse, TOO_MANY_REQUESTS_MSG};

#[derive(Debug, Default)]
struct LimiterEntry {
    count: u64,
    first_access_usecs: u64,
}

struct LimiterTable {
    map: HashMap<IpAddr, Mutex<LimiterEntry>>,
    last_clear: SystemTime,
}

impl LimiterTable {
    fn new() -> Self {
        LimiterTable {
            map: HashMap::new(),
            last_clear: SystemTime::now(),
        }
    }
}

/// Fixed-window request limiter keyed by client IP. Clones share the same counters, so one
/// `Limiter` wrapped around several routes limits them together.
#[derive(Clone)]
pub struct Limiter {
    max_per_period: u64,
    period: Duration,
    clear_frequency: Duration,
    trust_proxy: bool,
    limiter_tables: &'static [RwLock<LimiterTable>; 16],
}

impl Limiter {
    /// Should be created on a single thread. Panics if period is greater than clear frequency.
    ///
    /// With `trust_proxy`, the client IP is the address the proxy appended to
    /// `X-Forwarded-For` instead of the socket's peer address.
    pub fn new(
        max_per_period: u64,
        period: Duration,
        clear_frequency: Duration,
        trust_proxy: bool,
    ) -> Self {
        if period > clear_frequency {
            panic!("Period cannot be greater than clear frequency");
        }

        let limiter_tables = Box::leak(Box::new(std::array::from_fn(|_| {
            RwLock::new(LimiterTable::new())
        })));

        Limiter {
            max_per_period,
            period,
            clear_frequency,
            trust_proxy,
            limiter_tables,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Limiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = LimiterMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LimiterMiddleware {
            service,

            max_per_period: self.max_per_period,
            period: self.period,
            clear_frequency: self.clear_frequency,
            trust_proxy: self.trust_proxy,

            limiter_tables: self.limiter_tables,
        }))
    }
}

pub struct LimiterMiddleware<S> {
    service: S,

    max_per_period: u64,
    period: Duration,
    clear_frequency: Duration,
    trust_proxy: bool,

    limiter_tables: &'static [RwLock<LimiterTable>; 16],
}

impl<S, B> Service<ServiceRequest> for LimiterMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let ip = client_ip(&req, self.trust_proxy);

        let final_octet = match ip {
            IpAddr::V4(ip) => ip.octets()[3],
            IpAddr::V6(ip) => ip.octets()[15],
        };

        let table = &self.limiter_tables[(final_octet & 0x0F) as usize];

        let req_fut = self.service.call(req);

        let max_per_period = self.max_per_period;
        let period = self.period;
        let clear_frequency = self.clear_frequency;

        Box::pin(async move {
            let now = SystemTime::now();
            let timestamp_usecs: u64 = now
                .duration_since(UNIX_EPOCH)
                .map(|t| t.as_micros().try_into().unwrap_or(u64::MAX))
                .unwrap_or_default();

            let found_ip = {
                // The read lock is scoped in this block so it is dropped before the write
                // lock is acquired
                let table = table.read().await;
                let entry = table.map.get(&ip);

                if let Some(entry) = entry {
                    let mut entry = entry.lock().unwrap_or_else(|e| e.into_inner());
                    let first_access = UNIX_EPOCH + Duration::from_micros(entry.first_access_usecs);

                    if first_access + period < now {
                        entry.first_access_usecs = timestamp_usecs;
                        entry.count = 1;
                    } else {
                        if entry.count >= max_per_period {
                            log::warn!("Rate limit exceeded for {ip}");
                            return Err(HttpErrorResponse::TooManyRequests(Cow::Borrowed(
                                TOO_MANY_REQUESTS_MSG,
                            ))
                            .into());
                        }

                        entry.count += 1;
                    }

                    true
                } else {
                    false
                }
            };

            if !found_ip {
                let mut table = table.write().await;

                if now > table.last_clear + clear_frequency {
                    // Clear the table every so often to prevent it from growing too large
                    table.map.clear();
                    table.map.shrink_to_fit();
                    table.last_clear = SystemTime::now();
                }

                table
                    .map
                    .entry(ip)
                    .and_modify(|entry| {
                        // Was added by another thread before we acquired the lock; just
                        // increment the count
                        entry.get_mut().unwrap_or_else(|e| e.into_inner()).count += 1;
                    })
                    .or_insert_with(|| {
                        Mutex::new(LimiterEntry {
                            first_access_usecs: timestamp_usecs,
                            count: 1,
                        })
                    });
            }

            req_fut.await
        })
    }
}

fn client_ip(req: &ServiceRequest, trust_proxy: bool) -> IpAddr {
    #[cfg(test)]
    if let Some(test_ip) = req
        .headers()
        .get("test-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.parse::<IpAddr>().ok())
    {
        return test_ip;
    }

    if trust_proxy {
        if let Some(ip) = forwarded_by_last_hop(req) {
            return ip;
        }
    }

    req.peer_addr()
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// The rightmost `X-Forwarded-For` entry, which is the one appended by the single trusted
/// proxy in front of the server. Entries to its left are written by the client.
fn forwarded_by_last_hop(req: &ServiceRequest) -> Option<IpAddr> {
    req.headers()
        .get_all("x-forwarded-for")
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(','))
        .last()
        .and_then(parse_ip)
}

/// Accepts a bare IP or an IP with a port, e.g. `203.0.113.7`, `[2001:db8::1]:443`.
fn parse_ip(addr: &str) -> Option<IpAddr> {
    let addr = addr.trim();

    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        return Some(socket_addr.ip());
    }

    addr.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App, HttpResponse};
    use tokio::time::sleep;

    #[actix_web::test]
    async fn test_limiter() {
        let limiter = Limiter::new(
            2,
            Duration::from_millis(5),
            Duration::from_millis(8),
            false,
        );

        let app =
            test::init_service(App::new().wrap(limiter).service(
                web::resource("/").to(|| async { HttpResponse::Ok().body("Hello world") }),
            ))
            .await;

        let req = test::TestRequest::default().to_request();
        let res = app.call(req).await;
        assert!(res.is_ok());

        let req = test::TestRequest::default().to_request();
        let res = app.call(req).await;
        assert!(res.is_ok());

        let req = test::TestRequest::default().to_request();
        let res = app.call(req).await;
        assert!(res.is_err());

        // Other IPs should still be able to make requests
        let req = test::TestRequest::default()
            .append_header(("test-ip", "192.167.0.5"))
            .to_request();
        let res = app.call(req).await;
        assert!(res.is_ok());

        sleep(Duration::from_millis(6)).await;

        // Period has expired, so we should be able to make another request
        let req = test::TestRequest::default().to_request();
        let res = app.call(req).await;
        assert!(res.is_ok());

        let req = test::TestRequest::default().to_request();
        let res = app.call(req).await;
        assert!(res.is_ok());

        let req = test::TestRequest::default().to_request();
        let res = app.call(req).await;
        assert!(res.is_err());
    }

    #[actix_web::test]
    async fn test_limited_response_is_json_429() {
        let limiter = Limiter::new(
            1,
            Duration::from_secs(60),
            Duration::from_secs(3600),
            false,
        );

        let app = test::init_service(
            App::new()
                .wrap(limiter)
                .route("/", web::post().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let req = test::TestRequest::post().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // Blocked requests come back as an error response rather than an Ok response
        let req = test::TestRequest::post().uri("/").to_request();
        let err = app.call(req).await.unwrap_err();
        let resp = err.error_response();

        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], TOO_MANY_REQUESTS_MSG);
    }

    #[actix_web::test]
    async fn test_forwarded_ip_only_used_when_trusted() {
        for trust_proxy in [true, false] {
            let limiter = Limiter::new(
                1,
                Duration::from_secs(60),
                Duration::from_secs(3600),
                trust_proxy,
            );

            let app = test::init_service(
                App::new()
                    .wrap(limiter)
                    .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
            )
            .await;

            let proxy: SocketAddr = "10.0.0.1:443".parse().unwrap();

            let req = test::TestRequest::default()
                .peer_addr(proxy)
                .append_header(("X-Forwarded-For", "203.0.113.7"))
                .to_request();
            assert!(app.call(req).await.is_ok());

            // A different client behind the same proxy
            let req = test::TestRequest::default()
                .peer_addr(proxy)
                .append_header(("X-Forwarded-For", "203.0.113.8"))
                .to_request();
            assert_eq!(app.call(req).await.is_ok(), trust_proxy);
        }
    }

    #[actix_web::test]
    async fn test_client_supplied_forwarded_entries_ignored() {
        let limiter = Limiter::new(
            2,
            Duration::from_secs(60),
            Duration::from_secs(3600),
            true,
        );

        let app = test::init_service(
            App::new()
                .wrap(limiter)
                .route("/", web::post().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let proxy: SocketAddr = "10.0.0.1:443".parse().unwrap();

        // The client rotates the leftmost entries; the proxy always appends the same address
        for i in 0..3 {
            let req = test::TestRequest::post()
                .uri("/")
                .peer_addr(proxy)
                .append_header(("X-Forwarded-For", format!("10.0.0.{i}, 198.51.100.9")))
                .to_request();
            assert_eq!(app.call(req).await.is_ok(), i < 2, "request {i}");
        }

        // Without a forwarded header the peer address is used
        let req = test::TestRequest::post()
            .uri("/")
            .peer_addr(proxy)
            .to_request();
        assert!(app.call(req).await.is_ok());
    }

    #[test]
    fn test_parse_ip() {
        assert_eq!(parse_ip("203.0.113.7"), Some("203.0.113.7".parse().unwrap()));
        assert_eq!(parse_ip("203.0.113.7:5000"), Some("203.0.113.7".parse().unwrap()));
        assert_eq!(parse_ip("[2001:db8::1]:443"), Some("2001:db8::1".parse().unwrap()));
        assert_eq!(parse_ip("2001:db8::1"), Some("2001:db8::1".parse().unwrap()));
        assert_eq!(parse_ip("unknown"), None);
    }
}
