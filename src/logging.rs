use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};

use rocket::{
    fairing::{Fairing, Info, Kind},
    http::StatusClass,
    Data, Orbit, Request, Response, Rocket,
};

/// Sequence number pairing a response log line with its request line.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct RequestId(usize);

impl RequestId {
    /// The next ID in sequence. Wraps on overflow.
    fn next() -> RequestId {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        RequestId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fairing that logs one line per request and one per response, with the
/// response line levelled by status class so client and server errors stand
/// out in the log.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let config = rocket.config();
        let protocol = if config.tls_enabled() { "https" } else { "http" };
        info!("Listening on {protocol}://{}:{}", config.address, config.port);
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let id = req.local_cache(RequestId::next);
        info!("->req{id} {} {}", req.method(), req.uri());
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        // Reads the cache entry the request hook created.
        let id = req.local_cache(RequestId::next);
        let code = res.status();
        let route = req
            .route()
            .map(|r| match &r.name {
                Some(name) => format!("{name} ({})", r.uri),
                None => r.uri.to_string(),
            })
            .unwrap_or_else(|| "no matching route".to_string());
        match code.class() {
            StatusClass::ServerError => error!("<-rsp{id} {code} {route}"),
            StatusClass::ClientError => warn!("<-rsp{id} {code} {route}"),
            _ => info!("<-rsp{id} {code} {route}"),
        }
    }
}
