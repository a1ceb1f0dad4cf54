//! ==============================================================================
//! http.rs - local alert / dashboard endpoint
//! ==============================================================================
//!
//! purpose:
//!     the control surface the camera service and humans talk to.
//!
//!     POST /alert      forward {"message": ...} over the radio and to telegram
//!     GET  /dashboard  html page with the latest alert and sensor reading
//!     anything else    404
//!
//! model:
//!     the gateway loop calls `try_accept` once per tick. at most one
//!     connection is accepted, exactly one request is read from it, answered,
//!     and the connection is closed. there is no keep-alive.
//!
//!     a request is read into a buffer of `max_request_bytes`. reading stops
//!     once the headers and the declared body are in, when the buffer is full,
//!     or when `request_timeout_ms` runs out. whatever does not fit is dropped,
//!     so an oversized alert usually ends as a 400.
//!
//! ==============================================================================

use crate::config::HttpConfig;
use crate::dashboard::render_dashboard;
use crate::domain::DashboardSnapshot;
use crate::error::{GatewayError, Result};
use crate::notifier::Notifier;
use crate::radio::RadioLink;

use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// message used when POST /alert omits it
pub const DEFAULT_ALERT_MESSAGE: &str = "DANGER";
/// prefix for alerts forwarded from http to telegram
pub const HTTP_ALERT_PREFIX: &str = "📢 HTTP Alert: ";

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// The only statuses the endpoint ever produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
        }
    }
}

/// An http response, always sent with `Connection: close`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub content_type: Option<&'static str>,
    pub body: String,
}

impl Response {
    fn text(status: Status, body: &str) -> Self {
        Self { status, content_type: Some("text/plain"), body: body.to_string() }
    }

    fn html(body: String) -> Self {
        Self { status: Status::Ok, content_type: Some("text/html; charset=utf-8"), body }
    }

    fn not_found() -> Self {
        Self { status: Status::NotFound, content_type: None, body: String::new() }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status.code(), self.status.reason());
        if let Some(content_type) = self.content_type {
            out.push_str(&format!("Content-Type: {}\r\n", content_type));
        }
        out.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        out.push_str("Connection: close\r\n\r\n");
        out.push_str(&self.body);
        out.into_bytes()
    }
}

/// A request as read from one connection buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundHttpRequest {
    pub method: String,
    pub path: String,
    /// bytes after the blank line, `None` if the header terminator never arrived
    pub body: Option<Vec<u8>>,
}

impl InboundHttpRequest {
    /// parse the request line and split off the body
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let line_end = find(raw, b"\r\n").unwrap_or(raw.len());
        let line = std::str::from_utf8(&raw[..line_end])
            .map_err(|_| GatewayError::MalformedRequest("request line is not utf-8".to_string()))?;

        let mut parts = line.split_whitespace();
        let (method, target) = match (parts.next(), parts.next()) {
            (Some(m), Some(t)) => (m, t),
            _ => return Err(GatewayError::MalformedRequest(format!("bad request line {:?}", line))),
        };
        let path = target.split('?').next().unwrap_or(target);

        let body = find(raw, HEADER_TERMINATOR).map(|idx| {
            let start = idx + HEADER_TERMINATOR.len();
            let mut body = &raw[start..];
            if let Some(len) = content_length(&raw[..idx]) {
                body = &body[..len.min(body.len())];
            }
            body.to_vec()
        });

        Ok(Self { method: method.to_string(), path: path.to_string(), body })
    }
}

#[derive(Deserialize)]
struct AlertBody {
    #[serde(default = "default_message")]
    message: String,
}

fn default_message() -> String {
    DEFAULT_ALERT_MESSAGE.to_string()
}

/// extract the trimmed alert message from a POST /alert body
pub fn parse_alert_body(body: Option<&[u8]>) -> Result<String> {
    let body = body.ok_or_else(|| GatewayError::InvalidAlertBody("missing body".to_string()))?;
    let alert: AlertBody =
        serde_json::from_slice(body).map_err(|e| GatewayError::InvalidAlertBody(e.to_string()))?;
    Ok(alert.message.trim().to_string())
}

/// Which route a request took, for the tick report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// POST /alert; `forwarded` is false for a blank message
    Alert { forwarded: bool },
    Dashboard,
    NotFound,
}

/// Result of one handled connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOutcome {
    pub peer: SocketAddr,
    pub route: Route,
    pub status: Status,
}

// ==============================================================================
// server
// ==============================================================================

pub struct AlertHttpServer {
    listener: TcpListener,
    max_request_bytes: usize,
    request_timeout: Duration,
}

impl AlertHttpServer {
    pub async fn bind(config: &HttpConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind).await?;
        info!(addr = %listener.local_addr()?, "http server listening");
        Ok(Self {
            listener,
            max_request_bytes: config.max_request_bytes,
            request_timeout: config.request_timeout(),
        })
    }

    #[cfg(test)]
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// wait up to `timeout` for one client
    pub async fn try_accept(&self, timeout: Duration) -> Result<Option<(TcpStream, SocketAddr)>> {
        match tokio::time::timeout(timeout, self.listener.accept()).await {
            Ok(Ok(conn)) => Ok(Some(conn)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(None),
        }
    }

    /// read, route and answer exactly one request, then close the connection
    pub async fn handle<R, N>(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        snapshot: &DashboardSnapshot,
        radio: &mut R,
        notifier: &N,
    ) -> Result<HttpOutcome>
    where
        R: RadioLink + ?Sized,
        N: Notifier + ?Sized,
    {
        let raw = self.read_request(&mut stream).await?;
        debug!(%peer, bytes = raw.len(), "http request");

        let (route, response) = match InboundHttpRequest::parse(&raw) {
            Ok(request) => route(request, snapshot, radio, notifier).await,
            Err(e) => {
                debug!(%peer, error = %e, "unroutable request");
                (Route::NotFound, Response::not_found())
            }
        };

        stream.write_all(&response.to_bytes()).await?;
        if let Err(e) = stream.shutdown().await {
            debug!(%peer, error = %e, "http shutdown");
        }

        Ok(HttpOutcome { peer, route, status: response.status })
    }

    async fn read_request(&self, stream: &mut TcpStream) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.max_request_bytes];
        let mut filled = 0usize;

        let fill = fill_request(stream, &mut buf, &mut filled);
        let read = tokio::time::timeout(self.request_timeout, fill).await;
        match read {
            Ok(result) => result?,
            Err(_) => debug!(bytes = filled, "request read timed out, using partial request"),
        }

        if filled == buf.len() {
            debug!(limit = buf.len(), "request filled the buffer, trailing bytes dropped");
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

async fn fill_request(
    stream: &mut TcpStream,
    buf: &mut [u8],
    filled: &mut usize,
) -> std::io::Result<()> {
    while *filled < buf.len() {
        let n = stream.read(&mut buf[*filled..]).await?;
        if n == 0 {
            break;
        }
        *filled += n;
        if request_complete(&buf[..*filled]) {
            break;
        }
    }
    Ok(())
}

async fn route<R, N>(
    request: InboundHttpRequest,
    snapshot: &DashboardSnapshot,
    radio: &mut R,
    notifier: &N,
) -> (Route, Response)
where
    R: RadioLink + ?Sized,
    N: Notifier + ?Sized,
{
    match (request.method.as_str(), request.path.as_str()) {
        ("POST", "/alert") => match handle_alert(request.body.as_deref(), radio, notifier).await {
            Ok(forwarded) => (Route::Alert { forwarded }, Response::text(Status::Ok, "OK")),
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "alert handling error");
                (Route::Alert { forwarded: false }, Response::text(Status::BadRequest, "Error"))
            }
        },
        ("GET", "/dashboard") => (Route::Dashboard, Response::html(render_dashboard(snapshot))),
        _ => (Route::NotFound, Response::not_found()),
    }
}

/// returns whether the message went out over the radio
async fn handle_alert<R, N>(body: Option<&[u8]>, radio: &mut R, notifier: &N) -> Result<bool>
where
    R: RadioLink + ?Sized,
    N: Notifier + ?Sized,
{
    let message = parse_alert_body(body)?;
    if message.is_empty() {
        debug!("blank alert message, nothing forwarded");
        return Ok(false);
    }

    radio.send(message.as_bytes()).await?;
    info!(message = %message, "alert sent over radio");

    let text = format!("{}{}", HTTP_ALERT_PREFIX, message);
    if let Err(e) = notifier.notify(&text).await {
        warn!(error = %e, code = e.error_code(), "telegram error");
    }
    Ok(true)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn content_length(headers: &[u8]) -> Option<usize> {
    let headers = std::str::from_utf8(headers).ok()?;
    headers.split("\r\n").skip(1).find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

fn request_complete(raw: &[u8]) -> bool {
    match find(raw, HEADER_TERMINATOR) {
        Some(idx) => {
            let body_len = content_length(&raw[..idx]).unwrap_or(0);
            raw.len() >= idx + HEADER_TERMINATOR.len() + body_len
        }
        None => false,
    }
}
