//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: method validation, route
//! matching, and handing the matched file to a [`BinaryResponse`].

use crate::config::{Config, RouteHandler, RoutesConfig};
use crate::delivery::DeliveryError;
use crate::handler::files;
use crate::http::{self, response, BinaryResponse, RequestHead, ResponseBody, ResponseOptions};
use crate::logger::{self, AccessLogEntry};
use crate::source::FileSource;
use hyper::header::{CONTENT_RANGE, RANGE, USER_AGENT};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Main entry point for HTTP request handling
///
/// Request bodies are never read; only the head takes part in delivery.
pub async fn handle_request<B>(
    req: Request<B>,
    config: Arc<Config>,
    peer_addr: SocketAddr,
) -> Result<Response<ResponseBody>, Infallible> {
    let started = Instant::now();
    let (parts, _body) = req.into_parts();
    let mut entry = access_entry(&parts, peer_addr);

    let (response, delivery) = match check_http_method(&parts.method) {
        Some(resp) => (resp, None),
        None => serve(&parts, &config).await,
    };

    entry.status = response.status().as_u16();
    entry.content_range = response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    if delivery.is_none() && parts.method != Method::HEAD {
        entry.body_bytes = response
            .headers()
            .get(hyper::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
    }

    let access_format = config
        .logging
        .access_log
        .then(|| config.logging.access_log_format.clone());
    finish_delivery(delivery, entry, access_format, started);
    Ok(response)
}

/// Answer methods other than GET and HEAD directly
fn check_http_method(method: &Method) -> Option<Response<ResponseBody>> {
    match *method {
        Method::GET | Method::HEAD => None,
        Method::OPTIONS => Some(response::build_options_response()),
        _ => {
            logger::log_warning(&format!("Method not allowed: {method}"));
            Some(response::build_405_response())
        }
    }
}

type DeliveryTask = JoinHandle<Result<u64, DeliveryError>>;

async fn serve(parts: &Parts, config: &Config) -> (Response<ResponseBody>, Option<DeliveryTask>) {
    let is_head = parts.method == Method::HEAD;
    let Some(path) = route_request(parts.uri.path(), &config.routes).await else {
        return (response::build_404_response(is_head), None);
    };
    let Some(source) = files::open_source(&path).await else {
        return (response::build_404_response(is_head), None);
    };

    match build_response(source, parts, config) {
        Ok(binary) => match binary.into_http_response(is_head) {
            Ok((resp, task)) => (resp.map(response::delivery_body), task),
            Err(e) => {
                logger::log_error(&format!("Failed to start delivery of {}: {e}", path.display()));
                (response::build_500_response(is_head), None)
            }
        },
        Err(e) => {
            logger::log_error(&format!("Failed to prepare {}: {e}", path.display()));
            (response::build_500_response(is_head), None)
        }
    }
}

fn build_response(
    source: FileSource,
    parts: &Parts,
    config: &Config,
) -> Result<BinaryResponse<FileSource>, http::ResponseError> {
    let delivery = &config.delivery;
    let options = ResponseOptions {
        public: delivery.public,
        content_disposition: delivery.disposition,
        auto_etag: delivery.auto_etag,
        auto_last_modified: delivery.auto_last_modified,
        ..ResponseOptions::default()
    };
    let mut binary = BinaryResponse::new(source, options)?;
    binary
        .set_throttle(delivery.throttle())
        .prepare(RequestHead::from(parts))?;
    Ok(binary)
}

/// Find the file a request path maps to
///
/// Exact routes win; otherwise the longest directory route whose prefix
/// ends on a path segment boundary is used.
async fn route_request(path: &str, routes: &RoutesConfig) -> Option<PathBuf> {
    if let Some(handler) = routes.custom_routes.get(path) {
        return match handler {
            RouteHandler::File { path: file } => Some(PathBuf::from(file)),
            RouteHandler::Dir { path: dir } => files::resolve_in_directory(dir, path, path).await,
        };
    }

    let (prefix, dir) = routes
        .custom_routes
        .iter()
        .filter_map(|(prefix, handler)| match handler {
            RouteHandler::Dir { path: dir } if matches_prefix(path, prefix) => {
                Some((prefix.as_str(), dir.as_str()))
            }
            _ => None,
        })
        .max_by_key(|(prefix, _)| prefix.len())?;
    files::resolve_in_directory(dir, path, prefix).await
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/'))
}

fn access_entry(parts: &Parts, peer_addr: SocketAddr) -> AccessLogEntry {
    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        parts.method.to_string(),
        parts.uri.path().to_string(),
    );
    entry.http_version = match parts.version {
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2.0",
        _ => "1.1",
    }
    .to_string();
    let header = |name: hyper::header::HeaderName| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };
    entry.range = header(RANGE);
    entry.user_agent = header(USER_AGENT);
    entry
}

/// Log the request once its body has been delivered (or abandoned)
fn finish_delivery(
    delivery: Option<DeliveryTask>,
    mut entry: AccessLogEntry,
    access_format: Option<String>,
    started: Instant,
) {
    let Some(task) = delivery else {
        if let Some(format) = access_format {
            entry.request_time_us = elapsed_us(started);
            logger::log_access(&entry, &format);
        }
        return;
    };

    tokio::spawn(async move {
        entry.body_bytes = match task.await {
            Ok(Ok(delivered)) => delivered,
            Ok(Err(DeliveryError::Aborted { delivered, source })) => {
                logger::log_delivery_aborted(&entry.path, delivered, &source);
                delivered
            }
            Ok(Err(e)) => {
                logger::log_error(&format!("Delivery of {} failed: {e}", entry.path));
                0
            }
            Err(e) => {
                logger::log_error(&format!("Delivery task of {} failed: {e}", entry.path));
                0
            }
        };
        if let Some(format) = access_format {
            entry.request_time_us = elapsed_us(started);
            logger::log_access(&entry, &format);
        }
    });
}

fn elapsed_us(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tempfile::TempDir;

    const DATA: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    fn setup() -> (TempDir, Arc<Config>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), DATA).unwrap();
        let root = dir.path().to_str().unwrap();
        let toml = format!(
            r#"
            [logging]
            access_log = false

            [delivery]
            buffer_size = 7

            [routes.custom_routes."/files"]
            type = "dir"
            path = "{root}"

            [routes.custom_routes."/latest"]
            type = "file"
            path = "{root}/data.bin"
            "#
        );
        (dir, Arc::new(Config::from_toml(&toml).unwrap()))
    }

    fn request(method: Method, path: &str, range: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(range) = range {
            builder = builder.header("range", range);
        }
        builder.body(()).unwrap()
    }

    async fn call(config: &Arc<Config>, req: Request<()>) -> (Response<ResponseBody>, Vec<u8>) {
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let resp = handle_request(req, Arc::clone(config), peer).await.unwrap();
        let (parts, body) = resp.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes().to_vec();
        (Response::from_parts(parts, response::full_body(Vec::new())), bytes)
    }

    #[tokio::test]
    async fn test_serves_whole_file() {
        let (_dir, config) = setup();
        let (resp, body) = call(&config, request(Method::GET, "/files/data.bin", None)).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["accept-ranges"], "bytes");
        assert_eq!(resp.headers()["content-length"], "36");
        assert!(resp.headers().contains_key("etag"));
        assert!(resp.headers().contains_key("last-modified"));
        assert_eq!(body, DATA);
    }

    #[tokio::test]
    async fn test_serves_range_from_file_route() {
        let (_dir, config) = setup();
        let (resp, body) = call(&config, request(Method::GET, "/latest", Some("bytes=10-19"))).await;
        assert_eq!(resp.status(), 206);
        assert_eq!(resp.headers()["content-range"], "bytes 10-19/36");
        assert_eq!(body, &DATA[10..20]);
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let (_dir, config) = setup();
        let (resp, body) =
            call(&config, request(Method::GET, "/latest", Some("bytes=30-99"))).await;
        assert_eq!(resp.status(), 416);
        assert_eq!(resp.headers()["content-range"], "bytes */36");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_head_sends_headers_only() {
        let (_dir, config) = setup();
        let (resp, body) = call(&config, request(Method::HEAD, "/latest", None)).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-length"], "36");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_missing_and_unrouted_paths() {
        let (_dir, config) = setup();
        let (resp, _) = call(&config, request(Method::GET, "/files/nope.bin", None)).await;
        assert_eq!(resp.status(), 404);
        let (resp, _) = call(&config, request(Method::GET, "/elsewhere", None)).await;
        assert_eq!(resp.status(), 404);
        let (resp, _) = call(&config, request(Method::GET, "/filesX/data.bin", None)).await;
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_method_handling() {
        let (_dir, config) = setup();
        let (resp, _) = call(&config, request(Method::OPTIONS, "/latest", None)).await;
        assert_eq!(resp.status(), 204);
        let (resp, _) = call(&config, request(Method::POST, "/latest", None)).await;
        assert_eq!(resp.status(), 405);
        assert_eq!(resp.headers()["allow"], "GET, HEAD, OPTIONS");
    }

    #[test]
    fn test_matches_prefix() {
        assert!(matches_prefix("/files/a", "/files"));
        assert!(matches_prefix("/files", "/files"));
        assert!(matches_prefix("/files/a", "/files/"));
        assert!(!matches_prefix("/filesX", "/files"));
        assert!(matches_prefix("/anything", "/"));
    }
}
