//! HTTP response building module
//!
//! Builders for the short, fixed responses the router sends itself. File
//! bodies go through [`crate::http::binary::BinaryResponse`] instead.

use crate::http::body::DeliveryBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;
use std::io;

/// Methods the file routes answer
pub const ALLOWED_METHODS: &str = "GET, HEAD, OPTIONS";

/// Body type shared by every response the server writes
pub type ResponseBody = http_body_util::combinators::BoxBody<Bytes, io::Error>;

/// Box a fixed body
pub fn full_body(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Box a streamed delivery body
pub fn delivery_body(body: DeliveryBody) -> ResponseBody {
    body.boxed()
}

fn text_response(status: u16, text: &'static str, is_head: bool) -> Response<ResponseBody> {
    let body = if is_head { "" } else { text };
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain")
        .header("Content-Length", text.len())
        .body(full_body(body))
        .unwrap_or_else(|e| {
            log_build_error(status, &e);
            Response::new(full_body(body))
        })
}

/// Build 404 Not Found response
pub fn build_404_response(is_head: bool) -> Response<ResponseBody> {
    text_response(404, "404 Not Found", is_head)
}

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<ResponseBody> {
    let mut response = text_response(405, "405 Method Not Allowed", false);
    response
        .headers_mut()
        .insert("Allow", hyper::header::HeaderValue::from_static(ALLOWED_METHODS));
    response
}

/// Build 500 Internal Server Error response
pub fn build_500_response(is_head: bool) -> Response<ResponseBody> {
    text_response(500, "500 Internal Server Error", is_head)
}

/// Build OPTIONS response
pub fn build_options_response() -> Response<ResponseBody> {
    Response::builder()
        .status(204)
        .header("Allow", ALLOWED_METHODS)
        .body(full_body(Bytes::new()))
        .unwrap_or_else(|e| {
            log_build_error(204, &e);
            Response::new(full_body(Bytes::new()))
        })
}

/// Log response build error
fn log_build_error(status: u16, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
