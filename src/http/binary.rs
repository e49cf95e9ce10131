//! Binary response module
//!
//! [`BinaryResponse`] wraps a [`VirtualSource`] and turns it into an HTTP
//! response in two steps: [`BinaryResponse::prepare`] negotiates the range and
//! fills in status and headers, then [`BinaryResponse::send_content`] (or
//! [`BinaryResponse::into_http_response`]) streams the negotiated bytes.

use crate::delivery::{self, DeliveryError, ThrottleConfig};
use crate::http::body::DeliveryBody;
use crate::http::{cache, mime};
use crate::http::disposition::{self, DispositionError, DispositionKind};
use crate::http::range::{self, DeliveryPlan, ACCEPT_RANGES_BYTES};
use crate::source::{SourceError, VirtualSource};
use hyper::body::Bytes;
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, ACCEPT_RANGES, CONTENT_DISPOSITION,
    CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, IF_RANGE, LAST_MODIFIED, RANGE,
};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response, StatusCode, Version};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

/// Errors raised while building or preparing a [`BinaryResponse`]
#[derive(Debug, Error)]
pub enum ResponseError {
    /// The caller used the response in a way it does not support
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Source metadata could not be read
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A computed header value is not valid HTTP
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
}

impl From<DispositionError> for ResponseError {
    fn from(e: DispositionError) -> Self {
        Self::ContractViolation(e.0)
    }
}

/// The request fields that influence delivery
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    pub method: &'a Method,
    pub version: Version,
    pub headers: &'a HeaderMap,
}

impl<'a> From<&'a Parts> for RequestHead<'a> {
    fn from(parts: &'a Parts) -> Self {
        Self {
            method: &parts.method,
            version: parts.version,
            headers: &parts.headers,
        }
    }
}

impl<'a, B> From<&'a Request<B>> for RequestHead<'a> {
    fn from(req: &'a Request<B>) -> Self {
        Self {
            method: req.method(),
            version: req.version(),
            headers: req.headers(),
        }
    }
}

/// Construction-time options
#[derive(Debug, Clone)]
pub struct ResponseOptions {
    pub status: StatusCode,
    /// Initial headers; negotiation never overwrites `Accept-Ranges` or `Content-Type` set here
    pub headers: HeaderMap,
    /// Mark the response `Cache-Control: public`
    pub public: bool,
    /// Set `Content-Disposition` from the source's suggested name
    pub content_disposition: Option<DispositionKind>,
    /// Send the source validator as `ETag`
    pub auto_etag: bool,
    /// Send the source modification time as `Last-Modified`
    pub auto_last_modified: bool,
}

impl Default for ResponseOptions {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            public: true,
            content_disposition: None,
            auto_etag: false,
            auto_last_modified: true,
        }
    }
}

/// HTTP response delivering the bytes of a [`VirtualSource`]
pub struct BinaryResponse<S> {
    source: S,
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    throttle: ThrottleConfig,
    plan: Option<DeliveryPlan>,
}

impl<S: VirtualSource> BinaryResponse<S> {
    pub fn new(source: S, options: ResponseOptions) -> Result<Self, ResponseError> {
        let mut response = Self {
            source,
            status: options.status,
            version: Version::HTTP_11,
            headers: options.headers,
            throttle: ThrottleConfig::default(),
            plan: None,
        };

        if options.auto_etag {
            response.set_auto_etag()?;
        }
        if options.auto_last_modified {
            response.set_auto_last_modified()?;
        }
        if let Some(kind) = options.content_disposition {
            response.set_content_disposition(kind, "", "")?;
        }
        if options.public {
            cache::mark_public(&mut response.headers);
        }
        Ok(response)
    }

    /// Set `ETag` from the source validator (removed when the source has none)
    pub fn set_auto_etag(&mut self) -> Result<&mut Self, ResponseError> {
        match self.source.validator() {
            Some(validator) => {
                let value = HeaderValue::from_str(&cache::quote_etag(validator))?;
                self.headers.insert(ETAG, value);
            }
            None => {
                self.headers.remove(ETAG);
            }
        }
        Ok(self)
    }

    /// Set `Last-Modified` from the source (removed when the source has none)
    pub fn set_auto_last_modified(&mut self) -> Result<&mut Self, ResponseError> {
        match self.source.last_modified() {
            Some(time) => {
                let value = HeaderValue::from_str(&cache::http_date(time))?;
                self.headers.insert(LAST_MODIFIED, value);
            }
            None => {
                self.headers.remove(LAST_MODIFIED);
            }
        }
        Ok(self)
    }

    /// Set `Content-Disposition`
    ///
    /// An empty `filename` uses the source's suggested name; an empty
    /// `fallback` is derived from the filename.
    pub fn set_content_disposition(
        &mut self,
        kind: DispositionKind,
        filename: &str,
        fallback: &str,
    ) -> Result<&mut Self, ResponseError> {
        let filename = if filename.is_empty() {
            self.source.suggested_name().unwrap_or_default()
        } else {
            filename
        };
        let value = disposition::make_disposition(kind, filename, fallback)?;
        self.headers
            .insert(CONTENT_DISPOSITION, HeaderValue::from_str(&value)?);
        Ok(self)
    }

    pub fn set_throttle(&mut self, throttle: ThrottleConfig) -> &mut Self {
        self.throttle = throttle;
        self
    }

    pub fn set_max_bytes_per_second(&mut self, max_bytes_per_second: u64) -> &mut Self {
        self.throttle = ThrottleConfig::new(self.throttle.buffer_size, max_bytes_per_second);
        self
    }

    pub fn set_buffer_size(&mut self, buffer_size: usize) -> &mut Self {
        self.throttle = ThrottleConfig::new(buffer_size, self.throttle.max_bytes_per_second);
        self
    }

    /// Bodies come from the source only; setting one is a programming error
    pub fn set_content(&mut self, content: Option<Bytes>) -> Result<(), ResponseError> {
        if content.is_some() {
            return Err(ResponseError::ContractViolation(
                "the content cannot be set on a BinaryResponse".to_string(),
            ));
        }
        Ok(())
    }

    /// Always `None`: the body only exists as a stream
    pub const fn content(&self) -> Option<Bytes> {
        None
    }

    pub const fn status(&self) -> StatusCode {
        self.status
    }

    pub const fn version(&self) -> Version {
        self.version
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub const fn plan(&self) -> Option<&DeliveryPlan> {
        self.plan.as_ref()
    }

    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Negotiate against `request` and fill in status and headers
    pub fn prepare(&mut self, request: RequestHead<'_>) -> Result<&mut Self, ResponseError> {
        let size = self.source.size()?;
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(size));

        if !self.headers.contains_key(CONTENT_TYPE) {
            let content_type = self.source.content_type().unwrap_or(mime::OCTET_STREAM);
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);
        }

        self.version = if request.version == Version::HTTP_10 {
            Version::HTTP_10
        } else {
            Version::HTTP_11
        };

        let header_str = |name: HeaderName| request.headers.get(name).and_then(|v| v.to_str().ok());
        // An If-Range with non-text bytes can never equal the validator: ignore the Range
        let if_range_unreadable = request
            .headers
            .get(IF_RANGE)
            .is_some_and(|v| v.to_str().is_err());
        let range = if if_range_unreadable {
            None
        } else {
            header_str(RANGE)
        };
        let validator = self.headers.get(ETAG).and_then(|v| v.to_str().ok());
        let plan = range::negotiate(
            request.method.is_safe(),
            range,
            header_str(IF_RANGE),
            validator,
            size,
        );

        if !self.headers.contains_key(ACCEPT_RANGES) {
            self.headers
                .insert(ACCEPT_RANGES, HeaderValue::from_static(plan.accept_ranges));
        }

        match plan.status {
            StatusCode::PARTIAL_CONTENT => {
                self.status = StatusCode::PARTIAL_CONTENT;
                if let Some(content_range) = &plan.content_range {
                    self.headers
                        .insert(CONTENT_RANGE, HeaderValue::from_str(content_range)?);
                }
                self.headers
                    .insert(CONTENT_LENGTH, HeaderValue::from(plan.content_length(size)));
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                self.status = StatusCode::RANGE_NOT_SATISFIABLE;
                self.headers.insert(
                    CONTENT_RANGE,
                    HeaderValue::from_str(&format!("bytes */{size}"))?,
                );
                self.headers.insert(CONTENT_LENGTH, HeaderValue::from(0u64));
            }
            _ => {}
        }

        self.plan = Some(plan);
        Ok(self)
    }

    /// The plan to stream: the prepared one, or the full body when unprepared
    fn effective_plan(&self) -> DeliveryPlan {
        self.plan
            .clone()
            .unwrap_or_else(|| DeliveryPlan::full(ACCEPT_RANGES_BYTES))
    }

    /// Stream the body into `sink`
    ///
    /// Nothing is written unless the response status is 2xx.
    pub async fn send_content<W>(&mut self, sink: &mut W) -> Result<u64, DeliveryError>
    where
        W: tokio::io::AsyncWrite + Unpin + ?Sized,
    {
        if !self.status.is_success() {
            return Ok(0);
        }
        let plan = self.effective_plan();
        delivery::stream(&plan, &mut self.source, sink, self.throttle).await
    }
}

impl<S: VirtualSource + 'static> BinaryResponse<S> {
    /// Convert into a hyper response whose body is streamed by a spawned task
    ///
    /// With `head_only` the headers are kept and no bytes are streamed. The
    /// returned handle resolves once the delivery task finishes; it is `None`
    /// when there is nothing to stream.
    pub fn into_http_response(
        mut self,
        head_only: bool,
    ) -> Result<
        (
            Response<DeliveryBody>,
            Option<JoinHandle<Result<u64, DeliveryError>>>,
        ),
        ResponseError,
    > {
        let size = self.source.size()?;
        let length = if self.status.is_success() {
            self.effective_plan().content_length(size)
        } else {
            0
        };

        let (body, task) = if head_only || length == 0 {
            (DeliveryBody::empty(), None)
        } else {
            let (body, mut writer) = DeliveryBody::pipe(length, self.throttle.buffer_size);
            let mut streaming = BinaryResponse {
                source: self.source,
                status: self.status,
                version: self.version,
                headers: HeaderMap::new(),
                throttle: self.throttle,
                plan: self.plan.clone(),
            };
            let task = tokio::spawn(async move {
                let delivered = streaming.send_content(&mut writer).await?;
                // Best effort: the reader may already be gone after the last byte
                let _ = writer.shutdown().await;
                Ok(delivered)
            });
            (body, Some(task))
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = std::mem::take(&mut self.headers);
        Ok((response, task))
    }
}
