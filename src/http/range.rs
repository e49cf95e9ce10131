//! HTTP Range negotiation module
//!
//! Turns `Range`/`If-Range` request headers and source metadata into a
//! [`DeliveryPlan`]. Pure functions only: no I/O, no header mutation.

use hyper::StatusCode;

/// `Accept-Ranges` value advertised for safe methods
pub const ACCEPT_RANGES_BYTES: &str = "bytes";
/// `Accept-Ranges` value advertised for unsafe methods
pub const ACCEPT_RANGES_NONE: &str = "none";

/// Negotiated outcome of a request: status plus the byte window to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPlan {
    /// 200, 206 or 416
    pub status: StatusCode,
    /// First byte of the window
    pub range_start: u64,
    /// Window length, `None` means until end of source
    pub range_length: Option<u64>,
    /// `Content-Range` value, only set for 206
    pub content_range: Option<String>,
    /// `Accept-Ranges` value to advertise when the caller has not set one
    pub accept_ranges: &'static str,
}

impl DeliveryPlan {
    /// Whole source, 200 OK
    pub const fn full(accept_ranges: &'static str) -> Self {
        Self {
            status: StatusCode::OK,
            range_start: 0,
            range_length: None,
            content_range: None,
            accept_ranges,
        }
    }

    /// Inclusive window `[start, end]` of a source of `size` bytes, 206
    fn partial(start: u64, end: u64, size: u64, accept_ranges: &'static str) -> Self {
        Self {
            status: StatusCode::PARTIAL_CONTENT,
            range_start: start,
            range_length: Some(end - start + 1),
            content_range: Some(format!("bytes {start}-{end}/{size}")),
            accept_ranges,
        }
    }

    /// 416, no byte window
    const fn unsatisfiable(accept_ranges: &'static str) -> Self {
        Self {
            status: StatusCode::RANGE_NOT_SATISFIABLE,
            range_start: 0,
            range_length: None,
            content_range: None,
            accept_ranges,
        }
    }

    /// Number of body bytes this plan delivers for a source of `size` bytes
    pub fn content_length(&self, size: u64) -> u64 {
        if !self.status.is_success() {
            return 0;
        }
        self.range_length
            .unwrap_or_else(|| size.saturating_sub(self.range_start))
    }
}

/// Negotiate a delivery plan for a single request.
///
/// Supported `Range` formats (single range, `bytes` unit only):
/// - `bytes=start-end` - Specific range
/// - `bytes=start-` - From start to end
/// - `bytes=-suffix` - Last suffix bytes
///
/// A `Range` that cannot be parsed is treated as absent and yields the
/// full-body plan. A reversed range (`start > end`) also yields the full
/// body; only a well-ordered window reaching outside the source is 416.
///
/// # Arguments
/// * `method_is_safe` - Whether the request method is safe (GET, HEAD, ...)
/// * `range` - Value of the `Range` header
/// * `if_range` - Value of the `If-Range` header
/// * `validator` - Current validator (`ETag`) of the source
/// * `size` - Total source size
///
/// # Examples
/// ```
/// use rangeserve::http::range::negotiate;
///
/// let plan = negotiate(true, Some("bytes=1-4"), None, None, 35);
/// assert_eq!(plan.status, 206);
/// assert_eq!(plan.content_range.as_deref(), Some("bytes 1-4/35"));
///
/// let plan = negotiate(true, None, None, None, 35);
/// assert_eq!(plan.status, 200);
/// ```
pub fn negotiate(
    method_is_safe: bool,
    range: Option<&str>,
    if_range: Option<&str>,
    validator: Option<&str>,
    size: u64,
) -> DeliveryPlan {
    let accept_ranges = if method_is_safe {
        ACCEPT_RANGES_BYTES
    } else {
        ACCEPT_RANGES_NONE
    };

    let Some(range) = range else {
        return DeliveryPlan::full(accept_ranges);
    };

    // A stale If-Range means the client's partial copy is outdated: send everything
    if if_range.is_some_and(|tag| Some(tag) != validator) {
        return DeliveryPlan::full(accept_ranges);
    }

    let Some((start, end)) = parse_bounds(range, size) else {
        return DeliveryPlan::full(accept_ranges);
    };

    let last = i128::from(size) - 1;
    if start > end {
        return DeliveryPlan::full(accept_ranges);
    }
    if start < 0 || end > last {
        return DeliveryPlan::unsatisfiable(accept_ranges);
    }
    if start == 0 && end == last {
        return DeliveryPlan::full(accept_ranges);
    }

    // 0 <= start <= end <= size - 1 here, so both fit in u64
    match (u64::try_from(start), u64::try_from(end)) {
        (Ok(start), Ok(end)) => DeliveryPlan::partial(start, end, size, accept_ranges),
        _ => DeliveryPlan::full(accept_ranges),
    }
}

/// Resolve a `Range` value to signed inclusive bounds against `size`.
///
/// Returns `None` for anything that is not a single well-formed byte range.
fn parse_bounds(range: &str, size: u64) -> Option<(i128, i128)> {
    let ranges = range.trim().strip_prefix("bytes=")?;

    // Only support single range (not multi-range)
    if ranges.contains(',') {
        return None;
    }

    let (start_str, end_str) = ranges.split_once('-')?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());
    let size = i128::from(size);

    match (start_str.is_empty(), end_str.is_empty()) {
        (true, true) => None,
        // Suffix range: "-500" means last 500 bytes
        (true, false) => {
            let suffix = parse_offset(end_str)?;
            Some((size - suffix, size - 1))
        }
        // Open-ended range: "500-"
        (false, true) => Some((parse_offset(start_str)?, size - 1)),
        (false, false) => Some((parse_offset(start_str)?, parse_offset(end_str)?)),
    }
}

fn parse_offset(s: &str) -> Option<i128> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u64>().ok().map(i128::from)
}
