//! Content-Disposition header module
//!
//! Builds `inline`/`attachment` disposition values with an ASCII `filename`
//! and, when needed, an RFC 5987 `filename*` carrying the full UTF-8 name.

use serde::Deserialize;
use std::fmt::{self, Write as _};
use std::str::FromStr;
use thiserror::Error;

/// Disposition type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispositionKind {
    /// Display in the browser
    Inline,
    /// Download as a file
    Attachment,
}

impl DispositionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Attachment => "attachment",
        }
    }
}

impl fmt::Display for DispositionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispositionKind {
    type Err = DispositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "attachment" => Ok(Self::Attachment),
            _ => Err(DispositionError(format!(
                "disposition must be either \"inline\" or \"attachment\", got \"{s}\""
            ))),
        }
    }
}

/// Invalid disposition arguments
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DispositionError(pub String);

/// Build a `Content-Disposition` header value
///
/// # Arguments
/// * `kind` - `inline` or `attachment`
/// * `filename` - Name presented to the client, may contain any Unicode
/// * `fallback` - ASCII-only name for old clients; derived from `filename` when empty
///
/// # Examples
/// ```
/// use rangeserve::http::disposition::{make_disposition, DispositionKind};
///
/// let value = make_disposition(DispositionKind::Inline, "bar.txt", "").unwrap();
/// assert_eq!(value, "inline; filename=\"bar.txt\"");
/// ```
pub fn make_disposition(
    kind: DispositionKind,
    filename: &str,
    fallback: &str,
) -> Result<String, DispositionError> {
    if filename.is_empty() {
        return Err(DispositionError("filename must not be empty".to_string()));
    }

    let fallback = if fallback.is_empty() {
        ascii_fallback(filename)
    } else {
        fallback.to_string()
    };

    if !fallback.bytes().all(|b| b.is_ascii() && !b.is_ascii_control()) || fallback.contains('%') {
        return Err(DispositionError(
            "the filename fallback must only contain printable ASCII characters and no '%'"
                .to_string(),
        ));
    }

    if [filename, fallback.as_str()]
        .iter()
        .any(|name| name.contains('/') || name.contains('\\'))
    {
        return Err(DispositionError(
            "the filename and the fallback cannot contain the \"/\" and \"\\\" characters"
                .to_string(),
        ));
    }

    let mut value = format!("{kind}; filename=\"{}\"", escape_quoted(&fallback));
    if filename != fallback {
        let _ = write!(value, "; filename*=utf-8''{}", percent_encode(filename));
    }
    Ok(value)
}

/// Replace everything that cannot appear in a plain `filename` with `_`
fn ascii_fallback(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '%' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn escape_quoted(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// RFC 3986 percent-encoding of everything outside the unreserved set
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}
