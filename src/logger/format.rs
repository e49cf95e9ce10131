//! Access log format module
//!
//! Supports multiple log formats:
//! - `combined` (Apache/Nginx combined format)
//! - `common` (Common Log Format - CLF)
//! - `json` (JSON structured logging)
//! - Custom patterns with variables

use chrono::Local;
use std::fmt::Write as _;

const CLF_TIME: &str = "%d/%b/%Y:%H:%M:%S %z";

/// One delivered request
#[derive(Debug, Clone)]
pub struct AccessLogEntry {
    /// Client IP address
    pub remote_addr: String,
    /// Request timestamp
    pub time: chrono::DateTime<Local>,
    /// HTTP method (GET, HEAD, ...)
    pub method: String,
    /// Request URI path
    pub path: String,
    /// HTTP version (1.0, 1.1)
    pub http_version: String,
    /// Response status code
    pub status: u16,
    /// Body bytes actually written to the client
    pub body_bytes: u64,
    /// Requested `Range` header
    pub range: Option<String>,
    /// Served `Content-Range` header
    pub content_range: Option<String>,
    /// User-Agent header
    pub user_agent: Option<String>,
    /// Time from request to last body byte, in microseconds
    pub request_time_us: u64,
}

impl AccessLogEntry {
    /// Create a new access log entry with current timestamp
    pub fn new(remote_addr: String, method: String, path: String) -> Self {
        Self {
            remote_addr,
            time: Local::now(),
            method,
            path,
            http_version: "1.1".to_string(),
            status: 200,
            body_bytes: 0,
            range: None,
            content_range: None,
            user_agent: None,
            request_time_us: 0,
        }
    }

    /// Format the log entry according to the specified format
    pub fn format(&self, format: &str) -> String {
        match format {
            "combined" => self.format_combined(),
            "common" => self.format_common(),
            "json" => self.format_json(),
            custom => self.format_custom(custom),
        }
    }

    fn request_line(&self) -> String {
        format!("{} {} HTTP/{}", self.method, self.path, self.http_version)
    }

    /// Common Log Format (CLF)
    /// `$remote_addr - - [$time_local] "$request" $status $body_bytes_sent`
    fn format_common(&self) -> String {
        format!(
            "{} - - [{}] \"{}\" {} {}",
            self.remote_addr,
            self.time.format(CLF_TIME),
            self.request_line(),
            self.status,
            self.body_bytes,
        )
    }

    /// CLF followed by the requested and served ranges and the user agent
    fn format_combined(&self) -> String {
        format!(
            "{} \"{}\" \"{}\" \"{}\"",
            self.format_common(),
            self.range.as_deref().unwrap_or("-"),
            self.content_range.as_deref().unwrap_or("-"),
            self.user_agent.as_deref().unwrap_or("-"),
        )
    }

    /// JSON structured log format
    fn format_json(&self) -> String {
        let mut out = String::from("{");
        let _ = write!(
            out,
            r#""remote_addr":"{}","time":"{}","method":"{}","path":"{}","http_version":"{}","status":{},"body_bytes":{},"#,
            escape_json(&self.remote_addr),
            self.time.to_rfc3339(),
            escape_json(&self.method),
            escape_json(&self.path),
            escape_json(&self.http_version),
            self.status,
            self.body_bytes,
        );
        let _ = write!(
            out,
            r#""range":{},"content_range":{},"user_agent":{},"request_time_us":{}}}"#,
            json_opt(self.range.as_deref()),
            json_opt(self.content_range.as_deref()),
            json_opt(self.user_agent.as_deref()),
            self.request_time_us,
        );
        out
    }

    /// Custom format with variable substitution
    ///
    /// Supported variables:
    /// - `$remote_addr`, `$time_local`, `$time_iso8601`
    /// - `$request`, `$request_method`, `$request_uri`, `$request_time`
    /// - `$status`, `$body_bytes_sent`
    /// - `$http_range`, `$content_range`, `$http_user_agent`
    fn format_custom(&self, pattern: &str) -> String {
        #[allow(clippy::cast_precision_loss)]
        let request_time = self.request_time_us as f64 / 1_000_000.0;

        // Longer variables first: $request_time and $request_method before $request
        let vars: [(&str, String); 12] = [
            ("$remote_addr", self.remote_addr.clone()),
            ("$time_local", self.time.format(CLF_TIME).to_string()),
            ("$time_iso8601", self.time.to_rfc3339()),
            ("$request_time", format!("{request_time:.3}")),
            ("$request_method", self.method.clone()),
            ("$request_uri", self.path.clone()),
            ("$request", self.request_line()),
            ("$status", self.status.to_string()),
            ("$body_bytes_sent", self.body_bytes.to_string()),
            ("$http_range", self.range.clone().unwrap_or_else(|| "-".into())),
            (
                "$content_range",
                self.content_range.clone().unwrap_or_else(|| "-".into()),
            ),
            (
                "$http_user_agent",
                self.user_agent.clone().unwrap_or_else(|| "-".into()),
            ),
        ];

        vars.iter()
            .fold(pattern.to_string(), |acc, (name, value)| acc.replace(*name, value))
    }
}

fn json_opt(value: Option<&str>) -> String {
    value.map_or_else(|| "null".to_string(), |v| format!("\"{}\"", escape_json(v)))
}

/// Escape special characters for JSON string
fn escape_json(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_entry() -> AccessLogEntry {
        let mut entry = AccessLogEntry::new(
            "192.168.1.1".to_string(),
            "GET".to_string(),
            "/downloads/debian.iso".to_string(),
        );
        entry.status = 206;
        entry.body_bytes = 1234;
        entry.range = Some("bytes=0-1233".to_string());
        entry.content_range = Some("bytes 0-1233/5000".to_string());
        entry.user_agent = Some("curl/8.5".to_string());
        entry.request_time_us = 1_250_000;
        entry
    }

    #[test]
    fn test_format_common() {
        let log = create_test_entry().format("common");
        assert!(log.starts_with("192.168.1.1 - - ["));
        assert!(log.contains("\"GET /downloads/debian.iso HTTP/1.1\" 206 1234"));
        assert!(!log.contains("curl/8.5"));
    }

    #[test]
    fn test_format_combined() {
        let log = create_test_entry().format("combined");
        assert!(log.contains("206 1234"));
        assert!(log.contains("\"bytes=0-1233\" \"bytes 0-1233/5000\" \"curl/8.5\""));
    }

    #[test]
    fn test_format_combined_without_range() {
        let mut entry = create_test_entry();
        entry.range = None;
        entry.content_range = None;
        let log = entry.format("combined");
        assert!(log.ends_with("\"-\" \"-\" \"curl/8.5\""));
    }

    #[test]
    fn test_format_json() {
        let log = create_test_entry().format("json");
        assert!(log.starts_with('{') && log.ends_with('}'));
        assert!(log.contains(r#""remote_addr":"192.168.1.1""#));
        assert!(log.contains(r#""status":206"#));
        assert!(log.contains(r#""body_bytes":1234"#));
        assert!(log.contains(r#""content_range":"bytes 0-1233/5000""#));
        assert!(log.contains(r#""request_time_us":1250000}"#));
    }

    #[test]
    fn test_format_custom() {
        let log = create_test_entry().format("$request_method $status $content_range $request_time");
        assert_eq!(log, "GET 206 bytes 0-1233/5000 1.250");
    }

    #[test]
    fn test_escape_json() {
        assert_eq!(escape_json("a\"b\\c\n"), "a\\\"b\\\\c\\n");
    }
}
