// Configuration module entry point
// Loads layered configuration: defaults, then config file, then environment

mod types;

use std::net::SocketAddr;

// Re-export public types
pub use types::{
    Config, DeliveryConfig, LoggingConfig, PerformanceConfig, RouteHandler, RoutesConfig,
    ServerConfig,
};

/// Default config file (extension resolved by the `config` crate)
pub const DEFAULT_CONFIG_PATH: &str = "config";

impl Config {
    /// Load configuration from specified file path (without extension)
    ///
    /// A missing file is not an error; defaults and `RANGESERVE_*`
    /// environment variables still apply.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false));
        Self::build(builder)
    }

    /// Load configuration from an in-memory TOML document
    pub fn from_toml(content: &str) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml));
        Self::build(builder)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        let settings = builder
            .add_source(
                config::Environment::with_prefix("RANGESERVE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive", true)?
            .set_default("performance.header_read_timeout", 30)?
            .set_default("delivery.buffer_size", 16_384)?
            .set_default("delivery.max_bytes_per_second", 0)?
            .set_default("delivery.public", true)?
            .set_default("delivery.auto_etag", true)?
            .set_default("delivery.auto_last_modified", true)?
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::disposition::DispositionKind;

    #[test]
    fn test_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.logging.access_log_format, "combined");
        assert_eq!(cfg.logging.level, crate::logger::LogLevel::Info);
        assert_eq!(cfg.delivery.buffer_size, 16_384);
        assert_eq!(cfg.delivery.max_bytes_per_second, 0);
        assert!(cfg.delivery.public);
        assert!(cfg.delivery.auto_last_modified);
        assert_eq!(cfg.delivery.disposition, None);
        assert!(cfg.routes.custom_routes.is_empty());
        assert_eq!(
            cfg.get_socket_addr().unwrap(),
            "127.0.0.1:8080".parse().unwrap()
        );
    }

    #[test]
    fn test_full_document() {
        let cfg = Config::from_toml(
            r#"
            [server]
            host = "0.0.0.0"
            port = 9000
            workers = 2

            [logging]
            level = "warn"

            [delivery]
            buffer_size = 4096
            max_bytes_per_second = 65536
            disposition = "attachment"

            [routes.custom_routes."/iso"]
            type = "dir"
            path = "/srv/iso"

            [routes.custom_routes."/latest"]
            type = "file"
            path = "/srv/iso/latest.iso"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.workers, Some(2));
        assert_eq!(cfg.delivery.disposition, Some(DispositionKind::Attachment));
        assert_eq!(cfg.logging.level, crate::logger::LogLevel::Warn);

        let throttle = cfg.delivery.throttle();
        assert_eq!(throttle.buffer_size, 4096);
        assert_eq!(throttle.max_bytes_per_second, 65536);

        assert_eq!(
            cfg.routes.custom_routes.get("/iso"),
            Some(&RouteHandler::Dir {
                path: "/srv/iso".to_string()
            })
        );
        assert_eq!(
            cfg.routes.custom_routes.get("/latest"),
            Some(&RouteHandler::File {
                path: "/srv/iso/latest.iso".to_string()
            })
        );
    }

    #[test]
    fn test_zero_buffer_size_clamped() {
        let cfg = Config::from_toml("[delivery]\nbuffer_size = 0\n").unwrap();
        assert_eq!(cfg.delivery.throttle().buffer_size, 16_384);
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        assert!(Config::from_toml("[logging]\nlevel = \"loud\"\n").is_err());
    }
}
