// Connection handling module
// Accepts a single TCP connection and serves HTTP/1 on it

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::handler;
use crate::logger;

/// Accept and process a connection, checking limits and logging.
///
/// # Arguments
///
/// * `stream` - The TCP stream to handle
/// * `peer_addr` - The peer's socket address
/// * `config` - Shared server configuration
/// * `conn_counter` - Active connection counter
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    config: &Arc<Config>,
    conn_counter: &Arc<AtomicUsize>,
) {
    // Increment first, then check, so concurrent accepts cannot both slip through
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection rejected."
            ));
            drop(stream);
            return;
        }
    }

    if config.logging.access_log {
        logger::log_connection_accepted(&peer_addr);
    }

    // Throttled chunks are small and should not wait on Nagle
    if let Err(e) = stream.set_nodelay(true) {
        logger::log_warning(&format!("Failed to set TCP_NODELAY for {peer_addr}: {e}"));
    }

    handle_connection(
        stream,
        peer_addr,
        Arc::clone(config),
        Arc::clone(conn_counter),
    );
}

/// Serve one connection in a spawned task.
///
/// Only the request head is bounded by a timeout; bodies are paced by the
/// delivery throttle and may legitimately take a long time.
fn handle_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    config: Arc<Config>,
    conn_counter: Arc<AtomicUsize>,
) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .keep_alive(config.performance.keep_alive);
        if config.performance.header_read_timeout > 0 {
            builder.header_read_timeout(Duration::from_secs(
                config.performance.header_read_timeout,
            ));
        }

        let service_config = Arc::clone(&config);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                handler::handle_request(req, Arc::clone(&service_config), peer_addr)
            }),
        );

        if let Err(err) = conn.await {
            logger::log_connection_error(&err);
        }

        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}
