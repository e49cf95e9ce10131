// Server module entry point
// Binds the listener and runs the accept loop until Ctrl+C

pub mod connection;
pub mod listener;

pub use listener::create_reusable_listener;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::logger;

/// Accept connections on `listener` until a shutdown signal arrives.
///
/// In-flight deliveries are not waited for; their tasks are dropped with the
/// runtime, which closes their sources.
pub async fn run(listener: TcpListener, config: Arc<Config>) -> std::io::Result<()> {
    let active_connections = Arc::new(AtomicUsize::new(0));

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        connection::accept_connection(
                            stream,
                            peer_addr,
                            &config,
                            &active_connections,
                        );
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            signal = tokio::signal::ctrl_c() => {
                signal?;
                logger::log_shutdown();
                return Ok(());
            }
        }
    }
}
