use rangeserve::{config, logger, server};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path =
        std::env::args().nth(1).unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::Config::load_from(&config_path)?;
    logger::init(&cfg)?;

    // Worker threads default to the number of CPU cores
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.get_socket_addr()?;
    let listener = server::create_reusable_listener(addr)?;

    logger::log_server_start(&addr, &cfg);
    if cfg.routes.custom_routes.is_empty() {
        logger::log_warning("No routes configured; every request will get 404");
    }

    server::run(listener, Arc::new(cfg)).await?;
    Ok(())
}
