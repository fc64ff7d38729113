// Route exports
pub mod offline;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::time::Duration;

use crate::config::Settings;
use offline::OfflineState;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(offline::configure);
}

/// Serve the offline-capable proxy in front of the matching service
pub async fn serve_offline(settings: &Settings) -> std::io::Result<()> {
    let offline = &settings.offline;
    let state = OfflineState::new(
        &settings.api.base_url,
        offline.cache_size,
        Duration::from_secs(offline.cache_ttl_secs),
    )
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let host = offline.host.clone();
    let port = offline.port;
    let workers = offline.workers.unwrap_or(4);

    tracing::info!(
        "Starting offline proxy on {}:{} for {} (cache: {} entries, TTL: {}s)",
        host,
        port,
        settings.api.base_url,
        offline.cache_size,
        offline.cache_ttl_secs
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
