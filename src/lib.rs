pub mod application;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod schema;

#[cfg(test)]
mod test_support;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use db::{create_pool, DbPool};

use domain::errors::DomainError;
use handlers::{station, ApiDoc, AppState};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) -> Result<(), DomainError> {
    let mut conn = pool
        .get()
        .map_err(|e| DomainError::PersistenceFailure(e.to_string()))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| DomainError::PersistenceFailure(e.to_string()))?;
    Ok(())
}

/// Registers the station's HTTP routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/status", web::get().to(station::get_status))
        .route("/scans", web::post().to(station::submit_scan))
        .route("/sync", web::post().to(station::trigger_sync))
        .route("/catalog/refresh", web::post().to(station::refresh_catalog))
        .service(
            web::scope("/orders")
                .route("/unsynced", web::get().to(station::list_unsynced))
                .route("/{id}", web::get().to(station::get_order)),
        );
}

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    state: AppState,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    let state = web::Data::new(state);
    Ok(HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(configure)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/api-doc/openapi.json", ApiDoc::openapi()))
    })
    .workers(1)
    .disable_signals()
    .bind((host.to_string(), port))?
    .run())
}
