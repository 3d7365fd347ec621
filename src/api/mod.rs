// api/mod.rs
pub mod billing;
pub mod propositions;
pub mod templates;

use actix_web::web;

/// Configure l'ensemble des routes de l'API
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(propositions::configure_routes)
            .configure(templates::configure_routes)
            .configure(billing::configure_routes),
    );
}
