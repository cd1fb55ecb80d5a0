pub mod merge;

pub use merge::*;

use crate::health;
use actix_web::web;

/// Routes shared by the server and the handler tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource(["/api/merge-audio", "/api/v1/merge-audio"])
            .route(web::post().to(merge_audio))
            .default_service(web::to(method_not_allowed)),
    )
    .service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics)),
    )
    .route("/health", web::get().to(health::health_check));
}
