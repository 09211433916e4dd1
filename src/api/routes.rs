use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::api::handlers::stats::{get_cdf, get_cdf_text, get_series, get_status};

/// Root endpoint to provide information about the API
async fn index() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "name": "Rustband API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Passive per-subnet traffic accounting daemon",
        "endpoints": [
            {
                "path": "/api/status",
                "method": "GET",
                "description": "Daemon status and intake counters"
            },
            {
                "path": "/api/series",
                "method": "GET",
                "description": "Historical sample series (scope, start, end query parameters)"
            },
            {
                "path": "/api/cdf",
                "method": "GET",
                "description": "Cumulative distribution of per-sample traffic volume"
            },
            {
                "path": "/api/cdf.txt",
                "method": "GET",
                "description": "Cumulative distribution rendered as plain text"
            }
        ]
    }))
}

/// Configure API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // Root endpoint
        .route("/", web::get().to(index))
        .service(
            web::scope("/api")
                .route("/status", web::get().to(get_status))
                .route("/series", web::get().to(get_series))
                .route("/cdf", web::get().to(get_cdf))
                .route("/cdf.txt", web::get().to(get_cdf_text)),
        );
}
