use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

const SERVICE_NAME: &str = "event-vault";

/// Serve `/metrics` and `/health` until the server stops
///
/// Runs its own actix system, so the binary gives it a dedicated thread.
pub async fn start_metrics_server(registry: Arc<Registry>, port: u16) -> std::io::Result<()> {
    tracing::info!(port, "📊 Serving vault metrics on /metrics and /health");

    let registry = web::Data::new(registry);
    HttpServer::new(move || App::new().app_data(registry.clone()).configure(routes))
        .workers(1)
        .bind(("0.0.0.0", port))?
        .run()
        .await
}

/// Route table shared by the server and its tests
pub(crate) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(scrape))
        .route("/health", web::get().to(health));
}

async fn scrape(registry: web::Data<Arc<Registry>>) -> impl Responder {
    match encode_metrics(&registry) {
        Ok(body) => HttpResponse::Ok()
            .content_type(TextEncoder::new().format_type())
            .body(body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode vault metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn health(registry: web::Data<Arc<Registry>>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "metric_families": registry.gather().len(),
    }))
}

/// Prometheus text exposition of everything in the registry
pub(crate) fn encode_metrics(registry: &Registry) -> prometheus::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(buffer)
}
