use service_core::middleware::metrics::install_metrics_exporter;
use service_core::observability::init_tracing;
use textgen_service::config::TextgenConfig;
use textgen_service::startup::Application;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = TextgenConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    let otlp_endpoint = std::env::var("OTLP_ENDPOINT").ok();
    init_tracing(
        "textgen-service",
        &config.common.log_level,
        otlp_endpoint.as_deref(),
    );

    if let Some(metrics_port) = config.common.metrics_port {
        install_metrics_exporter(metrics_port).map_err(|e| {
            tracing::error!("Failed to install metrics exporter: {}", e);
            std::io::Error::other(format!("Metrics exporter error: {}", e))
        })?;
    }

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to start text generation service: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    app.run_until_stopped().await
}
