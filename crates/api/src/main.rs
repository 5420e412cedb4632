//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[cfg(feature = "kafka")]
fn spawn_payment_listener(config: &Config, state: &api::AppState) {
    use payment_events::{KafkaSource, KafkaSourceConfig, PaymentEventListener};

    let Some(brokers) = config.kafka_brokers.clone() else {
        tracing::warn!("KAFKA_BROKERS not set; payment events are not consumed");
        return;
    };
    let source_config = KafkaSourceConfig::new(brokers, config.payment_topic.clone())
        .with_max_attempts(config.payment_max_attempts);
    let listener = PaymentEventListener::new(state.orders.clone());
    tokio::spawn(async move {
        match KafkaSource::connect(source_config) {
            Ok(mut source) => listener.run(&mut source).await,
            Err(e) => tracing::error!(error = %e, "payment event listener failed to start"),
        }
    });
}

#[cfg(not(feature = "kafka"))]
fn spawn_payment_listener(config: &Config, _state: &api::AppState) {
    if config.kafka_brokers.is_some() {
        tracing::warn!("KAFKA_BROKERS is set but this build lacks the kafka feature");
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Connect storage and peers
    let state = api::bootstrap::build_state(&config)
        .await
        .expect("failed to initialise application state");
    spawn_payment_listener(&config, &state);

    // 4. Build the application
    let carts = state.carts().clone();
    let app = api::create_app(Arc::new(state), metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Let queued cart writes reach durable storage
    carts.flush().await;
    tracing::info!("server shut down gracefully");
}
