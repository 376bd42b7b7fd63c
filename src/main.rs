//! CLI for orderflow
//!
//! Subcommands:
//! - `broker`: run the bundled WebSocket broker
//! - `process`: consume `orders/new` until Ctrl-C
//! - `order`: submit one order and wait for its processed result

use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use orderflow::broker::Broker;
use orderflow::client::{ClientFactory, WsClientFactory};
use orderflow::config::{Settings, load_config};
use orderflow::connection::HealthMonitor;
use orderflow::metrics::{CounterMetrics, Metrics, MetricsSnapshot, NoopMetrics};
use orderflow::orders::{OrderProcessor, OrderService};
use orderflow::pubsub::{Publisher, Subscriber};
use orderflow::transport::start_websocket_server;
use orderflow::utils::logging;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "orderflow", version, about = "Order processing over a pub/sub broker")]
enum Command {
    /// Run the bundled WebSocket broker
    Broker,
    /// Process incoming orders until interrupted
    Process,
    /// Submit an order and wait until it has been processed
    Order {
        /// Customer placing the order
        customer: String,
        /// Product being ordered
        product: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.logging.level);

    let result = match cmd {
        Command::Broker => run_broker(&settings).await,
        Command::Process => run_processor(&settings).await,
        Command::Order { customer, product } => run_order(&settings, &customer, &product).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_broker(settings: &Settings) -> anyhow::Result<()> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let broker = Arc::new(Mutex::new(Broker::new()));

    tokio::select! {
        result = start_websocket_server(&addr, broker) => {
            result.with_context(|| format!("broker on {addr} failed"))?;
            warn!("Broker exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }
    Ok(())
}

async fn run_processor(settings: &Settings) -> anyhow::Result<()> {
    let metrics = Arc::new(CounterMetrics::new());
    let processor = OrderProcessor::from_settings(settings, Arc::new(WsClientFactory), metrics.clone());
    processor
        .start_processing()
        .await
        .context("failed to start order processing")?;

    let health = HealthMonitor::new(settings.processing.health_interval())
        .watch(processor.subscriber().connection())
        .watch(processor.publisher().connection())
        .spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for the shutdown signal")?;
    info!("Shutdown signal received. Stopping order processing.");

    health.abort();
    let stopped = processor.stop_processing().await;
    log_summary(&metrics.snapshot());
    stopped.context("failed to stop order processing")
}

async fn run_order(settings: &Settings, customer: &str, product: &str) -> anyhow::Result<()> {
    let metrics: Arc<dyn Metrics> = Arc::new(NoopMetrics);
    let factory: Arc<dyn ClientFactory> = Arc::new(WsClientFactory);
    let publisher = Publisher::new(settings, factory.clone(), metrics.clone());
    let results = Subscriber::new(settings, factory, metrics.clone());
    let service = OrderService::new(publisher.clone(), metrics);

    let outcome = service
        .submit_and_wait(&results, customer, product, settings.processing.completion_timeout())
        .await;

    // Best effort; the outcome is already decided.
    let _ = results.disconnect().await;
    let _ = publisher.disconnect().await;

    let order = outcome.context("order was not completed")?;
    info!(order_id = %order.order_id, status = %order.status, "Order completed");
    Ok(())
}

fn log_summary(snapshot: &MetricsSnapshot) {
    info!(
        processed = snapshot.processed,
        failed = snapshot.failed,
        orders_created = snapshot.orders_created,
        queue_length = snapshot.queue_length,
        "metrics summary"
    );
    for (operation, attempts) in &snapshot.retry_attempts {
        let delay = snapshot.retry_delay.get(operation).copied().unwrap_or_default();
        info!(
            %operation,
            attempts,
            delay_ms = delay.as_millis() as u64,
            "retry summary"
        );
    }
}
