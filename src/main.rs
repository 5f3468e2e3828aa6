use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

use fixflow::core::AppConfig;
use fixflow::engine::TradeEngine;
use fixflow::flow::OrderFlowGenerator;
use fixflow::session::sim::SimSession;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fixflow=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    // Config errors are the only fatal ones: descriptive message, non-zero exit.
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(Path::new(&path))?,
        None => AppConfig::load_default()?,
    };

    tracing::info!(
        "fixflow starting: {} orders over {:?}",
        config.flow.order_count,
        config.flow.symbols
    );

    let (sim, inbound) = SimSession::new(config.session.clone());
    let session = Arc::new(sim);
    let engine = Arc::new(TradeEngine::new(
        session.clone(),
        Duration::from_millis(config.session.logon_timeout_ms),
    ));

    // Single consumer drains the session's events in arrival order.
    let consumer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            while let Ok(event) = inbound.recv_async().await {
                engine.on_event(event);
            }
        })
    };

    session.start();

    let generator = OrderFlowGenerator::new(config.flow, engine.clone())?;
    generator.run().await?;

    // Give in-flight executions and scheduled cancels time to land.
    tokio::time::sleep(Duration::from_secs(2)).await;
    session.stop();

    let snapshot = engine.metrics_snapshot();
    tracing::info!("total traded volume: {}", snapshot.total_volume);
    tracing::info!("realized PnL (USD): {}", snapshot.realized_pnl);
    for (symbol, vwap) in &snapshot.vwaps {
        tracing::info!("VWAP for {}: ${:.2}", symbol, vwap);
    }
    tracing::info!(
        "orders tracked: {} ({} still open)",
        engine.registry().len(),
        engine.registry().open_orders().len()
    );

    consumer.abort();
    Ok(())
}
