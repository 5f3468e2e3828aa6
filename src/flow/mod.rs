//! Synthetic order flow - randomized load against the counterparty.
//!
//! Mirrors the original soak profile: a bounded stream of new orders drawn
//! from a configured universe, each independently followed (by coin flip)
//! with a delayed cancel. Cancels are fire-and-forget; their outcome comes
//! back on the inbound path and is reconciled by the registry.

use rand::Rng;
use rand::seq::IndexedRandom;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::core::{Error, FlowConfig, OrderType, Result, Side, Symbol};
use crate::engine::TradeEngine;

const SIDES: [Side; 3] = [Side::Buy, Side::Sell, Side::SellShort];
const ORDER_TYPES: [OrderType; 2] = [OrderType::Market, OrderType::Limit];

pub struct OrderFlowGenerator {
    config: FlowConfig,
    symbols: Vec<Symbol>,
    engine: Arc<TradeEngine>,
}

/// One sampled order, fully decided before any await point.
struct Draw {
    symbol: Symbol,
    side: Side,
    order_type: OrderType,
    price: Decimal,
    quantity: Decimal,
    cancel_after: Option<Duration>,
    next_delay: Duration,
}

impl OrderFlowGenerator {
    pub fn new(config: FlowConfig, engine: Arc<TradeEngine>) -> Result<Self> {
        if config.symbols.is_empty() {
            return Err(Error::Config("flow.symbols must not be empty".into()));
        }
        let symbols = config.symbols.iter().map(Symbol::new).collect();
        Ok(Self {
            config,
            symbols,
            engine,
        })
    }

    fn draw(&self) -> Draw {
        let mut rng = rand::rng();
        let c = &self.config;
        Draw {
            symbol: self.symbols.choose(&mut rng).cloned().expect("symbols checked at construction"),
            side: *SIDES.choose(&mut rng).expect("sides"),
            order_type: *ORDER_TYPES.choose(&mut rng).expect("order types"),
            price: Decimal::try_from(rng.random_range(c.price_min..=c.price_max))
                .unwrap_or(Decimal::ONE)
                .round_dp(2),
            quantity: Decimal::from(rng.random_range(c.qty_min..=c.qty_max)),
            cancel_after: (rng.random_range(0.0..1.0) < c.cancel_probability).then(|| {
                Duration::from_millis(
                    rng.random_range(c.cancel_delay_ms_min..=c.cancel_delay_ms_max),
                )
            }),
            next_delay: Duration::from_millis(
                rng.random_range(c.order_delay_ms_min..=c.order_delay_ms_max),
            ),
        }
    }

    /// Drive the configured number of orders through the engine. Waits for
    /// logon first; submission before the session is ready is an error, not
    /// a race.
    pub async fn run(&self) -> Result<()> {
        self.engine.wait_ready().await?;
        info!(
            "generating {} orders over {} symbols",
            self.config.order_count,
            self.symbols.len()
        );

        for _ in 0..self.config.order_count {
            let draw = self.draw();
            let price = (draw.order_type == OrderType::Limit).then_some(draw.price);

            let cl_ord_id = match self.engine.submit_order(
                draw.symbol,
                draw.side,
                draw.order_type,
                price,
                draw.quantity,
            ) {
                Ok(id) => id,
                Err(e @ Error::NotReady(_)) => return Err(e),
                Err(e) => {
                    warn!("submission failed: {}", e);
                    sleep(draw.next_delay).await;
                    continue;
                }
            };

            if let Some(delay) = draw.cancel_after {
                let engine = self.engine.clone();
                tokio::spawn(async move {
                    sleep(delay).await;
                    match engine.submit_cancel(&cl_ord_id) {
                        Ok(cancel_id) => debug!("cancel {} for {}", cancel_id, cl_ord_id),
                        // Order already terminal by the time the cancel fired.
                        Err(Error::UnknownOrder(reason)) => debug!("cancel skipped: {}", reason),
                        Err(e) => warn!("cancel for {} failed: {}", cl_ord_id, e),
                    }
                });
            }

            sleep(draw.next_delay).await;
        }

        info!("order flow complete");
        Ok(())
    }
}
