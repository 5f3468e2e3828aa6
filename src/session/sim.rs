//! Loopback session - a counterparty stand-in for soak runs and integration
//! tests.
//!
//! Accepts outbound messages and answers them with synthesized inbound
//! events over a flume channel: acks, one- or two-part executions at the
//! submitted price, cancel acks and cancel-rejects, by configured
//! probability. A single consumer drains the channel into the engine, so the
//! inbound path stays ordered exactly like a real session callback thread.

use rand::Rng;
use rust_decimal::Decimal;
use std::time::Duration;
use uuid::Uuid;

use crate::core::{Result, SessionConfig};
use crate::session::{OutboundMessage, RawMessage, Session, SessionEvent, tags};

pub struct SimSession {
    config: SessionConfig,
    events: flume::Sender<SessionEvent>,
}

impl SimSession {
    /// Build the session plus the inbound event stream it will write to.
    pub fn new(config: SessionConfig) -> (Self, flume::Receiver<SessionEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { config, events: tx }, rx)
    }

    /// Begin the session: a real engine would handshake here, the sim just
    /// confirms logon.
    pub fn start(&self) {
        let _ = self.events.send(SessionEvent::Logon);
    }

    pub fn stop(&self) {
        let _ = self.events.send(SessionEvent::Logout);
    }

    fn exec_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Queue synthesized events, each delivered after a small jitter so the
    /// inbound path genuinely interleaves with the generator.
    fn deliver(&self, events: Vec<RawMessage>) {
        let tx = self.events.clone();
        let mut rng = rand::rng();
        let delays: Vec<Duration> = events
            .iter()
            .map(|_| Duration::from_millis(rng.random_range(1..=20)))
            .collect();
        tokio::spawn(async move {
            for (msg, jitter) in events.into_iter().zip(delays) {
                tokio::time::sleep(jitter).await;
                if tx.send_async(SessionEvent::Message(msg)).await.is_err() {
                    return;
                }
            }
        });
    }

    fn plan_new_order(
        &self,
        cl_ord_id: &str,
        symbol: &str,
        side: char,
        price: Option<Decimal>,
        quantity: Decimal,
    ) -> Vec<RawMessage> {
        let mut rng = rand::rng();
        let base = |exec_type: char| {
            RawMessage::new(tags::MSG_EXECUTION_REPORT)
                .with(tags::CL_ORD_ID, cl_ord_id)
                .with(tags::EXEC_ID, Self::exec_id())
                .with(tags::EXEC_TYPE, exec_type)
                .with(tags::SYMBOL, symbol)
                .with(tags::SIDE, side)
        };

        let mut events = vec![base('0')];

        if rng.random_range(0.0..1.0) >= self.config.fill_probability {
            // Order rests unexecuted; a cancel may still reap it later.
            return events;
        }

        // Market orders carry no price; execute them at an arbitrary level.
        let px = price.unwrap_or_else(|| {
            Decimal::try_from(rng.random_range(1.0..=100.0))
                .unwrap_or(Decimal::ONE)
                .round_dp(2)
        });

        let first_part = (quantity / Decimal::TWO).floor();
        let split = rng.random_range(0.0..1.0) < self.config.partial_fill_probability
            && first_part > Decimal::ZERO
            && first_part < quantity;

        if split {
            events.push(
                base('1')
                    .with(tags::LAST_PX, px)
                    .with(tags::LAST_QTY, first_part),
            );
            events.push(
                base('2')
                    .with(tags::LAST_PX, px)
                    .with(tags::LAST_QTY, quantity - first_part),
            );
        } else {
            events.push(base('2').with(tags::LAST_PX, px).with(tags::LAST_QTY, quantity));
        }
        events
    }

    fn plan_cancel(
        &self,
        cl_ord_id: &str,
        orig_cl_ord_id: &str,
        symbol: &str,
        side: char,
    ) -> Vec<RawMessage> {
        let mut rng = rand::rng();
        if rng.random_range(0.0..1.0) < self.config.cancel_reject_probability {
            vec![RawMessage::new(tags::MSG_ORDER_CANCEL_REJECT).with(tags::CL_ORD_ID, cl_ord_id)]
        } else {
            vec![
                RawMessage::new(tags::MSG_EXECUTION_REPORT)
                    .with(tags::CL_ORD_ID, cl_ord_id)
                    .with(tags::ORIG_CL_ORD_ID, orig_cl_ord_id)
                    .with(tags::EXEC_ID, Self::exec_id())
                    .with(tags::EXEC_TYPE, '4')
                    .with(tags::SYMBOL, symbol)
                    .with(tags::SIDE, side),
            ]
        }
    }
}

impl Session for SimSession {
    fn send(&self, msg: &OutboundMessage) -> Result<()> {
        let events = match msg {
            OutboundMessage::NewOrder {
                cl_ord_id,
                symbol,
                side,
                price,
                quantity,
                ..
            } => self.plan_new_order(
                cl_ord_id.as_str(),
                symbol.as_str(),
                side.fix_value(),
                *price,
                *quantity,
            ),
            OutboundMessage::CancelRequest {
                cl_ord_id,
                orig_cl_ord_id,
                symbol,
                side,
                ..
            } => self.plan_cancel(
                cl_ord_id.as_str(),
                orig_cl_ord_id.as_str(),
                symbol.as_str(),
                side.fix_value(),
            ),
        };
        self.deliver(events);
        Ok(())
    }
}
