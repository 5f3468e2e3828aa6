//! Trade engine - ties the registry, the aggregator and the session together.
//!
//! Two lines of activity meet here: the outbound path (generator submitting
//! orders and cancels) and the inbound path (session callbacks delivered in
//! arrival order). Shared state is the lock-guarded registry and aggregator;
//! nothing in this module blocks on network I/O.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::{ClOrdId, Error, ExecKind, OrderType, Result, Side, Symbol};
use crate::session::{OutboundMessage, Session, SessionEvent};

pub mod dispatch;
pub mod metrics;
pub mod registry;

pub use dispatch::{AppMessage, ExecutionReport, classify};
pub use metrics::{ExecutionAggregator, MetricsSnapshot, PortfolioMetrics};
pub use registry::OrderRegistry;

pub struct TradeEngine {
    registry: Arc<OrderRegistry>,
    aggregator: Arc<ExecutionAggregator>,
    session: Arc<dyn Session>,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
    logon_timeout: Duration,
}

impl TradeEngine {
    pub fn new(session: Arc<dyn Session>, logon_timeout: Duration) -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self {
            registry: Arc::new(OrderRegistry::new()),
            aggregator: Arc::new(ExecutionAggregator::new()),
            session,
            ready_tx,
            ready_rx,
            logon_timeout,
        }
    }

    pub fn registry(&self) -> &OrderRegistry {
        &self.registry
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    /// Block (asynchronously) until the session confirms logon, up to the
    /// configured timeout. Expiry is `NotReady` — submission before logon is
    /// an error, never a silent drop.
    pub async fn wait_ready(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        let mut rx = self.ready_rx.clone();
        tokio::time::timeout(self.logon_timeout, rx.wait_for(|ready| *ready))
            .await
            .map_err(|_| {
                Error::NotReady(format!("no logon within {:?}", self.logon_timeout))
            })?
            .map_err(|_| Error::NotReady("session closed before logon".into()))?;
        Ok(())
    }

    /// Register a new order and hand it to the session. The order is in the
    /// registry (as `PendingNew`) before the collaborator ever sees it.
    pub fn submit_order(
        &self,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        price: Option<Decimal>,
        quantity: Decimal,
    ) -> Result<ClOrdId> {
        if !self.is_ready() {
            return Err(Error::NotReady("submit_order before logon".into()));
        }

        // A limit price on a market order is meaningless; drop it rather than
        // leak it to the wire.
        let price = match order_type {
            OrderType::Limit => price,
            OrderType::Market => None,
        };

        let cl_ord_id =
            self.registry
                .register(symbol.clone(), side, order_type, price, quantity)?;

        let msg = OutboundMessage::NewOrder {
            cl_ord_id: cl_ord_id.clone(),
            symbol,
            side,
            order_type,
            price,
            quantity,
        };
        if let Err(e) = self.session.send(&msg) {
            // The counterparty never saw this order; close it out locally.
            let _ = self.registry.apply_reject(&cl_ord_id);
            return Err(e);
        }
        debug!("submitted {}", cl_ord_id);
        Ok(cl_ord_id)
    }

    /// Request cancellation of a live order. Resolution (ack or
    /// cancel-reject) arrives later on the inbound path.
    pub fn submit_cancel(&self, orig: &ClOrdId) -> Result<ClOrdId> {
        if !self.is_ready() {
            return Err(Error::NotReady("submit_cancel before logon".into()));
        }

        let order = self
            .registry
            .get(orig)
            .ok_or_else(|| Error::UnknownOrder(orig.to_string()))?;
        let cancel_id = self.registry.request_cancel(orig, order.quantity)?;

        let msg = OutboundMessage::CancelRequest {
            cl_ord_id: cancel_id.clone(),
            orig_cl_ord_id: orig.clone(),
            symbol: order.symbol,
            side: order.side,
            quantity: order.quantity,
        };
        if let Err(e) = self.session.send(&msg) {
            // Undo the pending transition; the request never left.
            let _ = self.registry.apply_cancel_reject(&cancel_id);
            return Err(e);
        }
        debug!("cancel {} -> {}", orig, cancel_id);
        Ok(cancel_id)
    }

    /// Inbound event entry point. Total: every event resolves to exactly one
    /// handler or the no-op path, and per-event errors are logged here rather
    /// than unwound — one malformed event must not stop the ones behind it.
    pub fn on_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Logon => {
                info!("session logon confirmed");
                self.ready_tx.send_replace(true);
            }
            SessionEvent::Logout => {
                info!("session logout");
                self.ready_tx.send_replace(false);
            }
            SessionEvent::Message(raw) => match classify(&raw) {
                Ok(msg) => self.handle_app_message(msg),
                Err(e) => warn!("dropping malformed {} message: {}", raw.msg_type, e),
            },
        }
    }

    fn handle_app_message(&self, msg: AppMessage) {
        match msg {
            AppMessage::Execution(report) => self.handle_execution(report),
            AppMessage::Reject { cl_ord_id } => match cl_ord_id {
                Some(id) => {
                    if let Err(e) = self.registry.apply_reject(&id) {
                        warn!("reject for {}: {}", id, e);
                    }
                }
                None => warn!("session-level reject without an order id"),
            },
            AppMessage::CancelReject { cancel_id } => match cancel_id {
                Some(id) => {
                    if let Err(e) = self.registry.apply_cancel_reject(&id) {
                        warn!("cancel-reject for {}: {}", id, e);
                    }
                }
                None => warn!("cancel-reject without a cancel id"),
            },
            AppMessage::Unhandled => debug!("unhandled message type, ignored"),
        }
    }

    fn handle_execution(&self, report: ExecutionReport) {
        match report.exec_type {
            ExecKind::New => {
                if let Err(e) = self.registry.apply_ack(&report.cl_ord_id) {
                    warn!("ack for {}: {}", report.cl_ord_id, e);
                }
            }
            ExecKind::PartialFill | ExecKind::Fill => {
                // classify guarantees fill fields are present here.
                let Some(fill) = report.as_fill() else {
                    warn!("fill report {} without fill fields", report.exec_id);
                    return;
                };
                // Dedup first: a replayed report must touch neither the
                // metrics nor the order's cumulative quantity.
                if !self.aggregator.on_fill(&fill) {
                    return;
                }
                match self.registry.apply_fill(&report.cl_ord_id, fill.quantity) {
                    Ok(status) => debug!("{} -> {:?}", report.cl_ord_id, status),
                    Err(e) => warn!("fill for {}: {}", report.cl_ord_id, e),
                }
            }
            ExecKind::Canceled => {
                // Resolve by the cancel id we assigned; if the counterparty
                // acks under its own id, fall back to OrigClOrdID (tag 41).
                let mut applied = self.registry.apply_canceled(&report.cl_ord_id);
                if let (Err(Error::UnknownOrder(_)), Some(orig)) =
                    (&applied, &report.orig_cl_ord_id)
                {
                    applied = self.registry.apply_canceled(orig);
                }
                if let Err(e) = applied {
                    warn!("cancel ack for {}: {}", report.cl_ord_id, e);
                }
            }
            ExecKind::Rejected => {
                if let Err(e) = self.registry.apply_reject(&report.cl_ord_id) {
                    warn!("exec reject for {}: {}", report.cl_ord_id, e);
                }
            }
            ExecKind::Other(c) => debug!("exec type '{}' ignored", c),
        }
    }

    pub fn vwap(&self, symbol: &Symbol) -> Option<Decimal> {
        self.aggregator.vwap(symbol)
    }

    /// Consistent point-in-time read of the running metrics.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.aggregator.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OrderStatus;
    use crate::session::{RawMessage, tags};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    /// Records outbound traffic; optionally refuses it.
    struct RecordingSession {
        sent: Mutex<Vec<OutboundMessage>>,
        fail: bool,
    }

    impl RecordingSession {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    impl Session for RecordingSession {
        fn send(&self, msg: &OutboundMessage) -> crate::core::Result<()> {
            if self.fail {
                return Err(Error::Session("wire down".into()));
            }
            self.sent.lock().push(msg.clone());
            Ok(())
        }
    }

    fn ready_engine(session: Arc<RecordingSession>) -> TradeEngine {
        let engine = TradeEngine::new(session, Duration::from_millis(50));
        engine.on_event(SessionEvent::Logon);
        engine
    }

    fn exec(cl_ord_id: &str, exec_id: &str, exec_type: char) -> RawMessage {
        RawMessage::new(tags::MSG_EXECUTION_REPORT)
            .with(tags::CL_ORD_ID, cl_ord_id)
            .with(tags::EXEC_ID, exec_id)
            .with(tags::EXEC_TYPE, exec_type)
            .with(tags::SYMBOL, "X")
            .with(tags::SIDE, "1")
    }

    #[test]
    fn test_submission_before_logon_is_not_ready() {
        let engine = TradeEngine::new(
            Arc::new(RecordingSession::new()),
            Duration::from_millis(50),
        );
        let err = engine
            .submit_order(
                Symbol::new("MSFT"),
                Side::Buy,
                OrderType::Market,
                None,
                dec!(10),
            )
            .unwrap_err();
        assert!(matches!(err, Error::NotReady(_)));
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn test_logout_gates_submission_again() {
        let session = Arc::new(RecordingSession::new());
        let engine = ready_engine(session);
        engine.on_event(SessionEvent::Logout);
        assert!(!engine.is_ready());
        assert!(matches!(
            engine.submit_cancel(&ClOrdId::new("ORD-1")),
            Err(Error::NotReady(_))
        ));
    }

    #[test]
    fn test_order_registered_before_send() {
        let session = Arc::new(RecordingSession::new());
        let engine = ready_engine(session.clone());

        let id = engine
            .submit_order(
                Symbol::new("MSFT"),
                Side::Sell,
                OrderType::Limit,
                Some(dec!(42.50)),
                dec!(7),
            )
            .unwrap();

        assert_eq!(engine.registry().get(&id).unwrap().status, OrderStatus::PendingNew);
        let sent = session.sent.lock();
        assert_eq!(sent.len(), 1);
        let OutboundMessage::NewOrder { cl_ord_id, price, .. } = &sent[0] else {
            panic!("expected new order on the wire");
        };
        assert_eq!(cl_ord_id, &id);
        assert_eq!(*price, Some(dec!(42.50)));
    }

    #[test]
    fn test_failed_send_closes_order_locally() {
        let engine = {
            let session = Arc::new(RecordingSession::failing());
            let engine = TradeEngine::new(session, Duration::from_millis(50));
            engine.on_event(SessionEvent::Logon);
            engine
        };
        let err = engine
            .submit_order(
                Symbol::new("BAC"),
                Side::Buy,
                OrderType::Market,
                None,
                dec!(1),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Session(_)));
        // The order exists but is terminal; it will never get events.
        let orders = engine.registry().open_orders();
        assert!(orders.is_empty());
    }

    #[test]
    fn test_fill_scenario_pnl_and_vwap() {
        let session = Arc::new(RecordingSession::new());
        let engine = ready_engine(session);

        let id = engine
            .submit_order(
                Symbol::new("X"),
                Side::Buy,
                OrderType::Limit,
                Some(dec!(10.50)),
                dec!(100),
            )
            .unwrap();

        engine.on_event(SessionEvent::Message(exec(id.as_str(), "E-0", '0')));
        engine.on_event(SessionEvent::Message(
            exec(id.as_str(), "E-1", '1')
                .with(tags::LAST_PX, "10.00")
                .with(tags::LAST_QTY, "40"),
        ));
        engine.on_event(SessionEvent::Message(
            exec(id.as_str(), "E-2", '2')
                .with(tags::LAST_PX, "10.50")
                .with(tags::LAST_QTY, "60"),
        ));

        assert_eq!(engine.registry().get(&id).unwrap().status, OrderStatus::Filled);
        let snap = engine.metrics_snapshot();
        assert_eq!(snap.realized_pnl, dec!(-1030.0));
        assert_eq!(snap.total_volume, dec!(100));
        assert_eq!(engine.vwap(&Symbol::new("X")), Some(dec!(10.30)));
    }

    #[test]
    fn test_replayed_fill_event_is_idempotent() {
        let session = Arc::new(RecordingSession::new());
        let engine = ready_engine(session);
        let id = engine
            .submit_order(
                Symbol::new("X"),
                Side::Buy,
                OrderType::Limit,
                Some(dec!(10.00)),
                dec!(100),
            )
            .unwrap();

        let fill = exec(id.as_str(), "E-1", '1')
            .with(tags::LAST_PX, "10.00")
            .with(tags::LAST_QTY, "40");
        engine.on_event(SessionEvent::Message(fill.clone()));
        engine.on_event(SessionEvent::Message(fill));

        // Applied once by exec id: metrics and cumulative quantity agree.
        let snap = engine.metrics_snapshot();
        assert_eq!(snap.total_volume, dec!(40));
        assert_eq!(snap.realized_pnl, dec!(-400));
        assert_eq!(engine.registry().get(&id).unwrap().filled, dec!(40));
    }

    #[test]
    fn test_cancel_of_unknown_order_changes_nothing() {
        let session = Arc::new(RecordingSession::new());
        let engine = ready_engine(session.clone());
        let before = engine.metrics_snapshot();

        let err = engine.submit_cancel(&ClOrdId::new("GHOST")).unwrap_err();
        assert!(matches!(err, Error::UnknownOrder(_)));

        let after = engine.metrics_snapshot();
        assert_eq!(before.total_volume, after.total_volume);
        assert_eq!(before.realized_pnl, after.realized_pnl);
        assert!(engine.registry().is_empty());
        assert!(session.sent.lock().is_empty());
    }

    #[test]
    fn test_cancel_roundtrip_through_events() {
        let session = Arc::new(RecordingSession::new());
        let engine = ready_engine(session);
        let id = engine
            .submit_order(
                Symbol::new("AAPL"),
                Side::Sell,
                OrderType::Limit,
                Some(dec!(30)),
                dec!(10),
            )
            .unwrap();
        engine.on_event(SessionEvent::Message(exec(id.as_str(), "E-0", '0')));

        let cancel_id = engine.submit_cancel(&id).unwrap();
        assert_eq!(
            engine.registry().get(&id).unwrap().status,
            OrderStatus::CancelPending
        );

        // Counterparty refuses, order returns to Open.
        engine.on_event(SessionEvent::Message(
            RawMessage::new(tags::MSG_ORDER_CANCEL_REJECT).with(tags::CL_ORD_ID, cancel_id.as_str()),
        ));
        assert_eq!(engine.registry().get(&id).unwrap().status, OrderStatus::Open);

        // Second attempt succeeds with a cancel ack.
        let cancel_id = engine.submit_cancel(&id).unwrap();
        engine.on_event(SessionEvent::Message(exec(cancel_id.as_str(), "E-9", '4')));
        assert_eq!(
            engine.registry().get(&id).unwrap().status,
            OrderStatus::Cancelled
        );
    }

    #[test]
    fn test_cancel_ack_resolves_by_orig_id() {
        // Some counterparties ack a cancel under their own ClOrdID and only
        // carry ours in OrigClOrdID. The ack must still land.
        let session = Arc::new(RecordingSession::new());
        let engine = ready_engine(session);
        let id = engine
            .submit_order(
                Symbol::new("AAPL"),
                Side::Sell,
                OrderType::Limit,
                Some(dec!(30)),
                dec!(10),
            )
            .unwrap();
        engine.on_event(SessionEvent::Message(exec(id.as_str(), "E-0", '0')));
        engine.submit_cancel(&id).unwrap();

        engine.on_event(SessionEvent::Message(
            exec("THEIRS-1", "E-1", '4').with(tags::ORIG_CL_ORD_ID, id.as_str()),
        ));
        assert_eq!(
            engine.registry().get(&id).unwrap().status,
            OrderStatus::Cancelled
        );
    }

    #[test]
    fn test_malformed_event_does_not_stop_the_loop() {
        let session = Arc::new(RecordingSession::new());
        let engine = ready_engine(session);
        let id = engine
            .submit_order(
                Symbol::new("X"),
                Side::Sell,
                OrderType::Market,
                None,
                dec!(5),
            )
            .unwrap();

        // Garbage price, then a valid fill behind it.
        engine.on_event(SessionEvent::Message(
            exec(id.as_str(), "E-1", '2')
                .with(tags::SIDE, "2")
                .with(tags::LAST_PX, "not-a-price")
                .with(tags::LAST_QTY, "5"),
        ));
        engine.on_event(SessionEvent::Message(
            exec(id.as_str(), "E-2", '2')
                .with(tags::SIDE, "2")
                .with(tags::LAST_PX, "20")
                .with(tags::LAST_QTY, "5"),
        ));

        let snap = engine.metrics_snapshot();
        assert_eq!(snap.total_volume, dec!(5));
        assert_eq!(snap.realized_pnl, dec!(100));
    }

    #[tokio::test]
    async fn test_wait_ready_times_out_as_not_ready() {
        let engine = TradeEngine::new(
            Arc::new(RecordingSession::new()),
            Duration::from_millis(10),
        );
        assert!(matches!(engine.wait_ready().await, Err(Error::NotReady(_))));

        engine.on_event(SessionEvent::Logon);
        assert!(engine.wait_ready().await.is_ok());
    }
}
