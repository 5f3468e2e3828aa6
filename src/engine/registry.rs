//! Order registry - owns every order the client has submitted.
//!
//! Single writer-side table guarded by a `parking_lot::RwLock`, shared
//! between the generator (registrations, cancel requests) and the inbound
//! event path (acks, fills, rejects). Identifier allocation is an atomic
//! counter, so concurrent registration can never collide.

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::core::{ClOrdId, Error, Order, OrderStatus, OrderType, Result, Side, Symbol};

/// Links an outstanding cancel request to the order it targets. Removed once
/// the cancel resolves (ack or cancel-reject). `prior_status` is the open
/// status restored when the counterparty refuses the cancel.
#[derive(Debug, Clone)]
struct CancelLink {
    orig_id: ClOrdId,
    prior_status: OrderStatus,
}

pub struct OrderRegistry {
    orders: RwLock<HashMap<ClOrdId, Order>>,
    cancels: RwLock<HashMap<ClOrdId, CancelLink>>,
    next_id: AtomicU64,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            cancels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_seq(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Create a new order in `PendingNew` under a fresh process-unique
    /// identifier.
    pub fn register(
        &self,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        price: Option<Decimal>,
        quantity: Decimal,
    ) -> Result<ClOrdId> {
        let id = ClOrdId::new(format!("ORD-{}", self.next_seq()));
        self.register_with_id(id.clone(), symbol, side, order_type, price, quantity)?;
        Ok(id)
    }

    /// Create a new order under a caller-supplied identifier. Fails with
    /// `DuplicateIdentifier` if the id is already tracked.
    pub fn register_with_id(
        &self,
        cl_ord_id: ClOrdId,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        price: Option<Decimal>,
        quantity: Decimal,
    ) -> Result<()> {
        let now = Utc::now();
        let order = Order {
            cl_ord_id: cl_ord_id.clone(),
            symbol,
            side,
            order_type,
            price,
            quantity,
            filled: Decimal::ZERO,
            status: OrderStatus::PendingNew,
            created_at: now,
            updated_at: now,
        };

        let mut orders = self.orders.write();
        if orders.contains_key(&cl_ord_id) {
            return Err(Error::DuplicateIdentifier(cl_ord_id.to_string()));
        }
        orders.insert(cl_ord_id, order);
        Ok(())
    }

    /// Link a fresh cancel identifier to `orig` and move the order to
    /// `CancelPending`. Terminal or unknown originals (and orders that
    /// already have a cancel in flight) are not cancelable.
    pub fn request_cancel(&self, orig: &ClOrdId, quantity: Decimal) -> Result<ClOrdId> {
        let mut orders = self.orders.write();
        let order = orders
            .get_mut(orig)
            .ok_or_else(|| Error::UnknownOrder(orig.to_string()))?;

        if order.status.is_terminal() {
            return Err(Error::UnknownOrder(format!(
                "{} is terminal ({:?})",
                orig, order.status
            )));
        }
        if order.status == OrderStatus::CancelPending {
            return Err(Error::UnknownOrder(format!("{} already has a cancel in flight", orig)));
        }

        debug!("cancel requested for {} (qty {})", orig, quantity);
        let cancel_id = ClOrdId::new(format!("CXL-{}", self.next_seq()));
        self.cancels.write().insert(
            cancel_id.clone(),
            CancelLink {
                orig_id: orig.clone(),
                prior_status: order.status,
            },
        );
        order.status = OrderStatus::CancelPending;
        order.updated_at = Utc::now();
        Ok(cancel_id)
    }

    /// Counterparty acknowledged the order: `PendingNew -> Open`. Late acks
    /// for orders already past `PendingNew` are ignored.
    pub fn apply_ack(&self, cl_ord_id: &ClOrdId) -> Result<()> {
        let mut orders = self.orders.write();
        let order = orders
            .get_mut(cl_ord_id)
            .ok_or_else(|| Error::UnknownOrder(cl_ord_id.to_string()))?;

        if order.status == OrderStatus::PendingNew {
            order.status = OrderStatus::Open;
            order.updated_at = Utc::now();
        } else {
            debug!("late ack for {} in {:?}, ignored", cl_ord_id, order.status);
        }
        Ok(())
    }

    /// Apply executed quantity to an order and return its new status.
    ///
    /// Terminal orders never regress: a replayed fill against a `Filled`
    /// order is a no-op. Unknown identifiers are an error for the caller to
    /// log — late events from the network are expected, not fatal.
    pub fn apply_fill(&self, cl_ord_id: &ClOrdId, quantity: Decimal) -> Result<OrderStatus> {
        let mut orders = self.orders.write();
        let order = orders
            .get_mut(cl_ord_id)
            .ok_or_else(|| Error::UnknownOrder(cl_ord_id.to_string()))?;

        if order.status.is_terminal() {
            debug!(
                "fill for terminal order {} ({:?}), ignored",
                cl_ord_id, order.status
            );
            return Ok(order.status);
        }

        // Clamp so an over-reported last quantity cannot push cumulative
        // executed quantity past the requested amount.
        order.filled = (order.filled + quantity).min(order.quantity);
        order.status = if order.filled >= order.quantity {
            OrderStatus::Filled
        } else if order.status == OrderStatus::CancelPending {
            // Quantity is accounted, but the cancel is still outstanding.
            OrderStatus::CancelPending
        } else {
            OrderStatus::PartiallyFilled
        };
        order.updated_at = Utc::now();
        Ok(order.status)
    }

    /// Counterparty confirmed a cancel. The id may be the cancel's own
    /// identifier (resolved through its link) or, from some engines, the
    /// original order id directly.
    pub fn apply_canceled(&self, id: &ClOrdId) -> Result<()> {
        let link = self.cancels.write().remove(id);
        let target = match &link {
            Some(link) => &link.orig_id,
            None => id,
        };

        let mut orders = self.orders.write();
        let order = orders
            .get_mut(target)
            .ok_or_else(|| Error::UnknownOrder(target.to_string()))?;

        if order.status.is_terminal() {
            debug!(
                "cancel ack for terminal order {} ({:?}), ignored",
                target, order.status
            );
            return Ok(());
        }
        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        Ok(())
    }

    /// Counterparty rejected the order outright.
    pub fn apply_reject(&self, cl_ord_id: &ClOrdId) -> Result<()> {
        let mut orders = self.orders.write();
        let order = orders
            .get_mut(cl_ord_id)
            .ok_or_else(|| Error::UnknownOrder(cl_ord_id.to_string()))?;

        if order.status.is_terminal() {
            debug!(
                "reject for terminal order {} ({:?}), ignored",
                cl_ord_id, order.status
            );
            return Ok(());
        }
        order.status = OrderStatus::Rejected;
        order.updated_at = Utc::now();
        Ok(())
    }

    /// Counterparty refused a cancel request: restore the original order to
    /// the status it held before the cancel went out. Fills that landed while
    /// the cancel was in flight win over the stored prior status.
    pub fn apply_cancel_reject(&self, cancel_id: &ClOrdId) -> Result<()> {
        let link = self
            .cancels
            .write()
            .remove(cancel_id)
            .ok_or_else(|| Error::UnknownOrder(cancel_id.to_string()))?;

        let mut orders = self.orders.write();
        let order = orders
            .get_mut(&link.orig_id)
            .ok_or_else(|| Error::UnknownOrder(link.orig_id.to_string()))?;

        match order.status {
            OrderStatus::CancelPending => {
                order.status = if order.filled > Decimal::ZERO {
                    OrderStatus::PartiallyFilled
                } else {
                    link.prior_status
                };
                order.updated_at = Utc::now();
            }
            other => {
                warn!(
                    "cancel-reject for {} but order is {:?}, leaving as-is",
                    link.orig_id, other
                );
            }
        }
        Ok(())
    }

    pub fn get(&self, cl_ord_id: &ClOrdId) -> Option<Order> {
        self.orders.read().get(cl_ord_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }

    /// Orders still awaiting a terminal outcome.
    pub fn open_orders(&self) -> Vec<Order> {
        self.orders
            .read()
            .values()
            .filter(|o| !o.status.is_terminal())
            .cloned()
            .collect()
    }
}

impl Default for OrderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
