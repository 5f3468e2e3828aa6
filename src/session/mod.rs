//! Session surface - the boundary with the external FIX engine.
//!
//! The core never touches sockets, sequence numbers, or tag/value framing.
//! It hands typed outbound messages to a [`Session`] collaborator and
//! consumes decoded-but-untyped [`RawMessage`]s back, one per inbound event,
//! in arrival order.

use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::core::{ClOrdId, OrderType, Result, Side, Symbol};

pub mod sim;

/// FIX tag numbers and message types the core reads and writes. Field-level
/// wire syntax belongs to the session engine; the numbering is shared
/// vocabulary.
pub mod tags {
    pub const CL_ORD_ID: u32 = 11;
    pub const EXEC_ID: u32 = 17;
    pub const LAST_PX: u32 = 31;
    pub const LAST_QTY: u32 = 32;
    pub const ORDER_QTY: u32 = 38;
    pub const ORD_TYPE: u32 = 40;
    pub const ORIG_CL_ORD_ID: u32 = 41;
    pub const PRICE: u32 = 44;
    pub const SIDE: u32 = 54;
    pub const SYMBOL: u32 = 55;
    pub const EXEC_TYPE: u32 = 150;

    pub const MSG_REJECT: &str = "3";
    pub const MSG_LOGOUT: &str = "5";
    pub const MSG_EXECUTION_REPORT: &str = "8";
    pub const MSG_ORDER_CANCEL_REJECT: &str = "9";
    pub const MSG_LOGON: &str = "A";
}

/// Typed outbound request, constructed by the engine and encoded by the
/// session collaborator.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    NewOrder {
        cl_ord_id: ClOrdId,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        price: Option<Decimal>,
        quantity: Decimal,
    },
    CancelRequest {
        cl_ord_id: ClOrdId,
        orig_cl_ord_id: ClOrdId,
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
    },
}

/// One decoded inbound message: its type tag plus the field values the
/// decoder extracted. Values stay as text until the dispatcher parses the
/// ones its message type requires.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub msg_type: String,
    fields: HashMap<u32, String>,
}

impl RawMessage {
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with(mut self, tag: u32, value: impl ToString) -> Self {
        self.fields.insert(tag, value.to_string());
        self
    }

    pub fn field(&self, tag: u32) -> Option<&str> {
        self.fields.get(&tag).map(String::as_str)
    }
}

/// One inbound event from the session engine. Lifecycle notifications gate
/// order submission; application messages carry trading state.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Logon,
    Logout,
    Message(RawMessage),
}

/// Outbound half of the session engine. `send` is fire-and-forget: the only
/// observable outcome is whether the call itself was accepted. Results of the
/// request (acks, fills, rejects) arrive later as [`SessionEvent`]s.
pub trait Session: Send + Sync {
    fn send(&self, msg: &OutboundMessage) -> Result<()>;
}
