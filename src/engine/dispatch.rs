//! Inbound message classification.
//!
//! `classify` is a pure, total function from a decoded message to exactly one
//! typed application message or `Unhandled`. An unexpected message type is
//! never an error; a malformed required field within a recognized type is a
//! `FieldParse` error the caller logs and drops. Either way the dispatch loop
//! keeps running.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::core::{ClOrdId, Error, ExecKind, Fill, Result, Side, Symbol};
use crate::session::{RawMessage, tags};

/// Typed execution report (FIX 35=8) after field validation.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub cl_ord_id: ClOrdId,
    /// Original order id on cancel acks (tag 41), when the engine sent one
    pub orig_cl_ord_id: Option<ClOrdId>,
    pub exec_id: String,
    pub exec_type: ExecKind,
    pub symbol: Symbol,
    pub side: Side,
    /// Present exactly when `exec_type` is a fill (validated by `classify`)
    pub last_px: Option<Decimal>,
    pub last_qty: Option<Decimal>,
}

impl ExecutionReport {
    /// The fill carried by this report, if it is one.
    pub fn as_fill(&self) -> Option<Fill> {
        if !self.exec_type.is_fill() {
            return None;
        }
        Some(Fill {
            exec_id: self.exec_id.clone(),
            symbol: self.symbol.clone(),
            side: self.side,
            price: self.last_px?,
            quantity: self.last_qty?,
        })
    }
}

/// One routed inbound application message.
#[derive(Debug, Clone)]
pub enum AppMessage {
    Execution(ExecutionReport),
    /// Session-level reject of an order (FIX 35=3)
    Reject { cl_ord_id: Option<ClOrdId> },
    /// Cancel request refused (FIX 35=9); carries the cancel's own id
    CancelReject { cancel_id: Option<ClOrdId> },
    /// Recognized-but-unused or unknown message types pass through untouched
    Unhandled,
}

fn required<'a>(msg: &'a RawMessage, tag: u32) -> Result<&'a str> {
    msg.field(tag).ok_or_else(|| Error::missing_field(tag))
}

fn parse_decimal(tag: u32, value: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|_| Error::FieldParse {
        tag,
        value: value.to_string(),
    })
}

fn parse_char(tag: u32, value: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(Error::FieldParse {
            tag,
            value: value.to_string(),
        }),
    }
}

/// Map a decoded inbound message to its handler input. Total over message
/// types; fallible only on malformed fields inside a recognized type.
pub fn classify(msg: &RawMessage) -> Result<AppMessage> {
    match msg.msg_type.as_str() {
        tags::MSG_EXECUTION_REPORT => {
            // Identity fields first: a report that cannot be attributed is
            // reported as such even when its fill fields are also bad.
            let cl_ord_id = ClOrdId::new(required(msg, tags::CL_ORD_ID)?);
            let exec_id = required(msg, tags::EXEC_ID)?.to_string();
            let symbol = Symbol::new(required(msg, tags::SYMBOL)?);
            let side_char = parse_char(tags::SIDE, required(msg, tags::SIDE)?)?;
            let side = Side::from_fix(side_char).ok_or_else(|| Error::FieldParse {
                tag: tags::SIDE,
                value: side_char.to_string(),
            })?;
            let exec_type =
                ExecKind::from_fix(parse_char(tags::EXEC_TYPE, required(msg, tags::EXEC_TYPE)?)?);
            let orig_cl_ord_id = msg.field(tags::ORIG_CL_ORD_ID).map(ClOrdId::new);

            let (last_px, last_qty) = if exec_type.is_fill() {
                // Fills must carry an executed price and quantity.
                let px = parse_decimal(tags::LAST_PX, required(msg, tags::LAST_PX)?)?;
                let qty = parse_decimal(tags::LAST_QTY, required(msg, tags::LAST_QTY)?)?;
                (Some(px), Some(qty))
            } else {
                (None, None)
            };

            Ok(AppMessage::Execution(ExecutionReport {
                cl_ord_id,
                orig_cl_ord_id,
                exec_id,
                exec_type,
                symbol,
                side,
                last_px,
                last_qty,
            }))
        }
        tags::MSG_REJECT => Ok(AppMessage::Reject {
            cl_ord_id: msg.field(tags::CL_ORD_ID).map(ClOrdId::new),
        }),
        tags::MSG_ORDER_CANCEL_REJECT => Ok(AppMessage::CancelReject {
            cancel_id: msg.field(tags::CL_ORD_ID).map(ClOrdId::new),
        }),
        _ => Ok(AppMessage::Unhandled),
    }
}
