//! Core types - Strong typing for order and execution state

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tradeable symbol (e.g., "MSFT")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client order identifier (FIX tag 11), unique per session lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClOrdId(String);

impl ClOrdId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClOrdId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order side (FIX tag 54)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
    SellShort,
}

impl Side {
    /// Cash-ledger sign of an execution: buys consume cash, sells raise it.
    pub fn pnl_sign(self) -> Decimal {
        match self {
            Side::Buy => Decimal::NEGATIVE_ONE,
            Side::Sell | Side::SellShort => Decimal::ONE,
        }
    }

    /// FIX tag 54 value.
    pub fn fix_value(self) -> char {
        match self {
            Side::Buy => '1',
            Side::Sell => '2',
            Side::SellShort => '5',
        }
    }

    pub fn from_fix(c: char) -> Option<Self> {
        match c {
            '1' => Some(Side::Buy),
            '2' => Some(Side::Sell),
            '5' => Some(Side::SellShort),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
            Side::SellShort => write!(f, "SELL_SHORT"),
        }
    }
}

/// Order type (FIX tag 40)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn fix_value(self) -> char {
        match self {
            OrderType::Market => '1',
            OrderType::Limit => '2',
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Order status - the per-order state machine.
///
/// `PendingNew` is set at submission, before the counterparty acknowledges.
/// `Filled`, `Cancelled` and `Rejected` are terminal: no later event may move
/// an order out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingNew,
    Open,
    PartiallyFilled,
    Filled,
    CancelPending,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// Execution type carried on an execution report (FIX tag 150)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecKind {
    New,
    PartialFill,
    Fill,
    Canceled,
    Rejected,
    Other(char),
}

impl ExecKind {
    pub fn from_fix(c: char) -> Self {
        match c {
            '0' => ExecKind::New,
            '1' => ExecKind::PartialFill,
            '2' => ExecKind::Fill,
            '4' => ExecKind::Canceled,
            '8' => ExecKind::Rejected,
            other => ExecKind::Other(other),
        }
    }

    /// Only fills and partial fills move money and volume.
    pub fn is_fill(self) -> bool {
        matches!(self, ExecKind::Fill | ExecKind::PartialFill)
    }
}

/// A tracked order. Owned exclusively by the registry; mutated only through
/// registry operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub cl_ord_id: ClOrdId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    /// Present only for limit orders
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    /// Cumulative executed quantity
    pub filled: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn remaining(&self) -> Decimal {
        self.quantity - self.filled
    }
}

/// Immutable value extracted from one execution event. Consumed exactly once
/// by the aggregator; `exec_id` (FIX tag 17) is the dedup key for replayed
/// reports.
#[derive(Debug, Clone)]
pub struct Fill {
    pub exec_id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
}

impl Fill {
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}
