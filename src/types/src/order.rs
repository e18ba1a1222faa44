use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const HIDDEN: u64 = 1 << 6;
pub const REDUCE_ONLY: u64 = 1 << 10;
pub const POST_ONLY: u64 = 1 << 12;
pub const OCO: u64 = 1 << 14;

/// An order handed through to the exchange's authenticated socket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub symbol: String,
    pub order_type: String,
    /// Negative to sell.
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub cid: u64,
    pub gid: Option<u64>,
    pub flags: u64,
    pub lev: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderOp {
    Submit(NewOrder),
    Cancel { id: String },
}
