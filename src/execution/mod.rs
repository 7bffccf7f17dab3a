//! Execution module
//!
//! Paper fills with fees and slippage against an in-memory ledger of
//! portfolios. The ledger is the only writer of cash and positions.

mod paper;
mod types;

pub use paper::{CloseRequest, ExecutionService, OpenRequest};
pub use types::{
    ClosedTrade, ExecutionError, Fill, FillCosts, OpenedPosition, OrderId, PortfolioState, Side,
};
