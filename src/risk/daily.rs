//! Daily accumulators, reset at the UTC day boundary

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Today's net cash flow and realized P&L for one portfolio
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyLedger {
    /// UTC day the accumulators belong to
    pub day: Option<NaiveDate>,
    /// Fill cash flow: buys negative, sells positive
    pub net_flow: f64,
    pub realized_pnl: f64,
}

impl DailyLedger {
    /// Reset the accumulators when `now` falls on a new UTC day.
    /// Returns true when a reset happened.
    pub fn roll(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        if self.day == Some(today) {
            return false;
        }
        let rolled = self.day.is_some();
        self.day = Some(today);
        self.net_flow = 0.0;
        self.realized_pnl = 0.0;
        rolled
    }

    pub fn record_flow(&mut self, amount: f64, now: DateTime<Utc>) {
        self.roll(now);
        self.net_flow += amount;
    }

    pub fn record_pnl(&mut self, pnl: f64, now: DateTime<Utc>) {
        self.roll(now);
        self.realized_pnl += pnl;
    }

    /// Net flow as of `now`, zero if nothing was recorded today
    pub fn net_flow_at(&self, now: DateTime<Utc>) -> f64 {
        if self.day == Some(now.date_naive()) {
            self.net_flow
        } else {
            0.0
        }
    }

    /// Realized P&L as of `now`, zero if nothing was recorded today
    pub fn realized_pnl_at(&self, now: DateTime<Utc>) -> f64 {
        if self.day == Some(now.date_naive()) {
            self.realized_pnl
        } else {
            0.0
        }
    }
}
