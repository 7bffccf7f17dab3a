//! trend-pullback: paper-trading decision engine for one long-only
//! crypto trend-pullback strategy
//!
//! This library provides the core components for:
//! - Closed-candle windows with gap detection
//! - EMA, RSI and trend-slope indicators
//! - Entry signal evaluation with audit values
//! - Risk gates and risk-based position sizing
//! - Trailing stops and exit detection
//! - A paper execution ledger with fees and slippage
//! - A non-overlapping evaluation loop and a deterministic replay harness

pub mod audit;
pub mod backtest;
pub mod cli;
pub mod config;
pub mod engine;
pub mod execution;
pub mod indicators;
pub mod market;
pub mod persistence;
pub mod position;
pub mod risk;
pub mod signal;
pub mod telemetry;
