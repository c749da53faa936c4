//! Informational - Read-only views for operators and dashboards
//! Never mutates engine state

pub mod display;

pub use display::{position_report, strategy_status, PositionReport, StrategyStatus};
