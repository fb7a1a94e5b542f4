//! Market analysis domain: incremental indicators and regime classification.
pub mod indicators;
pub mod regime;
pub mod timeframe;
