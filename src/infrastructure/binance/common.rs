//! Common types and constants for Binance infrastructure
