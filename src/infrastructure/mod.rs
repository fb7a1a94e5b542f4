//! Infrastructure layer: concrete adapters behind the domain's ports.
//! Alpaca/OANDA stock adapters, the ML/sentiment/news pipelines, and the
//! `eframe` GUI from the teacher repository are out of scope (spec §1) and
//! were trimmed — see DESIGN.md.

pub mod binance;
pub mod core;
pub mod mock;
pub mod observability;
pub mod persistence;
