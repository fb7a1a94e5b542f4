//! Risk layer (spec §4.6): the single gate every strategy signal passes
//! through before it reaches the OMS.

pub mod risk_filter;

pub use risk_filter::{RiskContext, RiskFilter};
