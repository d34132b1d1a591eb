//! Signal Generation Module
//!
//! Technical confirmation of screened candidates on the latest panel date.

pub mod technical;

pub use technical::{TechnicalFilter, TechnicalSnapshot};
