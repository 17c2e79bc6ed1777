//! Request/response correlation.

pub mod correlator;
pub mod error;

pub use correlator::*;
pub use error::*;
