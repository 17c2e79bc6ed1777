//! Message dispatch: handler traits, handler sets and the dispatcher itself.

pub mod dispatcher;
pub mod error;
pub mod handler;

pub use dispatcher::*;
pub use error::*;
pub use handler::*;
