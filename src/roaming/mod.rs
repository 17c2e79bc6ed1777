//! Roaming: per-client entities that migrate between scenes while the client's gate keeps
//! routing to them.
//!
//! - [`SessionRoaming`]: the gate's link table for one client.
//! - [`Terminus`]: the hosting end of one link, and the unit that transfers.
//! - [`RoamingEntity`]: state that travels with a terminus.

pub mod entity;
pub mod error;
pub mod handlers;
pub mod session;
pub mod terminus;

pub use entity::*;
pub use error::*;
pub use handlers::handlers;
pub use session::*;
pub use terminus::*;
