//! The Registry engine: service/instance CRUD with TTL lifecycle, a
//! background sweeper, and watch fan-out.

pub mod dispatcher;
pub mod sweeper;
pub mod store;

pub use dispatcher::{Dispatcher, Envelope};
pub use store::{RegistryStore, MIN_TTL_SECONDS};
