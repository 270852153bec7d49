//! Wire adapters: one module per `.proto` service, translating between
//! generated messages and the `aio_runtime` engines.

pub mod config;
pub mod registry;
pub mod user;

pub use config::ConfigServiceImpl;
pub use registry::RegistryServiceImpl;
pub use user::ClientAuthServiceImpl;
