//! Client SDK for the aio control plane: a bearer-token provider, a
//! cluster-aware dialer, a service-discovery resolver, and the
//! self-registration loop.

pub mod auth;
pub mod dial;
pub mod discovery;
pub mod registration;
pub mod token;

pub use auth::{authed_channel, AuthedChannel};
pub use dial::{build as build_dial_target, dial};
pub use discovery::DiscoveryResolver;
pub use registration::{RegistrationParams, State as RegistrationState};
pub use token::TokenProvider;
