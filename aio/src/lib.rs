//! Facade crate re-exporting the wire-independent data model
//! (`aio-core`) and the client SDK (`aio-client`) as a single dependency
//! for downstream consumers that only need to talk to the control
//! plane, not host it.

pub use aio_client::{build_dial_target, dial, DiscoveryResolver, RegistrationParams, RegistrationState, TokenProvider};
pub use aio_core::{
    AgentResourceKind, Backoff, Clock, ClientCredential, ConfigItem, ConfigValue, CredentialStatus,
    Error, Instance, InstanceStatus, ManualClock, Principal, RefPayload, Result, Service,
    SubjectType, SystemClock, TokenCodec, ValueType, WatchEvent,
};

pub mod proto {
    pub use aio_proto::*;
}
