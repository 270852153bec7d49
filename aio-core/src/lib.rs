//! Wire-independent types shared by every `aio` control-plane crate:
//! the data model (§3), the canonical error kind (§7), environment
//! fallback chains (§3 "Environment"), watch events (§4.2), and a
//! pluggable clock used to make TTL logic testable.

pub mod backoff;
pub mod clock;
pub mod env;
pub mod error;
pub mod interceptor;
pub mod model;
pub mod token;
pub mod watch;

pub use backoff::Backoff;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use interceptor::BearerAuthInterceptor;
pub use model::{
    AgentResourceKind, ClientCredential, ConfigItem, ConfigValue, CredentialStatus, Instance,
    InstanceStatus, RefPayload, Service, ValueType,
};
pub use token::{Principal, SubjectType, TokenCodec};
pub use watch::WatchEvent;
