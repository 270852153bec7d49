//! The shared data model: `Service`, `Instance`, `ConfigItem`,
//! `ConfigValue`, `ClientCredential`, `AgentResource`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A logical endpoint template. `(project, name)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: String,
    pub project: String,
    pub name: String,
    pub owner: String,
    pub description: String,
    /// Free-form JSON spec, opaque to the registry.
    pub spec_json: serde_json::Value,
}

impl Service {
    pub fn key(project: &str, name: &str) -> String {
        format!("{project}/{name}")
    }
}

/// A running endpoint claim. `(service_id, instance_key)` is unique
/// while undeleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub id: String,
    pub service_id: String,
    pub instance_key: String,
    pub env: String,
    pub host: String,
    pub endpoint: String,
    pub meta: serde_json::Value,
    pub ttl_seconds: u32,
    pub last_heartbeat_at: i64,
    pub expires_at: i64,
    /// Incremented whenever a field Watch cares about changes
    /// (`endpoint`/`status`/`weight`/`protocol`/`metadata`); not by
    /// heartbeat-only refreshes. Used to detect `Modified` vs a plain
    /// liveness refresh.
    pub generation: u64,
    pub status: InstanceStatus,
    pub weight: u32,
    pub protocol: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstanceStatus {
    Registered,
    Heartbeating,
}

impl Instance {
    pub fn new(
        service_id: impl Into<String>,
        instance_key: impl Into<String>,
        env: impl Into<String>,
        host: impl Into<String>,
        endpoint: impl Into<String>,
        meta: serde_json::Value,
        ttl_seconds: u32,
        now: i64,
    ) -> Self {
        Instance {
            id: uuid::Uuid::new_v4().to_string(),
            service_id: service_id.into(),
            instance_key: instance_key.into(),
            env: env.into(),
            host: host.into(),
            endpoint: endpoint.into(),
            meta,
            ttl_seconds,
            last_heartbeat_at: now,
            expires_at: now + i64::from(ttl_seconds),
            generation: 0,
            status: InstanceStatus::Registered,
            weight: 1,
            protocol: "grpc".to_string(),
        }
    }

    /// Applies a heartbeat at `now`, returning the new `expires_at`.
    /// This never touches `generation` — heartbeat-only updates must
    /// not emit `Modified`.
    pub fn heartbeat(&mut self, now: i64) -> i64 {
        self.last_heartbeat_at = now;
        self.expires_at = now + i64::from(self.ttl_seconds);
        self.status = InstanceStatus::Heartbeating;
        self.expires_at
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }

    /// Instances with an empty endpoint are excluded from discovery
    /// listings.
    pub fn is_discoverable(&self) -> bool {
        !self.endpoint.is_empty()
    }
}

/// The type tag of a `ConfigValue`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Int,
    Float,
    Bool,
    Ref,
    Object,
    Array,
    Encrypted,
}

/// One property within a `ConfigItem`: a stored string plus its type
/// tag. `ref` values store a JSON-encoded `{key, property?}` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigValue {
    pub value: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

impl ConfigValue {
    pub fn string(s: impl Into<String>) -> Self {
        ConfigValue {
            value: s.into(),
            value_type: ValueType::String,
        }
    }

    pub fn int(i: i64) -> Self {
        ConfigValue {
            value: i.to_string(),
            value_type: ValueType::Int,
        }
    }

    pub fn float(f: f64) -> Self {
        ConfigValue {
            value: f.to_string(),
            value_type: ValueType::Float,
        }
    }

    pub fn bool(b: bool) -> Self {
        ConfigValue {
            value: b.to_string(),
            value_type: ValueType::Bool,
        }
    }

    pub fn reference(key: impl Into<String>, property: Option<String>) -> Self {
        let payload = RefPayload {
            key: key.into(),
            property,
        };
        ConfigValue {
            value: serde_json::to_string(&payload).expect("ref payload is always serializable"),
            value_type: ValueType::Ref,
        }
    }

    pub fn object(v: serde_json::Value) -> Self {
        ConfigValue {
            value: v.to_string(),
            value_type: ValueType::Object,
        }
    }

    pub fn array(v: serde_json::Value) -> Self {
        ConfigValue {
            value: v.to_string(),
            value_type: ValueType::Array,
        }
    }

    pub fn parse_ref(&self) -> Option<RefPayload> {
        if self.value_type != ValueType::Ref {
            return None;
        }
        serde_json::from_str(&self.value).ok()
    }
}

/// The `{key, property?}` payload carried by a `ref`-typed `ConfigValue`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefPayload {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
}

/// A versioned composite value stored at `<logical>.<env>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigItem {
    pub logical_key: String,
    pub env: String,
    pub properties: BTreeMap<String, ConfigValue>,
    pub version: u64,
    pub metadata: BTreeMap<String, String>,
    pub description: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ConfigItem {
    pub const METADATA_KEY_ENVIRONMENT: &'static str = "environment";

    /// The full storage key, e.g. `app.database.dev`.
    pub fn storage_key(logical_key: &str, env: &str) -> String {
        format!("{logical_key}.{env}")
    }

    /// Splits a storage key `<logical>.<env>` back into its parts. The
    /// env is always the trailing dot-segment; the logical key may
    /// itself contain dots.
    pub fn split_storage_key(storage_key: &str) -> Option<(&str, &str)> {
        storage_key.rsplit_once('.')
    }
}

/// `{client_key, client_secret_hash, status, expires_at?, ip_whitelist?}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientCredential {
    pub client_key: String,
    pub client_secret_hash: String,
    pub status: CredentialStatus,
    pub expires_at: Option<i64>,
    pub ip_whitelist: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    Disabled,
}

/// The addressable unit of `AgentOrchestrator` operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentResourceKind {
    NginxConf,
    SystemdUnit,
    SslMaterial,
    ServiceControl,
}
