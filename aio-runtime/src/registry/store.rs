//! The registry's in-memory engine: service/instance CRUD, TTL
//! application, and watch event emission.
//!
//! A cache kept in sync with writer events, deriving liveness state
//! from a recorded timestamp plus a duration rather than scheduling a
//! timer per object. Shared mutable state is owned here; `aio-server`
//! only translates between wire messages and these calls.

use aio_core::{env, Error, Instance, Result, Service, WatchEvent};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

use super::dispatcher::Dispatcher;

struct ServiceRecord {
    service: Service,
    instances: HashMap<String, Instance>,
}

/// Minimum TTL accepted by `RegisterInstance`.
pub const MIN_TTL_SECONDS: u32 = 5;

/// The registry's authoritative store of services and instances.
///
/// Every mutating operation on a single service is serialized through
/// that service's own lock, so a heartbeat racing a deregister for the
/// same instance always resolves deterministically rather than leaving
/// torn state.
pub struct RegistryStore {
    services: RwLock<HashMap<String, Mutex<ServiceRecord>>>,
    index: RwLock<HashMap<(String, String), String>>,
    dispatcher: Dispatcher,
    clock: Arc<dyn aio_core::Clock>,
}

impl RegistryStore {
    pub fn new(clock: Arc<dyn aio_core::Clock>) -> Self {
        RegistryStore {
            services: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
            dispatcher: Dispatcher::default(),
            clock,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    fn now(&self) -> i64 {
        self.clock.now()
    }

    /// `EnsureService`: returns the existing service if `(project, name)`
    /// is already registered, otherwise creates it.
    pub fn ensure_service(
        &self,
        project: &str,
        name: &str,
        owner: &str,
        description: &str,
        spec_json: serde_json::Value,
    ) -> Result<(Service, bool)> {
        if project.is_empty() || name.is_empty() {
            return Err(Error::invalid_argument("project and name are required"));
        }

        let index_key = (project.to_string(), name.to_string());
        if let Some(id) = self.index.read().get(&index_key).cloned() {
            let services = self.services.read();
            let record = services.get(&id).expect("index entry without a backing record");
            return Ok((record.lock().service.clone(), false));
        }

        let service = Service {
            id: uuid::Uuid::new_v4().to_string(),
            project: project.to_string(),
            name: name.to_string(),
            owner: owner.to_string(),
            description: description.to_string(),
            spec_json,
        };

        let mut services = self.services.write();
        let mut index = self.index.write();
        // Re-check under the write lock in case of a concurrent creator.
        if let Some(id) = index.get(&index_key).cloned() {
            let record = services.get(&id).expect("index entry without a backing record");
            return Ok((record.lock().service.clone(), false));
        }
        index.insert(index_key, service.id.clone());
        services.insert(
            service.id.clone(),
            Mutex::new(ServiceRecord {
                service: service.clone(),
                instances: HashMap::new(),
            }),
        );
        Ok((service, true))
    }

    pub fn get_service_by_id(&self, id: &str) -> Result<(Service, Vec<Instance>)> {
        let services = self.services.read();
        let record = services
            .get(id)
            .ok_or_else(|| Error::not_found(format!("service {id}")))?
            .lock();
        let now = self.now();
        let instances = live_instances(&record.instances, now, "");
        Ok((record.service.clone(), instances))
    }

    /// `ListServices`: services under `project`, instances filtered by
    /// `env` (wildcard `"all"`/empty means no filter) and always
    /// excluding expired or endpoint-less instances, so the invariant
    /// "no heartbeat for > ttl => absent from the next listing" holds
    /// even if the background sweeper hasn't run yet.
    pub fn list_services(&self, project: &str, env_filter: &str) -> Vec<(Service, Vec<Instance>)> {
        let services = self.services.read();
        let now = self.now();
        services
            .values()
            .filter_map(|record| {
                let record = record.lock();
                if record.service.project != project {
                    return None;
                }
                let instances = live_instances(&record.instances, now, env_filter);
                Some((record.service.clone(), instances))
            })
            .collect()
    }

    pub fn register_instance(
        &self,
        service_id: &str,
        instance_key: &str,
        env: &str,
        host: &str,
        endpoint: &str,
        meta: serde_json::Value,
        ttl_seconds: u32,
    ) -> Result<(String, i64)> {
        if ttl_seconds < MIN_TTL_SECONDS {
            return Err(Error::invalid_argument(format!(
                "ttl_seconds must be >= {MIN_TTL_SECONDS}"
            )));
        }
        if instance_key.is_empty() {
            return Err(Error::invalid_argument("instance_key is required"));
        }

        let services = self.services.read();
        let mut record = services
            .get(service_id)
            .ok_or_else(|| Error::not_found(format!("service {service_id}")))?
            .lock();

        let now = self.now();
        let service_name = record.service.name.clone();

        match record.instances.get_mut(instance_key) {
            Some(existing) => {
                let changed = existing.endpoint != endpoint
                    || existing.meta != meta
                    || existing.env != env
                    || existing.host != host;
                existing.endpoint = endpoint.to_string();
                existing.meta = meta;
                existing.env = env.to_string();
                existing.host = host.to_string();
                existing.ttl_seconds = ttl_seconds;
                existing.last_heartbeat_at = now;
                existing.expires_at = now + i64::from(ttl_seconds);
                if changed {
                    existing.generation += 1;
                    let snapshot = existing.clone();
                    drop(record);
                    self.dispatcher.publish(service_name, WatchEvent::Modified(snapshot));
                    return Ok((instance_key.to_string(), now + i64::from(ttl_seconds)));
                }
                Ok((instance_key.to_string(), existing.expires_at))
            }
            None => {
                let instance = Instance::new(service_id, instance_key, env, host, endpoint, meta, ttl_seconds, now);
                let expires_at = instance.expires_at;
                record.instances.insert(instance_key.to_string(), instance.clone());
                drop(record);
                self.dispatcher.publish(service_name, WatchEvent::Added(instance));
                Ok((instance_key.to_string(), expires_at))
            }
        }
    }

    /// `DeregisterInstance` is idempotent-success: removing an instance
    /// that is already gone is not an error.
    pub fn deregister_instance(&self, service_id: &str, instance_key: &str) -> Result<()> {
        let services = self.services.read();
        let mut record = services
            .get(service_id)
            .ok_or_else(|| Error::not_found(format!("service {service_id}")))?
            .lock();

        let service_name = record.service.name.clone();
        if let Some(instance) = record.instances.remove(instance_key) {
            drop(record);
            self.dispatcher.publish(service_name, WatchEvent::Deleted(instance));
        }
        Ok(())
    }

    /// Applies one `HeartbeatRequest`. Serialized with
    /// `register`/`deregister` through the same per-service lock, so a
    /// heartbeat that loses a race against a concurrent deregister
    /// correctly observes `NotFound`.
    pub fn heartbeat(&self, service_id: &str, instance_key: &str) -> Result<i64> {
        let services = self.services.read();
        let mut record = services
            .get(service_id)
            .ok_or_else(|| Error::not_found(format!("service {service_id}")))?
            .lock();

        let now = self.now();
        let instance = record
            .instances
            .get_mut(instance_key)
            .ok_or_else(|| Error::not_found(format!("instance {instance_key}")))?;
        Ok(instance.heartbeat(now))
    }

    /// A snapshot of currently-live instances for `service_name`/`env`,
    /// for the `Watch` bootstrap.
    pub fn snapshot_for_watch(&self, service_name: &str, env_filter: &str) -> Vec<Instance> {
        let services = self.services.read();
        let now = self.now();
        services
            .values()
            .filter(|record| record.lock().service.name == service_name)
            .flat_map(|record| {
                let record = record.lock();
                live_instances(&record.instances, now, env_filter)
            })
            .collect()
    }

    pub fn dispatcher_handle(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Reaps every instance whose `expires_at` has passed, across all
    /// services. Returns the count reaped, for the sweeper's log line.
    pub fn reap_expired(&self) -> usize {
        let services = self.services.read();
        let now = self.now();
        let mut reaped = 0;
        for record in services.values() {
            let mut record = record.lock();
            let service_name = record.service.name.clone();
            let expired_keys: Vec<String> = record
                .instances
                .iter()
                .filter(|(_, i)| i.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired_keys {
                if let Some(instance) = record.instances.remove(&key) {
                    reaped += 1;
                    self.dispatcher.publish(service_name.clone(), WatchEvent::Deleted(instance));
                }
            }
        }
        reaped
    }
}

fn live_instances(instances: &HashMap<String, Instance>, now: i64, env_filter: &str) -> Vec<Instance> {
    instances
        .values()
        .filter(|i| !i.is_expired(now))
        .filter(|i| i.is_discoverable())
        .filter(|i| env::is_env_wildcard(env_filter) || i.env == env_filter)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aio_core::ManualClock;

    fn store_with_clock(start: i64) -> (Arc<ManualClock>, RegistryStore) {
        let clock = Arc::new(ManualClock::new(start));
        let store = RegistryStore::new(clock.clone());
        (clock, store)
    }

    #[test]
    fn ensure_service_is_idempotent() {
        let (_c, store) = store_with_clock(0);
        let (s1, created1) = store.ensure_service("proj", "svc", "me", "", serde_json::json!({})).unwrap();
        let (s2, created2) = store.ensure_service("proj", "svc", "me", "", serde_json::json!({})).unwrap();
        assert!(created1);
        assert!(!created2);
        assert_eq!(s1.id, s2.id);
    }

    #[test]
    fn heartbeat_extends_expiry_and_list_reflects_it() {
        let (clock, store) = store_with_clock(0);
        let (svc, _) = store.ensure_service("proj", "svc", "me", "", serde_json::json!({})).unwrap();
        store
            .register_instance(&svc.id, "i1", "dev", "h1", "http://h1", serde_json::json!({}), 15)
            .unwrap();

        clock.advance(11);
        store.heartbeat(&svc.id, "i1").unwrap();
        clock.advance(11);
        // Total elapsed 22s, but heartbeat at t=11 extends to t=26: still alive.
        let (_s, instances) = store.get_service_by_id(&svc.id).unwrap();
        assert_eq!(instances.len(), 1);
    }

    #[test]
    fn unheartbeated_instance_disappears_after_ttl() {
        let (clock, store) = store_with_clock(0);
        let (svc, _) = store.ensure_service("proj", "svc", "me", "", serde_json::json!({})).unwrap();
        store
            .register_instance(&svc.id, "i1", "dev", "h1", "http://h1", serde_json::json!({}), 15)
            .unwrap();
        clock.advance(16);
        let listed = store.list_services("proj", "");
        assert!(listed[0].1.is_empty());
    }

    #[test]
    fn deregister_is_idempotent() {
        let (_c, store) = store_with_clock(0);
        let (svc, _) = store.ensure_service("proj", "svc", "me", "", serde_json::json!({})).unwrap();
        store.deregister_instance(&svc.id, "missing").unwrap();
    }

    #[test]
    fn heartbeat_missing_instance_is_not_found() {
        let (_c, store) = store_with_clock(0);
        let (svc, _) = store.ensure_service("proj", "svc", "me", "", serde_json::json!({})).unwrap();
        let err = store.heartbeat(&svc.id, "missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn ttl_below_minimum_is_rejected() {
        let (_c, store) = store_with_clock(0);
        let (svc, _) = store.ensure_service("proj", "svc", "me", "", serde_json::json!({})).unwrap();
        let err = store
            .register_instance(&svc.id, "i1", "dev", "h1", "http://h1", serde_json::json!({}), 1)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn reap_expired_removes_and_emits_deleted() {
        let (clock, store) = store_with_clock(0);
        let (svc, _) = store.ensure_service("proj", "svc", "me", "", serde_json::json!({})).unwrap();
        store
            .register_instance(&svc.id, "i1", "dev", "h1", "http://h1", serde_json::json!({}), 5)
            .unwrap();
        clock.advance(6);
        assert_eq!(store.reap_expired(), 1);
        let (_s, instances) = store.get_service_by_id(&svc.id).unwrap();
        assert!(instances.is_empty());
    }
}
