//! `DiscoveryResolver`: a per-`(project, service)` instance cache with
//! round-robin picking and failure cooldown.

use aio_core::{Error, Result};
use aio_proto::registry::registry_service_client::RegistryServiceClient;
use aio_proto::registry::{Instance, ListServicesRequest};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::AuthedChannel;

/// `Resolve` reuses a cached listing younger than this.
pub const CACHE_TTL_SECONDS: i64 = 30;
/// How long a reported-failed endpoint is skipped by `Pick`.
pub const COOLDOWN_SECONDS: i64 = 30;

/// Invoke with `true` if the picked instance's call failed, to put it
/// into cooldown; `false` (or never calling it) has no effect.
pub type ReportFn = Box<dyn Fn(bool) + Send + Sync>;

struct CacheEntry {
    instances: Vec<Instance>,
    fetched_at: i64,
    next_index: usize,
}

pub struct DiscoveryResolver {
    client: RegistryServiceClient<AuthedChannel>,
    cache: RwLock<HashMap<(String, String), CacheEntry>>,
    cooldowns: RwLock<HashMap<String, i64>>,
    clock: Arc<dyn aio_core::Clock>,
}

impl DiscoveryResolver {
    pub fn new(client: RegistryServiceClient<AuthedChannel>, clock: Arc<dyn aio_core::Clock>) -> Self {
        DiscoveryResolver {
            client,
            cache: RwLock::new(HashMap::new()),
            cooldowns: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Returns the cached instance list for `(project, service)` under
    /// `env`, refreshing from the registry if the cache is stale or
    /// missing.
    pub async fn resolve(&self, project: &str, service: &str, env: &str) -> Result<Vec<Instance>> {
        let key = (project.to_string(), service.to_string());
        let now = self.now();
        if let Some(entry) = self.cache.read().get(&key) {
            if now - entry.fetched_at < CACHE_TTL_SECONDS {
                return Ok(entry.instances.clone());
            }
        }
        self.refresh_service(project, service, env).await
    }

    /// Forces a re-fetch regardless of cache age.
    pub async fn refresh_service(&self, project: &str, service: &str, env: &str) -> Result<Vec<Instance>> {
        let request = ListServicesRequest {
            project: project.to_string(),
            env: env.to_string(),
        };
        let response = self
            .client
            .clone()
            .list_services(request)
            .await
            .map_err(Error::from)?
            .into_inner();

        let instances = response
            .services
            .into_iter()
            .find(|s| s.service.as_ref().is_some_and(|svc| svc.name == service))
            .map(|s| s.instances)
            .unwrap_or_default();

        let key = (project.to_string(), service.to_string());
        let mut cache = self.cache.write();
        let next_index = cache.get(&key).map(|e| e.next_index).unwrap_or(0);
        cache.insert(
            key,
            CacheEntry {
                instances: instances.clone(),
                fetched_at: self.now(),
                next_index,
            },
        );
        Ok(instances)
    }

    fn report_failure(&self, endpoint: &str) {
        self.cooldowns.write().insert(endpoint.to_string(), self.now() + COOLDOWN_SECONDS);
    }

    /// Picks the next healthy instance in strict round-robin order.
    /// `Unavailable` if every instance is in cooldown or none exist.
    pub async fn pick(self: &Arc<Self>, project: &str, service: &str, env: &str) -> Result<(Instance, ReportFn)> {
        let instances = self.resolve(project, service, env).await?;
        let now = self.now();
        let cooldowns = self.cooldowns.read();
        let healthy: Vec<Instance> = instances
            .into_iter()
            .filter(|i| cooldowns.get(&i.endpoint).copied().unwrap_or(0) <= now)
            .collect();
        drop(cooldowns);

        if healthy.is_empty() {
            return Err(Error::unavailable(format!("no healthy instances for {project}/{service}")));
        }

        let key = (project.to_string(), service.to_string());
        let idx = {
            let mut cache = self.cache.write();
            match cache.get_mut(&key) {
                Some(entry) => {
                    let idx = entry.next_index % healthy.len();
                    entry.next_index = entry.next_index.wrapping_add(1);
                    idx
                }
                None => 0,
            }
        };

        let picked = healthy[idx].clone();
        let endpoint = picked.endpoint.clone();
        let resolver = Arc::clone(self);
        let report: ReportFn = Box::new(move |failed| {
            if failed {
                resolver.report_failure(&endpoint);
            }
        });
        Ok((picked, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(endpoint: &str) -> Instance {
        Instance {
            id: endpoint.to_string(),
            service_id: "svc".to_string(),
            instance_key: endpoint.to_string(),
            env: "dev".to_string(),
            host: "h".to_string(),
            endpoint: endpoint.to_string(),
            meta_json: "{}".to_string(),
            ttl_seconds: 15,
            last_heartbeat_at: 0,
            expires_at: 1000,
            weight: 1,
            protocol: "grpc".to_string(),
        }
    }

    #[test]
    fn cache_entry_rotates_round_robin() {
        let mut entry = CacheEntry {
            instances: vec![instance("a"), instance("b"), instance("c")],
            fetched_at: 0,
            next_index: 0,
        };
        let picks: Vec<usize> = (0..5)
            .map(|_| {
                let idx = entry.next_index % entry.instances.len();
                entry.next_index += 1;
                idx
            })
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1]);
    }
}
