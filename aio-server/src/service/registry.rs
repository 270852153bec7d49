//! `RegistryService` RPC surface, a thin wire adapter
//! over `aio_runtime::RegistryStore`. All serialization/deserialization
//! and error-kind mapping to `tonic::Status` lives here; none of the
//! actual registry logic does.

use aio_core::{env, Instance as CoreInstance, Service as CoreService, WatchEvent};
use aio_proto::registry::registry_service_server::RegistryService;
use aio_proto::registry::{self as pb};
use aio_runtime::registry::Dispatcher;
use aio_runtime::RegistryStore;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status, Streaming};

pub struct RegistryServiceImpl {
    store: Arc<RegistryStore>,
}

impl RegistryServiceImpl {
    pub fn new(store: Arc<RegistryStore>) -> Self {
        RegistryServiceImpl { store }
    }
}

fn to_pb_service(s: &CoreService) -> pb::Service {
    pb::Service {
        id: s.id.clone(),
        project: s.project.clone(),
        name: s.name.clone(),
        owner: s.owner.clone(),
        description: s.description.clone(),
        spec_json: s.spec_json.to_string(),
    }
}

fn to_pb_instance(i: &CoreInstance) -> pb::Instance {
    pb::Instance {
        id: i.id.clone(),
        service_id: i.service_id.clone(),
        instance_key: i.instance_key.clone(),
        env: i.env.clone(),
        host: i.host.clone(),
        endpoint: i.endpoint.clone(),
        meta_json: i.meta.to_string(),
        ttl_seconds: i.ttl_seconds,
        last_heartbeat_at: i.last_heartbeat_at,
        expires_at: i.expires_at,
        weight: i.weight,
        protocol: i.protocol.clone(),
    }
}

fn parse_json(raw: &str) -> Result<serde_json::Value, Status> {
    if raw.is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw).map_err(|e| Status::invalid_argument(format!("malformed json: {e}")))
}

fn watch_kind(event: &WatchEvent<CoreInstance>) -> i32 {
    match event {
        WatchEvent::Added(_) => pb::watch_event::Kind::Added as i32,
        WatchEvent::Modified(_) => pb::watch_event::Kind::Modified as i32,
        WatchEvent::Deleted(_) => pb::watch_event::Kind::Deleted as i32,
    }
}

fn to_pb_watch_event(event: WatchEvent<CoreInstance>) -> pb::WatchEvent {
    let kind = watch_kind(&event);
    pb::WatchEvent {
        kind,
        instance: Some(to_pb_instance(event.as_inner())),
    }
}

#[tonic::async_trait]
impl RegistryService for RegistryServiceImpl {
    async fn ensure_service(
        &self,
        request: Request<pb::EnsureServiceRequest>,
    ) -> Result<Response<pb::EnsureServiceResponse>, Status> {
        let req = request.into_inner();
        let spec_json = parse_json(&req.spec_json)?;
        let (service, created) = self
            .store
            .ensure_service(&req.project, &req.name, &req.owner, &req.description, spec_json)
            .map_err(Status::from)?;
        Ok(Response::new(pb::EnsureServiceResponse {
            service: Some(to_pb_service(&service)),
            created,
        }))
    }

    async fn get_service_by_id(
        &self,
        request: Request<pb::GetServiceByIDRequest>,
    ) -> Result<Response<pb::GetServiceByIDResponse>, Status> {
        let req = request.into_inner();
        let (service, instances) = self.store.get_service_by_id(&req.id).map_err(Status::from)?;
        Ok(Response::new(pb::GetServiceByIDResponse {
            service: Some(to_pb_service(&service)),
            instances: instances.iter().map(to_pb_instance).collect(),
        }))
    }

    async fn list_services(
        &self,
        request: Request<pb::ListServicesRequest>,
    ) -> Result<Response<pb::ListServicesResponse>, Status> {
        let req = request.into_inner();
        let services = self.store.list_services(&req.project, &req.env);
        Ok(Response::new(pb::ListServicesResponse {
            services: services
                .iter()
                .map(|(service, instances)| pb::ServiceWithInstances {
                    service: Some(to_pb_service(service)),
                    instances: instances.iter().map(to_pb_instance).collect(),
                })
                .collect(),
        }))
    }

    async fn register_instance(
        &self,
        request: Request<pb::RegisterInstanceRequest>,
    ) -> Result<Response<pb::RegisterInstanceResponse>, Status> {
        let req = request.into_inner();
        let meta = parse_json(&req.meta_json)?;
        let (instance_key, expires_at) = self
            .store
            .register_instance(
                &req.service_id,
                &req.instance_key,
                &req.env,
                &req.host,
                &req.endpoint,
                meta,
                req.ttl_seconds,
            )
            .map_err(Status::from)?;
        Ok(Response::new(pb::RegisterInstanceResponse { instance_key, expires_at }))
    }

    async fn deregister_instance(
        &self,
        request: Request<pb::DeregisterInstanceRequest>,
    ) -> Result<Response<pb::DeregisterInstanceResponse>, Status> {
        let req = request.into_inner();
        self.store
            .deregister_instance(&req.service_id, &req.instance_key)
            .map_err(Status::from)?;
        Ok(Response::new(pb::DeregisterInstanceResponse {}))
    }

    type HeartbeatStreamStream = Pin<Box<dyn Stream<Item = Result<pb::HeartbeatResponse, Status>> + Send + 'static>>;

    async fn heartbeat_stream(
        &self,
        request: Request<Streaming<pb::HeartbeatRequest>>,
    ) -> Result<Response<Self::HeartbeatStreamStream>, Status> {
        let store = Arc::clone(&self.store);
        let mut inbound = request.into_inner();

        let output = async_stream::try_stream! {
            while let Some(req) = inbound.next().await {
                let req = req?;
                let expires_at = store.heartbeat(&req.service_id, &req.instance_key).map_err(Status::from)?;
                yield pb::HeartbeatResponse { expires_at };
            }
        };
        Ok(Response::new(Box::pin(output)))
    }

    type WatchStream = Pin<Box<dyn Stream<Item = Result<pb::WatchEvent, Status>> + Send + 'static>>;

    async fn watch(&self, request: Request<pb::WatchRequest>) -> Result<Response<Self::WatchStream>, Status> {
        let req = request.into_inner();
        let dispatcher: Dispatcher = self.store.dispatcher_handle();
        // Subscribe before bootstrapping so no event published between
        // subscribe and snapshot is lost.
        let mut rx = dispatcher.subscribe();
        let snapshot = self.store.snapshot_for_watch(&req.service_name, &req.env);
        let service_name = req.service_name;
        let env_filter = req.env;

        let output = async_stream::try_stream! {
            for instance in snapshot {
                yield pb::WatchEvent {
                    kind: pb::watch_event::Kind::Added as i32,
                    instance: Some(to_pb_instance(&instance)),
                };
            }
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if envelope.service_name != service_name {
                            continue;
                        }
                        let instance = envelope.event.as_inner();
                        if !env::is_env_wildcard(&env_filter) && instance.env != env_filter {
                            continue;
                        }
                        yield to_pb_watch_event(envelope.event);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Ok(Response::new(Box::pin(output)))
    }
}
