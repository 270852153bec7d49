//! The self-registration loop: ensure-service → register instance →
//! heartbeat on a ticker → deregister on exit, with backoff across
//! failures.

use aio_core::{Backoff, Error};
use aio_proto::registry::registry_service_client::RegistryServiceClient;
use aio_proto::registry::{DeregisterInstanceRequest, EnsureServiceRequest, HeartbeatRequest, RegisterInstanceRequest};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthedChannel;

#[derive(Debug, Clone)]
pub struct RegistrationParams {
    pub project: String,
    pub service_name: String,
    pub owner: String,
    pub description: String,
    pub spec_json: String,
    pub instance_key: String,
    pub env: String,
    pub host: String,
    pub endpoint: String,
    pub meta_json: String,
    pub ttl_seconds: u32,
}

/// The loop's externally-observable phase, useful for tests and status
/// reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Registered,
    Beating,
    Retrying,
    Stopped,
}

/// Runs the loop until `cancel` fires, then makes a best-effort
/// `DeregisterInstance` call before returning. Failures at any stage
/// are retried with backoff rather than ending the loop. `status`
/// mirrors the FSM's current phase for callers that want to observe it
/// (health checks, tests).
pub async fn run(
    mut client: RegistryServiceClient<AuthedChannel>,
    params: RegistrationParams,
    cancel: CancellationToken,
    status: watch::Sender<State>,
) {
    let mut backoff = Backoff::default_stream_backoff();
    let mut service_id: Option<String> = None;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let id = match &service_id {
            Some(id) => id.clone(),
            None => match ensure_service(&mut client, &params).await {
                Ok(id) => {
                    service_id = Some(id.clone());
                    backoff.reset();
                    id
                }
                Err(e) => {
                    tracing::warn!(error = %e, "ensure_service failed, retrying");
                    let _ = status.send(State::Retrying);
                    if wait_or_cancel(backoff.next_delay(), &cancel).await {
                        break;
                    }
                    continue;
                }
            },
        };

        if let Err(e) = register_instance(&mut client, &id, &params).await {
            tracing::warn!(error = %e, "register_instance failed, retrying");
            let _ = status.send(State::Retrying);
            if wait_or_cancel(backoff.next_delay(), &cancel).await {
                break;
            }
            continue;
        }
        backoff.reset();
        let _ = status.send(State::Registered);

        heartbeat_until_cancelled_or_failed(&mut client, &id, &params, &cancel, &mut backoff, &status).await;
    }

    let _ = status.send(State::Stopped);
    if let Some(id) = service_id {
        deregister_best_effort(&mut client, &id, &params.instance_key).await;
    }
}

async fn wait_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

async fn ensure_service(client: &mut RegistryServiceClient<AuthedChannel>, params: &RegistrationParams) -> Result<String, Error> {
    let request = EnsureServiceRequest {
        project: params.project.clone(),
        name: params.service_name.clone(),
        owner: params.owner.clone(),
        description: params.description.clone(),
        spec_json: params.spec_json.clone(),
    };
    let response = client.ensure_service(request).await.map_err(Error::from)?.into_inner();
    response
        .service
        .map(|s| s.id)
        .ok_or_else(|| Error::internal("ensure_service returned no service"))
}

async fn register_instance(
    client: &mut RegistryServiceClient<AuthedChannel>,
    service_id: &str,
    params: &RegistrationParams,
) -> Result<(), Error> {
    let request = RegisterInstanceRequest {
        service_id: service_id.to_string(),
        instance_key: params.instance_key.clone(),
        env: params.env.clone(),
        host: params.host.clone(),
        endpoint: params.endpoint.clone(),
        meta_json: params.meta_json.clone(),
        ttl_seconds: params.ttl_seconds,
    };
    client.register_instance(request).await.map_err(Error::from)?;
    Ok(())
}

/// Heartbeats on a ticker until cancellation or a failure that
/// requires falling back to `register_instance` (e.g. the instance
/// was reaped out from under us).
async fn heartbeat_until_cancelled_or_failed(
    client: &mut RegistryServiceClient<AuthedChannel>,
    service_id: &str,
    params: &RegistrationParams,
    cancel: &CancellationToken,
    backoff: &mut Backoff,
    status: &watch::Sender<State>,
) {
    let period = Duration::from_secs(10).max(Duration::from_secs(u64::from(params.ttl_seconds.max(1)) / 3));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let request = HeartbeatRequest {
                    service_id: service_id.to_string(),
                    instance_key: params.instance_key.clone(),
                };
                match client.heartbeat_stream(tokio_stream::once(request)).await {
                    Ok(response) => match response.into_inner().message().await {
                        Ok(Some(_)) => {
                            backoff.reset();
                            let _ = status.send(State::Beating);
                        }
                        Ok(None) => {
                            tracing::warn!("heartbeat stream closed with no response, re-registering");
                            return;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "heartbeat rejected, re-registering");
                            return;
                        }
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "heartbeat failed, re-registering");
                        return;
                    }
                }
            }
        }
    }
}

async fn deregister_best_effort(client: &mut RegistryServiceClient<AuthedChannel>, service_id: &str, instance_key: &str) {
    let request = DeregisterInstanceRequest {
        service_id: service_id.to_string(),
        instance_key: instance_key.to_string(),
    };
    if let Err(e) = client.deregister_instance(request).await {
        tracing::warn!(error = %e, "best-effort deregister on shutdown failed");
    }
}
