//! `ConfigService` RPC surface, adapting wire messages
//! to `aio_runtime::ConfigEngine`.

use aio_core::{ConfigItem, ConfigValue, ValueType};
use aio_proto::config::config_service_server::ConfigService;
use aio_proto::config::{self as pb};
use aio_runtime::ConfigEngine;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct ConfigServiceImpl {
    engine: Arc<ConfigEngine>,
}

impl ConfigServiceImpl {
    pub fn new(engine: Arc<ConfigEngine>) -> Self {
        ConfigServiceImpl { engine }
    }
}

fn value_type_from_str(s: &str) -> Result<ValueType, Status> {
    match s {
        "string" => Ok(ValueType::String),
        "int" => Ok(ValueType::Int),
        "float" => Ok(ValueType::Float),
        "bool" => Ok(ValueType::Bool),
        "ref" => Ok(ValueType::Ref),
        "object" => Ok(ValueType::Object),
        "array" => Ok(ValueType::Array),
        "encrypted" => Ok(ValueType::Encrypted),
        other => Err(Status::invalid_argument(format!("unknown config value type '{other}'"))),
    }
}

fn value_type_to_str(t: ValueType) -> &'static str {
    match t {
        ValueType::String => "string",
        ValueType::Int => "int",
        ValueType::Float => "float",
        ValueType::Bool => "bool",
        ValueType::Ref => "ref",
        ValueType::Object => "object",
        ValueType::Array => "array",
        ValueType::Encrypted => "encrypted",
    }
}

fn properties_from_pb(properties: Vec<pb::ConfigProperty>) -> Result<BTreeMap<String, ConfigValue>, Status> {
    properties
        .into_iter()
        .map(|p| {
            let value_type = value_type_from_str(&p.r#type)?;
            Ok((p.name, ConfigValue { value: p.value, value_type }))
        })
        .collect()
}

fn item_to_version_response(item: &ConfigItem) -> pb::ConfigVersionResponse {
    pb::ConfigVersionResponse {
        key: ConfigItem::storage_key(&item.logical_key, &item.env),
        version: item.version,
    }
}

#[tonic::async_trait]
impl ConfigService for ConfigServiceImpl {
    async fn create_config(
        &self,
        request: Request<pb::CreateConfigRequest>,
    ) -> Result<Response<pb::ConfigVersionResponse>, Status> {
        let req = request.into_inner();
        let properties = properties_from_pb(req.properties)?;
        let item = self
            .engine
            .create_config(&req.key, properties, req.metadata.into_iter().collect(), req.description, req.change_note)
            .map_err(Status::from)?;
        Ok(Response::new(item_to_version_response(&item)))
    }

    async fn update_config(
        &self,
        request: Request<pb::UpdateConfigRequest>,
    ) -> Result<Response<pb::ConfigVersionResponse>, Status> {
        let req = request.into_inner();
        let properties = properties_from_pb(req.properties)?;
        let item = self
            .engine
            .update_config(&req.key, properties, req.metadata.into_iter().collect(), req.description, req.change_note)
            .map_err(Status::from)?;
        Ok(Response::new(item_to_version_response(&item)))
    }

    async fn delete_config(
        &self,
        request: Request<pb::DeleteConfigRequest>,
    ) -> Result<Response<pb::DeleteConfigResponse>, Status> {
        let req = request.into_inner();
        self.engine.delete_config(&req.key).map_err(Status::from)?;
        Ok(Response::new(pb::DeleteConfigResponse {}))
    }

    async fn get_config_json(
        &self,
        request: Request<pb::GetConfigRequest>,
    ) -> Result<Response<pb::ConfigJSONResponse>, Status> {
        let req = request.into_inner();
        let fallback = (!req.fallback_chain.is_empty()).then_some(req.fallback_chain);
        let json = self
            .engine
            .get_config_json(&req.logical_key, &req.env, fallback.as_deref())
            .map_err(Status::from)?;
        Ok(Response::new(pb::ConfigJSONResponse {
            json: json.to_string(),
            version: 0,
        }))
    }

    async fn batch_get_configs(
        &self,
        request: Request<pb::BatchGetConfigsRequest>,
    ) -> Result<Response<pb::BatchGetConfigsResponse>, Status> {
        let req = request.into_inner();
        let results = self
            .engine
            .batch_get_configs(&req.logical_keys, &req.env)
            .map_err(Status::from)?;
        Ok(Response::new(pb::BatchGetConfigsResponse {
            results: results.into_iter().map(|(k, v)| (k, v.to_string())).collect(),
        }))
    }

    async fn get_configs_by_prefix(
        &self,
        request: Request<pb::GetConfigsByPrefixRequest>,
    ) -> Result<Response<pb::GetConfigsByPrefixResponse>, Status> {
        let req = request.into_inner();
        let results = self
            .engine
            .get_configs_by_prefix(&req.prefix, &req.env)
            .map_err(Status::from)?;
        Ok(Response::new(pb::GetConfigsByPrefixResponse {
            results: results.into_iter().map(|(k, v)| (k, v.to_string())).collect(),
        }))
    }

    async fn get_history(&self, request: Request<pb::GetHistoryRequest>) -> Result<Response<pb::GetHistoryResponse>, Status> {
        let req = request.into_inner();
        let revisions = self
            .engine
            .get_history(&req.key, req.limit as usize)
            .into_iter()
            .map(|item| pb::ConfigRevision {
                version: item.version,
                json: serde_json::to_string(&properties_to_json(&item)).unwrap_or_default(),
                updated_at: item.updated_at,
            })
            .collect();
        Ok(Response::new(pb::GetHistoryResponse { revisions }))
    }

    async fn get_by_revision(
        &self,
        request: Request<pb::GetByRevisionRequest>,
    ) -> Result<Response<pb::ConfigJSONResponse>, Status> {
        let req = request.into_inner();
        let item = self.engine.get_by_revision(&req.key, req.revision).map_err(Status::from)?;
        Ok(Response::new(pb::ConfigJSONResponse {
            json: serde_json::to_string(&properties_to_json(&item)).unwrap_or_default(),
            version: item.version,
        }))
    }

    type WatchStream = Pin<Box<dyn futures::Stream<Item = Result<pb::ConfigJSONResponse, Status>> + Send + 'static>>;

    async fn watch(&self, request: Request<pb::WatchConfigRequest>) -> Result<Response<Self::WatchStream>, Status> {
        let req = request.into_inner();
        let engine = Arc::clone(&self.engine);
        let stream = engine.watch_changes(req.logical_key, req.env);
        let mapped = futures::StreamExt::map(stream, |result| {
            result
                .map(|json| pb::ConfigJSONResponse { json: json.to_string(), version: 0 })
                .map_err(Status::from)
        });
        Ok(Response::new(Box::pin(mapped)))
    }
}

/// `GetHistory`/`GetByRevision` return the item's own properties
/// (unexpanded: no ref resolution, since a historical revision should
/// reflect exactly what was stored, not today's referents).
fn properties_to_json(item: &ConfigItem) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    for (name, value) in &item.properties {
        obj.insert(
            name.clone(),
            serde_json::json!({"value": value.value, "type": value_type_to_str(value.value_type)}),
        );
    }
    serde_json::Value::Object(obj)
}
