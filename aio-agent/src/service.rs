//! `AgentService` RPC surface, a thin wire adapter over
//! `aio_runtime::AgentEngine`. All serialization/deserialization and
//! error-kind mapping to `tonic::Status` lives here; none of the
//! actual nginx/systemd/SSL logic does.

use aio_proto::agent::agent_service_server::AgentService;
use aio_proto::agent::{self as pb};
use aio_runtime::AgentEngine;
use tonic::{Request, Response, Status};

pub struct AgentServiceImpl {
    engine: AgentEngine,
}

impl AgentServiceImpl {
    pub fn new(engine: AgentEngine) -> Self {
        AgentServiceImpl { engine }
    }
}

#[tonic::async_trait]
impl AgentService for AgentServiceImpl {
    async fn put_nginx_config(
        &self,
        request: Request<pb::PutNginxConfigRequest>,
    ) -> Result<Response<pb::PutNginxConfigResponse>, Status> {
        let req = request.into_inner();
        let path = self
            .engine
            .nginx
            .put(&req.name, &req.content, req.validate, req.reload)
            .await
            .map_err(Status::from)?;
        Ok(Response::new(pb::PutNginxConfigResponse {
            path: path.display().to_string(),
        }))
    }

    async fn delete_nginx_config(
        &self,
        request: Request<pb::DeleteNginxConfigRequest>,
    ) -> Result<Response<pb::DeleteNginxConfigResponse>, Status> {
        let req = request.into_inner();
        self.engine
            .nginx
            .delete(&req.name, req.validate, req.reload)
            .await
            .map_err(Status::from)?;
        Ok(Response::new(pb::DeleteNginxConfigResponse {}))
    }

    async fn get_nginx_config(
        &self,
        request: Request<pb::GetNginxConfigRequest>,
    ) -> Result<Response<pb::GetNginxConfigResponse>, Status> {
        let req = request.into_inner();
        let content = self.engine.nginx.get(&req.name).await.map_err(Status::from)?;
        Ok(Response::new(pb::GetNginxConfigResponse { content }))
    }

    async fn list_nginx_configs(
        &self,
        request: Request<pb::ListNginxConfigsRequest>,
    ) -> Result<Response<pb::ListNginxConfigsResponse>, Status> {
        let req = request.into_inner();
        let keyword = if req.keyword.is_empty() { None } else { Some(req.keyword.as_str()) };
        let names = self.engine.nginx.list(keyword).await.map_err(Status::from)?;
        Ok(Response::new(pb::ListNginxConfigsResponse { names }))
    }

    async fn validate_nginx_config(
        &self,
        _request: Request<pb::ValidateNginxConfigRequest>,
    ) -> Result<Response<pb::ValidateNginxConfigResponse>, Status> {
        let (ok, output) = self.engine.nginx.validate().await.map_err(Status::from)?;
        Ok(Response::new(pb::ValidateNginxConfigResponse { ok, output }))
    }

    async fn reload_nginx(
        &self,
        _request: Request<pb::ReloadNginxRequest>,
    ) -> Result<Response<pb::ReloadNginxResponse>, Status> {
        let output = self.engine.nginx.reload().await.map_err(Status::from)?;
        Ok(Response::new(pb::ReloadNginxResponse { output }))
    }

    async fn put_systemd_unit(
        &self,
        request: Request<pb::PutSystemdUnitRequest>,
    ) -> Result<Response<pb::PutSystemdUnitResponse>, Status> {
        let req = request.into_inner();
        let path = self
            .engine
            .systemd
            .put_unit(&req.name, &req.content, req.daemon_reload)
            .await
            .map_err(Status::from)?;
        Ok(Response::new(pb::PutSystemdUnitResponse {
            path: path.display().to_string(),
        }))
    }

    async fn delete_systemd_unit(
        &self,
        request: Request<pb::DeleteSystemdUnitRequest>,
    ) -> Result<Response<pb::DeleteSystemdUnitResponse>, Status> {
        let req = request.into_inner();
        self.engine
            .systemd
            .delete_unit(&req.name, req.stop, req.disable, req.daemon_reload)
            .await
            .map_err(Status::from)?;
        Ok(Response::new(pb::DeleteSystemdUnitResponse {}))
    }

    async fn systemd_service_control(
        &self,
        request: Request<pb::SystemdServiceControlRequest>,
    ) -> Result<Response<pb::SystemdServiceControlResponse>, Status> {
        let req = request.into_inner();
        let output = self.engine.systemd.control(&req.name, &req.action).await.map_err(Status::from)?;
        Ok(Response::new(pb::SystemdServiceControlResponse { output }))
    }

    async fn get_systemd_service_status(
        &self,
        request: Request<pb::GetSystemdServiceStatusRequest>,
    ) -> Result<Response<pb::GetSystemdServiceStatusResponse>, Status> {
        let req = request.into_inner();
        let status = self.engine.systemd.status(&req.name).await.map_err(Status::from)?;
        Ok(Response::new(pb::GetSystemdServiceStatusResponse {
            load_state: status.load_state,
            active_state: status.active_state,
            sub_state: status.sub_state,
            unit_file_state: status.unit_file_state,
            main_pid: status.main_pid,
            active_enter_timestamp: status.active_enter_timestamp,
            memory_current_bytes: status.memory_current_bytes,
            result: status.result,
        }))
    }

    async fn get_systemd_service_logs(
        &self,
        request: Request<pb::GetSystemdServiceLogsRequest>,
    ) -> Result<Response<pb::GetSystemdServiceLogsResponse>, Status> {
        let req = request.into_inner();
        let since = if req.since.is_empty() { None } else { Some(req.since.as_str()) };
        let until = if req.until.is_empty() { None } else { Some(req.until.as_str()) };
        let lines = self
            .engine
            .systemd
            .logs(&req.name, req.lines, since, until)
            .await
            .map_err(Status::from)?;
        Ok(Response::new(pb::GetSystemdServiceLogsResponse { lines }))
    }

    async fn deploy_ssl_certificate(
        &self,
        request: Request<pb::DeploySSLCertificateRequest>,
    ) -> Result<Response<pb::DeploySSLCertificateResponse>, Status> {
        let req = request.into_inner();
        let (fullchain_path, privkey_path) = self
            .engine
            .deploy_ssl_certificate(
                &req.base_path,
                &req.fullchain_name,
                &req.privkey_name,
                &req.fullchain_pem,
                &req.privkey_pem,
                req.file_mode,
            )
            .await
            .map_err(Status::from)?;
        Ok(Response::new(pb::DeploySSLCertificateResponse {
            fullchain_path: fullchain_path.display().to_string(),
            privkey_path: privkey_path.display().to_string(),
        }))
    }

    async fn reload_service(
        &self,
        request: Request<pb::ReloadServiceRequest>,
    ) -> Result<Response<pb::ReloadServiceResponse>, Status> {
        let req = request.into_inner();
        let output = self
            .engine
            .reload_service(&req.service_type, &req.service_name)
            .await
            .map_err(Status::from)?;
        Ok(Response::new(pb::ReloadServiceResponse { output }))
    }
}
