//! gRPC service implementation for the Rotation service.
//! Uses tonic with code generated from rotation.proto.

use rotation_core::RotationError;
use rotation_engine::RotationEngine;
use std::sync::Arc;
use std::time::Instant;
use tonic::{Request, Response, Status};
use tracing::error;

// Include the generated protobuf code.
// In CI/production, proto compilation generates this module.
// For development, we provide a manual definition.
pub mod rotation_proto {
    // When proto compilation works:
    // tonic::include_proto!("rotation.v1");

    // Manual definitions matching the proto file:
    #[derive(Clone, prost::Message)]
    pub struct SelectCandidateRequest {
        #[prost(string, tag = "1")]
        pub context_id: String,
    }

    #[derive(Clone, prost::Message)]
    pub struct SelectCandidateResponse {
        #[prost(string, tag = "1")]
        pub candidate_id: String,
        #[prost(bool, tag = "2")]
        pub explored: bool,
        #[prost(double, tag = "3")]
        pub score: f64,
    }

    #[derive(Clone, prost::Message)]
    pub struct CandidateEventRequest {
        #[prost(string, tag = "1")]
        pub context_id: String,
        #[prost(string, tag = "2")]
        pub candidate_id: String,
    }

    #[derive(Clone, prost::Message)]
    pub struct MessageResponse {
        #[prost(string, tag = "1")]
        pub message: String,
    }

    #[derive(Clone, prost::Message)]
    pub struct HealthCheckRequest {
        #[prost(string, tag = "1")]
        pub service: String,
    }

    #[derive(Clone, prost::Message)]
    pub struct HealthCheckResponse {
        #[prost(enumeration = "ServingStatus", tag = "1")]
        pub status: i32,
        #[prost(string, tag = "2")]
        pub node_id: String,
        #[prost(uint64, tag = "3")]
        pub uptime_secs: u64,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, prost::Enumeration)]
    #[repr(i32)]
    pub enum ServingStatus {
        Unknown = 0,
        Serving = 1,
        NotServing = 2,
    }
}

use rotation_proto::*;

/// gRPC Rotation service implementation.
pub struct RotationServiceImpl {
    engine: Arc<RotationEngine>,
    node_id: String,
    start_time: Instant,
}

impl RotationServiceImpl {
    pub fn new(engine: Arc<RotationEngine>, node_id: String) -> Self {
        Self {
            engine,
            node_id,
            start_time: Instant::now(),
        }
    }

    fn require(name: &'static str, value: &str) -> Result<(), Status> {
        if value.is_empty() {
            return Err(Status::invalid_argument(format!(
                "'{name}' must not be empty"
            )));
        }
        Ok(())
    }

    fn map_error(e: RotationError) -> Status {
        match e {
            RotationError::NoCandidatesInContext(context_id) => Status::not_found(format!(
                "no candidates registered in context '{context_id}'"
            )),
            other => {
                error!(error = %other, "gRPC rotation request failed");
                Status::internal(format!("Processing failed: {other}"))
            }
        }
    }
}

#[tonic::async_trait]
impl RotationServiceServer for RotationServiceImpl {
    async fn select_candidate(
        &self,
        request: Request<SelectCandidateRequest>,
    ) -> Result<Response<SelectCandidateResponse>, Status> {
        let req = request.into_inner();
        Self::require("context_id", &req.context_id)?;

        let decision = self
            .engine
            .select_candidate(&req.context_id)
            .await
            .map_err(Self::map_error)?;

        let (explored, score) = match &decision {
            rotation_engine::Decision::Explore { .. } => (true, 0.0),
            rotation_engine::Decision::Exploit { score, .. } => (false, *score),
        };

        Ok(Response::new(SelectCandidateResponse {
            candidate_id: decision.candidate_id().to_string(),
            explored,
            score,
        }))
    }

    async fn record_exposure(
        &self,
        request: Request<CandidateEventRequest>,
    ) -> Result<Response<MessageResponse>, Status> {
        let req = request.into_inner();
        Self::require("context_id", &req.context_id)?;
        Self::require("candidate_id", &req.candidate_id)?;

        self.engine
            .record_exposure(&req.context_id, &req.candidate_id)
            .await
            .map_err(Self::map_error)?;

        Ok(Response::new(MessageResponse {
            message: "exposure recorded".to_string(),
        }))
    }

    async fn record_engagement(
        &self,
        request: Request<CandidateEventRequest>,
    ) -> Result<Response<MessageResponse>, Status> {
        let req = request.into_inner();
        Self::require("context_id", &req.context_id)?;
        Self::require("candidate_id", &req.candidate_id)?;

        self.engine
            .record_engagement(&req.context_id, &req.candidate_id)
            .await
            .map_err(Self::map_error)?;

        Ok(Response::new(MessageResponse {
            message: "engagement recorded".to_string(),
        }))
    }

    async fn add_candidate(
        &self,
        request: Request<CandidateEventRequest>,
    ) -> Result<Response<MessageResponse>, Status> {
        let req = request.into_inner();
        Self::require("context_id", &req.context_id)?;
        Self::require("candidate_id", &req.candidate_id)?;

        self.engine
            .add_candidate(&req.context_id, &req.candidate_id)
            .await
            .map_err(Self::map_error)?;

        Ok(Response::new(MessageResponse {
            message: "candidate added to rotation".to_string(),
        }))
    }

    async fn remove_candidate(
        &self,
        request: Request<CandidateEventRequest>,
    ) -> Result<Response<MessageResponse>, Status> {
        let req = request.into_inner();
        Self::require("context_id", &req.context_id)?;
        Self::require("candidate_id", &req.candidate_id)?;

        let removed = self
            .engine
            .remove_candidate(&req.context_id, &req.candidate_id)
            .await
            .map_err(Self::map_error)?;

        if !removed {
            return Err(Status::not_found(format!(
                "'{}' is not in rotation for '{}'",
                req.candidate_id, req.context_id
            )));
        }

        Ok(Response::new(MessageResponse {
            message: "candidate removed from rotation".to_string(),
        }))
    }

    async fn health_check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        Ok(Response::new(HealthCheckResponse {
            status: ServingStatus::Serving as i32,
            node_id: self.node_id.clone(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }))
    }
}

/// Trait definition for the gRPC service (normally auto-generated by tonic).
#[tonic::async_trait]
pub trait RotationServiceServer: Send + Sync + 'static {
    async fn select_candidate(
        &self,
        request: Request<SelectCandidateRequest>,
    ) -> Result<Response<SelectCandidateResponse>, Status>;

    async fn record_exposure(
        &self,
        request: Request<CandidateEventRequest>,
    ) -> Result<Response<MessageResponse>, Status>;

    async fn record_engagement(
        &self,
        request: Request<CandidateEventRequest>,
    ) -> Result<Response<MessageResponse>, Status>;

    async fn add_candidate(
        &self,
        request: Request<CandidateEventRequest>,
    ) -> Result<Response<MessageResponse>, Status>;

    async fn remove_candidate(
        &self,
        request: Request<CandidateEventRequest>,
    ) -> Result<Response<MessageResponse>, Status>;

    async fn health_check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rotation_core::events::noop_notifier;
    use rotation_engine::{Ledger, MemoryLedger, RotationEngine};

    async fn service_with_members(members: &[&str]) -> RotationServiceImpl {
        let ledger = Arc::new(MemoryLedger::new());
        for candidate in members {
            ledger.add_member("slot-1", candidate).await.unwrap();
        }
        let engine = Arc::new(RotationEngine::new(ledger, noop_notifier()));
        RotationServiceImpl::new(engine, "node-test".to_string())
    }

    #[tokio::test]
    async fn test_select_candidate_explores_fresh_member() {
        let service = service_with_members(&["banner-1"]).await;

        let response = service
            .select_candidate(Request::new(SelectCandidateRequest {
                context_id: "slot-1".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.candidate_id, "banner-1");
        assert!(response.explored);
    }

    #[tokio::test]
    async fn test_select_candidate_rejects_empty_context() {
        let service = service_with_members(&[]).await;

        let status = service
            .select_candidate(Request::new(SelectCandidateRequest {
                context_id: String::new(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status = service
            .select_candidate(Request::new(SelectCandidateRequest {
                context_id: "slot-1".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn test_remove_candidate_not_in_rotation() {
        let service = service_with_members(&["banner-1"]).await;

        let status = service
            .remove_candidate(Request::new(CandidateEventRequest {
                context_id: "slot-1".to_string(),
                candidate_id: "banner-2".to_string(),
            }))
            .await
            .unwrap_err();

        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn test_record_engagement() {
        let service = service_with_members(&["banner-1"]).await;

        let response = service
            .record_engagement(Request::new(CandidateEventRequest {
                context_id: "slot-1".to_string(),
                candidate_id: "banner-1".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.message, "engagement recorded");
    }
}
