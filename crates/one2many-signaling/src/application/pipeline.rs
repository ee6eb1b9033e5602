//! The media-pipeline seam.
//!
//! [`PipelineClient`] is everything the coordinator needs from the external
//! media server.  The production implementation speaks JSON-RPC to a Kurento
//! media server; tests and local runs use the in-memory pipeline.
//!
//! None of these calls are assumed idempotent.  Release methods take their
//! handle by value so an owner cannot release the same handle twice.

use async_trait::async_trait;
use thiserror::Error;

use one2many_core::{BroadcastError, EndpointId, PipelineId};

/// Failures reported by a [`PipelineClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The media server could not be reached.
    #[error("Could not find media server at address {uri}. Exiting with error {reason}")]
    Unavailable { uri: String, reason: String },

    /// The media server answered with an error object.
    #[error("media server error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// No answer arrived within the request timeout.
    #[error("media server did not answer '{method}' in time")]
    Timeout { method: &'static str },

    /// The connection to the media server closed while a request was pending.
    #[error("connection to media server closed")]
    ConnectionClosed,

    /// The answer did not have the expected shape.
    #[error("malformed media server response: {0}")]
    MalformedResponse(String),
}

impl From<PipelineError> for BroadcastError {
    fn from(e: PipelineError) -> Self {
        BroadcastError::Pipeline(e.to_string())
    }
}

/// Asynchronous façade over the external media pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PipelineClient: Send + Sync {
    /// Creates the shared media pipeline.
    async fn create_pipeline(&self) -> Result<PipelineId, PipelineError>;

    /// Creates a participant endpoint inside `pipeline`.
    async fn create_endpoint(&self, pipeline: &PipelineId) -> Result<EndpointId, PipelineError>;

    /// Negotiates `sdp_offer` on `endpoint` and returns the SDP answer.
    async fn process_offer(
        &self,
        endpoint: &EndpointId,
        sdp_offer: &str,
    ) -> Result<String, PipelineError>;

    /// Routes media from `source` into `sink`.
    async fn connect(&self, source: &EndpointId, sink: &EndpointId) -> Result<(), PipelineError>;

    async fn release_pipeline(&self, pipeline: PipelineId) -> Result<(), PipelineError>;

    async fn release_endpoint(&self, endpoint: EndpointId) -> Result<(), PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_message_names_the_address() {
        let err = PipelineError::Unavailable {
            uri: "ws://10.0.0.9:8888/kurento".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err
            .to_string()
            .starts_with("Could not find media server at address ws://10.0.0.9:8888/kurento"));
    }

    #[test]
    fn test_pipeline_error_converts_to_broadcast_pipeline_failure() {
        let err: BroadcastError = PipelineError::Rpc {
            code: 40101,
            message: "Object not found".to_string(),
        }
        .into();
        assert_eq!(
            err,
            BroadcastError::Pipeline("media server error 40101: Object not found".to_string())
        );
    }
}
