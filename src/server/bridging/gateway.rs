//! Provider call/bridge operations consumed by the event dispatcher

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Rejected by provider ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Provider-side call state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegState {
    Started,
    Active,
    Transferring,
    Completed,
    Rejected,
    Error,
    #[serde(other)]
    Unknown,
}

impl LegState {
    pub fn is_active(&self) -> bool {
        matches!(self, LegState::Active)
    }

    /// The leg can no longer be answered or bridged
    pub fn is_terminal(&self) -> bool {
        matches!(self, LegState::Completed | LegState::Rejected | LegState::Error)
    }
}

/// Snapshot of a call leg as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegInfo {
    pub id: String,
    pub state: LegState,
    #[serde(rename = "bridgeId", default, skip_serializing_if = "Option::is_none")]
    pub bridge_id: Option<String>,
}

/// Outbound leg to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    pub from: String,
    pub to: String,
    #[serde(rename = "callbackUrl")]
    pub callback_url: String,
    pub tag: String,
}

#[async_trait::async_trait]
pub trait CallGateway: Send + Sync {
    /// Create an outbound leg and return its id
    async fn create_call(&self, request: &CallRequest) -> Result<String, GatewayError>;

    /// Current state of a leg; `NotFound` once the provider forgot it
    async fn get_call(&self, leg_id: &str) -> Result<LegInfo, GatewayError>;

    async fn answer_call(&self, leg_id: &str) -> Result<(), GatewayError>;

    /// Join two legs and return the bridge id
    async fn create_bridge(
        &self,
        leg_ids: [&str; 2],
        bridge_audio: bool,
    ) -> Result<String, GatewayError>;

    async fn bridge_members(&self, bridge_id: &str) -> Result<Vec<LegInfo>, GatewayError>;

    /// Hang up a leg. Hanging up a leg that is already gone succeeds.
    async fn hangup_call(&self, leg_id: &str) -> Result<(), GatewayError>;
}
