//! Call-event orchestration
//!
//! Consumes provider call events and pairs the PSTN leg and the SIP leg of a
//! user's call into one audio bridge:
//! - `incomingcall`: create the opposite leg, tagged with the incoming leg id
//! - `answer`: bridge the answered leg with the leg named by its tag
//! - `hangup`: tear the bridge down by hanging up the remaining leg
//!
//! Events can arrive concurrently and out of order. Transitions that read and
//! then mutate the leg registry hold the locks of the legs involved.

pub mod gateway;
pub mod locks;
pub mod registry;


use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::Url;
use thiserror::Error;

use crate::models::{CallEvent, EventType, User};
use super::config::user_url;

pub use gateway::{CallGateway, CallRequest, GatewayError, LegInfo, LegState};
pub use locks::LegLocks;
pub use registry::LegRegistry;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("User not found: {0}")]
    UnresolvedUser(String),
    #[error("Gateway error during {step}: {source}")]
    Gateway {
        step: &'static str,
        #[source]
        source: GatewayError,
    },
}

/// Which side originated an incoming call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Someone dialed the user's number; ring the SIP endpoint
    FromPstn,
    /// The SIP endpoint dialed out; call the dialed number
    FromSip,
}

/// Result of a completed transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    LegCreated {
        leg_id: String,
        to: String,
        direction: Direction,
    },
    Bridged {
        bridge_id: String,
    },
    /// The peer leg already belongs to a bridge
    AlreadyBridged,
    /// The peer leg ended before it could be bridged; the answered leg was hung up
    PeerGone,
    /// The answered leg ended before it could be bridged; the peer leg was hung up
    LegGone,
    TornDown {
        bridge_id: String,
        hung_up: Vec<String>,
    },
    NoPeerTag,
    NoRegisteredBridge,
    Ignored,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::LegCreated { leg_id, to, .. } => write!(f, "created leg {} to {}", leg_id, to),
            Outcome::Bridged { bridge_id } => write!(f, "bridged as {}", bridge_id),
            Outcome::AlreadyBridged => write!(f, "peer already bridged"),
            Outcome::PeerGone => write!(f, "peer leg gone"),
            Outcome::LegGone => write!(f, "answered leg gone"),
            Outcome::TornDown { bridge_id, hung_up } => {
                write!(f, "tore down {} ({} legs hung up)", bridge_id, hung_up.len())
            }
            Outcome::NoPeerTag => write!(f, "no peer tag"),
            Outcome::NoRegisteredBridge => write!(f, "no registered bridge"),
            Outcome::Ignored => write!(f, "ignored"),
        }
    }
}

/// Drives call legs through creation, pairing, bridging and teardown
pub struct EventDispatcher {
    gateway: Arc<dyn CallGateway>,
    registry: LegRegistry,
    locks: LegLocks,
    base_url: Url,
    timeout: Duration,
}

impl EventDispatcher {
    pub fn new(gateway: Arc<dyn CallGateway>, base_url: Url, timeout: Duration) -> Self {
        Self {
            gateway,
            registry: LegRegistry::new(),
            locks: LegLocks::new(),
            base_url,
            timeout,
        }
    }

    pub fn registry(&self) -> &LegRegistry {
        &self.registry
    }

    /// Run the transition for `event` on a background task. The provider is
    /// acknowledged independently of the outcome.
    pub fn spawn(self: &Arc<Self>, event: CallEvent, user: User) -> tokio::task::JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            match dispatcher.dispatch(&event, &user).await {
                Ok(outcome) => tracing::info!(
                    "{} event for {} on {}: {}",
                    event.event_type, user.user_name, event.call_id, outcome
                ),
                Err(e) => tracing::error!(
                    "Callback error ({} for {} on {}): {}",
                    event.event_type, user.user_name, event.call_id, e
                ),
            }
        })
    }

    /// Execute exactly one transition for `event`
    pub async fn dispatch(&self, event: &CallEvent, user: &User) -> Result<Outcome, DispatchError> {
        match event.event_type {
            EventType::IncomingCall => self.on_incoming_call(event, user).await,
            EventType::Answer => self.on_answer(event).await,
            EventType::Hangup => self.on_hangup(event).await,
            EventType::Other => Ok(Outcome::Ignored),
        }
    }

    async fn on_incoming_call(&self, event: &CallEvent, user: &User) -> Result<Outcome, DispatchError> {
        // Best-effort direction inference: the provider does not say which
        // side of the user's identity originated the call.
        let (to, direction) = if user.phone_number == event.to {
            (user.endpoint.sip_uri.clone(), Direction::FromPstn)
        } else if user.endpoint.sip_uri.contains(event.from.trim()) {
            (event.to.clone(), Direction::FromSip)
        } else {
            tracing::debug!(
                "Incoming call {} ({} -> {}) does not belong to {}",
                event.call_id, event.from, event.to, user.user_name
            );
            return Ok(Outcome::Ignored);
        };

        match direction {
            Direction::FromPstn => tracing::debug!("Handle incoming call: call to sip {}", to),
            Direction::FromSip => tracing::debug!("Handle outgoing call: call to {}", to),
        }

        let request = CallRequest {
            from: user.phone_number.clone(),
            to: to.clone(),
            callback_url: user_url(&self.base_url, &user.user_name, Some("callback")),
            tag: event.call_id.clone(),
        };
        let leg_id = self.step("create call", self.gateway.create_call(&request)).await?;

        Ok(Outcome::LegCreated { leg_id, to, direction })
    }

    async fn on_answer(&self, event: &CallEvent) -> Result<Outcome, DispatchError> {
        let Some(peer) = event.peer_tag() else {
            return Ok(Outcome::NoPeerTag);
        };
        let leg = event.call_id.as_str();

        let _guard = self.locks.acquire(&[leg, peer]).await;

        if let Some(bridge_id) = self.registry.get(peer).await {
            tracing::debug!("Leg {} already bridged as {}", peer, bridge_id);
            return Ok(Outcome::AlreadyBridged);
        }

        let peer_info = match self.step("get peer call", self.gateway.get_call(peer)).await {
            Ok(info) => info,
            Err(DispatchError::Gateway { source: GatewayError::NotFound(_), .. }) => {
                return self.drop_orphan(leg, peer).await;
            }
            Err(e) => return Err(e),
        };

        if let Some(bridge_id) = &peer_info.bridge_id {
            tracing::debug!("Leg {} already bridged as {}", peer, bridge_id);
            return Ok(Outcome::AlreadyBridged);
        }
        if peer_info.state.is_terminal() {
            return self.drop_orphan(leg, peer).await;
        }

        // The answered leg may have hung up before its answer was processed
        let leg_alive = match self.step("get answered call", self.gateway.get_call(leg)).await {
            Ok(info) => !info.state.is_terminal(),
            Err(DispatchError::Gateway { source: GatewayError::NotFound(_), .. }) => false,
            Err(e) => return Err(e),
        };
        if !leg_alive {
            tracing::info!("Answered leg {} is gone, hanging up {}", leg, peer);
            self.step("hang up orphaned call", self.gateway.hangup_call(peer)).await?;
            return Ok(Outcome::LegGone);
        }

        if !peer_info.state.is_active() {
            self.step("answer peer call", self.gateway.answer_call(peer)).await?;
        }

        let bridge_id = self
            .step("create bridge", self.gateway.create_bridge([leg, peer], true))
            .await?;
        self.registry.bind(leg, peer, &bridge_id).await;

        Ok(Outcome::Bridged { bridge_id })
    }

    async fn on_hangup(&self, event: &CallEvent) -> Result<Outcome, DispatchError> {
        let leg = event.call_id.as_str();
        let _guard = self.locks.acquire(&[leg]).await;

        let Some((bridge_id, released)) = self.registry.release(leg).await else {
            return Ok(Outcome::NoRegisteredBridge);
        };
        tracing::debug!("Released legs {:?} of bridge {}", released, bridge_id);

        let members = self
            .step("list bridge calls", self.gateway.bridge_members(&bridge_id))
            .await?;

        let active: Vec<&LegInfo> = members.iter().filter(|m| m.state.is_active()).collect();
        let results = join_all(active.iter().map(|member| {
            tracing::debug!("Hangup another call {}", member.id);
            self.step("hang up bridged call", self.gateway.hangup_call(&member.id))
        }))
        .await;

        let mut hung_up = Vec::with_capacity(active.len());
        let mut first_error = None;
        for (member, result) in active.iter().zip(results) {
            match result {
                Ok(()) => hung_up.push(member.id.clone()),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => tracing::error!("Hangup of {} failed: {}", member.id, e),
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        Ok(Outcome::TornDown { bridge_id, hung_up })
    }

    async fn drop_orphan(&self, leg: &str, peer: &str) -> Result<Outcome, DispatchError> {
        tracing::info!("Peer leg {} is gone, hanging up {}", peer, leg);
        self.step("hang up orphaned call", self.gateway.hangup_call(leg)).await?;
        Ok(Outcome::PeerGone)
    }

    /// Await one gateway call, bounded by the configured timeout
    async fn step<T, F>(&self, step: &'static str, call: F) -> Result<T, DispatchError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        let source = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => GatewayError::Timeout(self.timeout),
        };
        Err(DispatchError::Gateway { step, source })
    }
}
