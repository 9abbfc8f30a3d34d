//! Outbound transport boundary.
//!
//! The router hands every emission to a [`Publisher`] together with its
//! [`RoutingDetails`]. Exchange topology and wire properties belong to the
//! publisher implementation.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Publish failures.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("publish rejected: {0}")]
    Rejected(String),
}

/// Exchange kind a message is published to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeType {
    Direct,
    Topic,
    Fanout,
}

/// Audience of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    /// Delivered to one client session.
    Session,
    /// Stays between backend services.
    Internal,
    /// Originates from a client frontend.
    Frontend,
}

/// Where and how one message is routed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDetails {
    pub event_name: String,
    pub exchange: String,
    pub exchange_type: ExchangeType,
    pub routing_key: String,
    pub scope: Scope,
    /// Target session for session-scoped messages.
    pub session_id: Option<String>,
    /// Correlation id of the subscription this message belongs to.
    pub subscription_id: Option<String>,
}

impl RoutingDetails {
    pub fn builder(event_name: impl Into<String>) -> RoutingDetailsBuilder {
        RoutingDetailsBuilder {
            details: RoutingDetails {
                event_name: event_name.into(),
                exchange: String::new(),
                exchange_type: ExchangeType::Topic,
                routing_key: String::new(),
                scope: Scope::Internal,
                session_id: None,
                subscription_id: None,
            },
        }
    }
}

/// Builder for [`RoutingDetails`].
#[derive(Clone, Debug)]
pub struct RoutingDetailsBuilder {
    details: RoutingDetails,
}

impl RoutingDetailsBuilder {
    pub fn exchange(mut self, exchange: impl Into<String>) -> Self {
        self.details.exchange = exchange.into();
        self
    }

    pub fn exchange_type(mut self, exchange_type: ExchangeType) -> Self {
        self.details.exchange_type = exchange_type;
        self
    }

    pub fn routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.details.routing_key = routing_key.into();
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.details.scope = scope;
        self
    }

    pub fn session_id(mut self, session_id: Option<String>) -> Self {
        self.details.session_id = session_id;
        self
    }

    pub fn subscription_id(mut self, subscription_id: impl Into<String>) -> Self {
        self.details.subscription_id = Some(subscription_id.into());
        self
    }

    pub fn build(self) -> RoutingDetails {
        self.details
    }
}

/// Sends messages to the bus.
pub trait Publisher: Send + Sync {
    fn publish(&self, routing: &RoutingDetails, payload: &[u8]) -> Result<(), TransportError>;
}

impl<T: Publisher + ?Sized> Publisher for std::sync::Arc<T> {
    fn publish(&self, routing: &RoutingDetails, payload: &[u8]) -> Result<(), TransportError> {
        (**self).publish(routing, payload)
    }
}

/// A message handed to a [`ChannelPublisher`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub routing: RoutingDetails,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    /// Decode the payload as JSON.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.payload)
    }
}

/// Publisher that forwards messages into an in-process channel.
///
/// A bounded publisher rejects messages once its buffer is full rather than
/// blocking the caller.
#[derive(Clone)]
pub struct ChannelPublisher {
    sender: Sender<OutboundMessage>,
}

impl ChannelPublisher {
    /// Publisher with an unbounded buffer.
    pub fn unbounded() -> (Self, OutboundReceiver) {
        let (sender, receiver) = unbounded();
        (Self { sender }, OutboundReceiver { receiver })
    }

    /// Publisher holding at most `capacity` undelivered messages.
    pub fn bounded(capacity: usize) -> (Self, OutboundReceiver) {
        let (sender, receiver) = bounded(capacity);
        (Self { sender }, OutboundReceiver { receiver })
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, routing: &RoutingDetails, payload: &[u8]) -> Result<(), TransportError> {
        let message = OutboundMessage {
            routing: routing.clone(),
            payload: payload.to_vec(),
        };
        match self.sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TransportError::Rejected("buffer full".to_string())),
            Err(TrySendError::Disconnected(_)) => Err(TransportError::Closed),
        }
    }
}

/// Receiving side of a [`ChannelPublisher`].
pub struct OutboundReceiver {
    receiver: Receiver<OutboundMessage>,
}

impl OutboundReceiver {
    /// Receive the next message (blocking).
    pub fn recv(&self) -> Result<OutboundMessage, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<OutboundMessage, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything published so far, without blocking.
    pub fn drain(&self) -> Vec<OutboundMessage> {
        self.receiver.try_iter().collect()
    }
}
