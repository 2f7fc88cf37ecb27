//! Shared wire types for the courier outbox platform.
//!
//! Both deployables speak the same envelope over Kafka and the same control
//! DTOs over HTTP, so those types live here: the broker envelope, the
//! acknowledgment request the consumer posts back to the producer, and the
//! agent registration/heartbeat payloads of the registry plane.
//!
//! Everything serializes as camelCase JSON; the payload itself is an opaque
//! string the platform never inspects.

pub mod agent;
pub mod envelope;

pub use agent::{
    AgentDescriptor, AgentStatus, HealthStatus, HeartbeatRequest, RegisterAgentRequest,
    ServiceKind,
};
pub use envelope::{retry_idempotency_key, AcknowledgmentRequest, MessageEnvelope};
