//! Agent Client Protocol (ACP) subprocess plumbing.
//!
//! The gateway talks to each agent subprocess over line-delimited JSON-RPC
//! 2.0 on stdio. This module owns everything on that boundary:
//!
//! - [`codec`]: newline framing with a per-line size cap.
//! - [`wire`]: JSON-RPC frame construction and inbound classification,
//!   plus the `session/update` payload model.
//! - [`spawn`]: process-group spawning, stderr forwarding, liveness probes,
//!   and two-stage group termination.
//! - [`driver`]: the per-process protocol state machine — request/response
//!   demultiplexing, permission auto-answering, prompt event streams, and
//!   notification-queue hygiene across session loads.

pub mod codec;
pub mod driver;
pub mod spawn;
pub mod wire;
