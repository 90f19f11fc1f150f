//! Signaling Hub
//!
//! Real-time signaling and room-state engine for a mesh-topology WebRTC
//! application. Clients hold persistent bidirectional channels to the hub;
//! the hub groups them into named rooms, relays peer session-description
//! and ICE-candidate messages, propagates per-participant presence, and
//! enforces role-based moderation.
//!
//! # Architecture
//!
//! ```text
//! transport (WebSocket / long-poll)      tasks (sweep, health line)
//!        \                                /
//!         +---- hub engine task (single writer) ----+
//!         |  connection registry + session index    |
//!         |  room registry (members, host, creator) |
//!         |  host election                          |
//!         |  health map <- per-connection monitors  |
//!         +-----------------------------------------+
//! ```
//!
//! All room mutations serialize through the engine mailbox; transport I/O,
//! health monitors and supervisor timers run as independent tasks joined
//! by a `CancellationToken` hierarchy for shutdown.
//!
//! # Modules
//!
//! - [`transport`] - duplex transports, per-connection send-queues, fan-out
//! - [`actors`] - the engine task: event router and room-state owner
//! - [`state`] - registries (connections, rooms) and host election
//! - [`events`] - wire envelope, typed inbound payloads, outbound shapes
//! - [`monitor`] - per-connection adaptive ping loop
//! - [`tasks`] - lifecycle supervisor (stale sweep, health line)
//! - [`config`] - environment configuration
//! - [`errors`] - error taxonomy

#![warn(clippy::pedantic)]

pub mod actors;
pub mod config;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod monitor;
pub mod observability;
pub mod state;
pub mod system_info;
pub mod tasks;
pub mod transport;
