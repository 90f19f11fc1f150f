//! Room-state engine data stores.
//!
//! Three owned registries, mutated only by the engine task:
//!
//! - [`connections`] - participant records keyed by connection id plus the
//!   display-name session index used for duplicate-session preemption
//! - [`rooms`] - room membership (insertion-ordered), host map, creator map
//! - [`election`] - host-election transitions operating on the two above

pub mod connections;
pub mod election;
pub mod participant;
pub mod rooms;

pub use connections::ConnectionRegistry;
pub use participant::{Participant, ParticipantSummary, Presence};
pub use rooms::RoomRegistry;
