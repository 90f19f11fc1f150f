//! Host-election transitions.
//!
//! A room is either host-less or has exactly one host. Transitions run
//! inside the engine task and mutate both the host map and the `is_host`
//! flags on participant records, so the two views never diverge between
//! events. The router is responsible for announcing every transition
//! (`host-changed` or `host-status-update`) to the affected room.

use super::connections::ConnectionRegistry;
use super::rooms::RoomRegistry;

/// Outcome of the join-time election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinElection {
    /// The joiner became host (empty room, or no live host remained).
    Promoted,
    /// The joiner is the room creator and displaced the incumbent.
    DisplacedIncumbent { previous_host: String },
    /// An existing host stands; the joiner is a regular participant.
    NotHost,
}

/// A succession promotion after the host left the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Succession {
    pub new_host: String,
}

/// Decide host status for a joining participant.
///
/// The joiner must already be registered and present in the room's member
/// list. Promotion rules, in order:
///
/// 1. No host entry, or the entry points to a connection that is no longer
///    a live member of the room: the joiner is promoted.
/// 2. The joiner's authenticated user id matches the room's creator id and
///    someone else currently holds host: the incumbent is demoted and the
///    joiner promoted.
pub fn elect_on_join(
    rooms: &mut RoomRegistry,
    connections: &mut ConnectionRegistry,
    room_id: &str,
    joiner_id: &str,
) -> JoinElection {
    let current = rooms.host(room_id).cloned().filter(|host_id| {
        connections
            .get(host_id)
            .is_some_and(|p| p.room_id == room_id)
    });

    match current {
        None => {
            promote(rooms, connections, room_id, joiner_id);
            JoinElection::Promoted
        }
        // Re-join of the sitting host (same connection): refresh the flag.
        Some(host_id) if host_id == joiner_id => {
            promote(rooms, connections, room_id, joiner_id);
            JoinElection::Promoted
        }
        Some(host_id) if joiner_is_creator(rooms, connections, room_id, joiner_id) => {
            if let Some(incumbent) = connections.get_mut(&host_id) {
                incumbent.is_host = false;
            }
            promote(rooms, connections, room_id, joiner_id);
            JoinElection::DisplacedIncumbent {
                previous_host: host_id,
            }
        }
        Some(_) => JoinElection::NotHost,
    }
}

/// Promote the first remaining member when a non-empty room has no live
/// host. Call after any removal; returns the promotion when one happened.
pub fn ensure_host(
    rooms: &mut RoomRegistry,
    connections: &mut ConnectionRegistry,
    room_id: &str,
) -> Option<Succession> {
    if rooms.is_empty(room_id) {
        // remove_member already cleared the host entry with the room
        return None;
    }

    let host_is_live = rooms.host(room_id).is_some_and(|host_id| {
        connections
            .get(host_id)
            .is_some_and(|p| p.room_id == room_id)
    });
    if host_is_live {
        return None;
    }

    let next = rooms.members(room_id).first()?.clone();
    promote(rooms, connections, room_id, &next);
    Some(Succession { new_host: next })
}

/// Explicit `host-transfer`: demote `from`, promote `to`.
///
/// Both must be live members of `room_id` and `from` must currently hold
/// host; otherwise the transfer is refused and nothing changes.
pub fn transfer(
    rooms: &mut RoomRegistry,
    connections: &mut ConnectionRegistry,
    room_id: &str,
    from_id: &str,
    to_id: &str,
) -> bool {
    let from_is_host = rooms.host(room_id).is_some_and(|h| h.as_str() == from_id);
    let target_in_room = connections
        .get(to_id)
        .is_some_and(|p| p.room_id == room_id);
    if !from_is_host || !target_in_room || from_id == to_id {
        return false;
    }

    if let Some(from) = connections.get_mut(from_id) {
        from.is_host = false;
    }
    promote(rooms, connections, room_id, to_id);
    true
}

fn promote(
    rooms: &mut RoomRegistry,
    connections: &mut ConnectionRegistry,
    room_id: &str,
    connection_id: &str,
) {
    rooms.set_host(room_id, connection_id);
    if let Some(p) = connections.get_mut(connection_id) {
        p.is_host = true;
    }
}

fn joiner_is_creator(
    rooms: &RoomRegistry,
    connections: &ConnectionRegistry,
    room_id: &str,
    joiner_id: &str,
) -> bool {
    let Some(creator) = rooms.creator(room_id) else {
        return false;
    };
    connections
        .get(joiner_id)
        .and_then(|p| p.user_id.as_ref())
        .is_some_and(|user_id| user_id == creator)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::state::participant::Participant;

    fn join(
        rooms: &mut RoomRegistry,
        connections: &mut ConnectionRegistry,
        room: &str,
        conn: &str,
        name: &str,
        user_id: Option<&str>,
    ) {
        let mut p = Participant::new(
            conn.to_string(),
            name.to_string(),
            room.to_string(),
            user_id.map(String::from),
        );
        p.last_seen = p.joined_at;
        connections.register(p);
        rooms.add_member(room, conn);
    }

    #[test]
    fn test_first_joiner_is_promoted() {
        let mut rooms = RoomRegistry::new();
        let mut connections = ConnectionRegistry::new();
        join(&mut rooms, &mut connections, "r1", "a", "Alice", None);

        let outcome = elect_on_join(&mut rooms, &mut connections, "r1", "a");
        assert_eq!(outcome, JoinElection::Promoted);
        assert_eq!(rooms.host("r1").unwrap(), "a");
        assert!(connections.get("a").unwrap().is_host);
    }

    #[test]
    fn test_second_joiner_is_not_host() {
        let mut rooms = RoomRegistry::new();
        let mut connections = ConnectionRegistry::new();
        join(&mut rooms, &mut connections, "r1", "a", "Alice", None);
        elect_on_join(&mut rooms, &mut connections, "r1", "a");
        join(&mut rooms, &mut connections, "r1", "b", "Bob", None);

        let outcome = elect_on_join(&mut rooms, &mut connections, "r1", "b");
        assert_eq!(outcome, JoinElection::NotHost);
        assert_eq!(rooms.host("r1").unwrap(), "a");
        assert!(!connections.get("b").unwrap().is_host);
    }

    #[test]
    fn test_returning_creator_displaces_incumbent() {
        let mut rooms = RoomRegistry::new();
        let mut connections = ConnectionRegistry::new();
        rooms.set_creator_if_absent("r1", "user-creator");

        join(&mut rooms, &mut connections, "r1", "a", "Alice", None);
        elect_on_join(&mut rooms, &mut connections, "r1", "a");
        join(
            &mut rooms,
            &mut connections,
            "r1",
            "c",
            "Creator",
            Some("user-creator"),
        );

        let outcome = elect_on_join(&mut rooms, &mut connections, "r1", "c");
        assert_eq!(
            outcome,
            JoinElection::DisplacedIncumbent {
                previous_host: "a".to_string()
            }
        );
        assert_eq!(rooms.host("r1").unwrap(), "c");
        assert!(!connections.get("a").unwrap().is_host);
        assert!(connections.get("c").unwrap().is_host);
    }

    #[test]
    fn test_succession_promotes_first_remaining_member() {
        let mut rooms = RoomRegistry::new();
        let mut connections = ConnectionRegistry::new();
        join(&mut rooms, &mut connections, "r1", "a", "Alice", None);
        elect_on_join(&mut rooms, &mut connections, "r1", "a");
        join(&mut rooms, &mut connections, "r1", "b", "Bob", None);
        join(&mut rooms, &mut connections, "r1", "c", "Cara", None);

        // Host departs.
        connections.remove("a");
        rooms.remove_member("r1", "a");

        let succession = ensure_host(&mut rooms, &mut connections, "r1").unwrap();
        assert_eq!(succession.new_host, "b");
        assert!(connections.get("b").unwrap().is_host);
        assert!(!connections.get("c").unwrap().is_host);
    }

    #[test]
    fn test_succession_noop_when_host_still_live() {
        let mut rooms = RoomRegistry::new();
        let mut connections = ConnectionRegistry::new();
        join(&mut rooms, &mut connections, "r1", "a", "Alice", None);
        elect_on_join(&mut rooms, &mut connections, "r1", "a");
        join(&mut rooms, &mut connections, "r1", "b", "Bob", None);

        connections.remove("b");
        rooms.remove_member("r1", "b");

        assert!(ensure_host(&mut rooms, &mut connections, "r1").is_none());
        assert_eq!(rooms.host("r1").unwrap(), "a");
    }

    #[test]
    fn test_succession_noop_on_empty_room() {
        let mut rooms = RoomRegistry::new();
        let mut connections = ConnectionRegistry::new();
        assert!(ensure_host(&mut rooms, &mut connections, "r1").is_none());
    }

    #[test]
    fn test_transfer_roundtrip_restores_original_host() {
        let mut rooms = RoomRegistry::new();
        let mut connections = ConnectionRegistry::new();
        join(&mut rooms, &mut connections, "r1", "a", "Alice", None);
        elect_on_join(&mut rooms, &mut connections, "r1", "a");
        join(&mut rooms, &mut connections, "r1", "b", "Bob", None);

        assert!(transfer(&mut rooms, &mut connections, "r1", "a", "b"));
        assert_eq!(rooms.host("r1").unwrap(), "b");

        assert!(transfer(&mut rooms, &mut connections, "r1", "b", "a"));
        assert_eq!(rooms.host("r1").unwrap(), "a");
        assert!(connections.get("a").unwrap().is_host);
        assert!(!connections.get("b").unwrap().is_host);
    }

    #[test]
    fn test_transfer_refused_for_non_host_caller() {
        let mut rooms = RoomRegistry::new();
        let mut connections = ConnectionRegistry::new();
        join(&mut rooms, &mut connections, "r1", "a", "Alice", None);
        elect_on_join(&mut rooms, &mut connections, "r1", "a");
        join(&mut rooms, &mut connections, "r1", "b", "Bob", None);

        assert!(!transfer(&mut rooms, &mut connections, "r1", "b", "a"));
        assert_eq!(rooms.host("r1").unwrap(), "a");
    }

    #[test]
    fn test_transfer_refused_for_cross_room_target() {
        let mut rooms = RoomRegistry::new();
        let mut connections = ConnectionRegistry::new();
        join(&mut rooms, &mut connections, "r1", "a", "Alice", None);
        elect_on_join(&mut rooms, &mut connections, "r1", "a");
        join(&mut rooms, &mut connections, "r2", "x", "Xena", None);

        assert!(!transfer(&mut rooms, &mut connections, "r1", "a", "x"));
        assert_eq!(rooms.host("r1").unwrap(), "a");
    }
}
