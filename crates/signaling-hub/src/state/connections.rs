//! Connection registry: participant records plus the session index.
//!
//! The session index maps a display name to the connection ids currently
//! holding it. The join handler reads it to find the sessions a new join
//! preempts; all mutations run inside the engine task, which gives the
//! preempt-then-register sequence the atomicity the join contract needs.

use super::participant::Participant;
use std::collections::HashMap;

/// Process-wide participant store, keyed by connection id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    participants: HashMap<String, Participant>,
    /// Display name -> connection ids currently bearing that name.
    by_name: HashMap<String, Vec<String>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total live participant records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    #[must_use]
    pub fn get(&self, connection_id: &str) -> Option<&Participant> {
        self.participants.get(connection_id)
    }

    pub fn get_mut(&mut self, connection_id: &str) -> Option<&mut Participant> {
        self.participants.get_mut(connection_id)
    }

    #[must_use]
    pub fn contains(&self, connection_id: &str) -> bool {
        self.participants.contains_key(connection_id)
    }

    /// Connection ids currently holding `name`.
    #[must_use]
    pub fn sessions_named(&self, name: &str) -> Vec<String> {
        self.by_name.get(name).cloned().unwrap_or_default()
    }

    /// Remove every participant holding `name` and return the removed
    /// records. This is the preemption half of the join contract; the
    /// caller follows up with room removal, `user-left` emission, and a
    /// forced transport close for each returned record.
    pub fn preempt_sessions(&mut self, name: &str) -> Vec<Participant> {
        let conn_ids = self.by_name.remove(name).unwrap_or_default();
        conn_ids
            .into_iter()
            .filter_map(|conn_id| self.participants.remove(&conn_id))
            .collect()
    }

    /// Register a participant record and index its display name.
    pub fn register(&mut self, participant: Participant) {
        self.by_name
            .entry(participant.name.clone())
            .or_default()
            .push(participant.connection_id.clone());
        self.participants
            .insert(participant.connection_id.clone(), participant);
    }

    /// Remove one participant record, keeping the session index consistent.
    pub fn remove(&mut self, connection_id: &str) -> Option<Participant> {
        let participant = self.participants.remove(connection_id)?;
        if let Some(ids) = self.by_name.get_mut(&participant.name) {
            ids.retain(|id| id != connection_id);
            if ids.is_empty() {
                self.by_name.remove(&participant.name);
            }
        }
        Some(participant)
    }

    /// Rename a participant, re-keying the session index.
    ///
    /// Returns the old name, or `None` when the connection has no record.
    pub fn rename(&mut self, connection_id: &str, new_name: &str) -> Option<String> {
        let participant = self.participants.get_mut(connection_id)?;
        let old_name = std::mem::replace(&mut participant.name, new_name.to_string());

        if let Some(ids) = self.by_name.get_mut(&old_name) {
            ids.retain(|id| id != connection_id);
            if ids.is_empty() {
                self.by_name.remove(&old_name);
            }
        }
        self.by_name
            .entry(new_name.to_string())
            .or_default()
            .push(connection_id.to_string());

        Some(old_name)
    }

    /// Iterate all participant records.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }
}
