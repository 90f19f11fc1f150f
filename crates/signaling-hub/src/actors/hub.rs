//! The hub engine task: event router and room-state owner.
//!
//! A single actor owns the connection registry, room registry, health map
//! and monitor handles. Inbound transport events arrive as mailbox
//! messages and are processed in arrival order per connection; handlers
//! for different rooms serialize here too, which holds up fine at the
//! supported capacity (1000 participants, 50 per room).
//!
//! Handler failures are caught per event and logged with the connection
//! id; a faulty handler never terminates the connection or the process.

use crate::config::Config;
use crate::errors::{HubError, JoinRejection};
use crate::events::inbound::{
    BreakoutStartPayload, ClientEvent, HostMutePayload, HostTransferPayload, HostVideoPayload,
    JoinRoomPayload, PingPayload, RenamePayload, TargetPayload, TypingPayload,
};
use crate::events::outbound::with_fields;
use crate::events::{now_ms, ServerEvent};
use crate::metrics::HubMetrics;
use crate::monitor::{HealthMonitor, HealthSnapshot, MonitorHandle};
use crate::state::{election, ConnectionRegistry, Participant, RoomRegistry};
use crate::transport::Emitter;

use super::messages::{HubMessage, HubStats, RoomSnapshot, SweepReason};

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Mailbox buffer for the engine task.
const HUB_CHANNEL_BUFFER: usize = 1024;

/// Handle to the hub engine.
#[derive(Clone)]
pub struct HubActorHandle {
    sender: mpsc::Sender<HubMessage>,
    cancel_token: CancellationToken,
}

impl HubActorHandle {
    /// Spawn the engine task and return a handle to it.
    #[must_use]
    pub fn new(config: Arc<Config>, emitter: Arc<Emitter>, metrics: Arc<HubMetrics>) -> Self {
        let (sender, receiver) = mpsc::channel(HUB_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = HubActor {
            config,
            receiver,
            self_tx: sender.clone(),
            cancel_token: cancel_token.clone(),
            emitter,
            connections: ConnectionRegistry::new(),
            rooms: RoomRegistry::new(),
            health: HashMap::new(),
            monitors: HashMap::new(),
            metrics,
            draining: false,
            started_at: Instant::now(),
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Announce a newly established connection.
    pub async fn connected(&self, connection_id: String) -> Result<(), HubError> {
        self.send(HubMessage::Connected { connection_id }).await
    }

    /// Forward a decoded inbound event.
    pub async fn inbound(&self, connection_id: String, event: ClientEvent) -> Result<(), HubError> {
        self.send(HubMessage::Inbound {
            connection_id,
            event,
        })
        .await
    }

    /// Announce that a connection's transport is gone.
    pub async fn disconnected(&self, connection_id: String) -> Result<(), HubError> {
        self.send(HubMessage::Disconnected { connection_id }).await
    }

    /// Trigger a stale-connection sweep.
    pub async fn sweep(&self, reason: SweepReason) -> Result<(), HubError> {
        self.send(HubMessage::Sweep { reason }).await
    }

    /// Operator stats snapshot.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(HubMessage::GetStats { respond_to: tx }).await?;
        rx.await
            .map_err(|e| HubError::Internal(format!("response receive failed: {e}")))
    }

    /// Inspect one room.
    pub async fn room_snapshot(&self, room_id: String) -> Result<Option<RoomSnapshot>, HubError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(HubMessage::GetRoom {
            room_id,
            respond_to: tx,
        })
        .await?;
        rx.await
            .map_err(|e| HubError::Internal(format!("response receive failed: {e}")))
    }

    /// Run the graceful-shutdown sequence: broadcast `server-shutdown`,
    /// wait out the soft deadline, then force-close every connection.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(HubMessage::Shutdown { respond_to: tx }).await?;
        rx.await
            .map_err(|e| HubError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the engine task (immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Child token for transport-side tasks.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    async fn send(&self, message: HubMessage) -> Result<(), HubError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| HubError::Internal(format!("channel send failed: {e}")))
    }
}

/// A spawned health-monitor task and its handle.
struct ManagedMonitor {
    handle: MonitorHandle,
    task_handle: JoinHandle<()>,
}

/// The engine task state.
struct HubActor {
    config: Arc<Config>,
    receiver: mpsc::Receiver<HubMessage>,
    /// Clone of our own mailbox sender, handed to spawned monitors.
    self_tx: mpsc::Sender<HubMessage>,
    cancel_token: CancellationToken,
    emitter: Arc<Emitter>,
    connections: ConnectionRegistry,
    rooms: RoomRegistry,
    /// Latest health snapshot per connection, written from monitor reports.
    health: HashMap<String, HealthSnapshot>,
    monitors: HashMap<String, ManagedMonitor>,
    metrics: Arc<HubMetrics>,
    draining: bool,
    started_at: Instant,
}

impl HubActor {
    #[instrument(skip_all, name = "hub.actor")]
    async fn run(mut self) {
        info!(target: "hub.actor", "Hub engine started");

        loop {
            self.reap_finished_monitors().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "hub.actor", "Hub engine received cancellation signal");
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            info!(target: "hub.actor", "Hub engine channel closed, exiting");
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "hub.actor",
            participants = self.connections.len(),
            rooms = self.rooms.room_count(),
            "Hub engine stopped"
        );
    }

    async fn handle_message(&mut self, message: HubMessage) {
        match message {
            HubMessage::Connected { connection_id } => self.handle_connected(&connection_id),

            HubMessage::Inbound {
                connection_id,
                event,
            } => {
                self.metrics.record_event_dispatched();
                let event_name = event.name();
                if let Err(error) = self.route(&connection_id, event) {
                    warn!(
                        target: "hub.actor",
                        connection_id = %connection_id,
                        event = event_name,
                        error = %error,
                        "Event handler failed"
                    );
                }
            }

            HubMessage::Disconnected { connection_id } => {
                self.handle_disconnected(&connection_id);
            }

            HubMessage::HealthReport {
                connection_id,
                snapshot,
            } => {
                // Only track connections the transport still owns.
                if self.health.contains_key(&connection_id) {
                    self.health.insert(connection_id, snapshot);
                }
            }

            HubMessage::Sweep { reason } => self.handle_sweep(reason),

            HubMessage::GetStats { respond_to } => {
                let _ = respond_to.send(self.stats());
            }

            HubMessage::GetRoom {
                room_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.room_snapshot(&room_id));
            }

            HubMessage::Shutdown { respond_to } => {
                self.graceful_shutdown().await;
                let _ = respond_to.send(());
            }
        }
    }

    /// Dispatch one inbound event to its handler.
    fn route(&mut self, conn: &str, event: ClientEvent) -> Result<(), HubError> {
        match event {
            ClientEvent::JoinRoom(payload) => self.handle_join(conn, &payload),

            ClientEvent::Offer(p) => {
                self.relay(conn, "offer", "offer", p.offer, &p.target_id);
                Ok(())
            }
            ClientEvent::Answer(p) => {
                self.relay(conn, "answer", "answer", p.answer, &p.target_id);
                Ok(())
            }
            ClientEvent::IceCandidate(p) => {
                self.relay(conn, "ice-candidate", "candidate", p.candidate, &p.target_id);
                Ok(())
            }

            ClientEvent::UserMuted(p) => {
                self.self_toggle(conn, p.participant_id, "user-muted", "isMuted", p.is_muted);
                Ok(())
            }
            ClientEvent::UserVideoToggled(p) => {
                self.self_toggle(
                    conn,
                    p.participant_id,
                    "user-video-toggled",
                    "isVideoOff",
                    p.is_video_off,
                );
                Ok(())
            }
            ClientEvent::RaiseHandToggled(p) => {
                self.self_toggle(
                    conn,
                    p.participant_id,
                    "raise-hand-toggled",
                    "isRaiseHand",
                    p.is_raise_hand,
                );
                Ok(())
            }

            ClientEvent::Reaction(data) => {
                self.handle_reaction(conn, data);
                Ok(())
            }
            ClientEvent::ChatMessage(data) => {
                self.handle_chat(conn, data);
                Ok(())
            }
            ClientEvent::Typing(payload) => {
                self.handle_typing(conn, &payload);
                Ok(())
            }

            ClientEvent::HostMuteParticipant(payload) => {
                self.handle_host_mute(conn, &payload);
                Ok(())
            }
            ClientEvent::HostToggleVideo(payload) => {
                self.handle_host_video(conn, &payload);
                Ok(())
            }
            ClientEvent::HostRemoveParticipant(payload) => {
                self.handle_host_remove(conn, &payload);
                Ok(())
            }
            ClientEvent::HostTransfer(payload) => {
                self.handle_host_transfer(conn, &payload);
                Ok(())
            }
            ClientEvent::RenameParticipant(payload) => {
                self.handle_rename(conn, &payload);
                Ok(())
            }

            ClientEvent::Ping(payload) => {
                self.handle_client_ping(conn, &payload);
                Ok(())
            }
            ClientEvent::Pong(payload) => {
                self.handle_pong(conn, &payload);
                Ok(())
            }
            ClientEvent::ReconnectRequest => {
                self.handle_reconnect_request(conn);
                Ok(())
            }

            ClientEvent::StartBreakoutRooms(payload) => {
                self.handle_breakout_start(conn, &payload);
                Ok(())
            }
            ClientEvent::EndBreakoutRooms(data) => {
                self.host_room_fanout(conn, "breakout-rooms-ended", data, &[]);
                Ok(())
            }

            ClientEvent::CreatePoll(data) => {
                let stamps = [("createdBy", json!(conn)), ("timestamp", json!(now_ms()))];
                self.host_room_fanout(conn, "poll-created", data, &stamps);
                Ok(())
            }
            ClientEvent::VotePoll(data) => {
                let stamps = [("voterId", json!(conn))];
                self.member_room_fanout(conn, "poll-vote", data, &stamps, false);
                Ok(())
            }
            ClientEvent::EndPoll(data) => {
                self.host_room_fanout(conn, "poll-ended", data, &[]);
                Ok(())
            }

            ClientEvent::WhiteboardDraw(data) => {
                let stamps = [("senderId", json!(conn))];
                self.member_room_fanout(conn, "whiteboard-draw", data, &stamps, true);
                Ok(())
            }
            ClientEvent::WhiteboardClear(data) => {
                let stamps = [("clearedBy", json!(conn))];
                self.member_room_fanout(conn, "whiteboard-clear", data, &stamps, true);
                Ok(())
            }

            ClientEvent::ShareFile(data) => {
                self.handle_file_share(conn, data);
                Ok(())
            }
            ClientEvent::DeleteFile(data) => {
                let stamps = [("deletedBy", json!(conn))];
                self.member_room_fanout(conn, "file-deleted", data, &stamps, false);
                Ok(())
            }

            ClientEvent::AskQuestion(data) => {
                self.handle_ask_question(conn, data);
                Ok(())
            }
            ClientEvent::UpvoteQuestion(data) => {
                let stamps = [("voterId", json!(conn))];
                self.member_room_fanout(conn, "question-upvoted", data, &stamps, false);
                Ok(())
            }
            ClientEvent::AnswerQuestion(data) => {
                let stamps = [("answeredBy", json!(conn))];
                self.host_room_fanout(conn, "question-answered", data, &stamps);
                Ok(())
            }

            ClientEvent::ToggleMeetingLock(data) => {
                self.host_room_fanout(conn, "meeting-locked", data, &[]);
                Ok(())
            }
            ClientEvent::ToggleWaitingRoom(data) => {
                self.host_room_fanout(conn, "waiting-room-toggled", data, &[]);
                Ok(())
            }
            ClientEvent::ToggleScreenShareRestriction(data) => {
                self.host_room_fanout(conn, "screen-share-restricted", data, &[]);
                Ok(())
            }
            ClientEvent::ToggleChatRestriction(data) => {
                self.host_room_fanout(conn, "chat-restricted", data, &[]);
                Ok(())
            }

            ClientEvent::ScreenShareStarted(data) => {
                self.handle_screen_share(conn, data, true);
                Ok(())
            }
            ClientEvent::ScreenShareStopped(data) => {
                self.handle_screen_share(conn, data, false);
                Ok(())
            }

            ClientEvent::HostSpotlightParticipant(payload) => {
                self.handle_spotlight(conn, &payload);
                Ok(())
            }
            ClientEvent::HostRemoveSpotlight(data) => {
                self.handle_remove_spotlight(conn, &data);
                Ok(())
            }

            ClientEvent::ErrorReport(payload) => {
                warn!(
                    target: "hub.actor",
                    connection_id = %conn,
                    message = payload.message.as_deref().unwrap_or("<none>"),
                    "Client reported a transport error"
                );
                self.emitter.emit(
                    conn,
                    &ServerEvent::connection_recovery(
                        "Connection error observed; reconnect if issues persist",
                    ),
                );
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    fn handle_connected(&mut self, conn: &str) {
        self.metrics.connection_opened();
        self.health.insert(conn.to_string(), HealthSnapshot::new());

        let features = self.feature_list();
        self.emitter
            .emit(conn, &ServerEvent::connection_confirmed(conn, &features));

        if !self.draining {
            let (handle, task_handle) = HealthMonitor::spawn(
                conn.to_string(),
                Arc::clone(&self.emitter),
                self.self_tx.clone(),
                self.cancel_token.child_token(),
            );
            self.monitors
                .insert(conn.to_string(), ManagedMonitor { handle, task_handle });
        }

        debug!(target: "hub.actor", connection_id = %conn, "Connection confirmed");
    }

    fn handle_disconnected(&mut self, conn: &str) {
        self.stop_monitor(conn);
        self.health.remove(conn);
        self.metrics.connection_closed();

        if let Some(participant) = self.connections.remove(conn) {
            self.rooms.remove_member(&participant.room_id, conn);
            self.emitter.emit_to_room(
                self.rooms.members(&participant.room_id),
                &ServerEvent::user_left(conn, &participant.name, "disconnected"),
            );
            self.settle_room_after_departure(&participant.room_id, Some(conn));
            self.emit_participant_count(&participant.room_id);

            info!(
                target: "hub.actor",
                connection_id = %conn,
                room_id = %participant.room_id,
                user_name = %participant.name,
                "Participant disconnected"
            );
        }
        self.sync_gauges();
    }

    // ------------------------------------------------------------------
    // join-room pipeline
    // ------------------------------------------------------------------

    fn handle_join(&mut self, conn: &str, payload: &JoinRoomPayload) -> Result<(), HubError> {
        if self.draining {
            self.emitter
                .emit(conn, &ServerEvent::join_error("Server is shutting down"));
            return Ok(());
        }

        if self.connections.len() >= self.config.max_participants {
            self.reject_join(conn, JoinRejection::ServerAtCapacity);
            return Ok(());
        }

        let (room_id, user_name) = match payload.validate() {
            Ok(valid) => valid,
            Err(rejection) => {
                self.reject_join(conn, rejection);
                return Ok(());
            }
        };

        // A connection re-joining (moving to a breakout room, or retrying)
        // leaves its previous room first; it must never preempt itself.
        if let Some(previous) = self.connections.remove(conn) {
            self.rooms.remove_member(&previous.room_id, conn);
            if previous.room_id != room_id {
                self.emitter.emit_to_room(
                    self.rooms.members(&previous.room_id),
                    &ServerEvent::user_left(conn, &previous.name, "switched-room"),
                );
                self.settle_room_after_departure(&previous.room_id, Some(conn));
                self.emit_participant_count(&previous.room_id);
            }
        }

        self.preempt_duplicate_sessions(&user_name);
        self.purge_room_zombies(&room_id, &user_name);

        if self.rooms.member_count(&room_id) >= self.config.max_room_size {
            self.reject_join(conn, JoinRejection::RoomFull);
            return Ok(());
        }

        let participant = Participant::new(
            conn.to_string(),
            user_name.clone(),
            room_id.clone(),
            payload.user_id.clone(),
        );
        self.connections.register(participant);
        let created_room = self.rooms.add_member(&room_id, conn);
        if created_room {
            if let Some(user_id) = &payload.user_id {
                self.rooms.set_creator_if_absent(&room_id, user_id);
            }
        }

        let outcome = election::elect_on_join(&mut self.rooms, &mut self.connections, &room_id, conn);

        let me = self
            .connections
            .get(conn)
            .ok_or_else(|| HubError::ParticipantNotFound(conn.to_string()))?;
        let my_summary = me.summary();
        let my_name = me.name.clone();

        // 1. Announce the join to everyone already in the room.
        self.emitter.emit_to_room_except(
            self.rooms.members(&room_id),
            conn,
            &ServerEvent::user_joined(&my_summary),
        );

        // 2. Host convergence for join-time promotions.
        if matches!(
            outcome,
            election::JoinElection::Promoted | election::JoinElection::DisplacedIncumbent { .. }
        ) {
            self.emitter.emit_to_room(
                self.rooms.members(&room_id),
                &ServerEvent::host_status_update(conn, &my_name),
            );
        }

        // 3. Post-join snapshot for the joiner, excluding self.
        let others: Vec<_> = self
            .rooms
            .members(&room_id)
            .iter()
            .filter(|id| id.as_str() != conn)
            .filter_map(|id| self.connections.get(id))
            .map(Participant::summary)
            .collect();
        self.emitter
            .emit(conn, &ServerEvent::current_participants(&others));

        // 4. Membership count for the whole room.
        self.emit_participant_count(&room_id);

        self.sync_gauges();
        info!(
            target: "hub.actor",
            connection_id = %conn,
            room_id = %room_id,
            user_name = %my_name,
            is_host = matches!(outcome, election::JoinElection::Promoted | election::JoinElection::DisplacedIncumbent { .. }),
            room_size = self.rooms.member_count(&room_id),
            "Participant joined"
        );
        Ok(())
    }

    fn reject_join(&self, conn: &str, rejection: JoinRejection) {
        debug!(
            target: "hub.actor",
            connection_id = %conn,
            reason = %rejection,
            "Join rejected"
        );
        self.emitter
            .emit(conn, &ServerEvent::join_error(&rejection.client_message()));
    }

    /// Step 3 of the join contract: preempt every other connection bearing
    /// the same display name, announcing `user-left` to the rooms they
    /// occupied before forcing their transports closed.
    fn preempt_duplicate_sessions(&mut self, user_name: &str) {
        for old in self.connections.preempt_sessions(user_name) {
            self.rooms.remove_member(&old.room_id, &old.connection_id);
            self.stop_monitor(&old.connection_id);
            self.health.remove(&old.connection_id);

            self.emitter.emit_to_room(
                self.rooms.members(&old.room_id),
                &ServerEvent::user_left(&old.connection_id, &old.name, "duplicate-session"),
            );
            self.emitter.force_close(&old.connection_id);
            self.settle_room_after_departure(&old.room_id, Some(&old.connection_id));
            self.emit_participant_count(&old.room_id);

            info!(
                target: "hub.actor",
                connection_id = %old.connection_id,
                room_id = %old.room_id,
                user_name = %user_name,
                "Preempted duplicate session"
            );
        }
    }

    /// Step 4: drop room entries whose transport is dead or whose name
    /// collides with the joiner (zombies left behind by earlier sessions).
    fn purge_room_zombies(&mut self, room_id: &str, joining_name: &str) {
        let zombies: Vec<String> = self
            .rooms
            .members(room_id)
            .iter()
            .filter(|id| {
                !self.emitter.is_live(id)
                    || self
                        .connections
                        .get(id)
                        .is_none_or(|p| p.name == joining_name)
            })
            .cloned()
            .collect();

        for zombie in zombies {
            let name = self
                .connections
                .remove(&zombie)
                .map(|p| p.name)
                .unwrap_or_default();
            self.rooms.remove_member(room_id, &zombie);
            self.stop_monitor(&zombie);
            self.health.remove(&zombie);

            self.emitter.emit_to_room(
                self.rooms.members(room_id),
                &ServerEvent::user_left(&zombie, &name, "stale-connection"),
            );
            self.emitter.force_close(&zombie);

            info!(
                target: "hub.actor",
                connection_id = %zombie,
                room_id = %room_id,
                "Purged stale room entry"
            );
        }
        self.settle_room_after_departure(room_id, None);
    }

    // ------------------------------------------------------------------
    // Peer signaling
    // ------------------------------------------------------------------

    /// Relay an SDP/ICE blob to exactly one peer in the same room. The
    /// sender id is stamped here from the authenticated connection id;
    /// client-supplied sender fields are ignored. Unknown targets drop.
    fn relay(&self, conn: &str, event_name: &'static str, key: &'static str, payload: Value, target: &str) {
        let Some(sender) = self.connections.get(conn) else {
            return;
        };
        let Some(target_participant) = self.connections.get(target) else {
            return;
        };
        if sender.room_id != target_participant.room_id {
            return;
        }

        let event = ServerEvent::new(event_name, json!({ key: payload, "senderId": conn }));
        self.emitter.emit_to_peer(conn, target, &event);
    }

    // ------------------------------------------------------------------
    // Presence toggles and room-wide fan-outs
    // ------------------------------------------------------------------

    /// Self-state toggle: the sender must be the referenced participant or
    /// a host in the same room. Broadcast goes to the room except sender.
    fn self_toggle(
        &mut self,
        conn: &str,
        target: Option<String>,
        event_name: &'static str,
        key: &'static str,
        value: bool,
    ) {
        let target_id = target.unwrap_or_else(|| conn.to_string());

        let authorized = if target_id == conn {
            self.connections.contains(conn)
        } else {
            match (self.connections.get(conn), self.connections.get(&target_id)) {
                (Some(sender), Some(target_p)) => {
                    sender.is_host && sender.room_id == target_p.room_id
                }
                _ => false,
            }
        };
        if !authorized {
            return;
        }

        let Some(target_p) = self.connections.get_mut(&target_id) else {
            return;
        };
        match key {
            "isMuted" => target_p.is_muted = value,
            "isVideoOff" => target_p.is_video_off = value,
            _ => target_p.is_raise_hand = value,
        }
        let room_id = target_p.room_id.clone();

        let event = ServerEvent::new(event_name, json!({ "participantId": target_id, key: value }));
        self.emitter
            .emit_to_room_except(self.rooms.members(&room_id), conn, &event);
    }

    fn handle_reaction(&self, conn: &str, data: Value) {
        let Some(sender) = self.connections.get(conn) else {
            return;
        };
        let enriched = with_fields(
            data,
            &[
                ("participantId", json!(conn)),
                ("userName", json!(sender.name)),
                ("timestamp", json!(now_ms())),
            ],
        );
        self.emitter.emit_to_room(
            self.rooms.members(&sender.room_id),
            &ServerEvent::new("reaction-received", enriched),
        );
    }

    fn handle_chat(&self, conn: &str, data: Value) {
        let Some(sender) = self.connections.get(conn) else {
            return;
        };
        let enriched = with_fields(
            data,
            &[
                ("senderId", json!(conn)),
                ("userName", json!(sender.name)),
                ("timestamp", json!(now_ms())),
            ],
        );
        self.emitter.emit_to_room(
            self.rooms.members(&sender.room_id),
            &ServerEvent::new("chat-message", enriched),
        );
    }

    fn handle_typing(&self, conn: &str, payload: &TypingPayload) {
        let Some(sender) = self.connections.get(conn) else {
            return;
        };
        let event = ServerEvent::new(
            "user-typing",
            json!({
                "participantId": conn,
                "userName": sender.name,
                "isTyping": payload.is_typing,
            }),
        );
        self.emitter
            .emit_to_room_except(self.rooms.members(&sender.room_id), conn, &event);
    }

    /// Fan-out for opaque payloads any room member may send. With
    /// `except_sender` the sender is excluded from the fan-out.
    fn member_room_fanout(
        &self,
        conn: &str,
        event_name: &'static str,
        data: Value,
        stamps: &[(&str, Value)],
        except_sender: bool,
    ) {
        let Some(sender) = self.connections.get(conn) else {
            return;
        };
        let event = ServerEvent::new(event_name, with_fields(data, stamps));
        let members = self.rooms.members(&sender.room_id);
        if except_sender {
            self.emitter.emit_to_room_except(members, conn, &event);
        } else {
            self.emitter.emit_to_room(members, &event);
        }
    }

    /// Fan-out for opaque payloads that require the host role. Non-host
    /// senders are ignored silently.
    fn host_room_fanout(&self, conn: &str, event_name: &'static str, data: Value, stamps: &[(&str, Value)]) {
        let Some(sender) = self.connections.get(conn) else {
            return;
        };
        if !sender.is_host {
            return;
        }
        let event = ServerEvent::new(event_name, with_fields(data, stamps));
        self.emitter
            .emit_to_room(self.rooms.members(&sender.room_id), &event);
    }

    fn handle_file_share(&self, conn: &str, data: Value) {
        let Some(sender) = self.connections.get(conn) else {
            return;
        };
        let stamps = [
            ("sharedBy", json!(conn)),
            ("userName", json!(sender.name)),
            ("timestamp", json!(now_ms())),
        ];
        self.member_room_fanout(conn, "file-shared", data, &stamps, false);
    }

    fn handle_ask_question(&self, conn: &str, data: Value) {
        let Some(sender) = self.connections.get(conn) else {
            return;
        };
        let stamps = [
            ("askedBy", json!(conn)),
            ("userName", json!(sender.name)),
            ("timestamp", json!(now_ms())),
        ];
        self.member_room_fanout(conn, "question-asked", data, &stamps, false);
    }

    // ------------------------------------------------------------------
    // Host actions
    // ------------------------------------------------------------------

    /// Host guard: the caller must carry the host flag and the target must
    /// be a participant in the caller's room. Returns the shared room id.
    fn host_scope(&self, conn: &str, target: &str) -> Option<String> {
        let sender = self.connections.get(conn)?;
        if !sender.is_host {
            return None;
        }
        let target_p = self.connections.get(target)?;
        if sender.room_id != target_p.room_id {
            return None;
        }
        Some(sender.room_id.clone())
    }

    fn handle_host_mute(&mut self, conn: &str, payload: &HostMutePayload) {
        let Some(room_id) = self.host_scope(conn, &payload.participant_id) else {
            return;
        };
        if let Some(target) = self.connections.get_mut(&payload.participant_id) {
            target.is_muted = payload.is_muted;
        }
        let event = ServerEvent::new(
            "participant-force-muted",
            json!({ "participantId": payload.participant_id, "isMuted": payload.is_muted }),
        );
        self.emitter.emit_to_room(self.rooms.members(&room_id), &event);
    }

    fn handle_host_video(&mut self, conn: &str, payload: &HostVideoPayload) {
        let Some(room_id) = self.host_scope(conn, &payload.participant_id) else {
            return;
        };
        if let Some(target) = self.connections.get_mut(&payload.participant_id) {
            target.is_video_off = payload.is_video_off;
        }
        let event = ServerEvent::new(
            "participant-force-video-toggle",
            json!({ "participantId": payload.participant_id, "isVideoOff": payload.is_video_off }),
        );
        self.emitter.emit_to_room(self.rooms.members(&room_id), &event);
    }

    fn handle_host_remove(&mut self, conn: &str, payload: &TargetPayload) {
        let target = &payload.participant_id;
        let Some(room_id) = self.host_scope(conn, target) else {
            return;
        };

        self.emitter.emit(
            target,
            &ServerEvent::force_disconnect("removed-by-host", "You were removed from the meeting"),
        );

        self.stop_monitor(target);
        self.health.remove(target);
        if let Some(removed) = self.connections.remove(target) {
            self.rooms.remove_member(&room_id, target);
            self.emitter.emit_to_room(
                self.rooms.members(&room_id),
                &ServerEvent::user_left(target, &removed.name, "removed-by-host"),
            );
        }
        self.emitter.force_close(target);
        self.settle_room_after_departure(&room_id, Some(target));
        self.emit_participant_count(&room_id);
        self.sync_gauges();

        info!(
            target: "hub.actor",
            connection_id = %target,
            room_id = %room_id,
            removed_by = %conn,
            "Participant removed by host"
        );
    }

    fn handle_host_transfer(&mut self, conn: &str, payload: &HostTransferPayload) {
        let Some(room_id) = self.host_scope(conn, &payload.new_host_id) else {
            return;
        };
        if !election::transfer(
            &mut self.rooms,
            &mut self.connections,
            &room_id,
            conn,
            &payload.new_host_id,
        ) {
            return;
        }
        self.announce_host_changed(&room_id, &payload.new_host_id, Some(conn));
        info!(
            target: "hub.actor",
            room_id = %room_id,
            previous_host = %conn,
            new_host = %payload.new_host_id,
            "Host transferred"
        );
    }

    fn handle_rename(&mut self, conn: &str, payload: &RenamePayload) {
        let target_id = payload
            .participant_id
            .clone()
            .unwrap_or_else(|| conn.to_string());
        let new_name = payload.new_name.trim();
        if new_name.is_empty() {
            return;
        }

        let authorized = if target_id == conn {
            self.connections.contains(conn)
        } else {
            self.host_scope(conn, &target_id).is_some()
        };
        if !authorized {
            return;
        }

        let Some(old_name) = self.connections.rename(&target_id, new_name) else {
            return;
        };
        let room_id = match self.connections.get(&target_id) {
            Some(p) => p.room_id.clone(),
            None => return,
        };
        self.emitter.emit_to_room(
            self.rooms.members(&room_id),
            &ServerEvent::participant_renamed(&target_id, &old_name, new_name),
        );
    }

    fn handle_spotlight(&self, conn: &str, payload: &TargetPayload) {
        if self.host_scope(conn, &payload.participant_id).is_none() {
            return;
        }
        let Some(sender) = self.connections.get(conn) else {
            return;
        };
        self.emitter.emit_to_room(
            self.rooms.members(&sender.room_id),
            &ServerEvent::participant_spotlighted(&payload.participant_id),
        );
    }

    fn handle_remove_spotlight(&self, conn: &str, data: &Value) {
        let Some(sender) = self.connections.get(conn) else {
            return;
        };
        if !sender.is_host {
            return;
        }
        let target = data.get("participantId").and_then(Value::as_str);
        self.emitter.emit_to_room(
            self.rooms.members(&sender.room_id),
            &ServerEvent::spotlight_removed(target),
        );
    }

    // ------------------------------------------------------------------
    // Breakout rooms
    // ------------------------------------------------------------------

    fn handle_breakout_start(&self, conn: &str, payload: &BreakoutStartPayload) {
        let Some(sender) = self.connections.get(conn) else {
            return;
        };
        if !sender.is_host {
            return;
        }
        let room_id = sender.room_id.clone();

        self.emitter.emit_to_room(
            self.rooms.members(&room_id),
            &ServerEvent::new("breakout-rooms-created", json!({ "rooms": payload.rooms })),
        );
        self.emitter.emit_to_room(
            self.rooms.members(&room_id),
            &ServerEvent::new(
                "breakout-rooms-started",
                json!({ "duration": payload.duration }),
            ),
        );

        for (breakout_id, participants) in payload.assignments() {
            for participant_id in participants {
                let in_room = self
                    .connections
                    .get(&participant_id)
                    .is_some_and(|p| p.room_id == room_id);
                if in_room {
                    self.emitter.emit(
                        &participant_id,
                        &ServerEvent::assigned_to_breakout_room(&breakout_id),
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Screen share
    // ------------------------------------------------------------------

    fn handle_screen_share(&self, conn: &str, data: Value, started: bool) {
        let Some(sender) = self.connections.get(conn) else {
            return;
        };
        let room_id = sender.room_id.clone();
        let name = if started {
            "screen-share-started"
        } else {
            "screen-share-stopped"
        };
        let enriched = with_fields(
            data,
            &[
                ("participantId", json!(conn)),
                ("userName", json!(sender.name)),
            ],
        );
        self.emitter
            .emit_to_room_except(self.rooms.members(&room_id), conn, &ServerEvent::new(name, enriched));

        // Screen share drives spotlight automatically.
        let spotlight = if started {
            ServerEvent::participant_spotlighted(conn)
        } else {
            ServerEvent::spotlight_removed(Some(conn))
        };
        self.emitter
            .emit_to_room(self.rooms.members(&room_id), &spotlight);
    }

    // ------------------------------------------------------------------
    // Health and reconnect
    // ------------------------------------------------------------------

    fn handle_client_ping(&mut self, conn: &str, payload: &PingPayload) {
        if let Some(snapshot) = self.health.get_mut(conn) {
            snapshot.touch();
        }
        let snapshot = self.health.get(conn);
        self.emitter
            .emit(conn, &ServerEvent::pong(payload.timestamp, snapshot));
    }

    fn handle_pong(&mut self, conn: &str, payload: &PingPayload) {
        if let Some(snapshot) = self.health.get_mut(conn) {
            snapshot.touch();
        }
        if let Some(participant) = self.connections.get_mut(conn) {
            participant.last_seen = chrono::Utc::now();
        }
        if let Some(monitor) = self.monitors.get(conn) {
            monitor.handle.notify_pong(payload.timestamp);
        }
    }

    fn handle_reconnect_request(&self, conn: &str) {
        let user_data = self.connections.get(conn).map(Participant::summary);
        let health = self.health.get(conn);
        self.emitter.emit(
            conn,
            &ServerEvent::reconnect_response(user_data.as_ref(), health),
        );
    }

    // ------------------------------------------------------------------
    // Sweep and shutdown
    // ------------------------------------------------------------------

    /// Remove connections whose last liveness observation is older than
    /// the staleness threshold. Removal is silent (no `user-left`); host
    /// transitions still announce so surviving clients converge. Empty
    /// rooms are torn down by the registry as members leave.
    fn handle_sweep(&mut self, reason: SweepReason) {
        let threshold = Duration::from_secs(self.config.stale_after_seconds);
        let now = Instant::now();

        let stale: Vec<String> = self
            .health
            .iter()
            .filter(|(_, snapshot)| now.duration_since(snapshot.last_activity) > threshold)
            .map(|(id, _)| id.clone())
            .collect();

        if stale.is_empty() {
            debug!(target: "hub.actor", reason = reason.as_str(), "Sweep found nothing stale");
            return;
        }

        for conn in &stale {
            self.stop_monitor(conn);
            self.health.remove(conn);
            if let Some(participant) = self.connections.remove(conn) {
                self.rooms.remove_member(&participant.room_id, conn);
                self.settle_room_after_departure(&participant.room_id, Some(conn));
            }
            self.emitter.force_close(conn);
        }
        self.sync_gauges();

        info!(
            target: "hub.actor",
            reason = reason.as_str(),
            swept = stale.len(),
            participants = self.connections.len(),
            rooms = self.rooms.room_count(),
            "Stale sweep complete"
        );
    }

    async fn graceful_shutdown(&mut self) {
        if self.draining {
            return;
        }
        self.draining = true;

        let recovery = self.recovery_snapshot();
        info!(
            target: "hub.actor",
            participants = self.connections.len(),
            rooms = self.rooms.room_count(),
            "Broadcasting shutdown notice"
        );
        self.emitter.broadcast(&ServerEvent::server_shutdown(
            "Server is restarting, please reconnect shortly",
            recovery,
        ));

        for (_, monitor) in self.monitors.drain() {
            monitor.handle.cancel();
        }

        // Soft deadline: give clients a window to close on their own.
        let deadline = Duration::from_secs(self.config.shutdown_soft_deadline_seconds);
        let emitter = Arc::clone(&self.emitter);
        let drained = tokio::time::timeout(deadline, async move {
            while emitter.connection_count() > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await
        .is_ok();

        if !drained {
            warn!(
                target: "hub.actor",
                remaining = self.emitter.connection_count(),
                "Soft deadline expired, force-closing remaining connections"
            );
        }
        self.emitter.close_all();

        info!(target: "hub.actor", "Graceful shutdown complete");
    }

    /// Best-effort recovery hint carried in `server-shutdown`; clients are
    /// expected to re-issue `join-room` after reconnecting.
    fn recovery_snapshot(&self) -> Value {
        let mut rooms = serde_json::Map::new();
        for room_id in self.rooms.room_ids() {
            let participants: Vec<Value> = self
                .rooms
                .members(room_id)
                .iter()
                .filter_map(|id| self.connections.get(id))
                .map(|p| json!({ "id": p.connection_id, "name": p.name }))
                .collect();
            rooms.insert(
                room_id.clone(),
                json!({
                    "participants": participants,
                    "host": self.rooms.host(room_id),
                }),
            );
        }
        json!({
            "rooms": rooms,
            "participantCount": self.connections.len(),
            "timestamp": now_ms(),
        })
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    /// Re-establish the one-host invariant after any departure and
    /// announce the transition when a promotion happened.
    fn settle_room_after_departure(&mut self, room_id: &str, previous_host: Option<&str>) {
        if let Some(succession) =
            election::ensure_host(&mut self.rooms, &mut self.connections, room_id)
        {
            self.announce_host_changed(room_id, &succession.new_host, previous_host);
        }
    }

    fn announce_host_changed(&self, room_id: &str, new_host: &str, previous_host: Option<&str>) {
        let new_host_name = self
            .connections
            .get(new_host)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        let roster: Vec<(String, bool)> = self
            .rooms
            .members(room_id)
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    self.connections.get(id).is_some_and(|p| p.is_host),
                )
            })
            .collect();
        self.emitter.emit_to_room(
            self.rooms.members(room_id),
            &ServerEvent::host_changed(new_host, &new_host_name, previous_host, &roster),
        );
    }

    fn emit_participant_count(&self, room_id: &str) {
        let count = self.rooms.member_count(room_id);
        if count > 0 {
            self.emitter
                .emit_to_room(self.rooms.members(room_id), &ServerEvent::participant_count(count));
        }
    }

    fn stop_monitor(&mut self, conn: &str) {
        if let Some(monitor) = self.monitors.remove(conn) {
            monitor.handle.cancel();
        }
    }

    fn sync_gauges(&self) {
        self.metrics.set_participants(self.connections.len());
        self.metrics.set_rooms(self.rooms.room_count());
    }

    fn feature_list(&self) -> Vec<String> {
        let mut features = vec![
            "webrtc-signaling".to_string(),
            "presence".to_string(),
            "moderation".to_string(),
            "breakout-rooms".to_string(),
            "polls".to_string(),
            "whiteboard".to_string(),
            "file-share".to_string(),
            "qa".to_string(),
            "adaptive-health".to_string(),
        ];
        if let Some(ip) = &self.config.announced_ip {
            features.push(format!("announced-ip:{ip}"));
        }
        features
    }

    fn stats(&self) -> HubStats {
        HubStats {
            hub_id: self.config.hub_id.clone(),
            participants: self.connections.len(),
            rooms: self.rooms.room_count(),
            connections: self.emitter.connection_count(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    fn room_snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        if self.rooms.is_empty(room_id) {
            return None;
        }
        Some(RoomSnapshot {
            members: self
                .rooms
                .members(room_id)
                .iter()
                .filter_map(|id| self.connections.get(id))
                .map(Participant::summary)
                .collect(),
            host: self.rooms.host(room_id).cloned(),
        })
    }

    /// Reap monitor tasks that ended on their own; a panicked monitor is a
    /// bug worth surfacing, but never fatal to the engine.
    async fn reap_finished_monitors(&mut self) {
        let finished: Vec<String> = self
            .monitors
            .iter()
            .filter(|(_, m)| m.task_handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        for conn in finished {
            if let Some(monitor) = self.monitors.remove(&conn) {
                if let Err(join_error) = monitor.task_handle.await {
                    if join_error.is_panic() {
                        error!(
                            target: "hub.actor",
                            connection_id = %conn,
                            error = ?join_error,
                            "Health monitor panicked"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::transport::OutboundFrame;
    use serde_json::json;

    struct TestConn {
        id: String,
        rx: mpsc::UnboundedReceiver<OutboundFrame>,
    }

    impl TestConn {
        fn drain(&mut self) -> Vec<(String, Value)> {
            let mut events = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                if let OutboundFrame::Event(text) = frame {
                    let value: Value = serde_json::from_str(&text).unwrap();
                    events.push((
                        value["event"].as_str().unwrap_or_default().to_string(),
                        value["data"].clone(),
                    ));
                }
            }
            events
        }
    }

    struct Fixture {
        handle: HubActorHandle,
        emitter: Arc<Emitter>,
        counter: usize,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(Config::default())
        }

        fn with_config(config: Config) -> Self {
            let emitter = Emitter::new();
            let metrics = HubMetrics::new();
            let handle = HubActorHandle::new(Arc::new(config), Arc::clone(&emitter), metrics);
            Self {
                handle,
                emitter,
                counter: 0,
            }
        }

        async fn connect(&mut self) -> TestConn {
            self.counter += 1;
            let id = format!("conn-{}", self.counter);
            let (tx, rx) = mpsc::unbounded_channel();
            self.emitter.register(&id, tx);
            self.handle.connected(id.clone()).await.unwrap();
            TestConn { id, rx }
        }

        async fn send(&self, conn: &TestConn, event: &str, data: Value) {
            let frame = json!({ "event": event, "data": data }).to_string();
            let decoded = ClientEvent::parse(&frame).unwrap().expect("known event");
            self.handle.inbound(conn.id.clone(), decoded).await.unwrap();
        }

        async fn settle(&self) {
            // A request/response round-trip flushes everything queued
            // ahead of it in the mailbox.
            let _ = self.handle.stats().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_connection_receives_confirmation() {
        let mut fixture = Fixture::new();
        let mut conn = fixture.connect().await;
        fixture.settle().await;

        let events = conn.drain();
        assert_eq!(events[0].0, "connection-confirmed");
        assert_eq!(events[0].1["socketId"], conn.id);
        assert_eq!(events[0].1["serverVersion"], "2.0.0");
    }

    #[tokio::test]
    async fn test_first_joiner_becomes_host() {
        let mut fixture = Fixture::new();
        let mut alice = fixture.connect().await;
        fixture
            .send(&alice, "join-room", json!({ "roomId": "R1", "userName": "Alice" }))
            .await;
        fixture.settle().await;

        let events = alice.drain();
        let names: Vec<&str> = events.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"host-status-update"));
        assert!(names.contains(&"current-participants"));
        assert!(names.contains(&"participant-count"));

        let snapshot = fixture
            .handle
            .room_snapshot("R1".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.host.as_deref(), Some(alice.id.as_str()));
        assert!(snapshot.members[0].is_host);
    }

    #[tokio::test]
    async fn test_join_error_for_room_id_shaped_name() {
        let mut fixture = Fixture::new();
        let mut conn = fixture.connect().await;
        fixture
            .send(
                &conn,
                "join-room",
                json!({ "roomId": "R1", "userName": "abcdef-ghijkl" }),
            )
            .await;
        fixture.settle().await;

        let events = conn.drain();
        let join_error = events.iter().find(|(n, _)| n == "join-error").unwrap();
        assert_eq!(join_error.1["message"], "Invalid user name");
        assert!(fixture
            .handle
            .room_snapshot("R1".to_string())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_room_full_rejection_leaves_membership_untouched() {
        let mut config = Config::default();
        config.max_room_size = 2;
        let mut fixture = Fixture::with_config(config);

        let alice = fixture.connect().await;
        let bob = fixture.connect().await;
        let mut carol = fixture.connect().await;
        fixture
            .send(&alice, "join-room", json!({ "roomId": "R1", "userName": "Alice" }))
            .await;
        fixture
            .send(&bob, "join-room", json!({ "roomId": "R1", "userName": "Bob" }))
            .await;
        fixture
            .send(&carol, "join-room", json!({ "roomId": "R1", "userName": "Carol" }))
            .await;
        fixture.settle().await;

        let events = carol.drain();
        let join_error = events.iter().find(|(n, _)| n == "join-error").unwrap();
        assert_eq!(join_error.1["message"], "Room is full");

        let snapshot = fixture
            .handle
            .room_snapshot("R1".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.members.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_session_is_preempted() {
        let mut fixture = Fixture::new();
        let mut first = fixture.connect().await;
        fixture
            .send(&first, "join-room", json!({ "roomId": "R1", "userName": "Alice" }))
            .await;

        let mut second = fixture.connect().await;
        fixture
            .send(&second, "join-room", json!({ "roomId": "R1", "userName": "Alice" }))
            .await;
        fixture.settle().await;

        // The first session's transport got a close instruction.
        let mut saw_close = false;
        while let Ok(frame) = first.rx.try_recv() {
            if matches!(frame, OutboundFrame::Close) {
                saw_close = true;
            }
        }
        assert!(saw_close, "preempted session should be force-closed");

        let snapshot = fixture
            .handle
            .room_snapshot("R1".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.members.len(), 1);
        assert_eq!(snapshot.members[0].id, second.id);
        assert_eq!(snapshot.host.as_deref(), Some(second.id.as_str()));

        // The new session never saw its predecessor.
        let events = second.drain();
        let current = events
            .iter()
            .find(|(n, _)| n == "current-participants")
            .unwrap();
        assert_eq!(current.1.as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_offer_is_relayed_to_target_only() {
        let mut fixture = Fixture::new();
        let alice = fixture.connect().await;
        let mut bob = fixture.connect().await;
        let mut carol = fixture.connect().await;
        for (conn, name) in [(&alice, "Alice"), (&bob, "Bob"), (&carol, "Carol")] {
            fixture
                .send(conn, "join-room", json!({ "roomId": "R1", "userName": name }))
                .await;
        }
        fixture.settle().await;
        bob.drain();
        carol.drain();

        fixture
            .send(&alice, "offer", json!({ "offer": "X", "targetId": bob.id }))
            .await;
        fixture.settle().await;

        let bob_events = bob.drain();
        let offer = bob_events.iter().find(|(n, _)| n == "offer").unwrap();
        assert_eq!(offer.1["offer"], "X");
        assert_eq!(offer.1["senderId"], alice.id);

        assert!(carol.drain().iter().all(|(n, _)| n != "offer"));
    }

    #[tokio::test]
    async fn test_non_host_action_is_silently_ignored() {
        let mut fixture = Fixture::new();
        let alice = fixture.connect().await;
        let mut bob = fixture.connect().await;
        fixture
            .send(&alice, "join-room", json!({ "roomId": "R1", "userName": "Alice" }))
            .await;
        fixture
            .send(&bob, "join-room", json!({ "roomId": "R1", "userName": "Bob" }))
            .await;
        fixture.settle().await;
        bob.drain();

        // Bob is not host; the removal must not happen and nothing is emitted.
        fixture
            .send(&bob, "host-remove-participant", json!({ "participantId": alice.id }))
            .await;
        fixture.settle().await;

        assert!(bob.drain().is_empty());
        let snapshot = fixture
            .handle
            .room_snapshot("R1".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.members.len(), 2);
    }

    #[tokio::test]
    async fn test_host_disconnect_promotes_next_in_join_order() {
        let mut fixture = Fixture::new();
        let alice = fixture.connect().await;
        let mut bob = fixture.connect().await;
        let carol = fixture.connect().await;
        for (conn, name) in [(&alice, "Alice"), (&bob, "Bob"), (&carol, "Carol")] {
            fixture
                .send(conn, "join-room", json!({ "roomId": "R1", "userName": name }))
                .await;
        }
        fixture.settle().await;
        bob.drain();

        fixture.emitter.unregister(&alice.id);
        fixture.handle.disconnected(alice.id.clone()).await.unwrap();
        fixture.settle().await;

        let events = bob.drain();
        let host_changed = events.iter().find(|(n, _)| n == "host-changed").unwrap();
        assert_eq!(host_changed.1["newHostId"], bob.id);
        assert_eq!(host_changed.1["previousHostId"], alice.id);
        let roster = host_changed.1["participants"].as_array().unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0]["id"], bob.id);
        assert_eq!(roster[0]["isHost"], true);
        assert_eq!(roster[1]["isHost"], false);
    }

    #[tokio::test]
    async fn test_raise_hand_toggle_roundtrip() {
        let mut fixture = Fixture::new();
        let alice = fixture.connect().await;
        let mut bob = fixture.connect().await;
        fixture
            .send(&alice, "join-room", json!({ "roomId": "R1", "userName": "Alice" }))
            .await;
        fixture
            .send(&bob, "join-room", json!({ "roomId": "R1", "userName": "Bob" }))
            .await;
        fixture.settle().await;
        bob.drain();

        fixture
            .send(&alice, "raise-hand-toggled", json!({ "isRaiseHand": true }))
            .await;
        fixture
            .send(&alice, "raise-hand-toggled", json!({ "isRaiseHand": false }))
            .await;
        fixture.settle().await;

        let broadcasts: Vec<_> = bob
            .drain()
            .into_iter()
            .filter(|(n, _)| n == "raise-hand-toggled")
            .collect();
        assert_eq!(broadcasts.len(), 2);
        assert_eq!(broadcasts[0].1["isRaiseHand"], true);
        assert_eq!(broadcasts[1].1["isRaiseHand"], false);

        let snapshot = fixture
            .handle
            .room_snapshot("R1".to_string())
            .await
            .unwrap()
            .unwrap();
        let alice_summary = snapshot
            .members
            .iter()
            .find(|m| m.id == alice.id)
            .unwrap();
        assert!(!alice_summary.is_raise_hand);
    }

    #[tokio::test]
    async fn test_chat_is_enriched_and_reaches_sender_too() {
        let mut fixture = Fixture::new();
        let mut alice = fixture.connect().await;
        fixture
            .send(&alice, "join-room", json!({ "roomId": "R1", "userName": "Alice" }))
            .await;
        fixture.settle().await;
        alice.drain();

        fixture
            .send(&alice, "chat-message", json!({ "message": "hi all" }))
            .await;
        fixture.settle().await;

        let events = alice.drain();
        let chat = events.iter().find(|(n, _)| n == "chat-message").unwrap();
        assert_eq!(chat.1["message"], "hi all");
        assert_eq!(chat.1["userName"], "Alice");
        assert_eq!(chat.1["senderId"], alice.id);
        assert!(chat.1["timestamp"].is_i64());
    }

    #[tokio::test]
    async fn test_reconnect_request_answers_caller_only() {
        let mut fixture = Fixture::new();
        let mut conn = fixture.connect().await;
        fixture.send(&conn, "reconnect-request", json!({})).await;
        fixture.settle().await;

        let events = conn.drain();
        let response = events
            .iter()
            .find(|(n, _)| n == "reconnect-response")
            .unwrap();
        assert_eq!(response.1["success"], true);
        // Fresh connection id: no participant record to recover.
        assert!(response.1["userData"].is_null());
        assert!(response.1["connectionHealth"].is_object());
    }

    #[tokio::test]
    async fn test_shutdown_broadcasts_recovery_data_then_closes() {
        let mut config = Config::default();
        config.shutdown_soft_deadline_seconds = 0;
        let mut fixture = Fixture::with_config(config);
        let mut alice = fixture.connect().await;
        fixture
            .send(&alice, "join-room", json!({ "roomId": "R1", "userName": "Alice" }))
            .await;
        fixture.settle().await;
        alice.drain();

        fixture.handle.shutdown().await.unwrap();

        let mut saw_shutdown = false;
        let mut saw_close = false;
        while let Ok(frame) = alice.rx.try_recv() {
            match frame {
                OutboundFrame::Event(text) => {
                    let value: Value = serde_json::from_str(&text).unwrap();
                    if value["event"] == "server-shutdown" {
                        saw_shutdown = true;
                        assert_eq!(value["data"]["expectedDowntime"], 30_000);
                        assert!(value["data"]["recoveryData"]["rooms"]["R1"].is_object());
                    }
                }
                OutboundFrame::Close => saw_close = true,
            }
        }
        assert!(saw_shutdown);
        assert!(saw_close);
    }
}
