//! Live session registry and message fan-out
//!
//! This module owns the set of connected sessions and everything that
//! writes to more than one of them:
//! - Registration and idempotent removal of sessions
//! - Broadcast to every session, optionally excluding some
//! - Private delivery and complaints resolved by nickname
//!
//! The registry itself is plain data. Connection tasks share it behind a
//! `tokio::sync::RwLock` (see [`SharedRegistry`]) and hold the lock only for
//! the duration of one call; every write is a non-blocking push onto a
//! session's outbound queue, so no call here ever waits on a socket.

use crate::error::DeliveryError;
use crate::session::{Session, SessionId};
use chat_shared::private_line;
use log::{debug, info};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, RwLock};

pub type SharedRegistry = Arc<RwLock<Registry>>;

/// Manages all connected sessions
///
/// Sessions are keyed by id in a `BTreeMap`, so iteration follows registration
/// order. Nickname lookups therefore return the earliest-connected session
/// when several share a nickname.
pub struct Registry {
    sessions: BTreeMap<SessionId, Session>,
    next_session_id: u32,
    ban_duration_hours: u64,
}

impl Registry {
    /// Creates an empty registry; new sessions get the given ban duration
    pub fn new(ban_duration_hours: u64) -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_session_id: 1,
            ban_duration_hours,
        }
    }

    pub fn shared(ban_duration_hours: u64) -> SharedRegistry {
        Arc::new(RwLock::new(Self::new(ban_duration_hours)))
    }

    /// Adds a session for a freshly accepted connection
    ///
    /// `outbound` is the queue drained by that connection's writer task.
    pub fn register(
        &mut self,
        addr: SocketAddr,
        outbound: mpsc::Sender<String>,
    ) -> SessionId {
        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;

        let session = Session::new(id, addr, self.ban_duration_hours, outbound);
        info!("Session {} registered for {}", id, addr);
        self.sessions.insert(id, session);
        id
    }

    /// Removes a session, handing it back to the caller
    ///
    /// Returns None if it was already removed, so racing disconnect paths
    /// can both call this and only one of them proceeds with cleanup.
    pub fn unregister(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        info!("Session {} ({}) unregistered", id, session.nickname);
        Some(session)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Queues `message` for one session; false if it is gone or closing
    pub fn send_to(&self, id: SessionId, message: impl Into<String>) -> bool {
        self.sessions
            .get(&id)
            .map(|session| session.send(message))
            .unwrap_or(false)
    }

    /// Delivers `message` to every session not listed in `exclude`
    ///
    /// Delivery is best effort: a session whose writer is gone is skipped and
    /// the rest still receive the message. Returns the number of sessions the
    /// message was queued for.
    pub fn broadcast(&self, message: &str, exclude: &[SessionId]) -> usize {
        let mut delivered = 0;
        for (id, session) in &self.sessions {
            if exclude.contains(id) {
                continue;
            }
            if session.send(message) {
                delivered += 1;
            } else {
                debug!("Broadcast skipped {}", id);
            }
        }
        delivered
    }

    /// First session, in registration order, currently using `nickname`
    pub fn find_by_nickname(&self, nickname: &str) -> Option<SessionId> {
        self.sessions
            .values()
            .find(|session| session.nickname == nickname)
            .map(|session| session.id)
    }

    /// Sends `body` from `from` to the first session named `target`
    ///
    /// Exactly one outcome per call: a self-addressed message is rejected
    /// without any lookup, an unknown nickname is reported, otherwise the
    /// message reaches only the matched session. The caller relays the
    /// error text to the sender.
    pub fn send_private(
        &self,
        from: SessionId,
        target: &str,
        body: &str,
    ) -> Result<SessionId, DeliveryError> {
        let sender = self.get(from).ok_or(DeliveryError::UnknownSender)?;
        if sender.nickname == target {
            return Err(DeliveryError::ToSelf);
        }
        let recipient = self
            .find_by_nickname(target)
            .ok_or_else(|| DeliveryError::NoSuchNickname(target.to_string()))?;

        self.send_to(recipient, private_line(&sender.nickname, body));
        Ok(recipient)
    }

    /// Files a complaint against the first session named `target`
    ///
    /// A ban that has already run its course is lifted first, so complaints
    /// arriving after it count towards a new ban. Returns the target id and
    /// whether this complaint started a ban.
    pub fn complain(
        &mut self,
        target: &str,
        threshold: u32,
        now: Instant,
    ) -> Result<(SessionId, bool), DeliveryError> {
        let id = self
            .find_by_nickname(target)
            .ok_or_else(|| DeliveryError::NoSuchNickname(target.to_string()))?;
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| DeliveryError::NoSuchNickname(target.to_string()))?;

        if session.expire_ban(now) {
            info!("Ban on {} expired", session);
        }
        let banned = session.add_complaint(threshold, now);
        if banned {
            info!("{} banned after {} complaints", session, session.complaint_count);
        } else {
            debug!("Complaint against {} ({} total)", session, session.complaint_count);
        }
        Ok((id, banned))
    }

    /// Sends `farewell` to every session and drops them all, which closes
    /// their transports once the writer tasks drain. Used at shutdown.
    pub fn close_all(&mut self, farewell: &str) -> usize {
        let sessions = std::mem::take(&mut self.sessions);
        for session in sessions.values() {
            session.send(farewell);
        }
        sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
