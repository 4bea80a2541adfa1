//! Per-connection identity and moderation state.

use log::{debug, warn};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;

/// Opaque handle for a registered session.
///
/// Ids grow monotonically, so ordering by id is ordering by registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Server-side state of one connected client
///
/// Each session carries:
/// - The peer address captured at accept time and a mutable nickname
/// - Complaint and message counters used by the moderation policy
/// - The sending side of its bounded outbound queue; one writer task per
///   session drains that queue, so concurrent senders never interleave
///   partial writes. A peer that stops reading fills the queue and is kicked.
#[derive(Debug)]
pub struct Session {
    /// Registry handle, unique for the server's lifetime
    pub id: SessionId,
    /// Peer address captured at accept time
    pub addr: SocketAddr,
    /// Display name; starts as the peer address and is changed with `/nick`
    pub nickname: String,
    /// Complaints received since the last ban expired
    pub complaint_count: u32,
    /// When the current ban started, if one is running
    pub banned_at: Option<Instant>,
    /// Broadcasts sent in the current rate window
    pub message_count: u32,
    /// Start of the current rate window, if one is open
    pub first_message_at: Option<Instant>,
    /// How long a ban on this session lasts
    pub ban_duration_hours: u64,
    outbound: mpsc::Sender<String>,
    overflow: Arc<Notify>,
}

impl Session {
    /// Creates a fresh session whose nickname is the stringified peer address
    pub fn new(
        id: SessionId,
        addr: SocketAddr,
        ban_duration_hours: u64,
        outbound: mpsc::Sender<String>,
    ) -> Self {
        Self {
            id,
            addr,
            nickname: addr.to_string(),
            complaint_count: 0,
            banned_at: None,
            message_count: 0,
            first_message_at: None,
            ban_duration_hours,
            outbound,
            overflow: Arc::new(Notify::new()),
        }
    }

    /// Queues a message for this session's socket
    ///
    /// Returns false when the message was dropped. A closed writer only
    /// happens while the session is failing, and its own receive loop cleans
    /// it up. A full queue means the peer stopped reading: the overflow
    /// signal fires and the receive loop disconnects the session.
    pub fn send(&self, message: impl Into<String>) -> bool {
        match self.outbound.try_send(message.into()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue for {} is full, disconnecting", self);
                self.overflow.notify_one();
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Dropping message for {}: writer closed", self.id);
                false
            }
        }
    }

    /// Fires once the outbound queue overflowed
    pub fn overflow_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.overflow)
    }

    /// Counts one allowed broadcast, opening a new rate window if none is running
    pub fn record_message(&mut self, now: Instant) {
        if self.message_count == 0 {
            self.first_message_at = Some(now);
        }
        self.message_count += 1;
    }

    /// Adds one complaint and returns true if this complaint started a ban
    ///
    /// Complaints against an already banned session are still counted but
    /// never move the ban start.
    pub fn add_complaint(&mut self, threshold: u32, now: Instant) -> bool {
        self.complaint_count += 1;
        if self.complaint_count >= threshold && !self.is_banned() {
            self.banned_at = Some(now);
            return true;
        }
        false
    }

    pub fn is_banned(&self) -> bool {
        self.banned_at.is_some()
    }

    /// Forgives all complaints once the ban has lasted `ban_duration_hours`.
    /// Returns true if a ban was lifted.
    pub fn expire_ban(&mut self, now: Instant) -> bool {
        let Some(banned_at) = self.banned_at else {
            return false;
        };
        let ban = Duration::from_secs(self.ban_duration_hours.saturating_mul(3600));
        if now.saturating_duration_since(banned_at) < ban {
            return false;
        }
        self.complaint_count = 0;
        self.banned_at = None;
        true
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.nickname, self.addr)
    }
}
