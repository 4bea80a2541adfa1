//! Rate limiting and complaint-based bans
//!
//! The policy only ever resets counters. Incrementing `message_count` and
//! `complaint_count` belongs to the connection handler, which knows whether a
//! message was actually broadcast.

use crate::config::ServerConfig;
use crate::session::Session;
use chat_shared::{banned_notice, MESSAGE_LIMIT};
use log::{debug, info};
use std::time::{Duration, Instant};

/// Result of a pre-send check: whether to broadcast, and what to tell the sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    /// True when the message may be broadcast
    pub allowed: bool,
    /// Notices for the sender, in the order they should be delivered
    pub notices: Vec<String>,
}

/// Thresholds shared by every session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Complaints that start a ban
    pub complaint_threshold: u32,
    /// Broadcasts allowed per rate window
    pub message_limit: u32,
    /// Length of one rate window
    pub rate_window: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            complaint_threshold: 3,
            message_limit: 20,
            rate_window: Duration::from_secs(60 * 60),
        }
    }
}

impl Policy {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            complaint_threshold: config.complaint_threshold,
            message_limit: config.message_limit,
            rate_window: Duration::from_secs(config.rate_window_minutes.saturating_mul(60)),
        }
    }

    /// Forgives all complaints once the ban has lasted `ban_duration_hours`.
    /// Returns true if the session was unbanned.
    pub fn on_ban_window_elapsed(&self, session: &mut Session, now: Instant) -> bool {
        if !session.expire_ban(now) {
            return false;
        }
        info!("Ban on {} expired", session);
        true
    }

    /// Closes the current rate window once it is older than `rate_window`.
    /// The next recorded message opens a new one.
    pub fn on_message_window_elapsed(&self, session: &mut Session, now: Instant) -> bool {
        let Some(first) = session.first_message_at else {
            return false;
        };
        if now.saturating_duration_since(first) < self.rate_window {
            return false;
        }
        session.message_count = 0;
        session.first_message_at = None;
        true
    }

    /// Runs both window checks, then decides whether `session` may broadcast.
    ///
    /// The ban and rate-limit notices are independent: a session over both
    /// thresholds gets both in one call.
    pub fn check_access(&self, session: &mut Session, now: Instant) -> AccessDecision {
        self.on_ban_window_elapsed(session, now);
        self.on_message_window_elapsed(session, now);

        let mut notices = Vec::new();
        if session.complaint_count >= self.complaint_threshold {
            notices.push(banned_notice(session.ban_duration_hours));
        }
        if session.message_count >= self.message_limit {
            notices.push(MESSAGE_LIMIT.to_string());
        }

        let allowed = notices.is_empty();
        if !allowed {
            debug!("Denied message from {}: {:?}", session, notices);
        }
        AccessDecision { allowed, notices }
    }
}
