//! Delayed broadcasts.

use crate::error::ScheduleError;
use crate::registry::SharedRegistry;
use log::debug;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Broadcasts `message` to every session registered when `delay_minutes`
/// have passed.
///
/// Fire-and-forget: the spawned task is never tracked or cancelled, and it is
/// abandoned if the runtime shuts down first. Returns the fire time.
pub fn schedule_broadcast(
    registry: SharedRegistry,
    delay_minutes: u64,
    message: String,
) -> Result<Instant, ScheduleError> {
    let fire_at = delay_minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .and_then(|delay| Instant::now().checked_add(delay))
        .ok_or(ScheduleError::OutOfRange(delay_minutes))?;

    tokio::spawn(async move {
        sleep_until(fire_at).await;
        let delivered = registry.read().await.broadcast(&message, &[]);
        debug!("Delayed broadcast delivered to {} sessions", delivered);
    });

    Ok(fire_at)
}
