//! Inbound command admission.
//!
//! Commands from agents are validated here and buffered until the game loop
//! drains them at the start of the next tick.

use crate::collision::{self, Obstacle};
use crate::config::Config;
use parking_lot::Mutex;
use protocol::WorldMessage;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a command was refused. Refusals are expected outcomes, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    #[error("rate_limited")]
    RateLimited,
    #[error("out_of_bounds")]
    OutOfBounds,
    #[error("collision")]
    Collision,
    #[error("text_too_long")]
    TextTooLong,
}

/// Result of [`CommandQueue::enqueue`].
pub type Admission = Result<(), Rejection>;

/// Admission limits.
#[derive(Debug, Clone)]
pub struct QueueLimits {
    pub rate_limit: usize,
    pub rate_window: Duration,
    pub half_size: f64,
    pub collision_margin: f64,
    pub chat_max_len: usize,
}

impl QueueLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            rate_limit: config.limits.rate_limit,
            rate_window: Duration::from_millis(config.limits.rate_window_ms),
            half_size: config.world.half_size,
            collision_margin: config.limits.collision_margin,
            chat_max_len: config.limits.chat_max_len,
        }
    }
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Default)]
struct QueueInner {
    /// Admitted commands waiting for the next tick, in arrival order.
    pending: Vec<WorldMessage>,
    /// agent id -> instants of recent commands, oldest first.
    buckets: HashMap<String, VecDeque<Instant>>,
    obstacles: Vec<Obstacle>,
}

/// Per-tick command buffer with per-agent rate limiting.
///
/// All methods take `&self`; the queue is shared between connection tasks
/// (producers) and the game loop (sole consumer).
pub struct CommandQueue {
    limits: QueueLimits,
    inner: Mutex<QueueInner>,
}

impl CommandQueue {
    pub fn new(limits: QueueLimits) -> Self {
        Self {
            limits,
            inner: Mutex::new(QueueInner::default()),
        }
    }

    /// Replace the obstacle list wholesale.
    pub fn set_obstacles(&self, obstacles: Vec<Obstacle>) {
        self.inner.lock().obstacles = obstacles;
    }

    /// Validate and buffer a command.
    pub fn enqueue(&self, msg: WorldMessage) -> Admission {
        self.enqueue_at(msg, Instant::now())
    }

    /// [`enqueue`](Self::enqueue) with an explicit clock reading.
    ///
    /// Checks run in order and stop at the first failure: rate limit, bounds,
    /// obstacle collision, chat length.
    pub fn enqueue_at(&self, msg: WorldMessage, now: Instant) -> Admission {
        let mut inner = self.inner.lock();

        if !Self::check_rate(&self.limits, &mut inner.buckets, msg.agent_id(), now) {
            return Err(Rejection::RateLimited);
        }

        match &msg {
            WorldMessage::Position { x, z, .. } => {
                let half = self.limits.half_size;
                if !x.is_finite() || !z.is_finite() || x.abs() > half || z.abs() > half {
                    return Err(Rejection::OutOfBounds);
                }
                if collision::find_blocking(&inner.obstacles, *x, *z, self.limits.collision_margin)
                    .is_some()
                {
                    return Err(Rejection::Collision);
                }
            }
            WorldMessage::Chat { text, .. } => {
                if text.chars().count() > self.limits.chat_max_len {
                    return Err(Rejection::TextTooLong);
                }
            }
            WorldMessage::Action { .. }
            | WorldMessage::Emote { .. }
            | WorldMessage::Whisper { .. }
            | WorldMessage::Join { .. }
            | WorldMessage::Leave { .. }
            | WorldMessage::Profile { .. } => {}
        }

        inner.pending.push(msg);
        Ok(())
    }

    /// Take every pending command, leaving the queue empty.
    pub fn drain(&self) -> Vec<WorldMessage> {
        std::mem::take(&mut self.inner.lock().pending)
    }

    /// Forget an agent's rate bucket.
    pub fn prune_agent(&self, agent_id: &str) {
        self.inner.lock().buckets.remove(agent_id);
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Returns true and records `now` if the agent is under its limit.
    fn check_rate(
        limits: &QueueLimits,
        buckets: &mut HashMap<String, VecDeque<Instant>>,
        agent_id: &str,
        now: Instant,
    ) -> bool {
        let bucket = buckets.entry(agent_id.to_string()).or_default();

        if let Some(cutoff) = now.checked_sub(limits.rate_window) {
            while bucket.front().is_some_and(|&t| t < cutoff) {
                bucket.pop_front();
            }
        }

        if bucket.len() >= limits.rate_limit {
            return false;
        }
        bucket.push_back(now);
        true
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(QueueLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_move(agent_id: &str, x: f64, z: f64) -> WorldMessage {
        WorldMessage::Position {
            agent_id: agent_id.into(),
            x,
            y: 0.0,
            z,
            rotation: 0.0,
            timestamp: protocol::now_millis(),
        }
    }

    fn make_chat(agent_id: &str, text: String) -> WorldMessage {
        WorldMessage::Chat {
            agent_id: agent_id.into(),
            text,
            timestamp: protocol::now_millis(),
        }
    }

    #[test]
    fn test_enqueue_and_drain() {
        let queue = CommandQueue::default();
        let msg = make_move("a1", 5.0, 5.0);
        assert_eq!(queue.enqueue(msg.clone()), Ok(()));

        let drained = queue.drain();
        assert_eq!(drained, vec![msg]);
    }

    #[test]
    fn test_drain_is_fifo() {
        let queue = CommandQueue::default();
        let first = make_move("a1", 1.0, 1.0);
        let second = make_chat("a2", "hi".into());
        let third = make_move("a1", 2.0, 2.0);
        for msg in [first.clone(), second.clone(), third.clone()] {
            assert!(queue.enqueue(msg).is_ok());
        }
        assert_eq!(queue.pending_len(), 3);
        assert_eq!(queue.drain(), vec![first, second, third]);
    }

    #[test]
    fn test_drain_empty_and_twice() {
        let queue = CommandQueue::default();
        assert!(queue.drain().is_empty());

        queue.enqueue(make_move("a1", 0.0, 0.0)).unwrap();
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_bounds() {
        let queue = CommandQueue::default();
        assert_eq!(
            queue.enqueue(make_move("a1", 60.0, 0.0)),
            Err(Rejection::OutOfBounds)
        );
        assert_eq!(
            queue.enqueue(make_move("a1", 0.0, -60.0)),
            Err(Rejection::OutOfBounds)
        );
        assert_eq!(queue.enqueue(make_move("a1", 50.0, -50.0)), Ok(()));
        assert_eq!(
            queue.enqueue(make_move("a1", f64::NAN, 0.0)),
            Err(Rejection::OutOfBounds)
        );
    }

    #[test]
    fn test_obstacle_collision() {
        let queue = CommandQueue::default();
        queue.set_obstacles(vec![Obstacle::new(10.0, 10.0, 3.0)]);
        assert_eq!(
            queue.enqueue(make_move("a1", 10.0, 10.0)),
            Err(Rejection::Collision)
        );
        assert_eq!(queue.enqueue(make_move("a1", 30.0, 30.0)), Ok(()));
    }

    #[test]
    fn test_set_obstacles_replaces() {
        let queue = CommandQueue::default();
        queue.set_obstacles(vec![Obstacle::new(10.0, 10.0, 3.0)]);
        queue.set_obstacles(vec![Obstacle::new(-10.0, -10.0, 3.0)]);
        assert_eq!(queue.enqueue(make_move("a1", 10.0, 10.0)), Ok(()));
        assert_eq!(
            queue.enqueue(make_move("a1", -10.0, -10.0)),
            Err(Rejection::Collision)
        );
    }

    #[test]
    fn test_chat_length() {
        let queue = CommandQueue::default();
        assert_eq!(queue.enqueue(make_chat("a1", "a".repeat(500))), Ok(()));
        assert_eq!(
            queue.enqueue(make_chat("a1", "a".repeat(501))),
            Err(Rejection::TextTooLong)
        );
        // multi-byte characters count once
        assert_eq!(queue.enqueue(make_chat("a1", "é".repeat(500))), Ok(()));
    }

    #[test]
    fn test_rate_limit_per_agent() {
        let queue = CommandQueue::default();
        let now = Instant::now();
        for i in 0..20 {
            assert_eq!(
                queue.enqueue_at(make_move("a1", f64::from(i), 0.0), now),
                Ok(())
            );
        }
        assert_eq!(
            queue.enqueue_at(make_move("a1", 0.0, 0.0), now),
            Err(Rejection::RateLimited)
        );
        assert_eq!(queue.enqueue_at(make_move("a2", 0.0, 0.0), now), Ok(()));
    }

    #[test]
    fn test_rate_limit_checked_before_validation() {
        let queue = CommandQueue::default();
        let now = Instant::now();
        for _ in 0..20 {
            assert!(queue.enqueue_at(make_move("a1", 99.0, 0.0), now).is_err());
        }
        // rejected commands still consumed the window
        assert_eq!(
            queue.enqueue_at(make_move("a1", 0.0, 0.0), now),
            Err(Rejection::RateLimited)
        );
    }

    #[test]
    fn test_rate_window_expires() {
        let queue = CommandQueue::default();
        let start = Instant::now();
        for _ in 0..20 {
            queue.enqueue_at(make_move("a1", 0.0, 0.0), start).unwrap();
        }
        let later = start + Duration::from_millis(1001);
        assert_eq!(queue.enqueue_at(make_move("a1", 0.0, 0.0), later), Ok(()));
    }

    #[test]
    fn test_prune_agent_resets_bucket() {
        let queue = CommandQueue::default();
        let now = Instant::now();
        for _ in 0..20 {
            queue.enqueue_at(make_move("a1", 0.0, 0.0), now).unwrap();
        }
        queue.prune_agent("a1");
        assert_eq!(queue.enqueue_at(make_move("a1", 0.0, 0.0), now), Ok(()));
    }

    #[test]
    fn test_rejection_wire_names() {
        assert_eq!(Rejection::RateLimited.to_string(), "rate_limited");
        assert_eq!(
            serde_json::to_string(&Rejection::TextTooLong).unwrap(),
            "\"text_too_long\""
        );
    }
}
