//! Inactivity scanner.
//!
//! Periodically idles agents that have gone quiet and removes agents that
//! stay quiet, by enqueueing ordinary `action`/`leave` commands.

use crate::config::PresenceConfig;
use crate::directory::ProfileDirectory;
use crate::room::WorldHandle;
use protocol::{Action, WorldMessage};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

/// Applying our own idle command refreshes `last_seen`; activity within this
/// long after issuing it is attributed to the scanner.
const SELF_TOUCH_GRACE_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy)]
struct IdleMark {
    /// Last activity not caused by the scanner.
    quiet_since: u64,
    issued_at: u64,
}

/// Agents acted on by one scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub idled: Vec<String>,
    pub kicked: Vec<String>,
}

pub struct PresenceScanner {
    handle: WorldHandle,
    directory: Arc<dyn ProfileDirectory>,
    idle_after: Duration,
    kick_after: Duration,
    interval: Duration,
    idled: HashMap<String, IdleMark>,
}

impl PresenceScanner {
    pub fn new(handle: WorldHandle, config: &PresenceConfig) -> Self {
        let directory = handle.world().read().directory().clone();
        Self {
            handle,
            directory,
            idle_after: Duration::from_secs(config.idle_after_secs),
            kick_after: Duration::from_secs(config.kick_after_secs),
            interval: Duration::from_secs(config.scan_interval_secs.max(1)),
            idled: HashMap::new(),
        }
    }

    /// Run the scanner on the current runtime until aborted.
    pub fn spawn(mut self) -> JoinHandle<()> {
        info!(
            "Presence scanner active: idle={}min, kick={}min",
            self.idle_after.as_secs() / 60,
            self.kick_after.as_secs() / 60
        );
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.scan_at(protocol::now_millis());
            }
        })
    }

    /// Check every placed agent against the inactivity thresholds.
    pub fn scan_at(&mut self, now: u64) -> ScanOutcome {
        let present: HashSet<String> = self
            .handle
            .world()
            .read()
            .active_agent_ids()
            .into_iter()
            .map(str::to_owned)
            .collect();
        self.idled.retain(|id, _| present.contains(id));

        let idle_ms = self.idle_after.as_millis() as u64;
        let kick_ms = self.kick_after.as_millis() as u64;
        let mut outcome = ScanOutcome::default();

        for profile in self.directory.get_all() {
            let id = profile.agent_id;
            if !present.contains(&id) {
                continue;
            }

            let quiet_since = match self.idled.get(&id) {
                Some(mark) if profile.last_seen <= mark.issued_at + SELF_TOUCH_GRACE_MS => {
                    mark.quiet_since
                }
                _ => {
                    self.idled.remove(&id);
                    profile.last_seen
                }
            };
            let elapsed = now.saturating_sub(quiet_since);

            if elapsed > kick_ms {
                info!("Kicking {} (inactive {}min)", id, elapsed / 60_000);
                let queued = self.submit(WorldMessage::Leave {
                    agent_id: id.clone(),
                    timestamp: now,
                });
                if queued {
                    self.idled.remove(&id);
                    outcome.kicked.push(id);
                }
            } else if elapsed > idle_ms && !self.idled.contains_key(&id) {
                let queued = self.submit(WorldMessage::Action {
                    agent_id: id.clone(),
                    action: Action::Idle,
                    target_agent_id: None,
                    timestamp: now,
                });
                if !queued {
                    continue;
                }
                self.idled.insert(
                    id.clone(),
                    IdleMark {
                        quiet_since,
                        issued_at: now,
                    },
                );
                outcome.idled.push(id);
            }
        }

        outcome
    }

    /// Returns whether the command was queued.
    fn submit(&self, msg: WorldMessage) -> bool {
        let kind = msg.kind();
        match self.handle.queue().enqueue(msg) {
            Ok(()) => true,
            Err(rejection) => {
                debug!("Presence {} refused: {}", kind.as_str(), rejection);
                false
            }
        }
    }
}
