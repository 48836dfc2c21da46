//! Fixed-capacity ring buffer of recent world events.

use protocol::WorldMessage;

/// Circular event store that overwrites its oldest entry when full.
#[derive(Debug)]
pub struct EventHistory {
    slots: Vec<Option<WorldMessage>>,
    /// Next slot to write.
    write_idx: usize,
    /// Total events ever written.
    total: u64,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![None; capacity],
            write_idx: 0,
            total: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of readable events.
    pub fn len(&self) -> usize {
        self.total.min(self.slots.len() as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn total_written(&self) -> u64 {
        self.total
    }

    pub fn push(&mut self, msg: WorldMessage) {
        let capacity = self.slots.len();
        self.slots[self.write_idx] = Some(msg);
        self.write_idx = (self.write_idx + 1) % capacity;
        self.total += 1;
    }

    /// Stored events oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &WorldMessage> + '_ {
        let capacity = self.slots.len();
        let stored = self.len();
        let start = (self.write_idx + capacity - stored) % capacity;
        (0..stored).filter_map(move |i| self.slots[(start + i) % capacity].as_ref())
    }

    /// Up to `limit` events newer than `since_ts`, oldest first.
    ///
    /// `since_ts == 0` disables the timestamp filter. When more than `limit`
    /// events match, the oldest `limit` are returned, so callers can page
    /// forward from the last timestamp they saw.
    pub fn since(&self, since_ts: u64, limit: usize) -> Vec<WorldMessage> {
        self.iter()
            .filter(|ev| since_ts == 0 || ev.timestamp() > since_ts)
            .take(limit)
            .cloned()
            .collect()
    }
}
