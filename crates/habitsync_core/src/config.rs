//! Configuration for the local store and queue.

/// Persistence settings shared by every collection journal.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Sync the backend after every write.
    pub sync_on_write: bool,
    /// Never compact a journal holding fewer frames than this.
    pub compaction_min_frames: usize,
    /// Compact once frames exceed `live records * compaction_ratio`.
    pub compaction_ratio: usize,
}

impl StoreConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            sync_on_write: true,
            compaction_min_frames: 64,
            compaction_ratio: 4,
        }
    }

    /// Sets whether every write is synced.
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Sets the compaction thresholds.
    pub fn with_compaction(mut self, min_frames: usize, ratio: usize) -> Self {
        self.compaction_min_frames = min_frames;
        self.compaction_ratio = ratio.max(1);
        self
    }

    /// Returns true if a journal with `frames` frames and `live` records
    /// should be rewritten as a snapshot.
    pub fn should_compact(&self, frames: usize, live: usize) -> bool {
        frames >= self.compaction_min_frames && frames > live.max(1) * self.compaction_ratio
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compaction_thresholds() {
        let config = StoreConfig::new().with_compaction(8, 2);
        assert!(!config.should_compact(7, 0));
        assert!(config.should_compact(8, 0));
        assert!(!config.should_compact(8, 4));
        assert!(config.should_compact(9, 4));
    }
}
