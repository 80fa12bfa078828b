use bevy::prelude::*;

use super::pool::ResourcePool;
use super::scheduler::StreamingScheduler;

/// Counters for the streamed layer, refreshed every frame. Gauges mirror the
/// scheduler; totals only ever grow.
#[derive(Resource, Debug, Default, Clone)]
pub struct StreamStats {
    pub version: u64,
    pub resident: usize,
    pub queued: usize,
    pub pending: usize,
    pub retiring: usize,
    pub pooled: usize,
    pub cycles: u64,
    pub installs: u64,
    pub discards: u64,
    pub failures: u64,
}

impl StreamStats {
    pub fn note_cycle(&mut self, scheduler: &StreamingScheduler) {
        self.cycles += 1;
        self.version = scheduler.version();
    }
}

pub(super) fn update_stats(
    mut stats: ResMut<StreamStats>,
    scheduler: Res<StreamingScheduler>,
    pool: Res<ResourcePool>,
) {
    stats.version = scheduler.version();
    stats.resident = scheduler.live_count();
    stats.queued = scheduler.queued_count();
    stats.pending = scheduler.pending_count();
    stats.retiring = scheduler.retiring_count();
    stats.pooled = pool.idle_count();
}
