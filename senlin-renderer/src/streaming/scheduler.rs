use bevy::prelude::*;
use bevy::utils::{HashMap, HashSet};
use senlin_loader::{LoadResult, Priority, RequestTicket};
use senlin_scene::{
    ground_budget, surface_distance, AssetPlacement, Cartographic, FeatureId, LodTier,
    PlacementIndex, Rectangle, TierThresholds,
};
use std::collections::VecDeque;

/// Tuning of the streaming loop.
#[derive(Resource, Debug, Clone)]
pub struct StreamingConfig {
    /// Radius of the streaming sphere around the camera, meters.
    pub radius: f64,
    pub thresholds: TierThresholds,
    /// Camera travel that justifies a new cycle, meters. Settles closer to
    /// the last planned center than this are ignored.
    pub move_threshold: f64,
    /// Hard cap on resident assets; the nearest win.
    pub max_resident: usize,
    /// Queue items started per frame.
    pub drain_batch: usize,
    /// Retirements applied per frame.
    pub removal_batch: usize,
    /// Multiple of `radius` beyond which residents are evicted while the
    /// camera is still in motion.
    pub eviction_margin: f64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        StreamingConfig {
            radius: 700.0,
            thresholds: TierThresholds::default(),
            move_threshold: 15.0,
            max_resident: 2048,
            drain_batch: 8,
            removal_batch: 16,
            eviction_margin: 1.15,
        }
    }
}

/// A placement currently realized in the scene. The map key is the feature
/// id, so a feature can never be resident twice.
#[derive(Debug, Clone)]
pub struct LiveEntry {
    pub entity: Entity,
    pub tier: LodTier,
    pub url: String,
    /// Ground height the current transform was computed with.
    pub ground_height: Option<f64>,
}

/// One asset the drain loop still has to realize.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub fid: FeatureId,
    pub tier: LodTier,
    pub url: String,
    /// Scheduling version the item belongs to. Completions carrying an old
    /// version are banked in the pool instead of installed.
    pub version: u64,
    pub priority: Priority,
}

/// A queue item whose fetch is in flight.
pub struct PendingLoad {
    pub item: QueueItem,
    pub ticket: RequestTicket,
}

/// What one planning pass decided.
#[derive(Debug, Default)]
pub struct CyclePlan {
    /// Features to retire, farthest first.
    pub removals: Vec<FeatureId>,
    /// Assets to realize, nearest first.
    pub loads: Vec<QueueItem>,
    /// Live entries whose ground height changed since install.
    pub refreshes: Vec<FeatureId>,
    /// Every feature wanted this cycle, loads and keeps alike.
    pub keep: HashSet<FeatureId>,
}

pub struct CycleInput<'a> {
    /// Ground point under the camera.
    pub center: Cartographic,
    pub camera_agl: f64,
    pub placements: &'a HashMap<FeatureId, AssetPlacement>,
    pub index: &'a PlacementIndex,
    pub live: &'a HashMap<FeatureId, LiveEntry>,
    pub config: &'a StreamingConfig,
}

/// Plans one streaming cycle: queries the index around the center, keeps
/// what the sphere still covers, tiers by distance to the camera and diffs
/// against current residency. Pure; the scheduler applies the outcome.
pub fn plan_cycle(input: &CycleInput) -> CyclePlan {
    let mut plan = CyclePlan::default();
    let budget = ground_budget(input.config.radius, input.camera_agl);
    // an empty keep set retires everything; the camera climbed out of the
    // streaming sphere
    if budget > 0.0 {
        let bounds = Rectangle::from_center_and_radius(&input.center, budget);
        let mut wanted: Vec<(FeatureId, f64)> = Vec::new();
        for fid in input.index.query(&bounds) {
            let Some(placement) = input.placements.get(&fid) else {
                continue;
            };
            let ground = surface_distance(&input.center, &placement.cartographic());
            if ground <= budget {
                wanted.push((fid, ground));
            }
        }
        wanted.sort_by(|a, b| a.1.total_cmp(&b.1));
        wanted.truncate(input.config.max_resident);

        let agl = input.camera_agl.max(0.0);
        for (fid, ground) in wanted {
            let Some(placement) = input.placements.get(&fid) else {
                continue;
            };
            // tier by line-of-sight distance, not ground distance
            let eye = (ground * ground + agl * agl).sqrt();
            let wanted_tier = input.config.thresholds.tier_for_distance(eye);
            let Some((tier, url)) = placement.urls.resolve(wanted_tier) else {
                continue;
            };
            plan.keep.insert(fid);
            match input.live.get(&fid) {
                Some(entry) if entry.tier == tier => {
                    if entry.ground_height != placement.ground_height {
                        plan.refreshes.push(fid);
                    }
                }
                _ => {
                    plan.loads.push(QueueItem {
                        fid,
                        tier,
                        url: url.to_string(),
                        version: 0,
                        priority: eye.min(f64::from(u32::MAX)) as u32,
                    });
                }
            }
        }
    }

    for fid in input.live.keys() {
        if !plan.keep.contains(fid) {
            plan.removals.push(*fid);
        }
    }
    plan.removals.sort_by(|a, b| {
        let da = removal_distance(input, a);
        let db = removal_distance(input, b);
        db.total_cmp(&da)
    });
    plan
}

fn removal_distance(input: &CycleInput, fid: &FeatureId) -> f64 {
    input
        .placements
        .get(fid)
        .map(|p| surface_distance(&input.center, &p.cartographic()))
        .unwrap_or(f64::MAX)
}

/// Residency bookkeeping for the streamed layer. Versioned cycles write the
/// work queue; per-frame systems drain it in small batches. All decisions
/// live in plain methods so they stay testable away from the ECS.
#[derive(Resource)]
pub struct StreamingScheduler {
    version: u64,
    live: HashMap<FeatureId, LiveEntry>,
    queue: VecDeque<QueueItem>,
    pending: HashMap<FeatureId, PendingLoad>,
    retire: VecDeque<FeatureId>,
    refreshes: Vec<FeatureId>,
    last_center: Option<Cartographic>,
    busy: bool,
    visible: bool,
}

impl Default for StreamingScheduler {
    fn default() -> Self {
        StreamingScheduler::new()
    }
}

impl StreamingScheduler {
    pub fn new() -> Self {
        StreamingScheduler {
            version: 0,
            live: HashMap::default(),
            queue: VecDeque::new(),
            pending: HashMap::default(),
            retire: VecDeque::new(),
            refreshes: Vec::new(),
            last_center: None,
            busy: false,
            visible: true,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether work stamped with `version` still reflects the newest cycle.
    pub fn is_current(&self, version: u64) -> bool {
        version == self.version
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn live(&self) -> &HashMap<FeatureId, LiveEntry> {
        &self.live
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn retiring_count(&self) -> usize {
        self.retire.len()
    }

    /// Whether the camera has drifted far enough from the last planned
    /// center to justify planning again.
    pub fn center_drifted(&self, center: &Cartographic, move_threshold: f64) -> bool {
        match &self.last_center {
            Some(last) => surface_distance(last, center) > move_threshold,
            None => true,
        }
    }

    /// Runs one planning pass and applies it: the version is bumped first,
    /// so anything still in flight is stale from here on. Returns false
    /// when re-entered mid-cycle; the nested trigger is dropped.
    pub fn run_cycle(
        &mut self,
        center: Cartographic,
        camera_agl: f64,
        placements: &HashMap<FeatureId, AssetPlacement>,
        index: &PlacementIndex,
        config: &StreamingConfig,
    ) -> bool {
        if self.busy {
            return false;
        }
        self.busy = true;
        self.version += 1;
        let plan = plan_cycle(&CycleInput {
            center,
            camera_agl,
            placements,
            index,
            live: &self.live,
            config,
        });
        self.apply(center, plan);
        self.busy = false;
        true
    }

    fn apply(&mut self, center: Cartographic, plan: CyclePlan) {
        self.last_center = Some(center);
        // what the new cycle wants resident must not sit in the retire lane
        self.retire.retain(|fid| !plan.keep.contains(fid));
        for fid in plan.removals {
            if !self.retire.contains(&fid) {
                self.retire.push_back(fid);
            }
        }
        self.refreshes.extend(plan.refreshes);
        self.queue.clear();
        for mut item in plan.loads {
            item.version = self.version;
            // a superseded fetch for the same feature is stale on arrival
            self.pending.remove(&item.fid);
            self.queue.push_back(item);
        }
    }

    /// Next retirements to apply this frame, at most `max`.
    pub fn take_retirements(&mut self, max: usize) -> Vec<FeatureId> {
        let take = max.min(self.retire.len());
        self.retire.drain(..take).collect()
    }

    /// Next queue items to start this frame, at most `max`.
    pub fn take_queued(&mut self, max: usize) -> Vec<QueueItem> {
        let take = max.min(self.queue.len());
        self.queue.drain(..take).collect()
    }

    pub fn take_refreshes(&mut self) -> Vec<FeatureId> {
        std::mem::take(&mut self.refreshes)
    }

    pub fn note_pending(&mut self, item: QueueItem, ticket: RequestTicket) {
        self.pending.insert(item.fid, PendingLoad { item, ticket });
    }

    /// Pending loads whose fetch has resolved, success or failure.
    pub fn take_ready_pending(&mut self) -> Vec<(PendingLoad, LoadResult)> {
        let fids: Vec<FeatureId> = self.pending.keys().copied().collect();
        let mut ready = Vec::new();
        for fid in fids {
            let resolved = self
                .pending
                .get(&fid)
                .and_then(|pending| pending.ticket.try_take());
            if let Some(result) = resolved {
                if let Some(pending) = self.pending.remove(&fid) {
                    ready.push((pending, result));
                }
            }
        }
        ready
    }

    /// Records a feature as resident. Returns the entry it displaced, if
    /// any, which the caller must retire to the pool.
    pub fn install(&mut self, fid: FeatureId, entry: LiveEntry) -> Option<LiveEntry> {
        self.live.insert(fid, entry)
    }

    pub fn remove_live(&mut self, fid: &FeatureId) -> Option<LiveEntry> {
        self.live.remove(fid)
    }

    pub fn live_entry_mut(&mut self, fid: &FeatureId) -> Option<&mut LiveEntry> {
        self.live.get_mut(fid)
    }

    /// Queues retirement of every resident beyond `limit` meters from the
    /// center. Used while the camera is in motion.
    pub fn queue_evictions(
        &mut self,
        center: &Cartographic,
        placements: &HashMap<FeatureId, AssetPlacement>,
        limit: f64,
    ) -> usize {
        let mut queued = 0;
        for (fid, _) in self.live.iter() {
            let Some(placement) = placements.get(fid) else {
                continue;
            };
            if surface_distance(center, &placement.cartographic()) > limit
                && !self.retire.contains(fid)
            {
                self.retire.push_back(*fid);
                queued += 1;
            }
        }
        queued
    }

    /// Drops all queued and in-flight work. Dropping the pending tickets
    /// abandons their waiters; the shared fetches are cancelled separately
    /// through the loader.
    pub fn clear_work(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use senlin_scene::TierUrls;

    fn tiered_urls(name: &str) -> TierUrls {
        TierUrls {
            high: Some(format!("https://assets.test/{name}_high.png")),
            medium: Some(format!("https://assets.test/{name}_medium.png")),
            low: Some(format!("https://assets.test/{name}_low.png")),
        }
    }

    fn center() -> Cartographic {
        Cartographic::from_degrees(120.15, 30.25, 0.0)
    }

    /// A placement `east_meters` east of the center.
    fn placement_east(fid: u64, east_meters: f64) -> AssetPlacement {
        let c = center();
        let dlon = senlin_scene::meters_to_longitude_delta(east_meters, c.latitude);
        AssetPlacement {
            fid: FeatureId(fid),
            longitude: c.longitude + dlon,
            latitude: c.latitude,
            height_offset: 0.0,
            ground_height: None,
            yaw: 0.0,
            scale: 15.0,
            urls: tiered_urls("tree"),
        }
    }

    fn store(
        placements: Vec<AssetPlacement>,
    ) -> (HashMap<FeatureId, AssetPlacement>, PlacementIndex) {
        let index = PlacementIndex::build(&placements);
        let map = placements.into_iter().map(|p| (p.fid, p)).collect();
        (map, index)
    }

    fn config() -> StreamingConfig {
        StreamingConfig {
            thresholds: TierThresholds {
                high_max: 70.0,
                medium_max: 200.0,
            },
            ..Default::default()
        }
    }

    fn dummy_entity(n: u64) -> Entity {
        Entity::from_bits(n)
    }

    #[test]
    fn test_plan_tiers_by_distance() {
        let (placements, index) = store(vec![
            placement_east(1, 50.0),
            placement_east(2, 150.0),
            placement_east(3, 500.0),
        ]);
        let live = HashMap::default();
        let plan = plan_cycle(&CycleInput {
            center: center(),
            camera_agl: 0.0,
            placements: &placements,
            index: &index,
            live: &live,
            config: &config(),
        });
        assert!(plan.removals.is_empty());
        assert_eq!(plan.loads.len(), 3);
        // nearest first
        assert_eq!(plan.loads[0].fid, FeatureId(1));
        assert_eq!(plan.loads[0].tier, LodTier::High);
        assert_eq!(plan.loads[1].fid, FeatureId(2));
        assert_eq!(plan.loads[1].tier, LodTier::Medium);
        assert_eq!(plan.loads[2].fid, FeatureId(3));
        assert_eq!(plan.loads[2].tier, LodTier::Low);
        assert!(plan.loads[0].priority < plan.loads[2].priority);
    }

    #[test]
    fn test_altitude_shrinks_the_ground_budget() {
        let (placements, index) = store(vec![placement_east(1, 650.0), placement_east(2, 100.0)]);
        let live = HashMap::default();
        // sqrt(700^2 - 400^2) ~ 574m: the far placement drops out
        let plan = plan_cycle(&CycleInput {
            center: center(),
            camera_agl: 400.0,
            placements: &placements,
            index: &index,
            live: &live,
            config: &config(),
        });
        assert_eq!(plan.loads.len(), 1);
        assert_eq!(plan.loads[0].fid, FeatureId(2));
    }

    #[test]
    fn test_camera_above_sphere_keeps_nothing() {
        let (placements, index) = store(vec![placement_east(1, 10.0)]);
        let mut live = HashMap::default();
        live.insert(
            FeatureId(1),
            LiveEntry {
                entity: dummy_entity(1),
                tier: LodTier::High,
                url: "https://assets.test/tree_high.png".into(),
                ground_height: None,
            },
        );
        let plan = plan_cycle(&CycleInput {
            center: center(),
            camera_agl: 800.0,
            placements: &placements,
            index: &index,
            live: &live,
            config: &config(),
        });
        assert!(plan.loads.is_empty());
        assert_eq!(plan.removals, vec![FeatureId(1)]);
    }

    #[test]
    fn test_altitude_coarsens_tiers() {
        let (placements, index) = store(vec![placement_east(1, 10.0)]);
        let live = HashMap::default();
        // 10m away on the ground but 250m up: line of sight is ~250m
        let plan = plan_cycle(&CycleInput {
            center: center(),
            camera_agl: 250.0,
            placements: &placements,
            index: &index,
            live: &live,
            config: &config(),
        });
        assert_eq!(plan.loads[0].tier, LodTier::Low);
    }

    #[test]
    fn test_plan_is_idempotent_once_applied() {
        let (placements, index) = store(vec![
            placement_east(1, 50.0),
            placement_east(2, 150.0),
            placement_east(3, 500.0),
        ]);
        let mut live = HashMap::default();
        let first = plan_cycle(&CycleInput {
            center: center(),
            camera_agl: 0.0,
            placements: &placements,
            index: &index,
            live: &live,
            config: &config(),
        });
        for (n, item) in first.loads.iter().enumerate() {
            live.insert(
                item.fid,
                LiveEntry {
                    entity: dummy_entity(n as u64),
                    tier: item.tier,
                    url: item.url.clone(),
                    ground_height: None,
                },
            );
        }
        let second = plan_cycle(&CycleInput {
            center: center(),
            camera_agl: 0.0,
            placements: &placements,
            index: &index,
            live: &live,
            config: &config(),
        });
        assert!(second.loads.is_empty());
        assert!(second.removals.is_empty());
        assert!(second.refreshes.is_empty());
    }

    #[test]
    fn test_residency_cap_keeps_the_nearest() {
        let (placements, index) = store(vec![
            placement_east(1, 50.0),
            placement_east(2, 100.0),
            placement_east(3, 150.0),
            placement_east(4, 200.0),
        ]);
        let live = HashMap::default();
        let mut config = config();
        config.max_resident = 2;
        let plan = plan_cycle(&CycleInput {
            center: center(),
            camera_agl: 0.0,
            placements: &placements,
            index: &index,
            live: &live,
            config: &config,
        });
        let fids: Vec<FeatureId> = plan.loads.iter().map(|i| i.fid).collect();
        assert_eq!(fids, vec![FeatureId(1), FeatureId(2)]);
    }

    #[test]
    fn test_tier_fallback_does_not_thrash() {
        let mut sparse = placement_east(1, 30.0);
        sparse.urls = TierUrls {
            high: None,
            medium: None,
            low: Some("https://assets.test/only_low.png".into()),
        };
        let (placements, index) = store(vec![sparse]);
        // resident at the only tier it has, wanted at high
        let mut live = HashMap::default();
        live.insert(
            FeatureId(1),
            LiveEntry {
                entity: dummy_entity(1),
                tier: LodTier::Low,
                url: "https://assets.test/only_low.png".into(),
                ground_height: None,
            },
        );
        let plan = plan_cycle(&CycleInput {
            center: center(),
            camera_agl: 0.0,
            placements: &placements,
            index: &index,
            live: &live,
            config: &config(),
        });
        assert!(plan.loads.is_empty());
        assert!(plan.removals.is_empty());
    }

    #[test]
    fn test_ground_height_arrival_requests_refresh() {
        let mut grounded = placement_east(1, 30.0);
        grounded.ground_height = Some(412.0);
        let (placements, index) = store(vec![grounded]);
        let mut live = HashMap::default();
        live.insert(
            FeatureId(1),
            LiveEntry {
                entity: dummy_entity(1),
                tier: LodTier::High,
                url: "https://assets.test/tree_high.png".into(),
                ground_height: None,
            },
        );
        let plan = plan_cycle(&CycleInput {
            center: center(),
            camera_agl: 0.0,
            placements: &placements,
            index: &index,
            live: &live,
            config: &config(),
        });
        assert_eq!(plan.refreshes, vec![FeatureId(1)]);
        assert!(plan.loads.is_empty());
    }

    #[test]
    fn test_removals_order_farthest_first() {
        let (placements, index) = store(vec![placement_east(1, 100.0), placement_east(2, 300.0)]);
        let mut live = HashMap::default();
        for (fid, url) in [(1u64, "a"), (2, "b")] {
            live.insert(
                FeatureId(fid),
                LiveEntry {
                    entity: dummy_entity(fid),
                    tier: LodTier::Low,
                    url: url.into(),
                    ground_height: None,
                },
            );
        }
        // camera far above: everything goes, farthest first
        let plan = plan_cycle(&CycleInput {
            center: center(),
            camera_agl: 5000.0,
            placements: &placements,
            index: &index,
            live: &live,
            config: &config(),
        });
        assert_eq!(plan.removals, vec![FeatureId(2), FeatureId(1)]);
    }

    #[test]
    fn test_run_cycle_bumps_version_and_stales_old_work() {
        let (placements, index) = store(vec![placement_east(1, 50.0)]);
        let mut scheduler = StreamingScheduler::new();
        assert!(scheduler.run_cycle(center(), 0.0, &placements, &index, &config()));
        assert_eq!(scheduler.version(), 1);
        assert!(scheduler.is_current(1));

        assert!(scheduler.run_cycle(center(), 0.0, &placements, &index, &config()));
        assert_eq!(scheduler.version(), 2);
        assert!(!scheduler.is_current(1));
    }

    #[test]
    fn test_run_cycle_queues_and_drains_in_batches() {
        let (placements, index) = store(vec![
            placement_east(1, 50.0),
            placement_east(2, 100.0),
            placement_east(3, 150.0),
        ]);
        let mut scheduler = StreamingScheduler::new();
        scheduler.run_cycle(center(), 0.0, &placements, &index, &config());
        assert_eq!(scheduler.queued_count(), 3);

        let first = scheduler.take_queued(2);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].fid, FeatureId(1));
        assert_eq!(scheduler.queued_count(), 1);
        assert_eq!(scheduler.take_queued(2).len(), 1);
        assert!(scheduler.take_queued(2).is_empty());
    }

    #[test]
    fn test_rewanted_feature_leaves_the_retire_lane() {
        let (placements, index) = store(vec![placement_east(1, 50.0)]);
        let mut scheduler = StreamingScheduler::new();
        scheduler.install(
            FeatureId(1),
            LiveEntry {
                entity: dummy_entity(1),
                tier: LodTier::High,
                url: "https://assets.test/tree_high.png".into(),
                ground_height: None,
            },
        );
        // evicted while moving away...
        scheduler.queue_evictions(&center(), &placements, 10.0);
        assert_eq!(scheduler.retiring_count(), 1);
        // ...but the camera came back before the retirement applied
        scheduler.run_cycle(center(), 0.0, &placements, &index, &config());
        assert_eq!(scheduler.retiring_count(), 0);
        assert_eq!(scheduler.live_count(), 1);
    }

    #[test]
    fn test_evictions_respect_the_margin() {
        let (placements, _) = store(vec![placement_east(1, 100.0), placement_east(2, 900.0)]);
        let mut scheduler = StreamingScheduler::new();
        for fid in [1u64, 2] {
            scheduler.install(
                FeatureId(fid),
                LiveEntry {
                    entity: dummy_entity(fid),
                    tier: LodTier::Low,
                    url: "u".into(),
                    ground_height: None,
                },
            );
        }
        let queued = scheduler.queue_evictions(&center(), &placements, 700.0 * 1.15);
        assert_eq!(queued, 1);
        assert_eq!(scheduler.take_retirements(16), vec![FeatureId(2)]);
    }

    #[test]
    fn test_install_displaces_previous_entry() {
        let mut scheduler = StreamingScheduler::new();
        let old = LiveEntry {
            entity: dummy_entity(1),
            tier: LodTier::Low,
            url: "low.png".into(),
            ground_height: None,
        };
        assert!(scheduler.install(FeatureId(7), old).is_none());
        let displaced = scheduler.install(
            FeatureId(7),
            LiveEntry {
                entity: dummy_entity(2),
                tier: LodTier::High,
                url: "high.png".into(),
                ground_height: None,
            },
        );
        // at most one entity per feature, the old one comes back out
        assert_eq!(displaced.map(|e| e.entity), Some(dummy_entity(1)));
        assert_eq!(scheduler.live_count(), 1);
    }
}
