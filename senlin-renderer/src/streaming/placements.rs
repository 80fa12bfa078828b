use bevy::prelude::*;
use bevy::utils::HashMap;
use senlin_jobs::{AsyncReturn, FinishedJobs, Job, JobSpawner};
use senlin_scene::{
    map_features, AssetPlacement, FeatureCollection, FeatureError, FeatureId, PlacementIndex,
    SpeciesCatalog, TerrainSampler,
};
use std::path::PathBuf;
use std::sync::Arc;

use super::StreamCommand;
use crate::camera::SceneFrame;

/// Terrain sampling gives up after this many passes over the layer.
const MAX_HEIGHT_ATTEMPTS: u32 = 3;

/// Where the streamed layer reads its feature and species data from.
#[derive(Resource, Debug, Clone)]
pub struct StreamingSource {
    pub features_path: PathBuf,
    pub catalog_path: PathBuf,
}

/// The mapped feature layer plus its spatial index. Heights arrive after the
/// layer itself; placements carry `ground_height: None` until then.
#[derive(Resource, Default)]
pub struct PlacementSet {
    pub placements: HashMap<FeatureId, AssetPlacement>,
    pub index: PlacementIndex,
    loaded: bool,
    heights_resolved: bool,
    height_attempts: u32,
    heights_in_flight: bool,
}

impl PlacementSet {
    /// Builds a ready-to-query set from mapped placements.
    pub fn from_placements(placements: Vec<AssetPlacement>) -> Self {
        let index = PlacementIndex::build(&placements);
        PlacementSet {
            index,
            placements: placements.into_iter().map(|p| (p.fid, p)).collect(),
            loaded: true,
            ..Default::default()
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

pub struct LoadPlacementsJob {
    pub source: StreamingSource,
}

pub struct LoadedPlacements {
    pub placements: Vec<AssetPlacement>,
    pub skipped: usize,
}

impl Job for LoadPlacementsJob {
    type Outcome = Result<LoadedPlacements, FeatureError>;

    fn name(&self) -> String {
        format!("loading placements from {:?}", self.source.features_path)
    }

    fn perform(self) -> AsyncReturn<Self::Outcome> {
        Box::pin(async move {
            let features = FeatureCollection::from_path(&self.source.features_path)?;
            let catalog = SpeciesCatalog::from_path(&self.source.catalog_path)?;
            let outcome = map_features(&features, &catalog);
            Ok(LoadedPlacements {
                placements: outcome.placements,
                skipped: outcome.skipped,
            })
        })
    }
}

pub struct SampleHeightsJob {
    pub sampler: Arc<dyn TerrainSampler>,
    pub positions: Vec<(FeatureId, f64, f64)>,
}

pub struct SampledHeights {
    pub heights: Vec<(FeatureId, Option<f64>)>,
}

impl Job for SampleHeightsJob {
    type Outcome = SampledHeights;

    fn name(&self) -> String {
        format!("sampling terrain under {} placements", self.positions.len())
    }

    fn perform(self) -> AsyncReturn<Self::Outcome> {
        Box::pin(async move {
            let heights = self
                .positions
                .iter()
                .map(|(fid, longitude, latitude)| (*fid, self.sampler.height_at(*longitude, *latitude)))
                .collect();
            SampledHeights { heights }
        })
    }
}

pub(super) fn begin_loading(source: Option<Res<StreamingSource>>, mut jobs: JobSpawner) {
    // without a source the layer can still be fed a prebuilt PlacementSet
    let Some(source) = source else {
        return;
    };
    jobs.spawn(LoadPlacementsJob {
        source: source.as_ref().clone(),
    });
}

pub(super) fn receive_placements(
    mut finished_jobs: FinishedJobs,
    mut placement_set: ResMut<PlacementSet>,
    mut stream_commands: EventWriter<StreamCommand>,
) {
    while let Some(outcome) = finished_jobs.take_next::<LoadPlacementsJob>() {
        match outcome {
            Ok(loaded) => {
                if loaded.skipped > 0 {
                    warn!("dropped {} unmappable features", loaded.skipped);
                }
                info!("placement layer ready: {} assets", loaded.placements.len());
                *placement_set = PlacementSet::from_placements(loaded.placements);
                stream_commands.send(StreamCommand::Refresh);
            }
            Err(e) => {
                warn!("placement layer failed to load: {}", e);
            }
        }
    }
}

/// Kicks off a terrain pass whenever placements still lack a ground height.
pub(super) fn ensure_heights(
    frame: Res<SceneFrame>,
    mut placement_set: ResMut<PlacementSet>,
    mut jobs: JobSpawner,
) {
    if !placement_set.loaded
        || placement_set.heights_resolved
        || placement_set.heights_in_flight
        || placement_set.height_attempts >= MAX_HEIGHT_ATTEMPTS
    {
        return;
    }
    let positions: Vec<(FeatureId, f64, f64)> = placement_set
        .placements
        .values()
        .filter(|p| p.ground_height.is_none())
        .map(|p| (p.fid, p.longitude, p.latitude))
        .collect();
    if positions.is_empty() {
        placement_set.heights_resolved = true;
        return;
    }
    debug!("sampling terrain under {} placements", positions.len());
    jobs.spawn(SampleHeightsJob {
        sampler: frame.terrain.clone(),
        positions,
    });
    placement_set.heights_in_flight = true;
}

pub(super) fn receive_heights(
    mut finished_jobs: FinishedJobs,
    mut placement_set: ResMut<PlacementSet>,
    mut stream_commands: EventWriter<StreamCommand>,
) {
    while let Some(sampled) = finished_jobs.take_next::<SampleHeightsJob>() {
        let mut applied = 0usize;
        let mut unresolved = 0usize;
        for (fid, height) in sampled.heights {
            match height {
                Some(h) => {
                    if let Some(placement) = placement_set.placements.get_mut(&fid) {
                        placement.ground_height = Some(h);
                        applied += 1;
                    }
                }
                None => unresolved += 1,
            }
        }
        placement_set.height_attempts += 1;
        placement_set.heights_in_flight = false;
        placement_set.heights_resolved = unresolved == 0;
        if unresolved > 0 {
            warn!(
                "terrain has no data under {} placements (pass {})",
                unresolved, placement_set.height_attempts
            );
        }
        if applied > 0 {
            stream_commands.send(StreamCommand::Refresh);
        }
    }
}
