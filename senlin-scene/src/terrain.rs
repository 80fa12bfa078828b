/// Height source assets are grounded on. Coordinates are radians.
pub trait TerrainSampler: Send + Sync {
    /// Terrain height in meters at a position, `None` where the source has
    /// no data.
    fn height_at(&self, longitude: f64, latitude: f64) -> Option<f64>;

    fn sample_heights(&self, positions: &[(f64, f64)]) -> Vec<Option<f64>> {
        positions
            .iter()
            .map(|(longitude, latitude)| self.height_at(*longitude, *latitude))
            .collect()
    }
}

/// Flat terrain at a fixed height. The default sampler when no real source
/// is wired up.
pub struct ConstantTerrain(pub f64);

impl TerrainSampler for ConstantTerrain {
    fn height_at(&self, _longitude: f64, _latitude: f64) -> Option<f64> {
        Some(self.0)
    }
}
