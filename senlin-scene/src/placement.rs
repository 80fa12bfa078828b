use crate::Cartographic;

/// Stable identifier of one placed asset, taken from the source data.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub u64);

/// Level-of-detail bands an asset can be realized at.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LodTier {
    High,
    Medium,
    Low,
}

impl LodTier {
    pub const ALL: [LodTier; 3] = [LodTier::High, LodTier::Medium, LodTier::Low];

    pub fn coarser(&self) -> Option<LodTier> {
        match self {
            LodTier::High => Some(LodTier::Medium),
            LodTier::Medium => Some(LodTier::Low),
            LodTier::Low => None,
        }
    }
}

/// Distance bands that pick the tier: `[0, high_max)` is high,
/// `[high_max, medium_max)` medium, everything farther low.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TierThresholds {
    pub high_max: f64,
    pub medium_max: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        TierThresholds {
            high_max: 70.0,
            medium_max: 250.0,
        }
    }
}

impl TierThresholds {
    pub fn tier_for_distance(&self, distance: f64) -> LodTier {
        if distance < self.high_max {
            LodTier::High
        } else if distance < self.medium_max {
            LodTier::Medium
        } else {
            LodTier::Low
        }
    }
}

/// Resource locations per tier. Not every species ships every tier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierUrls {
    pub high: Option<String>,
    pub medium: Option<String>,
    pub low: Option<String>,
}

impl TierUrls {
    pub fn get(&self, tier: LodTier) -> Option<&str> {
        match tier {
            LodTier::High => self.high.as_deref(),
            LodTier::Medium => self.medium.as_deref(),
            LodTier::Low => self.low.as_deref(),
        }
    }

    /// Resolves a wanted tier to an available one, walking toward coarser
    /// tiers when the wanted resource is missing.
    pub fn resolve(&self, tier: LodTier) -> Option<(LodTier, &str)> {
        let mut candidate = Some(tier);
        while let Some(t) = candidate {
            if let Some(url) = self.get(t) {
                return Some((t, url));
            }
            candidate = t.coarser();
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_none() && self.medium.is_none() && self.low.is_none()
    }
}

/// One asset anchored to the ground, fully described by the source data
/// except for `ground_height`, which the terrain query fills in later.
#[derive(Debug, Clone)]
pub struct AssetPlacement {
    pub fid: FeatureId,
    /// Longitude in radians.
    pub longitude: f64,
    /// Latitude in radians.
    pub latitude: f64,
    /// Offset of the asset base above the ground, meters.
    pub height_offset: f64,
    /// Terrain height under the placement, unknown until sampled.
    pub ground_height: Option<f64>,
    /// Heading in radians.
    pub yaw: f64,
    /// Rendered height of the asset in meters.
    pub scale: f64,
    pub urls: TierUrls,
}

impl AssetPlacement {
    pub fn cartographic(&self) -> Cartographic {
        Cartographic::from_radians(
            self.longitude,
            self.latitude,
            self.ground_height.unwrap_or(0.0) + self.height_offset,
        )
    }
}
