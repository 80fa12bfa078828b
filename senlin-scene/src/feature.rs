use crate::{AssetPlacement, FeatureId, TierUrls};
use serde::Deserialize;
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum FeatureError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

/// One record of the source layer, positions in degrees.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFeature {
    pub id: u64,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default)]
    pub attributes: FeatureAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureAttributes {
    #[serde(default)]
    pub species: Option<String>,
    /// Plant height in meters.
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub yaw_degrees: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureCollection {
    pub features: Vec<RawFeature>,
}

impl FeatureCollection {
    pub fn from_json_str(json: &str) -> Result<Self, FeatureError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FeatureError> {
        FeatureCollection::from_json_str(&std::fs::read_to_string(path)?)
    }
}

/// Per-species rendering resources and the height those were authored at.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeciesEntry {
    pub nominal_height: f64,
    #[serde(default)]
    pub high_url: Option<String>,
    #[serde(default)]
    pub medium_url: Option<String>,
    #[serde(default)]
    pub low_url: Option<String>,
}

impl SpeciesEntry {
    pub fn urls(&self) -> TierUrls {
        TierUrls {
            high: self.high_url.clone(),
            medium: self.medium_url.clone(),
            low: self.low_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeciesCatalog {
    pub species: HashMap<String, SpeciesEntry>,
}

impl SpeciesCatalog {
    pub fn from_json_str(json: &str) -> Result<Self, FeatureError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FeatureError> {
        SpeciesCatalog::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn get(&self, name: &str) -> Option<&SpeciesEntry> {
        self.species.get(name)
    }
}

#[derive(Debug, Default)]
pub struct MappingOutcome {
    pub placements: Vec<AssetPlacement>,
    /// Features dropped because they cannot be placed or rendered.
    pub skipped: usize,
}

/// Turns raw features into placements. A malformed feature never aborts the
/// batch; it is counted and dropped.
pub fn map_features(collection: &FeatureCollection, catalog: &SpeciesCatalog) -> MappingOutcome {
    let mut outcome = MappingOutcome::default();
    for feature in &collection.features {
        let Some(placement) = map_one(feature, catalog) else {
            outcome.skipped += 1;
            continue;
        };
        outcome.placements.push(placement);
    }
    outcome
}

fn map_one(feature: &RawFeature, catalog: &SpeciesCatalog) -> Option<AssetPlacement> {
    if !feature.longitude.is_finite()
        || !feature.latitude.is_finite()
        || feature.longitude.abs() > 180.0
        || feature.latitude.abs() > 90.0
    {
        return None;
    }
    let species = feature.attributes.species.as_deref()?;
    let entry = catalog.get(species)?;
    let urls = entry.urls();
    if urls.is_empty() {
        return None;
    }
    let scale = feature
        .attributes
        .height
        .filter(|h| *h > 0.0)
        .unwrap_or(entry.nominal_height);
    if scale <= 0.0 {
        return None;
    }
    let yaw = feature
        .attributes
        .yaw_degrees
        .map(f64::to_radians)
        .unwrap_or_else(|| derived_yaw(feature.id));
    Some(AssetPlacement {
        fid: FeatureId(feature.id),
        longitude: feature.longitude.to_radians(),
        latitude: feature.latitude.to_radians(),
        height_offset: 0.0,
        ground_height: None,
        yaw,
        scale,
        urls,
    })
}

/// Stable pseudo-random heading derived from the feature id, so a feature
/// faces the same way every session.
fn derived_yaw(id: u64) -> f64 {
    let hashed = id.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(31);
    (hashed >> 11) as f64 / (1u64 << 53) as f64 * TAU
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_JSON: &str = r#"{
        "species": {
            "pinus": {
                "nominal_height": 18.0,
                "high_url": "https://assets.test/pinus_high.png",
                "medium_url": "https://assets.test/pinus_medium.png",
                "low_url": "https://assets.test/pinus_low.png"
            },
            "quercus": {
                "nominal_height": 15.0,
                "low_url": "https://assets.test/quercus_low.png"
            },
            "bare": {
                "nominal_height": 10.0
            }
        }
    }"#;

    const FEATURES_JSON: &str = r#"{
        "features": [
            { "id": 1, "longitude": 120.15, "latitude": 30.25,
              "attributes": { "species": "pinus", "height": 21.0 } },
            { "id": 2, "longitude": 120.151, "latitude": 30.251,
              "attributes": { "species": "quercus" } },
            { "id": 3, "longitude": 120.152, "latitude": 30.252,
              "attributes": { "species": "unknown" } },
            { "id": 4, "longitude": 120.153, "latitude": 30.253,
              "attributes": {} },
            { "id": 5, "longitude": 500.0, "latitude": 30.254,
              "attributes": { "species": "pinus" } },
            { "id": 6, "longitude": 120.154, "latitude": 30.255,
              "attributes": { "species": "bare" } }
        ]
    }"#;

    #[test]
    fn test_mapping_skips_malformed_features() {
        let collection = FeatureCollection::from_json_str(FEATURES_JSON).unwrap();
        let catalog = SpeciesCatalog::from_json_str(CATALOG_JSON).unwrap();
        let outcome = map_features(&collection, &catalog);
        // unknown species, missing species, bad longitude, url-less species
        assert_eq!(outcome.skipped, 4);
        assert_eq!(outcome.placements.len(), 2);
    }

    #[test]
    fn test_mapping_prefers_feature_height() {
        let collection = FeatureCollection::from_json_str(FEATURES_JSON).unwrap();
        let catalog = SpeciesCatalog::from_json_str(CATALOG_JSON).unwrap();
        let outcome = map_features(&collection, &catalog);
        let pinus = outcome
            .placements
            .iter()
            .find(|p| p.fid == FeatureId(1))
            .unwrap();
        assert_eq!(pinus.scale, 21.0);
        let quercus = outcome
            .placements
            .iter()
            .find(|p| p.fid == FeatureId(2))
            .unwrap();
        assert_eq!(quercus.scale, 15.0);
    }

    #[test]
    fn test_derived_yaw_is_stable_and_in_range() {
        for id in [0u64, 1, 2, 99, u64::MAX] {
            let yaw = derived_yaw(id);
            assert_eq!(yaw, derived_yaw(id));
            assert!((0.0..TAU).contains(&yaw));
        }
        assert_ne!(derived_yaw(1), derived_yaw(2));
    }

    #[test]
    fn test_from_path_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.json");
        std::fs::write(&path, FEATURES_JSON).unwrap();
        let collection = FeatureCollection::from_path(&path).unwrap();
        assert_eq!(collection.features.len(), 6);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(FeatureCollection::from_json_str("{").is_err());
        assert!(SpeciesCatalog::from_json_str("[]").is_err());
    }
}
