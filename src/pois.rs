//! Destination registry, POI loading and POI-to-track proximity matching.
//!
//! ## Algorithm
//! 1. Bound the track and grow the box by a buffer
//! 2. Query an R-tree of POI positions for everything inside the box
//! 3. Accept a surviving POI as soon as any track point is within the threshold
//!
//! The buffer is never smaller than the threshold's degree span at the
//! box's highest latitude, so the prune only ever drops POIs that no track
//! point could reach. When no such box exists (it would cross the
//! antimeridian or reach a pole, or a POI lies outside the valid coordinate
//! range) every POI is checked instead, as in [`match_pois_exhaustive`].
//!
//! Matched ids come back in POI file order, without duplicates.

use crate::error::{CircuitIndexError, Result};
use crate::geo_utils::{haversine_distance, meters_to_degrees, METERS_PER_DEGREE};
use crate::{Bounds, GeoPoint};
use geojson::{GeoJson, Value};
use log::{debug, info, warn};
use rstar::{RTree, RTreeObject, AABB};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Feature property holding a POI's stable identifier.
pub const POI_ID_PROPERTY: &str = "HW_ID";

/// Feature property holding a POI's zone name.
pub const POI_ZONE_PROPERTY: &str = "Zone";

// ============================================================================
// Registry
// ============================================================================

/// Registry entry for one destination. Only the POI file is used here.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DestinationEntry {
    #[serde(default)]
    pub file: Option<String>,
}

/// Mapping from destination id to its configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DestinationRegistry {
    #[serde(default)]
    pub maps: BTreeMap<String, DestinationEntry>,
}

impl DestinationRegistry {
    /// POI source filename configured for a destination.
    pub fn poi_file(&self, destination: &str) -> Option<&str> {
        self.maps
            .get(destination)
            .and_then(|entry| entry.file.as_deref())
            .filter(|file| !file.is_empty())
    }
}

/// Load the destination registry. A missing or malformed file yields an empty registry.
pub fn load_registry(path: &Path) -> DestinationRegistry {
    if !path.exists() {
        warn!("Destination registry not found at {}, POI matching disabled", path.display());
        return DestinationRegistry::default();
    }
    try_load_registry(path).unwrap_or_else(|e| {
        warn!("Ignoring destination registry: {}", e);
        DestinationRegistry::default()
    })
}

/// Load the destination registry, reporting why it could not be used.
pub fn try_load_registry(path: &Path) -> Result<DestinationRegistry> {
    let content = std::fs::read_to_string(path).map_err(|e| CircuitIndexError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| CircuitIndexError::json(path, e))
}

// ============================================================================
// POIs
// ============================================================================

/// A point of interest. Read-only input to circuit indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct Poi {
    pub id: String,
    pub position: GeoPoint,
    pub zone: Option<String>,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Load a destination's POIs from the file named in the registry.
///
/// Never fails: no configured file, a missing file or a corrupt file all
/// yield an empty list and a warning naming the destination.
pub fn load_pois(destination: &str, registry: &DestinationRegistry, poi_dir: &Path) -> Vec<Poi> {
    let Some(file) = registry.poi_file(destination) else {
        warn!("No POI file configured for destination '{}', skipping POI detection", destination);
        return Vec::new();
    };

    let path = poi_dir.join(file);
    if !path.exists() {
        warn!("POI file for destination '{}' not found at {}", destination, path.display());
        return Vec::new();
    }

    match try_load_pois(&path) {
        Ok(pois) => {
            info!("Loaded {} POIs for '{}' from {}", pois.len(), destination, file);
            pois
        }
        Err(e) => {
            warn!("Ignoring POIs for destination '{}': {}", destination, e);
            Vec::new()
        }
    }
}

/// Load POIs from a GeoJSON file, reporting why it could not be used.
pub fn try_load_pois(path: &Path) -> Result<Vec<Poi>> {
    let content = std::fs::read_to_string(path).map_err(|e| CircuitIndexError::io(path, e))?;
    parse_pois(&content).map_err(|reason| CircuitIndexError::GeoJson {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parse POIs: `Point` features with valid coordinates carrying a non-empty [`POI_ID_PROPERTY`].
pub fn parse_pois(content: &str) -> std::result::Result<Vec<Poi>, String> {
    let geojson: GeoJson = content.parse().map_err(|e: geojson::Error| e.to_string())?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err("expected a FeatureCollection".to_string());
    };

    let total = collection.features.len();
    let pois: Vec<Poi> = collection
        .features
        .into_iter()
        .filter_map(|feature| {
            let Value::Point(position) = &feature.geometry.as_ref()?.value else {
                return None;
            };
            if position.len() < 2 || !GeoPoint::new(position[1], position[0]).is_valid() {
                return None;
            }
            let properties = feature.properties?;
            let id = match properties.get(POI_ID_PROPERTY)? {
                serde_json::Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => return None,
            };
            let zone = properties
                .get(POI_ZONE_PROPERTY)
                .and_then(|v| v.as_str())
                .filter(|z| !z.is_empty())
                .map(str::to_string);

            Some(Poi {
                id,
                position: GeoPoint::new(position[1], position[0]),
                zone,
                properties,
            })
        })
        .collect();

    if pois.len() < total {
        debug!("Skipped {} features without a valid point or {}", total - pois.len(), POI_ID_PROPERTY);
    }

    Ok(pois)
}

// ============================================================================
// Matching
// ============================================================================

/// POI position in the R-tree, pointing back into the POI list.
#[derive(Debug, Clone, Copy)]
struct IndexedPoi {
    idx: usize,
    lat: f64,
    lng: f64,
}

impl RTreeObject for IndexedPoi {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lng, self.lat])
    }
}

/// A destination's POIs with a spatial index, built once and queried per track.
pub struct PoiIndex {
    pois: Vec<Poi>,
    tree: RTree<IndexedPoi>,
    /// Every POI lies inside the valid coordinate range, so box pruning is sound
    prunable: bool,
}

impl PoiIndex {
    pub fn new(pois: Vec<Poi>) -> Self {
        let indexed: Vec<IndexedPoi> = pois
            .iter()
            .enumerate()
            .map(|(idx, poi)| IndexedPoi {
                idx,
                lat: poi.position.latitude,
                lng: poi.position.longitude,
            })
            .collect();

        let prunable = pois.iter().all(|poi| poi.position.is_valid());
        Self { pois, tree: RTree::bulk_load(indexed), prunable }
    }

    /// First POI with the given id.
    pub fn get(&self, id: &str) -> Option<&Poi> {
        self.pois.iter().find(|poi| poi.id == id)
    }

    /// Ids of POIs within `threshold_m` of any track point, in POI order.
    pub fn match_track(&self, track: &[GeoPoint], threshold_m: f64, buffer_deg: f64) -> Vec<String> {
        let Some(bounds) = Bounds::from_points(track) else {
            return Vec::new();
        };

        let search = prune_buffer(&bounds, threshold_m, buffer_deg)
            .map(|buffer| bounds.expand(buffer))
            .filter(|search| self.prunable && search.is_within_globe());
        let Some(search) = search else {
            debug!("No safe envelope for this track, checking all {} POIs", self.pois.len());
            return collect_matches(self.pois.iter(), track, threshold_m);
        };

        let envelope = AABB::from_corners(
            [search.min_lng, search.min_lat],
            [search.max_lng, search.max_lat],
        );

        let mut candidates: Vec<usize> = self
            .tree
            .locate_in_envelope(&envelope)
            .map(|indexed| indexed.idx)
            .collect();
        candidates.sort_unstable();

        debug!("{} of {} POIs inside track envelope", candidates.len(), self.pois.len());

        collect_matches(candidates.into_iter().map(|idx| &self.pois[idx]), track, threshold_m)
    }
}

/// Widest longitude span, in degrees, for which a 1% margin over the
/// threshold still bounds the haversine distance from below.
const MAX_PRUNE_SPAN_DEG: f64 = 20.0;

/// Buffer in degrees around a track's bounds that no reachable POI can fall
/// outside of, or `None` when no box is safe.
fn prune_buffer(bounds: &Bounds, threshold_m: f64, buffer_deg: f64) -> Option<f64> {
    let lat_reach = threshold_m / METERS_PER_DEGREE;
    let highest_lat = bounds.min_lat.abs().max(bounds.max_lat.abs()) + lat_reach;
    // meters_to_degrees floors the cosine at 0.01; above that latitude it undershoots
    if !(highest_lat.to_radians().cos() > 0.01) {
        return None;
    }
    // 1% over the threshold covers the chord/arc gap of the haversine bound
    let reach = meters_to_degrees(threshold_m * 1.01, highest_lat);
    (reach < MAX_PRUNE_SPAN_DEG).then(|| buffer_deg.max(reach))
}

fn collect_matches<'a>(
    pois: impl Iterator<Item = &'a Poi>,
    track: &[GeoPoint],
    threshold_m: f64,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut matched = Vec::new();

    for poi in pois {
        if seen.contains(poi.id.as_str()) {
            continue;
        }
        if track
            .iter()
            .any(|point| haversine_distance(point, &poi.position) <= threshold_m)
        {
            seen.insert(poi.id.as_str());
            matched.push(poi.id.clone());
        }
    }

    matched
}

/// Match POIs against a track using the bounding-box prune.
///
/// Builds a throwaway [`PoiIndex`]; when matching many tracks against the
/// same POIs, build the index once and call [`PoiIndex::match_track`].
pub fn match_pois_on_track(
    track: &[GeoPoint],
    pois: &[Poi],
    threshold_m: f64,
    buffer_deg: f64,
) -> Vec<String> {
    PoiIndex::new(pois.to_vec()).match_track(track, threshold_m, buffer_deg)
}

/// Match POIs against a track by checking every POI against every track point.
pub fn match_pois_exhaustive(track: &[GeoPoint], pois: &[Poi], threshold_m: f64) -> Vec<String> {
    collect_matches(pois.iter(), track, threshold_m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn poi(id: &str, lat: f64, lng: f64, zone: Option<&str>) -> Poi {
        Poi {
            id: id.to_string(),
            position: GeoPoint::new(lat, lng),
            zone: zone.map(str::to_string),
            properties: serde_json::Map::new(),
        }
    }

    fn sample_track() -> Vec<GeoPoint> {
        (0..10).map(|i| GeoPoint::new(33.80 + i as f64 * 0.0005, 10.85)).collect()
    }

    #[test]
    fn test_match_within_threshold() {
        let track = sample_track();
        let pois = vec![
            poi("near", 33.802, 10.8503, None), // ~28m east of the track
            poi("far", 33.802, 10.852, None),   // ~185m east
            poi("away", 36.0, 10.0, None),
        ];
        let matched = match_pois_on_track(&track, &pois, 50.0, 0.002);
        assert_eq!(matched, vec!["near".to_string()]);
    }

    #[test]
    fn test_match_deduplicates_and_keeps_poi_order() {
        let track = sample_track();
        let pois = vec![
            poi("b", 33.803, 10.85, None),
            poi("a", 33.801, 10.85, None),
            poi("b", 33.804, 10.85, None),
        ];
        let matched = match_pois_on_track(&track, &pois, 50.0, 0.002);
        assert_eq!(matched, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_match_empty_inputs() {
        assert!(match_pois_on_track(&[], &[poi("a", 0.0, 0.0, None)], 50.0, 0.002).is_empty());
        assert!(match_pois_on_track(&sample_track(), &[], 50.0, 0.002).is_empty());
    }

    #[test]
    fn test_zero_buffer_still_finds_threshold_matches() {
        // POI sits beside a single-point track, outside a zero-size box
        let track = vec![GeoPoint::new(60.0, 10.0)];
        let pois = vec![poi("side", 60.0, 10.0008, None)]; // ~44m east at 60N
        assert_eq!(match_pois_on_track(&track, &pois, 50.0, 0.0), vec!["side".to_string()]);
        assert_eq!(match_pois_exhaustive(&track, &pois, 50.0), vec!["side".to_string()]);
    }

    #[test]
    fn test_large_threshold_beyond_buffer() {
        let track = vec![GeoPoint::new(33.8, 10.85)];
        let pois = vec![poi("wide", 33.8, 10.855, None)]; // ~460m away
        assert_eq!(match_pois_on_track(&track, &pois, 500.0, 0.002), vec!["wide".to_string()]);
    }

    #[test]
    fn test_prune_agrees_with_exhaustive() {
        let track = sample_track();
        let pois: Vec<Poi> = (0..50)
            .map(|i| poi(&format!("p{}", i), 33.79 + i as f64 * 0.0004, 10.8495 + (i % 3) as f64 * 0.0004, None))
            .collect();
        assert_eq!(
            match_pois_on_track(&track, &pois, 50.0, 0.002),
            match_pois_exhaustive(&track, &pois, 50.0)
        );
    }

    #[test]
    fn test_match_across_antimeridian() {
        let track = vec![GeoPoint::new(-16.5, 179.9998)];
        let pois = vec![poi("fiji", -16.5, -179.9998, None)]; // ~43m away
        assert_eq!(match_pois_exhaustive(&track, &pois, 50.0), vec!["fiji".to_string()]);
        assert_eq!(match_pois_on_track(&track, &pois, 50.0, 0.002), vec!["fiji".to_string()]);
    }

    #[test]
    fn test_match_near_pole() {
        let track = vec![GeoPoint::new(89.9997, 0.0)];
        let pois = vec![poi("opposite", 89.9997, 180.0, None)]; // ~67m across the pole
        assert_eq!(match_pois_exhaustive(&track, &pois, 100.0), vec!["opposite".to_string()]);
        assert_eq!(match_pois_on_track(&track, &pois, 100.0, 0.002), vec!["opposite".to_string()]);
    }

    #[test]
    fn test_match_with_out_of_range_poi() {
        // Same place as the track point once longitude wraps
        let track = vec![GeoPoint::new(10.0, -170.0)];
        let pois = vec![poi("wrapped", 10.0, 190.0, None)];
        assert_eq!(match_pois_on_track(&track, &pois, 50.0, 0.002), vec!["wrapped".to_string()]);
    }

    #[test]
    fn test_poi_index_get() {
        let index = PoiIndex::new(vec![poi("a", 1.0, 2.0, Some("North"))]);
        assert_eq!(index.get("a").and_then(|p| p.zone.as_deref()), Some("North"));
        assert!(index.get("b").is_none());
    }

    #[test]
    fn test_parse_pois_filters_features() {
        let text = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"HW_ID": "HW-1", "Zone": "Midoun", "name": "Fort"}, "geometry": {"type": "Point", "coordinates": [10.85, 33.80]}},
            {"type": "Feature", "properties": {"HW_ID": ""}, "geometry": {"type": "Point", "coordinates": [10.85, 33.80]}},
            {"type": "Feature", "properties": {"name": "No id"}, "geometry": {"type": "Point", "coordinates": [10.85, 33.80]}},
            {"type": "Feature", "properties": {"HW_ID": "HW-3"}, "geometry": {"type": "LineString", "coordinates": [[10.85, 33.80], [10.86, 33.81]]}},
            {"type": "Feature", "properties": {"HW_ID": 42}, "geometry": {"type": "Point", "coordinates": [10.9, 33.9]}},
            {"type": "Feature", "properties": {"HW_ID": "HW-9"}, "geometry": {"type": "Point", "coordinates": [33.9, 100.0]}}
        ]}"#;
        let pois = parse_pois(text).unwrap();
        assert_eq!(pois.len(), 2);
        assert_eq!(pois[0].id, "HW-1");
        assert_eq!(pois[0].position, GeoPoint::new(33.80, 10.85));
        assert_eq!(pois[0].zone.as_deref(), Some("Midoun"));
        assert_eq!(pois[0].properties.get("name").and_then(|v| v.as_str()), Some("Fort"));
        assert_eq!(pois[1].id, "42");
        assert_eq!(pois[1].zone, None);
    }

    #[test]
    fn test_registry_lookup() {
        let registry: DestinationRegistry = serde_json::from_str(
            r#"{"maps": {"djerba": {"file": "djerba.geojson", "name": "Djerba"}, "empty": {"file": ""}, "nofile": {}}}"#,
        )
        .unwrap();
        assert_eq!(registry.poi_file("djerba"), Some("djerba.geojson"));
        assert_eq!(registry.poi_file("empty"), None);
        assert_eq!(registry.poi_file("nofile"), None);
        assert_eq!(registry.poi_file("unknown"), None);
    }

    #[test]
    fn test_load_pois_fails_soft() {
        let dir = TempDir::new().unwrap();
        let registry: DestinationRegistry = serde_json::from_str(
            r#"{"maps": {"missing": {"file": "missing.geojson"}, "corrupt": {"file": "corrupt.geojson"}}}"#,
        )
        .unwrap();
        fs::write(dir.path().join("corrupt.geojson"), "{{{").unwrap();

        assert!(load_pois("missing", &registry, dir.path()).is_empty());
        assert!(load_pois("corrupt", &registry, dir.path()).is_empty());
        assert!(load_pois("unconfigured", &registry, dir.path()).is_empty());
    }

    #[test]
    fn test_load_registry_fails_soft() {
        let dir = TempDir::new().unwrap();
        assert_eq!(load_registry(&dir.path().join("none.json")), DestinationRegistry::default());

        let path = dir.path().join("destinations.json");
        fs::write(&path, "[1, 2]").unwrap();
        assert_eq!(load_registry(&path), DestinationRegistry::default());
        assert!(matches!(try_load_registry(&path), Err(CircuitIndexError::Json { .. })));
    }
}
