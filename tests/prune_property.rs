//! Property tests for the matching prune and distance accumulation.

use circuit_index::geo_utils::{haversine_distance, track_distance};
use circuit_index::{match_pois_exhaustive, match_pois_on_track, GeoPoint, Poi};
use proptest::prelude::*;

fn build_track(base: (f64, f64), steps: &[(f64, f64)]) -> Vec<GeoPoint> {
    let mut lat = base.0;
    let mut lng = base.1;
    steps
        .iter()
        .map(|(dlat, dlng)| {
            lat += dlat;
            lng += dlng;
            GeoPoint::new(lat, lng)
        })
        .collect()
}

fn build_pois(base: (f64, f64), offsets: &[(f64, f64)]) -> Vec<Poi> {
    offsets
        .iter()
        .enumerate()
        .map(|(i, (dlat, dlng))| Poi {
            id: format!("poi-{}", i),
            position: GeoPoint::new(base.0 + dlat, base.1 + dlng),
            zone: None,
            properties: serde_json::Map::new(),
        })
        .collect()
}

proptest! {
    #[test]
    fn pruned_matching_equals_exhaustive(
        base_lat in -90.0f64..90.0,
        base_lng in -180.0f64..180.0,
        steps in prop::collection::vec((-0.002f64..0.002, -0.002f64..0.002), 0..30),
        offsets in prop::collection::vec((-0.01f64..0.01, -0.01f64..0.01), 0..40),
        threshold in 5.0f64..400.0,
        buffer in 0.0f64..0.004,
    ) {
        let track = build_track((base_lat, base_lng), &steps);
        let pois = build_pois((base_lat, base_lng), &offsets);

        prop_assert_eq!(
            match_pois_on_track(&track, &pois, threshold, buffer),
            match_pois_exhaustive(&track, &pois, threshold)
        );
    }

    #[test]
    fn pruned_matching_equals_exhaustive_across_antimeridian(
        base_lat in -80.0f64..80.0,
        side in prop::bool::ANY,
        steps in prop::collection::vec((-0.002f64..0.002, -0.002f64..0.002), 1..20),
        poi_lngs in prop::collection::vec((-0.01f64..0.01, 179.99f64..180.0, prop::bool::ANY), 1..20),
        threshold in 5.0f64..400.0,
    ) {
        let base_lng = if side { 179.999 } else { -179.999 };
        let track = build_track((base_lat, base_lng), &steps);
        let offsets: Vec<(f64, f64)> = poi_lngs
            .iter()
            .map(|(dlat, lng, east)| (*dlat, if *east { *lng } else { -*lng }))
            .collect();
        let pois = build_pois((base_lat, 0.0), &offsets);

        prop_assert_eq!(
            match_pois_on_track(&track, &pois, threshold, 0.0),
            match_pois_exhaustive(&track, &pois, threshold)
        );
    }

    #[test]
    fn pruned_matching_equals_exhaustive_near_poles(
        north in prop::bool::ANY,
        base_lng in -180.0f64..180.0,
        steps in prop::collection::vec((-0.001f64..0.001, -0.5f64..0.5), 1..20),
        offsets in prop::collection::vec((-0.005f64..0.005, -180.0f64..180.0), 1..20),
        threshold in 5.0f64..400.0,
    ) {
        let base_lat = if north { 89.995 } else { -89.995 };
        let track = build_track((base_lat, base_lng), &steps);
        let pois = build_pois((base_lat, 0.0), &offsets);

        prop_assert_eq!(
            match_pois_on_track(&track, &pois, threshold, 0.0),
            match_pois_exhaustive(&track, &pois, threshold)
        );
    }

    #[test]
    fn track_distance_is_sum_of_legs(
        base_lat in -60.0f64..60.0,
        base_lng in -170.0f64..170.0,
        steps in prop::collection::vec((-0.05f64..0.05, -0.05f64..0.05), 3..4),
    ) {
        let track = build_track((base_lat, base_lng), &steps);
        let legs = haversine_distance(&track[0], &track[1]) + haversine_distance(&track[1], &track[2]);
        prop_assert_eq!(track_distance(&track), legs);
    }
}
