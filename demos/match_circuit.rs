//! Index a single circuit against a handful of POIs and a zone.
//!
//! Run with: cargo run --example match_circuit

use circuit_index::{
    geo_utils, track, DestinationRegistry, IndexConfig, Poi, PoiIndex, Reconciler, Zone,
};

const CIRCUIT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="Wikiloc">
  <trk>
    <name>Wikiloc - Houmt Souk old town</name>
    <desc><![CDATA[Loop through the souks & the fort]]></desc>
    <trkseg>
      <trkpt lat="33.8760" lon="10.8570"/>
      <trkpt lat="33.8775" lon="10.8585"/>
      <trkpt lat="33.8790" lon="10.8600"/>
      <trkpt lat="33.8805" lon="10.8590"/>
    </trkseg>
  </trk>
</gpx>"#;

fn poi(id: &str, lat: f64, lng: f64, zone: Option<&str>) -> Poi {
    Poi {
        id: id.to_string(),
        position: circuit_index::GeoPoint::new(lat, lng),
        zone: zone.map(str::to_string),
        properties: serde_json::Map::new(),
    }
}

fn main() -> circuit_index::Result<()> {
    let points = track::parse_track(CIRCUIT);
    println!("Circuit Indexing Example\n");
    println!("Track: {} points, {}", points.len(), geo_utils::format_km(geo_utils::track_distance(&points)));

    let pois = PoiIndex::new(vec![
        poi("borj-el-kebir", 33.8806, 10.8593, Some("Houmt Souk")), // Next to the last point
        poi("souk", 33.8776, 10.8586, None),                        // On the route
        poi("guellala", 33.7295, 10.8640, Some("Guellala")),        // 16 km south
    ]);

    let zones = vec![Zone {
        name: "Houmt Souk".to_string(),
        boundary: geo::LineString::from(vec![
            (10.84, 33.86),
            (10.88, 33.86),
            (10.88, 33.89),
            (10.84, 33.89),
            (10.84, 33.86),
        ]),
    }];

    let config = IndexConfig::default();
    println!(
        "Config: threshold={}m, buffer={}deg\n",
        config.proximity_threshold_m, config.bbox_buffer_deg
    );

    let reconciler = Reconciler::with_inputs(config, zones, DestinationRegistry::default())?;
    let outcome = reconciler.index_track("djerba", "houmt_souk.gpx", CIRCUIT.as_bytes(), &pois, &[]);

    let entry = &outcome.entry;
    println!("Entry:");
    println!("  id:          {} ({:?})", entry.id, outcome.resolution);
    println!("  name:        {}", entry.name);
    println!("  description: {}", entry.description);
    println!("  distance:    {}", entry.distance);
    println!("  zone:        {}", entry.zone.as_deref().unwrap_or("-"));
    println!("  pois:        {:?}", entry.poi_ids);

    if let Some(rewritten) = &outcome.rewritten {
        println!("\nFile would gain {} bytes to carry {}", rewritten.len() - CIRCUIT.len(), track::identifier_marker(&entry.id));
    }

    Ok(())
}
