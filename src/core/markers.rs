use crate::domain::model::PostalRecord;
use serde_json::{json, Value};

pub const MAP_CENTER: (f64, f64) = (-14.2350, -51.9253);
pub const MAP_ZOOM: u8 = 5;
const MIN_RADIUS: f64 = 3.0;
const MAX_RADIUS: f64 = 20.0;

/// A bubble sized by its share of the largest quantity on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub code: String,
    pub quantity: f64,
    pub lat: f64,
    pub lon: f64,
    pub radius: f64,
}

pub fn build_markers(records: &[PostalRecord]) -> Vec<Marker> {
    let located: Vec<(&PostalRecord, f64, f64)> = records
        .iter()
        .filter_map(|r| Some((r, r.lat?, r.lon?)))
        .collect();

    let max_quantity = located
        .iter()
        .map(|(r, _, _)| r.quantity)
        .fold(0.0_f64, f64::max);

    located
        .into_iter()
        .map(|(record, lat, lon)| {
            let scaled = if max_quantity > 0.0 {
                record.quantity / max_quantity * MAX_RADIUS
            } else {
                0.0
            };
            Marker {
                code: record.code.clone(),
                quantity: record.quantity,
                lat,
                lon,
                radius: scaled.max(MIN_RADIUS),
            }
        })
        .collect()
}

/// GeoJSON `FeatureCollection` of the markers; coordinates are `[lon, lat]`.
pub fn to_geojson(markers: &[Marker]) -> Value {
    let features: Vec<Value> = markers
        .iter()
        .map(|m| {
            json!({
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [m.lon, m.lat]},
                "properties": {
                    "cep": m.code,
                    "quantidade": m.quantity,
                    "radius": m.radius,
                    "popup": format!("CEP: {} | Quantidade: {}", m.code, m.quantity),
                }
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "properties": {
            "center": [MAP_CENTER.0, MAP_CENTER.1],
            "zoom": MAP_ZOOM,
        },
        "features": features,
    })
}
