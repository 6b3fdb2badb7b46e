use crate::places::{FeatureCollection, PlaceRecord};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

/// Normalize a raw provider payload into an ordered, de-duplicated collection.
///
/// - Features without a non-empty `place_id` are dropped.
/// - `lat`/`lon` are coerced to numbers (numeric strings are accepted); features whose
///   coordinates are not finite after coercion are dropped.
/// - The first valid occurrence of a `place_id` wins; an invalid record does not claim
///   its id. Output order is first-seen order in the payload.
/// - A payload without a `features` array yields an empty collection.
pub fn sanitize(raw: Value) -> FeatureCollection {
    let features = match raw {
        Value::Object(mut body) => body.remove("features"),
        _ => None,
    };
    let Some(Value::Array(features)) = features else {
        return FeatureCollection::default();
    };

    let total = features.len();
    let mut seen = HashSet::with_capacity(total);
    let mut kept = Vec::with_capacity(total);
    for feature in features {
        if let Some(record) = sanitize_feature(feature, &seen) {
            seen.insert(record.properties.place_id.clone());
            kept.push(record);
        }
    }

    if kept.len() < total {
        debug!(target: "locus::places", total, kept = kept.len(), "dropped invalid or duplicate places");
    }
    FeatureCollection { features: kept, ..FeatureCollection::default() }
}

fn sanitize_feature(mut feature: Value, seen: &HashSet<String>) -> Option<PlaceRecord> {
    let properties = feature.get_mut("properties")?.as_object_mut()?;

    let place_id = place_id(properties)?;
    if seen.contains(&place_id) {
        return None;
    }
    let lat = coerce_coordinate(properties.get("lat"))?;
    let lon = coerce_coordinate(properties.get("lon"))?;

    properties.insert("place_id".into(), Value::String(place_id));
    properties.insert("lat".into(), Value::from(lat));
    properties.insert("lon".into(), Value::from(lon));

    match serde_json::from_value(feature) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!(target: "locus::places", error = %e, "dropped malformed place");
            None
        }
    }
}

fn place_id(properties: &Map<String, Value>) -> Option<String> {
    match properties.get("place_id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn coerce_coordinate(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
