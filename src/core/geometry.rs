//! Purpose: Validated GeoJSON geometry values used by features and query filters.
//! Exports: `Geometry`, `GeoInterface`.
//! Role: Keeps geometry handling at the JSON level; no planar math happens client-side.
//! Invariants: A `Geometry` always has a known GeoJSON `type` and its required member.
use super::error::{Error, ErrorKind};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

const COORDINATE_TYPES: [&str; 6] = [
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
];

/// Anything that can render itself as a GeoJSON geometry object.
pub trait GeoInterface {
    fn geo_interface(&self) -> Value;
}

impl GeoInterface for Value {
    fn geo_interface(&self) -> Value {
        self.clone()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    value: Value,
}

impl Geometry {
    pub fn from_value(value: Value) -> Result<Self, Error> {
        validate(&value)?;
        Ok(Self { value })
    }

    pub fn from_geo(source: &impl GeoInterface) -> Result<Self, Error> {
        Self::from_value(source.geo_interface())
    }

    pub fn point(lon: f64, lat: f64) -> Self {
        Self {
            value: serde_json::json!({ "type": "Point", "coordinates": [lon, lat] }),
        }
    }

    /// Closed polygon covering an axis-aligned bounding box.
    pub fn bbox(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            value: serde_json::json!({
                "type": "Polygon",
                "coordinates": [[
                    [min_lon, min_lat],
                    [max_lon, min_lat],
                    [max_lon, max_lat],
                    [min_lon, max_lat],
                    [min_lon, min_lat],
                ]],
            }),
        }
    }

    pub fn geometry_type(&self) -> &str {
        self.value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl GeoInterface for Geometry {
    fn geo_interface(&self) -> Value {
        self.value.clone()
    }
}

impl TryFrom<Value> for Geometry {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl Serialize for Geometry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Geometry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Geometry::from_value(value).map_err(|err| {
            serde::de::Error::custom(err.message().unwrap_or("invalid geometry").to_string())
        })
    }
}

fn validate(value: &Value) -> Result<(), Error> {
    let Some(object) = value.as_object() else {
        return Err(Error::new(ErrorKind::Usage).with_message("geometry must be a JSON object"));
    };
    let Some(kind) = object.get("type").and_then(Value::as_str) else {
        return Err(Error::new(ErrorKind::Usage).with_message("geometry is missing a string type"));
    };
    if kind == "GeometryCollection" {
        let Some(members) = object.get("geometries").and_then(Value::as_array) else {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("GeometryCollection requires a geometries array"));
        };
        for member in members {
            validate(member)?;
        }
        return Ok(());
    }
    if !COORDINATE_TYPES.contains(&kind) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("unsupported geometry type {kind}"))
            .with_hint("Use a GeoJSON geometry, not a Feature or FeatureCollection."));
    }
    if !object.get("coordinates").is_some_and(Value::is_array) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("{kind} geometry requires a coordinates array")));
    }
    Ok(())
}
