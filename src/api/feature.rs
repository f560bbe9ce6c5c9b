//! Purpose: Define `Feature`, a single GeoJSON feature stored in a product.
//! Exports: `Feature`, `FeatureAttributes`.
//! Role: Value type handed to and returned from `FeatureCollection`.
//! Invariants: Only geometry and properties are sent on create; ids come from the service.
use crate::core::error::{Error, ErrorKind};
use crate::core::geometry::{GeoInterface, Geometry};
use crate::core::jsonapi::Resource;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Wire attributes of a feature resource.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct FeatureAttributes {
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub id: Option<String>,
    pub geometry: Geometry,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: Geometry, properties: Map<String, Value>) -> Self {
        Self {
            id: None,
            geometry,
            properties,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn geojson(&self) -> Value {
        let mut object = Map::new();
        object.insert("type".to_string(), Value::from("Feature"));
        object.insert("geometry".to_string(), self.geometry.as_value().clone());
        object.insert(
            "properties".to_string(),
            Value::Object(self.properties.clone()),
        );
        if let Some(id) = &self.id {
            object.insert("id".to_string(), Value::from(id.as_str()));
        }
        Value::Object(object)
    }

    pub fn from_geojson(value: &Value) -> Result<Self, Error> {
        if value.get("type").and_then(Value::as_str) != Some("Feature") {
            return Err(Error::new(ErrorKind::Usage).with_message("expected a GeoJSON Feature"));
        }
        let geometry = value
            .get("geometry")
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::Usage).with_message("feature has no geometry"))
            .and_then(Geometry::from_value)?;
        let properties = match value.get("properties") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("feature properties must be an object"));
            }
        };
        let id = match value.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        Ok(Self {
            id,
            geometry,
            properties,
        })
    }

    pub fn attributes(&self) -> FeatureAttributes {
        FeatureAttributes {
            geometry: self.geometry.clone(),
            properties: self.properties.clone(),
        }
    }

    pub(crate) fn from_resource(resource: Resource<FeatureAttributes>) -> Self {
        Self {
            id: Some(resource.id),
            geometry: resource.attributes.geometry,
            properties: resource.attributes.properties,
        }
    }
}

impl GeoInterface for Feature {
    fn geo_interface(&self) -> Value {
        self.geometry.geo_interface()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Feature({})", self.geojson())
    }
}
