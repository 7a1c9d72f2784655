use std::{fs, path::Path};

use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::{Map, Number, Value as JsonValue};

use crate::{error::Result, types::Section};

fn closed_ring(ring: &[[f64; 2]]) -> Vec<Vec<f64>> {
    let mut positions: Vec<Vec<f64>> = ring.iter().map(|&[x, y]| vec![x, y]).collect();
    if let Some(first) = positions.first().cloned() {
        if positions.last() != Some(&first) {
            positions.push(first);
        }
    }
    positions
}

fn number(value: f64) -> JsonValue {
    Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
}

impl Section {
    /// One polygon feature per shape, in physical units
    pub fn to_geojson(&self) -> FeatureCollection {
        let features = self
            .shapes
            .iter()
            .enumerate()
            .map(|(i, shape)| {
                let coordinates = shape.rings().map(|ring| closed_ring(ring)).collect();

                let mut properties = Map::new();
                properties.insert("area".to_string(), number(shape.area()));
                properties.insert("hole_count".to_string(), JsonValue::from(shape.holes.len()));
                properties.insert("perimeter".to_string(), number(shape.perimeter()));

                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::Polygon(coordinates))),
                    id: Some(geojson::feature::Id::Number(Number::from(i))),
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        let mut foreign_members = Map::new();
        foreign_members.insert("shape_count".to_string(), JsonValue::from(self.shapes.len()));
        foreign_members.insert("area".to_string(), number(self.area()));

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        }
    }

    pub fn to_geojson_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_geojson())?)
    }

    pub fn save_geojson<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_geojson_string()?)?;
        Ok(())
    }
}
