//! Geo index
//!
//! Indexes one coordinate pair per document, projected in one of three
//! shapes:
//! - two fields holding latitude and longitude separately
//! - one field holding an `[lat, lon]` array
//! - one field holding GeoJSON-style data (`[lon, lat]` array or a
//!   Point object), selected by the `geoJson` flag
//!
//! Coordinates outside `[-90, 90]` / `[-180, 180]` are rejected.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{StorageError, StorageResult};
use crate::index::definition::IndexDefinition;
use crate::index::secondary::{
    lookup_attribute_path, CollectionIndex, DocumentLocation, OperationMode,
};

/// How the indexed coordinate pair is laid out in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoVariant {
    /// Two fields, latitude first
    IndividualLatLon,
    /// One field holding [lat, lon]
    CombinedLatLon,
    /// One field holding GeoJSON data ([lon, lat] or a Point object)
    CombinedGeoJson,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Coordinate {
    latitude: f64,
    longitude: f64,
}

pub struct GeoIndex {
    id: u64,
    type_name: &'static str,
    variant: GeoVariant,
    fields: Vec<String>,
    entries: HashMap<String, Coordinate>,
}

impl GeoIndex {
    pub fn new(id: u64, definition: &IndexDefinition) -> StorageResult<Self> {
        let (type_name, variant) = match definition.fields.len() {
            2 => ("geo2", GeoVariant::IndividualLatLon),
            1 if definition.geo_json == Some(true) => ("geo1", GeoVariant::CombinedGeoJson),
            1 => ("geo1", GeoVariant::CombinedLatLon),
            _ => {
                return Err(StorageError::bad_parameter(
                    "geo index takes one or two fields",
                ))
            }
        };
        Ok(GeoIndex {
            id,
            type_name,
            variant,
            fields: definition.fields.clone(),
            entries: HashMap::new(),
        })
    }

    pub fn variant(&self) -> GeoVariant {
        self.variant
    }

    fn project(&self, document: &Value) -> StorageResult<Coordinate> {
        let malformed = || StorageError::bad_parameter("document has no usable geo coordinates");

        let (latitude, longitude) = match self.variant {
            GeoVariant::IndividualLatLon => {
                let lat = lookup_attribute_path(document, &self.fields[0])
                    .and_then(Value::as_f64)
                    .ok_or_else(malformed)?;
                let lon = lookup_attribute_path(document, &self.fields[1])
                    .and_then(Value::as_f64)
                    .ok_or_else(malformed)?;
                (lat, lon)
            }
            GeoVariant::CombinedLatLon => {
                let pair = coordinate_pair(
                    lookup_attribute_path(document, &self.fields[0]).ok_or_else(malformed)?,
                )
                .ok_or_else(malformed)?;
                (pair.0, pair.1)
            }
            GeoVariant::CombinedGeoJson => {
                let value =
                    lookup_attribute_path(document, &self.fields[0]).ok_or_else(malformed)?;
                // a Point object or a bare [lon, lat] array
                let coordinates = match value {
                    Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("Point") => {
                        map.get("coordinates").ok_or_else(malformed)?
                    }
                    other => other,
                };
                let pair = coordinate_pair(coordinates).ok_or_else(malformed)?;
                (pair.1, pair.0)
            }
        };

        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(StorageError::bad_parameter(
                "geo coordinates out of range",
            ));
        }
        Ok(Coordinate {
            latitude,
            longitude,
        })
    }

    /// Indexed document keys ordered by great-circle distance from the
    /// given point, closest first
    pub fn nearest(&self, latitude: f64, longitude: f64, limit: usize) -> Vec<&str> {
        let mut with_distance: Vec<(&str, f64)> = self
            .entries
            .iter()
            .map(|(key, coord)| {
                (
                    key.as_str(),
                    haversine(latitude, longitude, coord.latitude, coord.longitude),
                )
            })
            .collect();
        with_distance.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(b.0)));
        with_distance.truncate(limit);
        with_distance.into_iter().map(|(key, _)| key).collect()
    }
}

fn coordinate_pair(value: &Value) -> Option<(f64, f64)> {
    let array = value.as_array()?;
    if array.len() != 2 {
        return None;
    }
    Some((array[0].as_f64()?, array[1].as_f64()?))
}

/// Great-circle distance in meters
fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

impl CollectionIndex for GeoIndex {
    fn id(&self) -> u64 {
        self.id
    }

    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn insert(
        &mut self,
        doc_key: &str,
        _location: DocumentLocation,
        document: &Value,
        mode: OperationMode,
    ) -> StorageResult<()> {
        match self.project(document) {
            Ok(coordinate) => {
                self.entries.insert(doc_key.to_string(), coordinate);
                Ok(())
            }
            Err(_) if mode == OperationMode::Rollback => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn remove(
        &mut self,
        doc_key: &str,
        _document: &Value,
        _mode: OperationMode,
    ) -> StorageResult<()> {
        self.entries.remove(doc_key);
        Ok(())
    }

    fn matches_definition(&self, definition: &IndexDefinition) -> bool {
        definition.type_name == self.type_name
            && definition.fields == self.fields
            && (self.type_name != "geo1"
                || definition.geo_json.unwrap_or(false)
                    == (self.variant == GeoVariant::CombinedGeoJson))
    }

    fn to_definition(&self) -> IndexDefinition {
        let mut def = IndexDefinition::new(self.type_name, self.fields.clone());
        def.sparse = true;
        if self.type_name == "geo1" {
            def.geo_json = Some(self.variant == GeoVariant::CombinedGeoJson);
        }
        def
    }

    fn size(&self) -> usize {
        self.entries.len()
    }
}
