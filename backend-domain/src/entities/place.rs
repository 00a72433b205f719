// Place reference data
// Read-only geometry and naming owned by the trip/place collaborator

use serde::{Deserialize, Serialize};

use crate::value_objects::GeoPoint;

/// One place returned by the place index with its effective trip/region
/// context and distance from the query point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceMatch {
    pub place_id: String,
    pub trip_id: Option<String>,
    pub trip_name: Option<String>,
    pub region_name: Option<String>,
    pub place_name: String,
    pub place_notes_html: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_meters: f64,
}

impl PlaceMatch {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaceCatalog {
    #[serde(default)]
    pub trips: Vec<TripEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripEntry {
    pub trip_id: String,
    pub name: String,
    #[serde(default)]
    pub regions: Vec<RegionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionEntry {
    #[serde(default)]
    pub region_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub places: Vec<PlaceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceEntry {
    pub place_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes_html: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

/// A place flattened together with the trip and region that own it.
#[derive(Debug, Clone)]
pub struct PlaceRecord {
    pub place_id: String,
    pub trip_id: String,
    pub trip_name: String,
    pub region_name: String,
    pub place_name: String,
    pub place_notes_html: Option<String>,
    pub location: GeoPoint,
}

impl PlaceCatalog {
    pub fn flatten(&self) -> Vec<PlaceRecord> {
        let mut records = Vec::new();
        for trip in &self.trips {
            for region in &trip.regions {
                for place in &region.places {
                    records.push(PlaceRecord {
                        place_id: place.place_id.clone(),
                        trip_id: trip.trip_id.clone(),
                        trip_name: trip.name.clone(),
                        region_name: region.name.clone(),
                        place_name: place.name.clone(),
                        place_notes_html: place.notes_html.clone(),
                        location: GeoPoint::new(place.latitude, place.longitude),
                    });
                }
            }
        }
        records
    }
}

impl PlaceRecord {
    pub fn to_match(&self, distance_meters: f64) -> PlaceMatch {
        PlaceMatch {
            place_id: self.place_id.clone(),
            trip_id: Some(self.trip_id.clone()),
            trip_name: Some(self.trip_name.clone()),
            region_name: Some(self.region_name.clone()),
            place_name: self.place_name.clone(),
            place_notes_html: self.place_notes_html.clone(),
            latitude: self.location.latitude,
            longitude: self.location.longitude,
            distance_meters,
        }
    }
}
