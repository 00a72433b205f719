use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use backend_domain::{GeoPoint, PlaceCatalogRepository, PlaceIndex, PlaceMatch, PlaceRecord};

/// Bounding boxes are widened slightly so the haversine check has the final say.
const BOX_SLACK: f64 = 1.01;

/// In-memory index over the place catalog. Lookups scan a flattened
/// snapshot; reloads swap the snapshot atomically.
pub struct CatalogPlaceIndex {
    repo: Arc<dyn PlaceCatalogRepository>,
    places: RwLock<Arc<Vec<PlaceRecord>>>,
}

impl CatalogPlaceIndex {
    pub fn new(repo: Arc<dyn PlaceCatalogRepository>) -> Self {
        Self {
            repo,
            places: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn with_places(repo: Arc<dyn PlaceCatalogRepository>, places: Vec<PlaceRecord>) -> Self {
        Self {
            repo,
            places: RwLock::new(Arc::new(places)),
        }
    }
}

fn longitude_gap(a: f64, b: f64) -> f64 {
    ((a - b + 540.0) % 360.0 - 180.0).abs()
}

pub fn nearest_places(
    places: &[PlaceRecord],
    origin: GeoPoint,
    radius_meters: f64,
) -> Vec<PlaceMatch> {
    let (lat_delta, lon_delta) = origin.bounding_deltas(radius_meters * BOX_SLACK);
    let mut matches = places
        .iter()
        .filter(|place| (place.location.latitude - origin.latitude).abs() <= lat_delta)
        .filter(|place| longitude_gap(place.location.longitude, origin.longitude) <= lon_delta)
        .filter_map(|place| {
            let distance = origin.distance_meters(&place.location);
            (distance <= radius_meters).then(|| place.to_match(distance))
        })
        .collect::<Vec<_>>();
    matches.sort_by(|a, b| {
        a.distance_meters
            .total_cmp(&b.distance_meters)
            .then_with(|| a.place_id.cmp(&b.place_id))
    });
    matches
}

#[async_trait]
impl PlaceIndex for CatalogPlaceIndex {
    async fn find_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<Vec<PlaceMatch>> {
        let origin = GeoPoint::new(latitude, longitude);
        if !origin.is_valid() {
            return Err(anyhow!("invalid coordinates ({}, {})", latitude, longitude));
        }
        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Ok(Vec::new());
        }
        let snapshot = self.places.read().await.clone();
        Ok(nearest_places(&snapshot, origin, radius_meters))
    }

    async fn reload(&self) -> Result<usize> {
        let catalog = self.repo.load_place_catalog().await?;
        let mut records = catalog
            .flatten()
            .into_iter()
            .filter(|record| record.location.is_valid())
            .collect::<Vec<_>>();
        records.sort_by(|a, b| a.place_id.cmp(&b.place_id));
        records.dedup_by(|a, b| a.place_id == b.place_id);
        let count = records.len();
        *self.places.write().await = Arc::new(records);
        info!("indexed {} places", count);
        Ok(count)
    }

    async fn place_count(&self) -> usize {
        self.places.read().await.len()
    }
}
