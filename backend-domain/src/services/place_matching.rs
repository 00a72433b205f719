// Accuracy gate and effective radius

use crate::entities::{DetectionSettings, PlaceMatch};

/// Whether a fix is precise enough to attribute to a place at all.
/// Rejected pings skip detection entirely, sweeping included.
pub fn passes_accuracy_gate(accuracy_meters: f64, settings: &DetectionSettings) -> bool {
    accuracy_meters.is_finite()
        && accuracy_meters >= 0.0
        && accuracy_meters <= settings.visited_accuracy_reject_meters
}

/// `accuracy * multiplier` clamped into `[min_radius, max_radius]`.
pub fn effective_radius_meters(accuracy_meters: f64, settings: &DetectionSettings) -> f64 {
    let scaled = accuracy_meters.max(0.0) * settings.visited_accuracy_multiplier;
    // min wins over max when misconfigured
    scaled
        .min(settings.visited_max_radius_meters)
        .max(settings.visited_min_radius_meters)
}

/// Places hit by a ping, nearest first, one entry per place id.
pub fn select_hits(places: &[PlaceMatch], effective_radius: f64) -> Vec<PlaceMatch> {
    let mut hits: Vec<PlaceMatch> = Vec::new();
    for place in places {
        if place.distance_meters > effective_radius {
            continue;
        }
        if hits.iter().any(|hit| hit.place_id == place.place_id) {
            continue;
        }
        hits.push(place.clone());
    }
    hits.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
    hits
}
