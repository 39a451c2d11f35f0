//! Candidate rescuer matching.
//!
//! Given an incident location and a search radius, produce the ordered list
//! of rescuers worth pinging: available, inside the radius, nearest first
//! (ties broken by rating descending, then account id), and not already
//! contacted for this incident at an equal or larger radius. A rescuer
//! pinged at 5 km becomes a candidate again only once the search grows past
//! 5 km.

use tracing::debug;

use crate::model::RescuerProfile;
use crate::storage::Storage;

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two (lat, lng) points in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Find candidate rescuer ids for an incident at the given radius.
///
/// Returns an empty list when nobody qualifies; the caller opens the session
/// with zero pings and lets the sweeper fail it.
pub async fn find_candidates(
    storage: &Storage,
    incident_id: i64,
    latitude: f64,
    longitude: f64,
    radius_km: f64,
) -> Result<Vec<String>, sqlx::Error> {
    let excluded = storage
        .contacted_rescuers_at_radius(incident_id, radius_km)
        .await?;

    let rescuers = storage.available_rescuers().await?;

    let candidates = rank_candidates(&rescuers, latitude, longitude, radius_km, &excluded);

    debug!(
        incident_id,
        radius_km,
        excluded = excluded.len(),
        candidates = candidates.len(),
        "matched rescuer candidates"
    );

    Ok(candidates)
}

/// Pure ranking core: filter by radius and exclusion, order nearest-first
/// with rating then id tie-breaks.
fn rank_candidates(
    rescuers: &[RescuerProfile],
    latitude: f64,
    longitude: f64,
    radius_km: f64,
    excluded: &[String],
) -> Vec<String> {
    let mut in_range: Vec<(f64, &RescuerProfile)> = rescuers
        .iter()
        .filter(|r| !excluded.contains(&r.account_id))
        .map(|r| {
            (
                haversine_km(latitude, longitude, r.latitude, r.longitude),
                r,
            )
        })
        .filter(|(distance, _)| *distance <= radius_km)
        .collect();

    in_range.sort_by(|(da, ra), (db, rb)| {
        da.partial_cmp(db)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                rb.rating
                    .partial_cmp(&ra.rating)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| ra.account_id.cmp(&rb.account_id))
    });

    in_range
        .into_iter()
        .map(|(_, r)| r.account_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionTrigger;
    use chrono::Utc;

    fn rescuer(id: &str, latitude: f64, longitude: f64, rating: f64) -> RescuerProfile {
        RescuerProfile {
            account_id: id.to_string(),
            name: id.to_string(),
            latitude,
            longitude,
            rating,
            available: true,
        }
    }

    #[test]
    fn haversine_known_distance() {
        // Ho Chi Minh City center to Thu Duc, roughly 11 km
        let d = haversine_km(10.762622, 106.660172, 10.8231, 106.7297);
        assert!((9.0..13.0).contains(&d), "got {d}");

        // Zero distance
        assert!(haversine_km(10.0, 106.0, 10.0, 106.0) < 1e-9);
    }

    #[test]
    fn ranking_is_nearest_first_with_rating_tie_break() {
        let origin = (10.762622, 106.660172);
        // ~0.01 degrees latitude is roughly 1.1 km
        let rescuers = vec![
            rescuer("far", origin.0 + 0.03, origin.1, 5.0),
            rescuer("near", origin.0 + 0.01, origin.1, 1.0),
            // Same position as "tied-low", higher rating should come first
            rescuer("tied-high", origin.0 + 0.02, origin.1, 4.0),
            rescuer("tied-low", origin.0 + 0.02, origin.1, 2.0),
        ];

        let ranked = rank_candidates(&rescuers, origin.0, origin.1, 5.0, &[]);
        assert_eq!(ranked, vec!["near", "tied-high", "tied-low", "far"]);
    }

    #[test]
    fn equal_rating_ties_break_by_id() {
        let rescuers = vec![
            rescuer("b", 10.01, 106.0, 3.0),
            rescuer("a", 10.01, 106.0, 3.0),
        ];

        let ranked = rank_candidates(&rescuers, 10.0, 106.0, 5.0, &[]);
        assert_eq!(ranked, vec!["a", "b"]);
    }

    #[test]
    fn out_of_radius_and_excluded_are_dropped() {
        let rescuers = vec![
            rescuer("inside", 10.01, 106.0, 3.0),
            rescuer("outside", 11.0, 106.0, 5.0),
            rescuer("burned", 10.01, 106.0, 5.0),
        ];

        let ranked = rank_candidates(&rescuers, 10.0, 106.0, 5.0, &["burned".to_string()]);
        assert_eq!(ranked, vec!["inside"]);
    }

    async fn test_storage(name: &str) -> Storage {
        let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
        Storage::new(&url).await.unwrap()
    }

    #[tokio::test]
    async fn find_candidates_skips_prior_pings_until_radius_grows() {
        let storage = test_storage("matcher_exclusion").await;
        let now = Utc::now();

        let (lat, lng) = (10.762622, 106.660172);
        storage
            .upsert_rescuer(&rescuer("r1", lat + 0.01, lng, 3.0))
            .await
            .unwrap();

        let incident_id = storage
            .insert_incident("acct-1", lat, lng, None, &[], now)
            .await
            .unwrap();

        // First session at 5 km pings r1
        storage
            .create_session_with_requests(
                incident_id,
                1,
                5.0,
                1,
                SessionTrigger::Initial,
                None,
                &["r1".to_string()],
                now,
                now + chrono::Duration::seconds(120),
            )
            .await
            .unwrap();

        // Second attempt at the same radius must not re-ping
        let same_radius = find_candidates(&storage, incident_id, lat, lng, 5.0)
            .await
            .unwrap();
        assert!(same_radius.is_empty());

        // Strictly larger radius may
        let grown = find_candidates(&storage, incident_id, lat, lng, 10.0)
            .await
            .unwrap();
        assert_eq!(grown, vec!["r1".to_string()]);
    }

    #[tokio::test]
    async fn unavailable_rescuers_are_never_candidates() {
        let storage = test_storage("matcher_unavailable").await;
        let now = Utc::now();

        let (lat, lng) = (10.762622, 106.660172);
        let mut off_duty = rescuer("off-duty", lat + 0.01, lng, 5.0);
        off_duty.available = false;
        storage.upsert_rescuer(&off_duty).await.unwrap();

        let incident_id = storage
            .insert_incident("acct-1", lat, lng, None, &[], now)
            .await
            .unwrap();

        let candidates = find_candidates(&storage, incident_id, lat, lng, 5.0)
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }
}
