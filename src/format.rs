//! Display helpers for distances and dates.

use crate::types::{GeoPoint, Timestamp};
use chrono::{DateTime, Utc};

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points (haversine).
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// "850 m" below one kilometre, "2.4 km" below ten, "12 km" above.
pub fn format_distance(km: f64) -> String {
    if !km.is_finite() || km < 0.0 {
        return "-".to_string();
    }
    if km < 1.0 {
        format!("{} m", (km * 1000.0).round() as i64)
    } else if km < 10.0 {
        format!("{:.1} km", km)
    } else {
        format!("{} km", km.round() as i64)
    }
}

fn to_datetime(ts: Timestamp) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ts.as_millis())
}

/// Calendar date, e.g. "15 Oct 2026".
pub fn format_date(ts: Timestamp) -> String {
    match to_datetime(ts) {
        Some(dt) => dt.format("%-d %b %Y").to_string(),
        None => "-".to_string(),
    }
}

/// Calendar date and time, e.g. "15 Oct 2026, 14:05".
pub fn format_date_time(ts: Timestamp) -> String {
    match to_datetime(ts) {
        Some(dt) => dt.format("%-d %b %Y, %H:%M").to_string(),
        None => "-".to_string(),
    }
}

/// Age of `ts` relative to `now`: "just now", "5 min ago", "3 h ago",
/// "2 days ago"; a week or more (or a future time) falls back to the date.
pub fn format_relative(ts: Timestamp, now: Timestamp) -> String {
    let elapsed_ms = match now.as_millis().checked_sub(ts.as_millis()) {
        Some(ms) if ms >= 0 => ms,
        _ => return format_date(ts),
    };
    let minutes = elapsed_ms / 60_000;
    let hours = minutes / 60;
    let days = hours / 24;
    match (minutes, hours, days) {
        (0, _, _) => "just now".to_string(),
        (m, 0, _) => format!("{} min ago", m),
        (_, h, 0) => format!("{} h ago", h),
        (_, _, 1) => "yesterday".to_string(),
        (_, _, d) if d < 7 => format!("{} days ago", d),
        _ => format_date(ts),
    }
}
