//! Great-circle helpers for the tours-within and distances endpoints.

use std::str::FromStr;

use crate::error::AppError;

/// Mean earth radius, matching the spherical model used for `$centerSphere`
/// and `$geoNear` queries.
pub const EARTH_RADIUS_MI: f64 = 3963.2;
pub const EARTH_RADIUS_KM: f64 = 6378.1;
const EARTH_RADIUS_M: f64 = EARTH_RADIUS_KM * 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Mi,
    Km,
}

impl Unit {
    pub fn earth_radius(&self) -> f64 {
        match self {
            Unit::Mi => EARTH_RADIUS_MI,
            Unit::Km => EARTH_RADIUS_KM,
        }
    }

    /// Converts metres into this unit.
    pub fn multiplier(&self) -> f64 {
        match self {
            Unit::Mi => 0.000621371,
            Unit::Km => 0.001,
        }
    }
}

impl FromStr for Unit {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mi" => Ok(Unit::Mi),
            "km" => Ok(Unit::Km),
            other => Err(AppError::Validation(format!("Unit must be either mi or km, got {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl FromStr for LatLng {
    type Err = AppError;

    /// Parses `"lat,lng"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::Validation("Please provide latitude and longitude in the format lat,lng".into());
        let (lat, lng) = s.split_once(',').ok_or_else(invalid)?;
        let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(invalid());
        }
        Ok(LatLng { lat, lng })
    }
}

/// Central angle between two points in radians (haversine).
pub fn angular_distance(a: LatLng, b: LatLng) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * h.sqrt().min(1.0).asin()
}

/// True when `point` lies within `distance` (in `unit`) of `center`.
pub fn within(center: LatLng, point: LatLng, distance: f64, unit: Unit) -> bool {
    angular_distance(center, point) <= distance / unit.earth_radius()
}

/// Distance from `from` to `to` expressed in `unit`.
pub fn distance(from: LatLng, to: LatLng, unit: Unit) -> f64 {
    angular_distance(from, to) * EARTH_RADIUS_M * unit.multiplier()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOS_ANGELES: LatLng = LatLng { lat: 34.111745, lng: -118.113491 };
    const SAN_FRANCISCO: LatLng = LatLng { lat: 37.773972, lng: -122.431297 };

    #[test]
    fn parses_lat_lng_pairs() {
        assert_eq!("34.1,-118.1".parse::<LatLng>().unwrap(), LatLng { lat: 34.1, lng: -118.1 });
        assert!("34.1".parse::<LatLng>().is_err());
        assert!("abc,def".parse::<LatLng>().is_err());
        assert!("95,0".parse::<LatLng>().is_err());
    }

    #[test]
    fn units_are_mi_or_km() {
        assert_eq!("mi".parse::<Unit>().unwrap(), Unit::Mi);
        assert_eq!("km".parse::<Unit>().unwrap(), Unit::Km);
        assert!("ft".parse::<Unit>().is_err());
    }

    #[test]
    fn la_to_sf_is_about_350_miles() {
        let mi = distance(LOS_ANGELES, SAN_FRANCISCO, Unit::Mi);
        assert!((340.0..360.0).contains(&mi), "{mi}");
        let km = distance(LOS_ANGELES, SAN_FRANCISCO, Unit::Km);
        assert!((550.0..580.0).contains(&km), "{km}");
    }

    #[test]
    fn within_respects_the_radius() {
        assert!(within(LOS_ANGELES, SAN_FRANCISCO, 400.0, Unit::Mi));
        assert!(!within(LOS_ANGELES, SAN_FRANCISCO, 200.0, Unit::Mi));
        assert!(within(LOS_ANGELES, LOS_ANGELES, 0.0, Unit::Km));
    }
}
