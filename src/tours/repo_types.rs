use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

use super::geo::LatLng;
use crate::query::{FieldKind, FieldSpec, ResourceSchema};

pub const DIFFICULTIES: [&str; 3] = ["easy", "medium", "difficult"];
pub const DEFAULT_RATINGS_AVERAGE: f64 = 4.5;

/// GeoJSON point with `[lng, lat]` coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "type", default = "point")]
    pub kind: String,
    pub coordinates: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
}

fn point() -> String {
    "Point".into()
}

impl Location {
    pub fn lng(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }

    fn is_valid(&self) -> bool {
        self.kind == "Point" && (-180.0..=180.0).contains(&self.lng()) && (-90.0..=90.0).contains(&self.lat())
    }
}

/// Stored tour, as read back for aggregations.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default = "default_ratings_average")]
    pub ratings_average: f64,
    #[serde(default)]
    pub ratings_quantity: u64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub start_dates: Vec<String>,
    #[serde(default)]
    pub start_location: Option<Location>,
}

fn default_ratings_average() -> f64 {
    DEFAULT_RATINGS_AVERAGE
}

impl Tour {
    pub fn start_dates(&self) -> impl Iterator<Item = OffsetDateTime> + '_ {
        self.start_dates.iter().filter_map(|d| parse_start_date(d))
    }

    pub fn start_point(&self) -> Option<LatLng> {
        self.start_location.as_ref().map(|location| LatLng {
            lat: location.lat(),
            lng: location.lng(),
        })
    }
}

/// Writable tour fields. Every field is optional so the same shape serves
/// create (then checked for required fields) and partial update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_group_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratings_average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratings_quantity: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_discount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_cover: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_dates: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_tour: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Location>>,
}

macro_rules! overlay {
    ($base:expr, $over:expr, $($field:ident),+ $(,)?) => {
        TourDraft { $($field: $over.$field.or($base.$field)),+ }
    };
}

impl TourDraft {
    /// `self` with every field present in `over` replaced.
    pub fn overlaid(self, over: TourDraft) -> TourDraft {
        overlay!(
            self,
            over,
            name,
            duration,
            max_group_size,
            difficulty,
            ratings_average,
            ratings_quantity,
            price,
            price_discount,
            summary,
            description,
            image_cover,
            images,
            start_dates,
            secret_tour,
            start_location,
            locations,
        )
    }

    /// Trims text fields and rewrites start dates as RFC 3339.
    pub fn normalize(&mut self) {
        for text in [&mut self.name, &mut self.summary, &mut self.description] {
            if let Some(s) = text.as_mut() {
                *s = s.trim().to_string();
            }
        }
        if let Some(dates) = self.start_dates.as_mut() {
            for date in dates.iter_mut() {
                if let Some(at) = parse_start_date(date).and_then(|at| crate::store::timestamp(at).ok()) {
                    if let Some(s) = at.as_str() {
                        *date = s.to_string();
                    }
                }
            }
        }
    }

    /// Every rule violation, in field order.
    pub fn violations(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut require = |present: bool, msg: &str| {
            if !present {
                errors.push(msg.to_string());
            }
        };
        require(self.name.as_deref().is_some_and(|s| !s.is_empty()), "A tour must have a name");
        require(self.duration.is_some(), "A tour must have a duration");
        require(self.max_group_size.is_some(), "A tour must have a group size");
        require(self.difficulty.is_some(), "A tour must have a difficulty");
        require(self.price.is_some(), "A tour must have a price");
        require(self.summary.as_deref().is_some_and(|s| !s.is_empty()), "A tour must have a summary");
        require(
            self.description.as_deref().is_some_and(|s| !s.is_empty()),
            "A tour must have a description",
        );
        require(
            self.image_cover.as_deref().is_some_and(|s| !s.is_empty()),
            "A tour must have a cover image",
        );

        if let Some(name) = self.name.as_deref().filter(|s| !s.is_empty()) {
            let len = name.chars().count();
            if len > 50 {
                errors.push("A tour name must have less or equal to 50 characters".into());
            }
            if len < 10 {
                errors.push("A tour name must have at least 10 characters".into());
            }
        }
        if let Some(d) = self.duration.filter(|d| *d <= 0.0) {
            errors.push(format!("Duration must be positive, got {d}"));
        }
        if self.max_group_size == Some(0) {
            errors.push("Group size must be at least 1".into());
        }
        if let Some(difficulty) = self.difficulty.as_deref() {
            if !DIFFICULTIES.contains(&difficulty) {
                errors.push("Difficulty is either: easy, medium, difficult".into());
            }
        }
        if let Some(avg) = self.ratings_average {
            if avg < 1.0 {
                errors.push("Rating must be above 1.0".into());
            }
            if avg > 5.0 {
                errors.push("Rating must be below or equal to 5.0".into());
            }
        }
        if let Some(price) = self.price.filter(|p| *p < 0.0) {
            errors.push(format!("Price must not be negative, got {price}"));
        }
        if let Some(discount) = self.price_discount {
            if self.price.is_some_and(|price| discount >= price) {
                errors.push(format!("Discount price ({discount}) should be below regular price"));
            }
        }
        for date in self.start_dates.iter().flatten() {
            if parse_start_date(date).is_none() {
                errors.push(format!("Invalid start date: {date}"));
            }
        }
        let mut locations = self.start_location.iter().chain(self.locations.iter().flatten());
        if locations.any(|l| !l.is_valid()) {
            errors.push("Locations must be GeoJSON points with [lng, lat] coordinates".into());
        }
        errors
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD` and `YYYY-MM-DD,HH:MM` (UTC).
pub fn parse_start_date(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(at);
    }
    if let Ok(at) = PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day],[hour]:[minute]")) {
        return Some(at.assume_utc());
    }
    time::Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc())
}

pub static TOUR_SCHEMA: ResourceSchema = ResourceSchema {
    fields: &[
        FieldSpec::new("id", FieldKind::Id),
        FieldSpec::new("name", FieldKind::Text),
        FieldSpec::new("slug", FieldKind::Text),
        FieldSpec::new("duration", FieldKind::Number),
        FieldSpec::new("maxGroupSize", FieldKind::Number),
        FieldSpec::new("difficulty", FieldKind::Text),
        FieldSpec::new("ratingsAverage", FieldKind::Number),
        FieldSpec::new("ratingsQuantity", FieldKind::Number),
        FieldSpec::new("price", FieldKind::Number),
        FieldSpec::new("priceDiscount", FieldKind::Number),
        FieldSpec::new("summary", FieldKind::Text),
        FieldSpec::new("description", FieldKind::Text),
        FieldSpec::new("imageCover", FieldKind::Text),
        FieldSpec::new("images", FieldKind::List),
        FieldSpec::new("startDates", FieldKind::List),
        FieldSpec::new("startLocation", FieldKind::Object),
        FieldSpec::new("locations", FieldKind::List),
        FieldSpec::new("createdAt", FieldKind::Date),
    ],
    hidden: &["secretTour"],
};
