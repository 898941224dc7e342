use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use super::{
    dto::{DifficultyStats, MonthPlan, TourDistance},
    geo::{self, LatLng, Unit},
    repo::visible_scope,
    repo_types::{Tour, TourDraft, DEFAULT_RATINGS_AVERAGE, TOUR_SCHEMA},
};
use crate::{
    error::AppError,
    query::{Projection, QueryDescriptor},
    state::AppState,
    store::{apply_projection, decode, Collection, Document, Patch},
};

/// Lowercase, ASCII-alphanumeric words joined by `-`.
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

fn check(draft: &TourDraft) -> Result<(), AppError> {
    let errors = draft.violations();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!("Invalid input data. {}", errors.join(". "))))
    }
}

fn to_object(draft: &TourDraft) -> Result<Map<String, Value>, AppError> {
    match serde_json::to_value(draft).map_err(anyhow::Error::from)? {
        Value::Object(obj) => Ok(obj),
        _ => Err(AppError::Internal(anyhow::anyhow!("tour draft did not serialize to an object"))),
    }
}

/// Shapes a stored tour for clients: hidden fields removed, `durationWeeks`
/// added when `duration` is present.
pub fn present(doc: Document) -> Document {
    let mut doc = apply_projection(doc, &Projection::Exclude(TOUR_SCHEMA.hidden_fields()));
    if let Some(weeks) = doc.get("duration").and_then(Value::as_f64).map(|d| d / 7.0) {
        doc["durationWeeks"] = json!(weeks);
    }
    doc
}

pub async fn create_tour(state: &AppState, mut draft: TourDraft) -> Result<Document, AppError> {
    draft.normalize();
    check(&draft)?;

    let mut doc = to_object(&draft)?;
    if let Some(name) = draft.name.as_deref() {
        doc.insert("slug".into(), json!(slugify(name)));
    }
    doc.entry("ratingsAverage").or_insert(json!(DEFAULT_RATINGS_AVERAGE));
    doc.entry("ratingsQuantity").or_insert(json!(0));
    doc.entry("secretTour").or_insert(json!(false));
    doc.entry("images").or_insert(json!([]));
    doc.entry("startDates").or_insert(json!([]));
    doc.entry("locations").or_insert(json!([]));

    let created = Tour::insert(state.store.as_ref(), Value::Object(doc)).await?;
    info!(tour_id = %created["id"], "tour created");
    Ok(present(created))
}

/// Partial update. The merged result is validated before anything is
/// written.
pub async fn update_tour(state: &AppState, id: Uuid, mut changes: TourDraft) -> Result<Document, AppError> {
    let store = state.store.as_ref();
    let current = Tour::find_document(store, id)
        .await?
        .ok_or_else(|| AppError::not_found("tour"))?;

    changes.normalize();
    let existing: TourDraft = decode(current.clone())?;
    check(&existing.overlaid(changes.clone()))?;

    let mut patch = Patch::from_object(to_object(&changes)?);
    if let Some(name) = changes.name.as_deref() {
        patch = patch.set("slug", slugify(name));
    }
    if patch.is_empty() {
        return Ok(present(current));
    }
    let updated = Tour::update(store, id, &patch)
        .await?
        .ok_or_else(|| AppError::not_found("tour"))?;
    info!(tour_id = %id, "tour updated");
    Ok(present(updated))
}

/// Removes the tour and its reviews.
pub async fn delete_tour(state: &AppState, id: Uuid) -> Result<(), AppError> {
    let store = state.store.as_ref();
    if !Tour::delete(store, id).await? {
        return Err(AppError::not_found("tour"));
    }
    let reviews = store
        .delete_many(Collection::Reviews, &json!({ "tour": id.to_string() }))
        .await?;
    info!(tour_id = %id, reviews, "tour deleted");
    Ok(())
}

/// Tours rated 4.5 or better grouped by difficulty, cheapest group first.
pub async fn tour_stats(state: &AppState) -> Result<Vec<DifficultyStats>, AppError> {
    let tours = Tour::all_matching(state.store.as_ref(), json!({ "ratingsAverage": { "$gte": 4.5 } })).await?;

    let mut groups: BTreeMap<String, Vec<&Tour>> = BTreeMap::new();
    for tour in &tours {
        groups.entry(tour.difficulty.clone()).or_default().push(tour);
    }

    let mut stats: Vec<DifficultyStats> = groups
        .into_iter()
        .map(|(difficulty, tours)| {
            let n = tours.len() as f64;
            let prices = tours.iter().map(|t| t.price);
            DifficultyStats {
                difficulty,
                num_tours: tours.len() as u64,
                num_ratings: tours.iter().map(|t| t.ratings_quantity).sum(),
                avg_rating: tours.iter().map(|t| t.ratings_average).sum::<f64>() / n,
                avg_price: prices.clone().sum::<f64>() / n,
                min_price: prices.clone().fold(f64::INFINITY, f64::min),
                max_price: prices.fold(f64::NEG_INFINITY, f64::max),
            }
        })
        .collect();
    stats.sort_by(|a, b| a.avg_price.total_cmp(&b.avg_price));
    Ok(stats)
}

/// Tour starts per month of `year`, busiest month first, at most 12 rows.
pub async fn monthly_plan(state: &AppState, year: i32) -> Result<Vec<MonthPlan>, AppError> {
    let tours = Tour::all_matching(state.store.as_ref(), json!({})).await?;

    let mut months: BTreeMap<u8, Vec<String>> = BTreeMap::new();
    for tour in &tours {
        for start in tour.start_dates().filter(|d| d.year() == year) {
            months.entry(u8::from(start.month())).or_default().push(tour.name.clone());
        }
    }

    let mut plan: Vec<MonthPlan> = months
        .into_iter()
        .map(|(month, tours)| MonthPlan {
            month,
            num_tour_starts: tours.len() as u64,
            tours,
        })
        .collect();
    plan.sort_by(|a, b| b.num_tour_starts.cmp(&a.num_tour_starts).then(a.month.cmp(&b.month)));
    plan.truncate(12);
    Ok(plan)
}

async fn visible_documents(state: &AppState) -> Result<Vec<Document>, AppError> {
    Ok(state
        .store
        .find(Collection::Tours, &QueryDescriptor::for_filter(visible_scope()))
        .await?)
}

/// Tours whose start location lies within `distance` of `center`.
pub async fn tours_within(state: &AppState, distance: f64, center: LatLng, unit: Unit) -> Result<Vec<Document>, AppError> {
    if !distance.is_finite() || distance < 0.0 {
        return Err(AppError::Validation("Distance must be a non-negative number".into()));
    }
    let mut found = Vec::new();
    for doc in visible_documents(state).await? {
        let tour: Tour = decode(doc.clone())?;
        if tour.start_point().is_some_and(|p| geo::within(center, p, distance, unit)) {
            found.push(present(doc));
        }
    }
    Ok(found)
}

/// Distance from `origin` to every tour with a start location, nearest
/// first.
pub async fn distances(state: &AppState, origin: LatLng, unit: Unit) -> Result<Vec<TourDistance>, AppError> {
    let mut rows = Vec::new();
    for doc in visible_documents(state).await? {
        let tour: Tour = decode(doc)?;
        let Some(point) = tour.start_point() else { continue };
        rows.push(TourDistance {
            id: tour.id,
            name: tour.name,
            distance: geo::distance(origin, point, unit),
        });
    }
    rows.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    Ok(rows)
}
