use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{
        DistancesBody, DistancesResponse, PlanBody, PlanResponse, StatsBody, StatsResponse, TourListResponse,
        TourResponse,
    },
    geo::{LatLng, Unit},
    repo::visible_scope,
    repo_types::{Tour, TourDraft, TOUR_SCHEMA},
    services,
};
use crate::{
    auth::{Authorized, TourManagers, TourStaff},
    error::AppError,
    extract::{AppJson, AppPath, AppQuery, QueryPairs},
    query::{execute, ApiFeatures},
    reviews,
    state::AppState,
    store::Collection,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tours))
        .route("/top-5-cheap", get(top_five_cheap))
        .route("/tour-stats", get(tour_stats))
        .route("/tours-within/:distance/center/:latlng/unit/:unit", get(tours_within))
        .route("/distances/:latlng/unit/:unit", get(distances))
        .route("/:id", get(get_tour))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_tour))
        .route("/:id", axum::routing::patch(update_tour).delete(delete_tour))
        .route("/monthly-plan/:year", get(monthly_plan))
}

const TOP_CHEAP_ALIAS: [(&str, &str); 3] = [
    ("limit", "5"),
    ("sort", "-ratingsAverage,price"),
    ("fields", "name,price,ratingsAverage,summary,difficulty"),
];

async fn list(state: &AppState, params: &[(String, String)]) -> Result<Json<TourListResponse>, AppError> {
    let descriptor = ApiFeatures::build(visible_scope(), params, &TOUR_SCHEMA)?;
    let tours = execute(state.store.as_ref(), Collection::Tours, &descriptor).await?;
    Ok(Json(TourListResponse::new(tours.into_iter().map(services::present).collect())))
}

#[instrument(skip(state))]
pub async fn list_tours(
    State(state): State<AppState>,
    AppQuery(params): QueryPairs,
) -> Result<Json<TourListResponse>, AppError> {
    list(&state, &params).await
}

/// Five best-rated, cheapest tours. Client filters and paging still apply;
/// the alias owns limit, sort and fields.
#[instrument(skip(state))]
pub async fn top_five_cheap(
    State(state): State<AppState>,
    AppQuery(params): QueryPairs,
) -> Result<Json<TourListResponse>, AppError> {
    let mut params = params;
    params.retain(|(k, _)| !TOP_CHEAP_ALIAS.iter().any(|(alias, _)| alias == k));
    params.extend(TOP_CHEAP_ALIAS.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    list(&state, &params).await
}

#[instrument(skip(state))]
pub async fn get_tour(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<TourResponse>, AppError> {
    let doc = Tour::find_document(state.store.as_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("tour"))?;
    let mut tour = services::present(doc);
    tour["reviews"] = json!(reviews::services::for_tour(&state, id).await?);
    Ok(Json(TourResponse::new(tour)))
}

#[instrument(skip(state, _manager, payload))]
pub async fn create_tour(
    State(state): State<AppState>,
    _manager: Authorized<TourManagers>,
    AppJson(payload): AppJson<TourDraft>,
) -> Result<(StatusCode, Json<TourResponse>), AppError> {
    let tour = services::create_tour(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(TourResponse::new(tour))))
}

#[instrument(skip(state, _manager, payload))]
pub async fn update_tour(
    State(state): State<AppState>,
    _manager: Authorized<TourManagers>,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<TourDraft>,
) -> Result<Json<TourResponse>, AppError> {
    let tour = services::update_tour(&state, id, payload).await?;
    Ok(Json(TourResponse::new(tour)))
}

#[instrument(skip(state, _manager))]
pub async fn delete_tour(
    State(state): State<AppState>,
    _manager: Authorized<TourManagers>,
    AppPath(id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    services::delete_tour(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn tour_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let stats = services::tour_stats(&state).await?;
    Ok(Json(StatsResponse {
        status: "success",
        data: StatsBody { stats },
    }))
}

#[instrument(skip(state, _staff))]
pub async fn monthly_plan(
    State(state): State<AppState>,
    _staff: Authorized<TourStaff>,
    AppPath(year): AppPath<i32>,
) -> Result<Json<PlanResponse>, AppError> {
    let plan = services::monthly_plan(&state, year).await?;
    Ok(Json(PlanResponse {
        status: "success",
        results: plan.len(),
        data: PlanBody { plan },
    }))
}

#[instrument(skip(state))]
pub async fn tours_within(
    State(state): State<AppState>,
    AppPath((distance, latlng, unit)): AppPath<(f64, String, String)>,
) -> Result<Json<TourListResponse>, AppError> {
    let center: LatLng = latlng.parse()?;
    let unit: Unit = unit.parse()?;
    let tours = services::tours_within(&state, distance, center, unit).await?;
    Ok(Json(TourListResponse::new(tours)))
}

#[instrument(skip(state))]
pub async fn distances(
    State(state): State<AppState>,
    AppPath((latlng, unit)): AppPath<(String, String)>,
) -> Result<Json<DistancesResponse>, AppError> {
    let origin: LatLng = latlng.parse()?;
    let unit: Unit = unit.parse()?;
    let distances = services::distances(&state, origin, unit).await?;
    Ok(Json(DistancesResponse {
        status: "success",
        results: distances.len(),
        data: DistancesBody { distances },
    }))
}
