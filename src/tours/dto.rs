use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct TourBody {
    pub tour: Value,
}

#[derive(Debug, Serialize)]
pub struct TourResponse {
    pub status: &'static str,
    pub data: TourBody,
}

impl TourResponse {
    pub fn new(tour: Value) -> Self {
        Self {
            status: "success",
            data: TourBody { tour },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TourList {
    pub tours: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct TourListResponse {
    pub status: &'static str,
    pub results: usize,
    pub data: TourList,
}

impl TourListResponse {
    pub fn new(tours: Vec<Value>) -> Self {
        Self {
            status: "success",
            results: tours.len(),
            data: TourList { tours },
        }
    }
}

/// One row of `/tours/tour-stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyStats {
    pub difficulty: String,
    pub num_tours: u64,
    pub num_ratings: u64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

#[derive(Debug, Serialize)]
pub struct StatsBody {
    pub stats: Vec<DifficultyStats>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub status: &'static str,
    pub data: StatsBody,
}

/// One month of `/tours/monthly-plan/:year`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthPlan {
    pub month: u8,
    pub num_tour_starts: u64,
    pub tours: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PlanBody {
    pub plan: Vec<MonthPlan>,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub status: &'static str,
    pub results: usize,
    pub data: PlanBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TourDistance {
    pub id: uuid::Uuid,
    pub name: String,
    pub distance: f64,
}

#[derive(Debug, Serialize)]
pub struct DistancesBody {
    pub distances: Vec<TourDistance>,
}

#[derive(Debug, Serialize)]
pub struct DistancesResponse {
    pub status: &'static str,
    pub results: usize,
    pub data: DistancesBody,
}
