use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct ReviewBody {
    pub review: Value,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub status: &'static str,
    pub data: ReviewBody,
}

impl ReviewResponse {
    pub fn new(review: Value) -> Self {
        Self {
            status: "success",
            data: ReviewBody { review },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewList {
    pub reviews: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct ReviewListResponse {
    pub status: &'static str,
    pub results: usize,
    pub data: ReviewList,
}

impl ReviewListResponse {
    pub fn new(reviews: Vec<Value>) -> Self {
        Self {
            status: "success",
            results: reviews.len(),
            data: ReviewList { reviews },
        }
    }
}
