use serde_json::{json, Value};
use uuid::Uuid;

use crate::query::{QueryDescriptor, SortKey};
use crate::reviews::repo_types::Review;
use crate::store::{decode, Collection, Document, DocumentStore, Patch, StoreError};

pub fn tour_scope(tour: Uuid) -> Value {
    json!({ "tour": tour.to_string() })
}

pub struct NewReview<'a> {
    pub review: &'a str,
    pub rating: Option<f64>,
    pub tour: Uuid,
    pub user: Uuid,
}

impl Review {
    pub async fn find_by_id(store: &dyn DocumentStore, id: Uuid) -> Result<Option<Review>, StoreError> {
        store.find_by_id(Collection::Reviews, id).await?.map(decode).transpose()
    }

    pub async fn create(store: &dyn DocumentStore, new: NewReview<'_>) -> Result<Document, StoreError> {
        let mut doc = json!({
            "review": new.review,
            "tour": new.tour.to_string(),
            "user": new.user.to_string(),
        });
        if let Some(rating) = new.rating {
            doc["rating"] = json!(rating);
        }
        store.create(Collection::Reviews, doc).await
    }

    pub async fn update(store: &dyn DocumentStore, id: Uuid, patch: &Patch) -> Result<Option<Document>, StoreError> {
        store.find_by_id_and_update(Collection::Reviews, id, patch).await
    }

    pub async fn delete(store: &dyn DocumentStore, id: Uuid) -> Result<Option<Document>, StoreError> {
        store.find_by_id_and_delete(Collection::Reviews, id).await
    }

    /// Reviews of one tour, oldest first.
    pub async fn for_tour(store: &dyn DocumentStore, tour: Uuid) -> Result<Vec<Document>, StoreError> {
        let query = QueryDescriptor::for_filter(tour_scope(tour)).sorted_by(vec![SortKey::asc("createdAt")]);
        store.find(Collection::Reviews, &query).await
    }

    /// Number of reviews of `tour` and the mean of their ratings, if any
    /// review carries one.
    pub async fn rating_summary(store: &dyn DocumentStore, tour: Uuid) -> Result<(u64, Option<f64>), StoreError> {
        let reviews = Self::for_tour(store, tour).await?;
        let ratings: Vec<f64> = reviews.iter().filter_map(|r| r.get("rating").and_then(Value::as_f64)).collect();
        let average = (!ratings.is_empty()).then(|| ratings.iter().sum::<f64>() / ratings.len() as f64);
        Ok((reviews.len() as u64, average))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn one_review_per_tour_and_user() {
        let store = MemoryStore::new();
        let (tour, user) = (Uuid::new_v4(), Uuid::new_v4());
        let new = || NewReview {
            review: "Amazing",
            rating: Some(5.0),
            tour,
            user,
        };
        Review::create(&store, new()).await.unwrap();
        let err = Review::create(&store, new()).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn summary_averages_present_ratings() {
        let store = MemoryStore::new();
        let tour = Uuid::new_v4();
        for (rating, text) in [(Some(4.0), "good"), (Some(5.0), "great"), (None, "no score")] {
            Review::create(&store, NewReview { review: text, rating, tour, user: Uuid::new_v4() })
                .await
                .unwrap();
        }
        Review::create(&store, NewReview { review: "other", rating: Some(1.0), tour: Uuid::new_v4(), user: Uuid::new_v4() })
            .await
            .unwrap();

        let (count, average) = Review::rating_summary(&store, tour).await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(average, Some(4.5));

        assert_eq!(Review::rating_summary(&store, Uuid::new_v4()).await.unwrap(), (0, None));
    }
}
