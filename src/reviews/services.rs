use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    repo::{tour_scope, NewReview},
    repo_types::{Review, ReviewRequest, REVIEW_SCHEMA},
};
use crate::{
    auth::Authenticated,
    error::AppError,
    query::{execute, ApiFeatures},
    state::AppState,
    store::{Collection, Document, Patch},
    tours::{Tour, DEFAULT_RATINGS_AVERAGE},
    users::{Role, User},
};

fn check(req: &ReviewRequest, creating: bool) -> Result<(), AppError> {
    let errors = req.violations(creating);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!("Invalid input data. {}", errors.join(". "))))
    }
}

/// Recomputes `ratingsQuantity` and `ratingsAverage` of a tour from its
/// reviews. A tour without reviews goes back to 0 and 4.5.
pub async fn recalculate_ratings(state: &AppState, tour: Uuid) -> Result<(), AppError> {
    let store = state.store.as_ref();
    let (quantity, average) = Review::rating_summary(store, tour).await?;
    let average = match (quantity, average) {
        (0, _) | (_, None) => DEFAULT_RATINGS_AVERAGE,
        (_, Some(avg)) => avg,
    };
    Tour::set_ratings(store, tour, quantity, average).await?;
    info!(tour_id = %tour, quantity, average, "tour ratings recalculated");
    Ok(())
}

/// Replaces each review's `user` id with `{id, name, photo}`. Authors that
/// no longer exist or are deactivated become `null`.
pub async fn populate_authors(state: &AppState, mut docs: Vec<Document>) -> Result<Vec<Document>, AppError> {
    let mut authors: HashMap<Uuid, Value> = HashMap::new();
    for doc in docs.iter_mut() {
        let Some(id) = doc.get("user").and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok()) else {
            continue;
        };
        if !authors.contains_key(&id) {
            let author = User::find_by_id(state.store.as_ref(), id)
                .await?
                .map(|u| json!({ "id": u.id, "name": u.name, "photo": u.photo }))
                .unwrap_or(Value::Null);
            authors.insert(id, author);
        }
        doc["user"] = authors.get(&id).cloned().unwrap_or(Value::Null);
    }
    Ok(docs)
}

pub async fn for_tour(state: &AppState, tour: Uuid) -> Result<Vec<Document>, AppError> {
    let docs = Review::for_tour(state.store.as_ref(), tour).await?;
    populate_authors(state, docs).await
}

/// Lists reviews through the query transformer, optionally limited to one
/// tour.
pub async fn list(state: &AppState, tour: Option<Uuid>, params: &[(String, String)]) -> Result<Vec<Document>, AppError> {
    let base = tour.map(tour_scope).unwrap_or(Value::Null);
    let descriptor = ApiFeatures::build(base, params, &REVIEW_SCHEMA)?;
    let docs = execute(state.store.as_ref(), Collection::Reviews, &descriptor).await?;
    populate_authors(state, docs).await
}

pub async fn get(state: &AppState, id: Uuid) -> Result<Document, AppError> {
    let doc = state
        .store
        .find_by_id(Collection::Reviews, id)
        .await?
        .ok_or_else(|| AppError::not_found("review"))?;
    get_populated(state, doc).await
}

/// Creates a review by the caller. The tour comes from the nested route or,
/// failing that, the body.
pub async fn create_review(
    state: &AppState,
    author: &Authenticated,
    route_tour: Option<Uuid>,
    req: ReviewRequest,
) -> Result<Document, AppError> {
    check(&req, true)?;
    let tour = route_tour
        .or(req.tour)
        .ok_or_else(|| AppError::Validation("Review must belong to a tour.".into()))?;
    if !Tour::exists(state.store.as_ref(), tour).await? {
        return Err(AppError::not_found("tour"));
    }

    let review = req.review.as_deref().map(str::trim).unwrap_or_default();
    let doc = Review::create(
        state.store.as_ref(),
        NewReview {
            review,
            rating: req.rating,
            tour,
            user: author.id(),
        },
    )
    .await?;
    info!(review_id = %doc["id"], tour_id = %tour, user_id = %author.id(), "review created");

    recalculate_ratings(state, tour).await?;
    get_populated(state, doc).await
}

async fn get_populated(state: &AppState, doc: Document) -> Result<Document, AppError> {
    let mut docs = populate_authors(state, vec![doc]).await?;
    docs.pop().ok_or_else(|| AppError::not_found("review"))
}

/// Users may only touch their own reviews; admins may touch any.
async fn owned_review(state: &AppState, editor: &Authenticated, id: Uuid) -> Result<Review, AppError> {
    let review = Review::find_by_id(state.store.as_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("review"))?;
    if editor.role() != Role::Admin && review.user != editor.id() {
        warn!(review_id = %id, user_id = %editor.id(), "review belongs to someone else");
        return Err(AppError::Forbidden);
    }
    Ok(review)
}

pub async fn update_review(
    state: &AppState,
    editor: &Authenticated,
    id: Uuid,
    req: ReviewRequest,
) -> Result<Document, AppError> {
    check(&req, false)?;
    let review = owned_review(state, editor, id).await?;

    let mut patch = Patch::new();
    if let Some(text) = req.review.as_deref() {
        patch = patch.set("review", text.trim());
    }
    if let Some(rating) = req.rating {
        patch = patch.set("rating", rating);
    }
    let doc = if patch.is_empty() {
        state.store.find_by_id(Collection::Reviews, id).await?
    } else {
        Review::update(state.store.as_ref(), id, &patch).await?
    }
    .ok_or_else(|| AppError::not_found("review"))?;

    recalculate_ratings(state, review.tour).await?;
    get_populated(state, doc).await
}

pub async fn delete_review(state: &AppState, editor: &Authenticated, id: Uuid) -> Result<(), AppError> {
    let review = owned_review(state, editor, id).await?;
    Review::delete(state.store.as_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("review"))?;
    info!(review_id = %id, user_id = %editor.id(), "review deleted");
    recalculate_ratings(state, review.tour).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{guard, jwt::JwtKeys};
    use crate::tours::TourDraft;
    use crate::users::NewUser;

    async fn person(state: &AppState, role: Role, email: &str) -> Authenticated {
        let user = User::create(
            state.store.as_ref(),
            NewUser {
                name: "Reviewer",
                email,
                password_hash: "hash",
                role,
                photo: Some("user.jpg"),
            },
        )
        .await
        .unwrap();
        let keys = JwtKeys::new(&state.config.jwt);
        let token = keys.sign(user.id).unwrap();
        guard::verify(&keys, state.store.as_ref(), Some(&format!("Bearer {token}")))
            .await
            .unwrap()
    }

    async fn tour(state: &AppState) -> Uuid {
        let draft = TourDraft {
            name: Some("The Forest Hiker".into()),
            duration: Some(5.0),
            max_group_size: Some(25),
            difficulty: Some("easy".into()),
            price: Some(397.0),
            summary: Some("Breathtaking hike".into()),
            description: Some("Long description".into()),
            image_cover: Some("cover.jpg".into()),
            ..TourDraft::default()
        };
        let doc = crate::tours::services::create_tour(state, draft).await.unwrap();
        Uuid::parse_str(doc["id"].as_str().unwrap()).unwrap()
    }

    fn rated(text: &str, rating: f64) -> ReviewRequest {
        ReviewRequest {
            review: Some(text.into()),
            rating: Some(rating),
            tour: None,
        }
    }

    async fn tour_ratings(state: &AppState, id: Uuid) -> (Value, Value) {
        let doc = state.store.find_by_id(Collection::Tours, id).await.unwrap().unwrap();
        (doc["ratingsQuantity"].clone(), doc["ratingsAverage"].clone())
    }

    #[tokio::test]
    async fn ratings_follow_create_update_and_delete() {
        let state = AppState::fake();
        let tour_id = tour(&state).await;
        let alice = person(&state, Role::User, "alice@example.com").await;
        let bob = person(&state, Role::User, "bob@example.com").await;

        let a = create_review(&state, &alice, Some(tour_id), rated("Lovely", 4.0)).await.unwrap();
        create_review(&state, &bob, Some(tour_id), rated("Perfect", 5.0)).await.unwrap();
        assert_eq!(tour_ratings(&state, tour_id).await, (json!(2), json!(4.5)));

        let a_id = Uuid::parse_str(a["id"].as_str().unwrap()).unwrap();
        update_review(&state, &alice, a_id, rated("Fine", 2.0)).await.unwrap();
        assert_eq!(tour_ratings(&state, tour_id).await, (json!(2), json!(3.5)));

        delete_review(&state, &alice, a_id).await.unwrap();
        assert_eq!(tour_ratings(&state, tour_id).await, (json!(1), json!(5.0)));
    }

    #[tokio::test]
    async fn last_review_deleted_resets_to_defaults() {
        let state = AppState::fake();
        let tour_id = tour(&state).await;
        let alice = person(&state, Role::User, "alice@example.com").await;
        let review = create_review(&state, &alice, Some(tour_id), rated("Nice", 3.0)).await.unwrap();
        let id = Uuid::parse_str(review["id"].as_str().unwrap()).unwrap();

        delete_review(&state, &alice, id).await.unwrap();
        assert_eq!(tour_ratings(&state, tour_id).await, (json!(0), json!(4.5)));
    }

    #[tokio::test]
    async fn reviews_are_bound_to_the_caller_and_populated() {
        let state = AppState::fake();
        let tour_id = tour(&state).await;
        let alice = person(&state, Role::User, "alice@example.com").await;

        let review = create_review(&state, &alice, Some(tour_id), rated("Great", 5.0)).await.unwrap();
        assert_eq!(review["user"]["id"], json!(alice.id()));
        assert_eq!(review["user"]["photo"], "user.jpg");
        assert!(review["user"].get("email").is_none());

        let dup = create_review(&state, &alice, Some(tour_id), rated("Again", 4.0)).await.unwrap_err();
        assert!(matches!(dup, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_tour_is_rejected() {
        let state = AppState::fake();
        let alice = person(&state, Role::User, "alice@example.com").await;
        let none = create_review(&state, &alice, None, rated("Great", 5.0)).await.unwrap_err();
        assert!(matches!(none, AppError::Validation(_)));
        let unknown = create_review(&state, &alice, Some(Uuid::new_v4()), rated("Great", 5.0)).await.unwrap_err();
        assert!(matches!(unknown, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn only_owner_or_admin_may_edit() {
        let state = AppState::fake();
        let tour_id = tour(&state).await;
        let alice = person(&state, Role::User, "alice@example.com").await;
        let mallory = person(&state, Role::User, "mallory@example.com").await;
        let admin = person(&state, Role::Admin, "admin@example.com").await;

        let review = create_review(&state, &alice, Some(tour_id), rated("Great", 5.0)).await.unwrap();
        let id = Uuid::parse_str(review["id"].as_str().unwrap()).unwrap();

        let err = update_review(&state, &mallory, id, rated("Bad", 1.0)).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
        assert!(matches!(delete_review(&state, &mallory, id).await, Err(AppError::Forbidden)));

        delete_review(&state, &admin, id).await.unwrap();
    }

    #[tokio::test]
    async fn listing_can_be_scoped_to_a_tour() {
        let state = AppState::fake();
        let tour_id = tour(&state).await;
        let alice = person(&state, Role::User, "alice@example.com").await;
        create_review(&state, &alice, Some(tour_id), rated("Great", 5.0)).await.unwrap();

        let params = vec![("rating[gte]".to_string(), "4".to_string())];
        assert_eq!(list(&state, Some(tour_id), &params).await.unwrap().len(), 1);
        assert!(list(&state, Some(Uuid::new_v4()), &params).await.unwrap().is_empty());
        assert_eq!(list(&state, None, &[]).await.unwrap().len(), 1);
    }
}
