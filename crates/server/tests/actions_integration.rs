//! Film mutation and user management tests over HTTP.

mod common;

use axum::http::StatusCode;
use boxdio_core::{
    upstream::{FilmRelationship, UpstreamError},
    SharedConfig,
};
use common::{fixtures, TestFixture};
use serde_json::json;

const WATCHLIST: &str = "/u/user1/catalog/movie/boxdio-watchlist.json";

// =============================================================================
// Mutations
// =============================================================================

#[tokio::test]
async fn test_rate_by_external_id() {
    let fixture = TestFixture::new().await;
    fixture
        .upstream
        .add_film(fixtures::film("f1", "tt0113277", "Heat"))
        .await;

    let response = fixture
        .post(
            "/api/v1/users/user1/films/tt0113277/rating",
            json!({ "rating": 4.5 }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "rating", json!(4.5));
    assert_json_path!(response.body, "watched", json!(true));

    let calls = fixture.upstream.recorded_calls().await;
    let update = calls
        .iter()
        .find(|c| c.operation == "update_film_relationship")
        .unwrap();
    assert_eq!(update.resource, "f1");
    assert!(update.token.starts_with("access-"));
}

#[tokio::test]
async fn test_mutation_invalidates_catalogs() {
    let fixture = TestFixture::new().await;
    fixture.upstream.set_watchlist("m1", fixtures::films(3)).await;

    assert_eq!(fixture.metas(WATCHLIST).await.len(), 3);
    assert_eq!(fixture.metas(WATCHLIST).await.len(), 3);
    assert_eq!(fixture.upstream.call_count("watchlist_page").await, 1);

    let response = fixture
        .post(
            "/api/v1/users/user1/films/lb-tt0000002/watchlist",
            json!({ "in_watchlist": false }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "inWatchlist", json!(false));

    fixture.metas(WATCHLIST).await;
    assert_eq!(fixture.upstream.call_count("watchlist_page").await, 2);
}

#[tokio::test]
async fn test_film_state_reflects_mutation_without_refetch() {
    let fixture = TestFixture::new().await;
    fixture
        .upstream
        .set_relationship(
            "f1",
            FilmRelationship {
                watched: true,
                ..Default::default()
            },
        )
        .await;

    let response = fixture.get("/api/v1/users/user1/films/f1/state").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "liked", json!(false));

    let response = fixture
        .post("/api/v1/users/user1/films/f1/liked", json!({ "liked": true }))
        .await;
    assert_status!(response, StatusCode::OK);

    let response = fixture.get("/api/v1/users/user1/films/f1/state").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "liked", json!(true));
    assert_json_path!(response.body, "watched", json!(true));

    // First read fetched, the second was served from the post-mutation snapshot
    assert_eq!(fixture.upstream.call_count("film_relationship").await, 1);
}

#[tokio::test]
async fn test_clear_rating() {
    let fixture = TestFixture::new().await;
    fixture
        .upstream
        .set_relationship(
            "f1",
            FilmRelationship {
                watched: true,
                rating: Some(3.0),
                ..Default::default()
            },
        )
        .await;

    let response = fixture
        .post("/api/v1/users/user1/films/f1/rating", json!({ "rating": null }))
        .await;
    assert_status!(response, StatusCode::OK);
    assert!(response.body.get("rating").is_none());
}

#[tokio::test]
async fn test_invalid_rating_is_rejected_before_upstream() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/users/user1/films/f1/rating", json!({ "rating": 4.3 }))
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(
        fixture.upstream.call_count("update_film_relationship").await,
        0
    );
}

#[tokio::test]
async fn test_unknown_external_id_is_not_found() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/users/user1/films/tt9999999/watched",
            json!({ "watched": true }),
        )
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_user_without_credential_is_unauthorized() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .put(
            "/api/v1/users/user2",
            json!({ "username": "bob", "member_id": "m2" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);

    let response = fixture
        .post(
            "/api/v1/users/user2/films/f1/watched",
            json!({ "watched": true }),
        )
        .await;
    assert_status!(response, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_upstream_rate_limit_maps_to_429() {
    let fixture = TestFixture::new().await;
    fixture
        .upstream
        .set_next_error(UpstreamError::RateLimited)
        .await;

    let response = fixture
        .post(
            "/api/v1/users/user1/films/f1/watched",
            json!({ "watched": true }),
        )
        .await;
    assert_status!(response, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_raw("/api/v1/users/user1/films/f1/rating", "{not json")
        .await;
    assert!(response.status.is_client_error());
}

// =============================================================================
// Users and preferences
// =============================================================================

#[tokio::test]
async fn test_upsert_user_keeps_preferences() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .put(
            "/api/v1/users/user1/preferences",
            json!({ "show_ratings": false, "list_ids": ["l1"] }),
        )
        .await;
    assert_status!(response, StatusCode::OK);

    let response = fixture
        .put(
            "/api/v1/users/user1",
            json!({ "username": "ann", "member_id": "m1" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "username", json!("ann"));
    // The refresh credential is never echoed back
    assert!(response.body.get("refresh_token").is_none());

    let response = fixture.get("/api/v1/users/user1/preferences").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "show_ratings", json!(false));
    assert_json_path!(response.body, "list_ids", json!(["l1"]));
}

#[tokio::test]
async fn test_member_change_drops_old_member_collections() {
    let fixture = TestFixture::new().await;
    fixture.upstream.add_member("ann", "m1").await;
    fixture.upstream.set_watchlist("m1", fixtures::films(3)).await;

    let config = SharedConfig {
        username: Some("ann".to_string()),
        enabled_catalogs: vec!["watchlist".to_string()],
        ..Default::default()
    };
    let shared = format!(
        "/s/{}/catalog/movie/boxdio-watchlist.json",
        config.encode().expect("Failed to encode shared config")
    );
    fixture.metas(&shared).await;
    fixture.metas(&shared).await;
    assert_eq!(fixture.upstream.call_count("watchlist_page").await, 1);

    let response = fixture
        .put(
            "/api/v1/users/user1",
            json!({ "username": "ann", "member_id": "m5" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);

    fixture.metas(&shared).await;
    assert_eq!(fixture.upstream.call_count("watchlist_page").await, 2);
}

#[tokio::test]
async fn test_upsert_user_requires_identity() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .put("/api/v1/users/user3", json!({ "username": "", "member_id": "m3" }))
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_preferences_of_unknown_user() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/users/nobody/preferences").await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let response = fixture
        .put("/api/v1/users/nobody/preferences", json!({}))
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_preference_change_invalidates_catalogs() {
    let fixture = TestFixture::new().await;
    fixture.upstream.set_watchlist("m1", fixtures::films(3)).await;

    fixture.metas(WATCHLIST).await;
    let response = fixture
        .put("/api/v1/users/user1/preferences", json!({ "list_ids": ["l9"] }))
        .await;
    assert_status!(response, StatusCode::OK);

    fixture.metas(WATCHLIST).await;
    assert_eq!(fixture.upstream.call_count("watchlist_page").await, 2);
}

#[tokio::test]
async fn test_invalidate_cache_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.upstream.set_watchlist("m1", fixtures::films(3)).await;
    fixture.upstream.set_diary("m1", Vec::new()).await;

    fixture.metas(WATCHLIST).await;
    fixture
        .metas("/u/user1/catalog/movie/boxdio-diary.json")
        .await;

    let response = fixture.delete("/api/v1/users/user1/cache").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "removed", json!(2));

    let response = fixture.delete("/api/v1/users/user1/cache").await;
    assert_json_path!(response.body, "removed", json!(0));
}
