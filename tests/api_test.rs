use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http_body_util::BodyExt;
use secret_friend::abuse::RateLimiter;
use secret_friend::api::{self, DEVICE_ID_HEADER};
use secret_friend::exchange::Exchange;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app() -> Router {
    api::router(Arc::new(Exchange::in_memory()), None)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    device: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(device) = device {
        builder = builder.header(DEVICE_ID_HEADER, device);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Create an event and return (event_id, roster entries as JSON)
async fn create(app: &Router) -> (String, Vec<Value>) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/events",
        None,
        Some(json!({
            "name": "Amigo Secreto",
            "organizer_name": "Org",
            "organizer_password": "natal",
            "participants": ["Ana", "Bruno", "Caio", "Duda"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let event_id = body["event"]["id"].as_str().unwrap().to_string();
    let roster = body["roster"].as_array().unwrap().clone();
    (event_id, roster)
}

fn id_of(roster: &[Value], name: &str) -> String {
    roster
        .iter()
        .find(|r| r["name"] == name)
        .and_then(|r| r["id"].as_str())
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_event_validation() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/events",
        None,
        Some(json!({
            "name": "Amigo Secreto",
            "organizer_name": "Org",
            "organizer_password": "natal",
            "participants": ["Ana", "Bruno"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INSUFFICIENT_PARTICIPANTS");
}

#[tokio::test]
async fn test_claim_flow_over_http() {
    let app = app();
    let (event_id, roster) = create(&app).await;
    let ana = id_of(&roster, "Ana");
    let base = format!("/api/events/{}", event_id);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("{}/select", base),
        Some("phone"),
        Some(json!({ "participant_id": ana })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["t"], "pending_confirmation");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("{}/confirm", base),
        Some("phone"),
        Some(json!({ "participant_id": ana, "is_me": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["t"], "confirmed");
    assert_eq!(body["reveal"]["visibility"], "hidden");
    assert_eq!(body["reveal"]["first_claim"], true);
    let recipient = body["reveal"]["recipient"]["name"].clone();
    assert_ne!(recipient, "Ana");

    let (status, body) = send(&app, Method::GET, &format!("{}/me", base), Some("phone"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recipient"]["name"], recipient);
    assert_eq!(body["visibility"], "hidden");

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("{}/me?show=true", base),
        Some("phone"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["visibility"], "shown");
    assert_eq!(body["recipient"]["name"], recipient);

    // The public page never leaks recipients
    let (status, body) = send(&app, Method::GET, &base, Some("phone"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.to_string().contains("recipient"));
    let me = body["roster"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["is_me"] == true)
        .unwrap();
    assert_eq!(me["name"], "Ana");
    assert_eq!(me["state"], "CLAIMED");

    // Another device is blocked
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("{}/select", base),
        Some("laptop"),
        Some(json!({ "participant_id": ana })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["t"], "claimed_elsewhere");

    // Bound device cannot take a second slot
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("{}/confirm", base),
        Some("phone"),
        Some(json!({ "participant_id": id_of(&roster, "Bruno"), "is_me": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_BOUND");

    // Wish: owner only
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("{}/wish", base),
        Some("laptop"),
        Some(json!({ "participant_id": ana, "wish": "chocolate" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NOT_OWNER");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("{}/wish", base),
        Some("phone"),
        Some(json!({ "participant_id": ana, "wish": " chocolate " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["wish"], "chocolate");

    let (_, body) = send(&app, Method::GET, &format!("{}/wishes", base), None, None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    // Release: the slot stays claimed
    let (status, body) = send(&app, Method::DELETE, &format!("{}/binding", base), Some("phone"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], ana.as_str());

    let (status, body) = send(&app, Method::GET, &format!("{}/me", base), Some("phone"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_claim_routes_require_device() {
    let app = app();
    let (event_id, roster) = create(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/events/{}/select", event_id),
        None,
        Some(json!({ "participant_id": id_of(&roster, "Ana") })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_DEVICE_ID");
}

#[tokio::test]
async fn test_unknown_event_is_404() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/api/events/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_organizer_overview_auth() {
    let app = app();
    let (event_id, _) = create(&app).await;
    let uri = format!("/api/events/{}/admin", event_id);

    let (status, _) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri(&uri)
        .header("x-organizer-password", "wrong")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(wrong).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let basic = format!("Basic {}", STANDARD.encode("Org:natal"));
    let request = Request::builder()
        .uri(&uri)
        .header(header::AUTHORIZATION, basic)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["stats"]["pending"], 4);
    assert_eq!(body["participants"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_claim_routes_are_rate_limited() {
    let limiter = Arc::new(RateLimiter::new(2, Duration::from_secs(60)));
    let app = api::router(Arc::new(Exchange::in_memory()), Some(limiter));
    let (event_id, roster) = create(&app).await;
    let uri = format!("/api/events/{}/select", event_id);
    let body = json!({ "participant_id": id_of(&roster, "Ana") });

    for _ in 0..2 {
        let (status, _) = send(&app, Method::POST, &uri, Some("spammer"), Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body_json) = send(&app, Method::POST, &uri, Some("spammer"), Some(body.clone())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json["code"], "RATE_LIMITED");

    // Other devices and read-only routes are unaffected
    let (status, _) = send(&app, Method::POST, &uri, Some("polite"), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, &format!("/api/events/{}", event_id), Some("spammer"), None).await;
    assert_eq!(status, StatusCode::OK);
}
