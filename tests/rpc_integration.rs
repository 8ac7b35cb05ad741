// tests/rpc_integration.rs

use member_pins::{
    Backend, BackendConfig, Coordinate, FeedConfig, MemberRole, PinsError, ProximityPinFeed,
    ProximityQuery,
};
use serde_json::{json, Value};


use test_utils::shared::{init, spawn_responder};

const NEARBY_RESPONSE: &str = r#"[
  {"user_id": "7d0c2a", "city": "Itacaré", "state": "BA", "lat": -13.27, "lng": -39.66,
   "avatar_url": "avatars/ana.png", "display_name": "Ana", "distance_km": 0.53},
  {"user_id": "91be44", "city": null, "state": null, "lat": -13.35, "lng": -39.7,
   "avatar_url": null, "display_name": "Bruno", "distance_km": 9.4}
]"#;

#[tokio::test]
async fn test_nearby_pins_request_shape() {
    init();
    let (url, server) = spawn_responder(200, NEARBY_RESPONSE).await;
    let mut backend = Backend::new(&url, "anon-key").unwrap();
    backend.set_session_token(Some("member-jwt".to_string()));

    let pins = backend
        .pins()
        .nearby(Coordinate::new(-13.2687, -39.6644), 50.0, 200)
        .await
        .unwrap();

    let request = server.await.unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/rest/v1/rpc/get_nearby_member_pins");
    assert_eq!(request.header("apikey"), Some("anon-key"));
    assert_eq!(request.header("authorization"), Some("Bearer member-jwt"));
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(
        request.json(),
        json!({"lat": -13.2687, "lng": -39.6644, "radius_km": 50.0, "limit": 200})
    );

    assert_eq!(pins.len(), 2);
    assert_eq!(pins[0].owner_id, "7d0c2a");
    assert_eq!(pins[0].distance_km, Some(0.53));
    assert_eq!(pins[1].city, None);
    assert_eq!(pins[1].distance_km, Some(9.4));
}

#[tokio::test]
async fn test_feed_over_http_keeps_server_distances() {
    init();
    let (url, server) = spawn_responder(200, NEARBY_RESPONSE).await;
    let backend = Backend::new(&url, "anon-key").unwrap();
    let feed = ProximityPinFeed::new(backend.pins(), FeedConfig::default());

    let pins = feed
        .refresh(&ProximityQuery::new(Coordinate::new(-13.2687, -39.6644), 50.0, 200))
        .await
        .unwrap();

    let request = server.await.unwrap();
    // Signed out: the anon key doubles as bearer token.
    assert_eq!(request.header("authorization"), Some("Bearer anon-key"));
    assert_eq!(request.json()["limit"], json!(200));
    assert_eq!(feed.pins(), pins);
    assert_eq!(
        pins.iter().map(|p| p.distance_km).collect::<Vec<_>>(),
        vec![Some(0.53), Some(9.4)]
    );
}

#[tokio::test]
async fn test_approved_pins_request() {
    init();
    let body = r#"[{"user_id": "a1", "lat": 1.5, "lng": 2.5, "display_name": null}]"#;
    let (url, server) = spawn_responder(200, body).await;
    let backend = Backend::new(&url, "anon-key").unwrap();

    let pins = backend.pins().approved(500).await.unwrap();

    let request = server.await.unwrap();
    assert_eq!(request.path, "/rest/v1/rpc/get_approved_member_pins");
    assert_eq!(request.json(), json!({"limit": 500}));
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].distance_km, None);
    assert_eq!(pins[0].display_name, None);
}

#[tokio::test]
async fn test_missing_function_maps_to_not_found() {
    init();
    let body = r#"{"code": "PGRST202", "message": "Could not find the function public.nope", "details": null, "hint": null}"#;
    let (url, server) = spawn_responder(404, body).await;
    let backend = Backend::new(&url, "anon-key").unwrap();

    let result: Result<Value, PinsError> = backend.rpc().call("nope", &json!({})).await;
    server.await.unwrap();
    match result {
        Err(PinsError::NotFound(message)) => assert!(message.contains("public.nope")),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_with_plain_body() {
    init();
    let (url, server) = spawn_responder(502, "Bad Gateway").await;
    let backend = Backend::new(&url, "anon-key").unwrap();

    let result = backend.pins().approved(10).await;
    server.await.unwrap();
    assert!(
        matches!(result, Err(PinsError::InternalServerError(_))),
        "got {:?}",
        result
    );
}

#[tokio::test]
async fn test_feed_wraps_http_failures() {
    init();
    let body = r#"{"code": "42501", "message": "permission denied for function get_nearby_member_pins"}"#;
    let (url, server) = spawn_responder(403, body).await;
    let backend = Backend::new(&url, "anon-key").unwrap();
    let feed = ProximityPinFeed::new(backend.pins(), FeedConfig::default());

    let result = feed
        .refresh(&ProximityQuery::new(Coordinate::new(0.0, 0.0), 5.0, 10))
        .await;
    server.await.unwrap();
    match result {
        Err(PinsError::BackendQueryFailed(cause)) => {
            assert!(matches!(*cause, PinsError::OperationForbidden(_)))
        }
        other => panic!("expected BackendQueryFailed, got {:?}", other),
    }
    assert!(feed.pins().is_empty());
}

#[tokio::test]
async fn test_invalid_function_name_never_sent() {
    init();
    let backend = Backend::new("http://127.0.0.1:9", "anon-key").unwrap();
    let result: Result<Value, PinsError> =
        backend.rpc().call("../auth/v1/admin", &json!({})).await;
    assert!(matches!(result, Err(PinsError::InvalidFunctionName(_))));
}

#[tokio::test]
async fn test_negative_radius_rejected_locally() {
    init();
    let backend = Backend::new("http://127.0.0.1:9", "anon-key").unwrap();
    let result = backend
        .pins()
        .nearby(Coordinate::new(0.0, 0.0), -1.0, 10)
        .await;
    assert!(matches!(result, Err(PinsError::InvalidInput(_))));
}

#[tokio::test]
async fn test_has_role() {
    init();
    let (url, server) = spawn_responder(200, "true").await;
    let config = BackendConfig::new(url, "anon-key").with_session_token("admin-jwt");
    let backend = Backend::from_config(&config).unwrap();

    let allowed = backend
        .roles()
        .has_role("5b8e0d", MemberRole::Admin)
        .await
        .unwrap();

    let request = server.await.unwrap();
    assert!(allowed);
    assert_eq!(request.path, "/rest/v1/rpc/has_role");
    assert_eq!(request.json(), json!({"_user_id": "5b8e0d", "_role": "admin"}));
    assert_eq!(request.header("authorization"), Some("Bearer admin-jwt"));
}

#[tokio::test]
async fn test_has_role_rejects_empty_user() {
    init();
    let backend = Backend::new("http://127.0.0.1:9", "anon-key").unwrap();
    let result = backend.roles().has_role("  ", MemberRole::Support).await;
    assert!(matches!(result, Err(PinsError::InvalidInput(_))));
}
