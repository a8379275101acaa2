//! Integration tests — build the router over an in-memory store and drive the
//! auth endpoints end to end.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use screener_api::{AppState, config::ApiConfig};
use screener_core::auth::AuthPolicy;
use screener_core::auth::admin::grant_admin_by_login;
use screener_core::auth::challenge::ChallengeIssuer;
use screener_core::auth::issuer::CredentialIssuer;
use screener_core::auth::login_guard::LoginAttemptGuard;
use screener_core::auth::memory_store::MemoryCredentialStore;
use serde_json::{Value, json};
use tower::ServiceExt;

const CAPTCHA_CODE: &str = "K7PQR";

fn test_state() -> AppState {
    let policy = AuthPolicy {
        password_cost: 4,
        ..AuthPolicy::default()
    };
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        pg_connection_url: String::new(),
        jwt_secret: "test-secret".into(),
        policy: policy.clone(),
    };
    let issuer = CredentialIssuer::new(
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(LoginAttemptGuard::from_policy(&policy)),
        Arc::new(
            ChallengeIssuer::from_policy(&policy)
                .with_generator(Arc::new(|_| CAPTCHA_CODE.to_string())),
        ),
        policy,
        config.jwt_secret.as_bytes(),
    );
    AppState { issuer, config }
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    bearer: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn register(app: &Router, login: &str, secret: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/register",
        Some(json!({"loginKey": login, "secret": secret})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

async fn login(app: &Router, body: Value) -> (StatusCode, Value) {
    send(app, "POST", "/login", Some(body), None).await
}

#[tokio::test]
async fn register_lockout_and_captcha_recovery() {
    let app = screener_api::router(test_state());

    let registered = register(&app, "alice", "secret1").await;
    assert_eq!(registered["principal"]["isAdmin"], false);
    assert_eq!(registered["tokenType"], "Bearer");
    assert!(registered["accessToken"].as_str().is_some());
    assert!(registered["refreshToken"].as_str().is_some());

    for _ in 0..5 {
        let (status, body) = login(&app, json!({"loginKey": "alice", "secret": "wrong"})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_credentials");
        assert!(body.get("requiresCaptcha").is_none());
    }

    // Sixth attempt: challenge required even with the right secret.
    let (status, body) = login(&app, json!({"loginKey": "alice", "secret": "secret1"})).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["requiresCaptcha"], true);

    let (status, captcha) = send(&app, "GET", "/captcha?loginKey=alice", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(captcha["image"].as_str().unwrap().starts_with("<svg"));
    let challenge_id = captcha["challengeId"].as_str().unwrap().to_string();

    // Seventh attempt: right answer plus right secret.
    let (status, body) = login(
        &app,
        json!({
            "loginKey": "alice",
            "secret": "secret1",
            "challengeId": challenge_id,
            "challengeResponse": CAPTCHA_CODE,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["principal"]["loginKey"], "alice");

    // Counter was reset: plain login works again.
    let (status, _) = login(&app, json!({"loginKey": "alice", "secret": "secret1"})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn captcha_cannot_be_reused() {
    let state = test_state();
    let app = screener_api::router(state.clone());
    register(&app, "alice", "secret1").await;
    for _ in 0..5 {
        login(&app, json!({"loginKey": "alice", "secret": "wrong"})).await;
    }

    let (_, captcha) = send(&app, "GET", "/captcha?loginKey=alice", None, None).await;
    let challenge_id = captcha["challengeId"].clone();
    let (status, _) = login(
        &app,
        json!({
            "loginKey": "alice",
            "secret": "secret1",
            "challengeId": challenge_id,
            "challengeResponse": "WRONG",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, body) = login(
        &app,
        json!({
            "loginKey": "alice",
            "secret": "secret1",
            "challengeId": challenge_id,
            "challengeResponse": CAPTCHA_CODE,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["requiresCaptcha"], true);
    assert_eq!(state.issuer.guard().failure_count("alice"), 5);
}

#[tokio::test]
async fn captcha_is_bound_to_its_login_key() {
    let state = test_state();
    let app = screener_api::router(state.clone());
    register(&app, "alice", "secret1").await;
    for _ in 0..5 {
        login(&app, json!({"loginKey": "alice", "secret": "wrong"})).await;
    }

    let (status, _) = send(&app, "GET", "/captcha", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, captcha) = send(&app, "GET", "/captcha?loginKey=mallory", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = login(
        &app,
        json!({
            "loginKey": "alice",
            "secret": "secret1",
            "challengeId": captcha["challengeId"],
            "challengeResponse": CAPTCHA_CODE,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["requiresCaptcha"], true);

    // Fetching again for the same key leaves one pending challenge.
    send(&app, "GET", "/captcha?loginKey=alice", None, None).await;
    send(&app, "GET", "/captcha?loginKey=alice", None, None).await;
    assert_eq!(state.issuer.challenges().pending_count(), 1);
}

#[tokio::test]
async fn duplicate_registration_is_409() {
    let app = screener_api::router(test_state());
    register(&app, "alice", "secret1").await;
    let (status, body) = send(
        &app,
        "POST",
        "/register",
        Some(json!({"loginKey": "alice", "secret": "other"})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_exists");
}

#[tokio::test]
async fn blank_credentials_are_400() {
    let app = screener_api::router(test_state());
    let (status, _) = login(&app, json!({"loginKey": "", "secret": "x"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn refresh_token_is_single_use() {
    let app = screener_api::router(test_state());
    let registered = register(&app, "alice", "secret1").await;
    let original = registered["refreshToken"].as_str().unwrap().to_string();

    let (status, rotated) = send(
        &app,
        "POST",
        "/refresh-token",
        Some(json!({"refreshToken": original})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["refreshToken"], registered["refreshToken"]);

    let (status, body) = send(
        &app,
        "POST",
        "/refresh-token",
        Some(json!({"refreshToken": original})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_or_expired_token");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_refreshes_have_exactly_one_winner() {
    let app = screener_api::router(test_state());
    let registered = register(&app, "alice", "secret1").await;
    let token = registered["refreshToken"].as_str().unwrap().to_string();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let app = app.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            send(
                &app,
                "POST",
                "/refresh-token",
                Some(json!({"refreshToken": token})),
                None,
            )
            .await
            .0
        }));
    }
    let mut ok = 0;
    for h in handles {
        match h.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::UNAUTHORIZED => {}
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(ok, 1);
}

#[tokio::test]
async fn logout_is_idempotent() {
    let app = screener_api::router(test_state());
    let registered = register(&app, "alice", "secret1").await;
    let token = registered["refreshToken"].clone();

    for _ in 0..2 {
        let (status, body) =
            send(&app, "POST", "/logout", Some(json!({"refreshToken": token})), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }
    let (status, _) = send(
        &app,
        "POST",
        "/logout",
        Some(json!({"refreshToken": "never-issued"})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "POST",
        "/refresh-token",
        Some(json!({"refreshToken": token})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_requires_a_valid_grant() {
    let app = screener_api::router(test_state());
    let registered = register(&app, "alice", "secret1").await;
    let access = registered["accessToken"].as_str().unwrap();

    let (status, _) = send(&app, "GET", "/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/me", None, Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, me) = send(&app, "GET", "/me", None, Some(access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["loginKey"], "alice");
    assert_eq!(me["isActive"], true);
    assert_eq!(me["permittedPaths"], json!(["/", "/stocks", "/strategies"]));
}

#[tokio::test]
async fn permission_check_applies_shared_policy() {
    let app = screener_api::router(test_state());
    let registered = register(&app, "alice", "secret1").await;
    let access = registered["accessToken"].as_str().unwrap();

    let (status, body) = send(&app, "GET", "/permissions/check?path=/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);

    let (_, body) = send(&app, "GET", "/permissions/check?path=/stocks", None, None).await;
    assert_eq!(body["allowed"], false);

    let (_, body) = send(
        &app,
        "GET",
        "/permissions/check?path=/stocks/",
        None,
        Some(access),
    )
    .await;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["path"], "/stocks");

    let (_, body) = send(&app, "GET", "/permissions/check?path=/users", None, Some(access)).await;
    assert_eq!(body["allowed"], false);

    let (status, _) = send(
        &app,
        "GET",
        "/permissions/check?path=/stocks",
        None,
        Some("garbage"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_endpoints_require_admin_principal() {
    let state = test_state();
    let app = screener_api::router(state.clone());
    let root = register(&app, "root", "rootpw").await;
    let alice = register(&app, "alice", "secret1").await;
    let root_access = root["accessToken"].as_str().unwrap();
    let alice_access = alice["accessToken"].as_str().unwrap();
    let alice_id = alice["principal"]["id"].as_str().unwrap();

    let (status, body) = send(&app, "GET", "/admin/principals", None, Some(alice_access)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = send(&app, "GET", "/admin/principals", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Promotion takes effect for the existing grant: the store is consulted.
    grant_admin_by_login(state.issuer.store().as_ref(), "root")
        .await
        .unwrap();

    let (status, body) = send(&app, "GET", "/admin/principals", None, Some(root_access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["principals"].as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/admin/principals/{alice_id}/permissions"),
        Some(json!({"paths": ["/", "/backtest/", "/backtest"]})),
        Some(root_access),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["permittedPaths"], json!(["/", "/backtest"]));

    // A rotated grant carries the new set.
    let (_, rotated) = send(
        &app,
        "POST",
        "/refresh-token",
        Some(json!({"refreshToken": alice["refreshToken"]})),
        None,
    )
    .await;
    let fresh = rotated["accessToken"].as_str().unwrap();
    let (_, body) = send(&app, "GET", "/permissions/check?path=/backtest", None, Some(fresh)).await;
    assert_eq!(body["allowed"], true);
    let (_, body) = send(&app, "GET", "/permissions/check?path=/stocks", None, Some(fresh)).await;
    assert_eq!(body["allowed"], false);

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/admin/principals/{alice_id}/admin"),
        Some(json!({"isAdmin": true})),
        Some(root_access),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isAdmin"], true);
}

#[tokio::test]
async fn deactivation_ends_sessions_and_self_lockout_is_refused() {
    let state = test_state();
    let app = screener_api::router(state.clone());
    let root = register(&app, "root", "rootpw").await;
    let alice = register(&app, "alice", "secret1").await;
    grant_admin_by_login(state.issuer.store().as_ref(), "root")
        .await
        .unwrap();
    let root_access = root["accessToken"].as_str().unwrap();
    let root_id = root["principal"]["id"].as_str().unwrap();
    let alice_id = alice["principal"]["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/admin/principals/{root_id}/active"),
        Some(json!({"isActive": false})),
        Some(root_access),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/admin/principals/{alice_id}/active"),
        Some(json!({"isActive": false})),
        Some(root_access),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isActive"], false);

    let (status, _) = send(
        &app,
        "POST",
        "/refresh-token",
        Some(json!({"refreshToken": alice["refreshToken"]})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = login(&app, json!({"loginKey": "alice", "secret": "secret1"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        "DELETE",
        &format!("/admin/principals/{root_id}/sessions"),
        None,
        Some(root_access),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], 1);
}
