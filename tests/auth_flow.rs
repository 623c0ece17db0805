//! End-to-end flow tests: the real router on a real port, driven through the
//! client-side session holder.

use gradeflow_backend::auth::models::UserRole;
use gradeflow_backend::client::{SessionClient, SessionEvent};
use gradeflow_backend::models::Config;
use gradeflow_backend::{build_router, AppState, RateLimiters};
use reqwest::StatusCode;
use std::net::SocketAddr;
use tokio::net::TcpListener;

const ADMIN_EMAIL: &str = "admin@test.local";
const ADMIN_PASSWORD: &str = "integration-admin-pw";

struct TestApp {
    state: AppState,
    base_url: String,
    _dir: tempfile::TempDir,
}

async fn spawn_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();

    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: dir.path().join("test.db").to_string_lossy().into_owned(),
        upload_dir: dir.path().join("uploads").to_string_lossy().into_owned(),
        secret_key: "integration-test-secret".to_string(),
        access_token_expire_minutes: 30,
        token_sweep_interval_secs: 3600,
        rate_limit_default: 10_000,
        rate_limit_ai: 10,
        admin_email: ADMIN_EMAIL.to_string(),
        admin_password: ADMIN_PASSWORD.to_string(),
        anthropic_api_key: None,
        openai_api_key: None,
        ai_model: "test".to_string(),
    };

    let state = AppState::new(&config).unwrap();
    state
        .users
        .ensure_admin(&config.admin_email, &config.admin_password)
        .unwrap();

    let app = build_router(state.clone(), RateLimiters::from_config(&config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        state,
        base_url: format!("http://{}", addr),
        _dir: dir,
    }
}

/// Register a user over the wire, then verify them through the real
/// verification endpoint.
async fn register_verified(app: &TestApp, email: &str, password: &str, role: UserRole) {
    let path = match role {
        UserRole::Student => "/api/auth/register/student",
        UserRole::Teacher => "/api/auth/register/teacher",
    };

    let resp = reqwest::Client::new()
        .post(format!("{}{}", app.base_url, path))
        .json(&serde_json::json!({
            "email": email,
            "name": "Test User",
            "password": password,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let user = app.state.users.get_by_email(email).unwrap().unwrap();
    let token = app.state.verifier.issue(&user).unwrap();

    let resp = reqwest::Client::new()
        .get(format!(
            "{}/api/auth/verify-email?token={}",
            app.base_url, token
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_check_is_public() {
    let app = spawn_app().await;
    let resp = reqwest::get(format!("{}/health", app.base_url)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_route_needs_token() {
    let app = spawn_app().await;
    let resp = reqwest::get(format!("{}/api/submissions", app.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_login_and_profile() {
    let app = spawn_app().await;
    let client = SessionClient::new(app.base_url.clone());

    assert!(client.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap());
    assert!(client.is_logged_in());

    let me = client.current_user().unwrap();
    assert_eq!(me.email, ADMIN_EMAIL);
    assert!(me.is_admin);
}

#[tokio::test]
async fn test_bad_password_leaves_client_untouched() {
    let app = spawn_app().await;
    let client = SessionClient::new(app.base_url.clone());

    assert!(!client.login(ADMIN_EMAIL, "wrong-password").await.unwrap());
    assert!(!client.is_logged_in());
    assert!(client.last_login_error().is_some());
}

#[tokio::test]
async fn test_unverified_account_cannot_login_until_verified() {
    let app = spawn_app().await;

    // Register but skip verification
    let resp = reqwest::Client::new()
        .post(format!("{}/api/auth/register/student", app.base_url))
        .json(&serde_json::json!({
            "email": "fresh@test.local",
            "name": "Fresh",
            "password": "longenough",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let client = SessionClient::new(app.base_url.clone());
    assert!(!client.login("fresh@test.local", "longenough").await.unwrap());

    // Verify through the real endpoint, then login succeeds
    let user = app.state.users.get_by_email("fresh@test.local").unwrap().unwrap();
    let token = app.state.verifier.issue(&user).unwrap();
    reqwest::get(format!(
        "{}/api/auth/verify-email?token={}",
        app.base_url, token
    ))
    .await
    .unwrap();

    assert!(client.login("fresh@test.local", "longenough").await.unwrap());
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = spawn_app().await;
    register_verified(&app, "dup@test.local", "longenough", UserRole::Student).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/auth/register/student", app.base_url))
        .json(&serde_json::json!({
            "email": "dup@test.local",
            "name": "Again",
            "password": "longenough",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_admin_route_forbidden_for_student() {
    let app = spawn_app().await;
    register_verified(&app, "student@test.local", "longenough", UserRole::Student).await;

    let client = SessionClient::new(app.base_url.clone());
    assert!(client.login("student@test.local", "longenough").await.unwrap());

    // Valid session, wrong role: Forbidden, never Unauthorized
    let resp = client.get("/api/admin/users").await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // A 403 is not a session failure; the client keeps its token
    assert!(client.is_logged_in());
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let app = spawn_app().await;
    let client = SessionClient::new(app.base_url.clone());
    assert!(client.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap());

    let old_token = client.token().unwrap();
    client.logout().await;
    assert!(!client.is_logged_in());

    // Reusing the revoked token is rejected
    let resp = reqwest::Client::new()
        .get(format!("{}/api/auth/me", app.base_url))
        .bearer_auth(&old_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deactivation_kills_live_session() {
    let app = spawn_app().await;
    register_verified(&app, "victim@test.local", "longenough", UserRole::Student).await;

    let admin = SessionClient::new(app.base_url.clone());
    assert!(admin.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap());

    let student = SessionClient::new(app.base_url.clone());
    assert!(student.login("victim@test.local", "longenough").await.unwrap());
    let mut events = student.subscribe();

    // Admin deactivates the account while the student session is live
    let victim = app
        .state
        .users
        .get_by_email("victim@test.local")
        .unwrap()
        .unwrap();
    let resp = admin
        .patch_json(
            &format!("/api/admin/users/{}/set-active", victim.id),
            &serde_json::json!({ "is_active": false }),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // The student's next request bounces and the session holder clears itself
    let resp = student.get("/api/submissions").await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(!student.is_logged_in());
    assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedOut);
}

#[tokio::test]
async fn test_submission_and_feedback_flow() {
    let app = spawn_app().await;
    register_verified(&app, "writer@test.local", "longenough", UserRole::Student).await;

    let student = SessionClient::new(app.base_url.clone());
    assert!(student.login("writer@test.local", "longenough").await.unwrap());

    // Upload an essay
    let form = reqwest::multipart::Form::new()
        .text("title", "My essay")
        .text("description", "First draft")
        .part(
            "file",
            reqwest::multipart::Part::bytes(b"The essay body.".to_vec())
                .file_name("essay.txt")
                .mime_str("text/plain")
                .unwrap(),
        );

    let resp = reqwest::Client::new()
        .post(format!("{}/api/submissions/upload", app.base_url))
        .bearer_auth(student.token().unwrap())
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let submission: serde_json::Value = resp.json().await.unwrap();
    let submission_id = submission["id"].as_str().unwrap().to_string();
    assert_eq!(submission["status"], "pending");

    // The owner sees it in their list
    let resp = student.get("/api/submissions").await.unwrap();
    let list: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(list["submissions"].as_array().unwrap().len(), 1);

    // Download round-trips the original bytes
    let resp = student
        .get(&format!("/api/submissions/{}/download", submission_id))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"The essay body.");

    // Admin leaves feedback; submission flips to reviewed
    let admin = SessionClient::new(app.base_url.clone());
    assert!(admin.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap());

    let resp = admin
        .post_json(
            "/api/feedback",
            &serde_json::json!({
                "submission_id": submission_id,
                "content": "Clear thesis, expand the conclusion.",
                "grade": "B+",
            }),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let feedback: serde_json::Value = resp.json().await.unwrap();

    let resp = student
        .get(&format!("/api/submissions/{}", submission_id))
        .await
        .unwrap();
    let submission: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(submission["status"], "reviewed");

    // A second feedback on the same submission is rejected
    let resp = admin
        .post_json(
            "/api/feedback",
            &serde_json::json!({
                "submission_id": submission_id,
                "content": "again",
            }),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // The student reads their feedback
    let resp = student
        .get(&format!("/api/feedback/submission/{}", submission_id))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let seen: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(seen["grade"], "B+");

    // Students cannot create feedback themselves
    let resp = student
        .post_json(
            "/api/feedback",
            &serde_json::json!({
                "submission_id": submission_id,
                "content": "I grade myself an A",
            }),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Deleting feedback resets the submission to pending
    let resp = admin
        .delete(&format!("/api/feedback/{}", feedback["id"].as_str().unwrap()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = student
        .get(&format!("/api/submissions/{}", submission_id))
        .await
        .unwrap();
    let submission: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(submission["status"], "pending");
}

#[tokio::test]
async fn test_upload_rejects_disallowed_extension() {
    let app = spawn_app().await;
    register_verified(&app, "uploader@test.local", "longenough", UserRole::Student).await;

    let student = SessionClient::new(app.base_url.clone());
    assert!(student.login("uploader@test.local", "longenough").await.unwrap());

    let form = reqwest::multipart::Form::new()
        .text("title", "Nope")
        .part(
            "file",
            reqwest::multipart::Part::bytes(b"MZ".to_vec()).file_name("malware.exe"),
        );

    let resp = reqwest::Client::new()
        .post(format!("{}/api/submissions/upload", app.base_url))
        .bearer_auth(student.token().unwrap())
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_collaboration_sharing() {
    let app = spawn_app().await;
    register_verified(&app, "owner@test.local", "longenough", UserRole::Student).await;
    register_verified(&app, "peer@test.local", "longenough", UserRole::Student).await;

    let owner = SessionClient::new(app.base_url.clone());
    assert!(owner.login("owner@test.local", "longenough").await.unwrap());
    let peer = SessionClient::new(app.base_url.clone());
    assert!(peer.login("peer@test.local", "longenough").await.unwrap());

    let form = reqwest::multipart::Form::new().text("title", "Shared work").part(
        "file",
        reqwest::multipart::Part::bytes(b"content".to_vec()).file_name("work.txt"),
    );
    let resp = reqwest::Client::new()
        .post(format!("{}/api/submissions/upload", app.base_url))
        .bearer_auth(owner.token().unwrap())
        .multipart(form)
        .send()
        .await
        .unwrap();
    let submission: serde_json::Value = resp.json().await.unwrap();
    let submission_id = submission["id"].as_str().unwrap();

    let peer_user = app.state.users.get_by_email("peer@test.local").unwrap().unwrap();

    // The peer cannot share someone else's submission
    let resp = peer
        .post_json(
            "/api/collaborations",
            &serde_json::json!({
                "submission_id": submission_id,
                "user_id": peer_user.id,
                "permission": "read",
            }),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // The owner can
    let resp = owner
        .post_json(
            "/api/collaborations",
            &serde_json::json!({
                "submission_id": submission_id,
                "user_id": peer_user.id,
                "permission": "write",
            }),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = owner.get("/api/collaborations").await.unwrap();
    let list: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(list["collaborations"].as_array().unwrap().len(), 1);
    assert_eq!(list["collaborations"][0]["permission"], "write");
}

#[tokio::test]
async fn test_admin_user_pagination_and_search() {
    let app = spawn_app().await;
    register_verified(&app, "alpha@one.edu", "longenough", UserRole::Student).await;
    register_verified(&app, "beta@two.edu", "longenough", UserRole::Teacher).await;

    let admin = SessionClient::new(app.base_url.clone());
    assert!(admin.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap());

    // admin + 2 registered users
    let resp = admin.get("/api/admin/users?page=1&per_page=2").await.unwrap();
    let page: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(page["total"], 3);
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["users"].as_array().unwrap().len(), 2);

    // Search narrows by email substring
    let resp = admin
        .get("/api/admin/users?search=two.edu")
        .await
        .unwrap();
    let page: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["users"][0]["email"], "beta@two.edu");

    // Out-of-range page is empty, not an error
    let resp = admin.get("/api/admin/users?page=50").await.unwrap();
    let page: serde_json::Value = resp.json().await.unwrap();
    assert!(page["users"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_ai_generation_reports_unconfigured() {
    let app = spawn_app().await;
    register_verified(&app, "ai@test.local", "longenough", UserRole::Student).await;

    let student = SessionClient::new(app.base_url.clone());
    assert!(student.login("ai@test.local", "longenough").await.unwrap());

    let form = reqwest::multipart::Form::new().text("title", "Gradable").part(
        "file",
        reqwest::multipart::Part::bytes(b"text to grade".to_vec()).file_name("hw.txt"),
    );
    let resp = reqwest::Client::new()
        .post(format!("{}/api/submissions/upload", app.base_url))
        .bearer_auth(student.token().unwrap())
        .multipart(form)
        .send()
        .await
        .unwrap();
    let submission: serde_json::Value = resp.json().await.unwrap();

    let admin = SessionClient::new(app.base_url.clone());
    assert!(admin.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap());

    // No provider key in the test config
    let resp = admin
        .post_json(
            &format!(
                "/api/feedback/generate/{}",
                submission["id"].as_str().unwrap()
            ),
            &serde_json::json!({}),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}
