//! Integration tests for the txdata-wb HTTP API
//!
//! Each test builds the full router over an in-memory database and a
//! temporary root folder, then drives it with `oneshot` requests.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot` method
use txdata_common::config::TomlConfig;
use txdata_common::db::init_memory_database;
use txdata_wb::encoding::manager;
use txdata_wb::workspace::Workspace;
use txdata_wb::{build_router, AppState};

const SURVEY_CSV: &str = "Age,Satisfaction,Gender\n\
                          23,Agree,F\n\
                          35,Strongly Agree,M\n\
                          41,Neutral,F\n\
                          29,Agree,M\n\
                          52,Disagree,F\n\
                          38,Agree,M\n";

struct TestApp {
    _dir: tempfile::TempDir,
    app: Router,
}

async fn setup_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_memory_database().await.unwrap();
    let config = TomlConfig::default();
    manager::seed_prototypes(&pool, &config.prototypes_or_default()).await.unwrap();
    let state = AppState::new(
        pool,
        Workspace::new(dir.path().join("projects")),
        Workspace::new(dir.path().join("workspaces")),
        config,
    );
    TestApp {
        app: build_router(state),
        _dir: dir,
    }
}

/// Test helper: send a request and return status plus JSON body
async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// Register and log in; returns the session token
async fn login_as(app: &Router, name: &str) -> String {
    let email = format!("{}@example.org", name);
    let (status, _) = send(
        app,
        json_request(
            "POST",
            "/auth/register",
            None,
            json!({"username": name, "email": email, "password": "pw-123", "password_confirm": "pw-123"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        json_request("POST", "/auth/login", None, json!({"email": email, "password": "pw-123"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

const BOUNDARY: &str = "txdata-test-boundary";

fn upload_request(token: &str, name: &str, filename: &str, csv: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\n{name}\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"topic\"\r\n\r\nCampus life\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: text/csv\r\n\r\n{csv}\r\n\
         --{b}--\r\n",
        b = BOUNDARY,
        name = name,
        filename = filename,
        csv = csv,
    );
    Request::builder()
        .method("POST")
        .uri("/projects")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn create_project(app: &Router, token: &str, name: &str) -> i64 {
    let (status, body) = send(app, upload_request(token, name, "survey.csv", SURVEY_CSV)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_i64().unwrap()
}

// =============================================================================
// Public endpoints
// =============================================================================

#[tokio::test]
async fn test_health_and_index_are_public() {
    let t = setup_app().await;

    let (status, body) = send(&t.app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "txdata-wb");

    let response = t
        .app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let t = setup_app().await;

    let (status, body) = send(&t.app, Request::get("/projects").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Authentication required.");

    let (status, body) = send(&t.app, get("/projects", "not-a-session")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

// =============================================================================
// Accounts
// =============================================================================

#[tokio::test]
async fn test_register_login_me_logout() {
    let t = setup_app().await;
    let token = login_as(&t.app, "amira").await;

    let (status, body) = send(&t.app, get("/auth/me", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "amira");
    assert!(body["user_code"].as_str().unwrap().starts_with("DL-"));

    let (status, _) = send(&t.app, json_request("POST", "/auth/logout", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&t.app, get("/auth/me", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_registration_and_bad_login() {
    let t = setup_app().await;
    login_as(&t.app, "ben").await;

    let (status, _) = send(
        &t.app,
        json_request(
            "POST",
            "/auth/register",
            None,
            json!({"username": "ben2", "email": "ben@example.org", "password": "x", "password_confirm": "x"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &t.app,
        json_request("POST", "/auth/login", None, json!({"email": "ben@example.org", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Projects
// =============================================================================

#[tokio::test]
async fn test_project_lifecycle() {
    let t = setup_app().await;
    let token = login_as(&t.app, "carla").await;
    let id = create_project(&t.app, &token, "Campus Survey").await;

    let (status, body) = send(&t.app, get("/projects", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["map_filename"], "campus_survey.json");

    let (status, body) = send(&t.app, get(&format!("/projects/{}", id), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["preview"]["columns"], json!(["Age", "Satisfaction", "Gender"]));
    assert_eq!(body["files"][0]["name"], "campus_survey.csv");

    let (status, body) = send(
        &t.app,
        json_request("PUT", &format!("/projects/{}", id), Some(&token), json!({"name": "Campus Survey 2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Campus Survey 2");

    let response = t
        .app
        .clone()
        .oneshot(get(&format!("/projects/{}/files/campus_survey.csv", id), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );

    let (status, _) = send(
        &t.app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/projects/{}", id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&t.app, get(&format!("/projects/{}", id), &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_rejects_non_csv() {
    let t = setup_app().await;
    let token = login_as(&t.app, "dora").await;
    let (status, body) = send(&t.app, upload_request(&token, "Sheet", "survey.xlsx", SURVEY_CSV)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Invalid file type. Please upload a CSV file.");
}

#[tokio::test]
async fn test_other_users_project_is_forbidden() {
    let t = setup_app().await;
    let owner = login_as(&t.app, "emil").await;
    let intruder = login_as(&t.app, "fiona").await;
    let id = create_project(&t.app, &owner, "Private").await;

    let (status, _) = send(&t.app, get(&format!("/projects/{}", id), &intruder)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&t.app, get(&format!("/sim/{}/map", id), &intruder)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&t.app, json_request("POST", "/projects/purge", Some(&intruder), json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// =============================================================================
// Simulation → encoding → analysis
// =============================================================================

#[tokio::test]
async fn test_full_workflow() {
    let t = setup_app().await;
    let token = login_as(&t.app, "gabriel").await;
    let id = create_project(&t.app, &token, "Workflow").await;

    // Question map is generated from the headers
    let (status, body) = send(&t.app, get(&format!("/sim/{}/map", id), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["keys"], json!(["q1", "q2", "q3"]));
    assert_eq!(body["generated"], true);

    // Encoding needs simulated data first
    let (status, body) = send(
        &t.app,
        json_request("POST", &format!("/encoding/{}/run", id), Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["message"],
        "Simulated data 'simulated_workflow.csv' not found. Run bootstrap simulation first."
    );

    let (status, body) = send(
        &t.app,
        json_request(
            "POST",
            &format!("/sim/{}/run", id),
            Some(&token),
            json!({"method": "standard", "n_samples": 40, "seed": 11}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["rows"], 40);
    assert_eq!(body["plotted_keys"], json!(["q1"]));

    let (status, body) = send(&t.app, get(&format!("/sim/{}/results", id), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_rows"], 40);
    assert_eq!(body["plots"][0]["key"], "q1");

    // Assign definitions
    let (status, body) = send(&t.app, get(&format!("/encoding/{}/assign", id), &token)).await;
    assert_eq!(status, StatusCode::OK);
    let q2 = body["columns"][1]["id"].as_i64().unwrap();
    let q3 = body["columns"][2]["id"].as_i64().unwrap();

    let (status, _) = send(
        &t.app,
        json_request(
            "POST",
            &format!("/encoding/{}/apply", id),
            Some(&token),
            json!({
                "column_ids": [q2],
                "definition_name": "Agreement",
                "prototype_name": "5-Point Likert",
                "configuration": {"map": {"Disagree": 2, "Neutral": 3, "Agree": 4, "Strongly Agree": 5}}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &t.app,
        json_request(
            "POST",
            &format!("/encoding/{}/apply", id),
            Some(&token),
            json!({"column_ids": [q3], "definition_name": "Gender", "prototype_name": "Nominal Categories"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &t.app,
        json_request("POST", &format!("/encoding/{}/run", id), Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["encoded_file"], "workflow_encoded.csv");
    assert_eq!(body["warnings"], json!([]));

    let (status, body) = send(&t.app, get(&format!("/encoding/{}/results", id), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["question_texts"]["q2"], "Satisfaction");

    // Analysis over the encoded data
    let (status, body) = send(&t.app, get(&format!("/analysis/{}", id), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["variable_types"]["numeric"].as_array().unwrap().contains(&json!("q1")));
    assert_eq!(body["total_rows"], 40);

    let (status, body) = send(
        &t.app,
        json_request(
            "POST",
            &format!("/analysis/{}/run", id),
            Some(&token),
            json!({"analysis_type": "descriptive", "variable": "q1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["plot"].as_str().unwrap().starts_with("data:image/svg+xml;base64,"));

    let (status, body) = send(
        &t.app,
        json_request(
            "POST",
            &format!("/analysis/{}/composite", id),
            Some(&token),
            json!({"name": "combo", "variables": ["q1", "q2"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["variable_types"]["numeric"].as_array().unwrap().contains(&json!("combo")));

    let (status, _) = send(
        &t.app,
        json_request("POST", &format!("/analysis/{}/reset", id), Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&t.app, get(&format!("/analysis/{}", id), &token)).await;
    assert!(!body["variable_types"]["numeric"].as_array().unwrap().contains(&json!("combo")));
}

#[tokio::test]
async fn test_analysis_without_encoding_is_not_found() {
    let t = setup_app().await;
    let token = login_as(&t.app, "hana").await;
    let id = create_project(&t.app, &token, "Empty").await;

    let (status, body) = send(&t.app, get(&format!("/analysis/{}", id), &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body["error"]["message"],
        "Encoded data not found. Please generate the encoded file from the Encoding Workflow first."
    );
}

// =============================================================================
// Tutorials
// =============================================================================

#[tokio::test]
async fn test_tutorial_admin_requires_admin_role() {
    let t = setup_app().await;
    let token = login_as(&t.app, "ivan").await;

    let (status, body) = send(&t.app, get("/tutorials", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, body) = send(&t.app, get("/tutorial_admin/levels/1/sections", &token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "Admin access required.");

    let (status, _) = send(&t.app, get("/tutorials/subtopics/42", &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
