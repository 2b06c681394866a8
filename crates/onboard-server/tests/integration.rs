use axum::http::StatusCode;
use http_body_util::BodyExt;
use onboard_core::config::Config;
use onboard_core::Portal;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Initialize a portal inside the temp directory and build a router on it.
fn app(dir: &TempDir) -> axum::Router {
    Config::new("test-portal").save(dir.path()).unwrap();
    let portal = Portal::open(dir.path()).unwrap();
    onboard_server::build_router(Arc::new(portal))
}

async fn send(app: axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&b).unwrap()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    send(app, "GET", uri, None).await
}

async fn post_json(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, "POST", uri, Some(body)).await
}

async fn put_json(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, "PUT", uri, Some(body)).await
}

fn meta(name: &str, phases: &[u8]) -> Value {
    json!({
        "project_name": name,
        "domain": "claims",
        "environment": "dev",
        "team_name": "Claims Platform",
        "team_email": "claims-platform@example.com",
        "jira_project": "CLM",
        "aws_account_id": "123456789012",
        "eks_cluster_name": "eks-claims-dev",
        "start_date": "2026-01-05",
        "phases": phases,
    })
}

fn task_id(detail: &Value, key: &str) -> u64 {
    detail["phases"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|p| p["tasks"].as_array().unwrap().iter())
        .find(|t| t["key"] == key)
        .unwrap_or_else(|| panic!("task {key} not in project"))["id"]
        .as_u64()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn catalog_lists_nine_phases() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(app(&dir), "/api/catalog").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phases"].as_array().unwrap().len(), 9);
}

#[tokio::test]
async fn create_project_returns_201_with_phases() {
    let dir = TempDir::new().unwrap();
    let (status, body) = post_json(app(&dir), "/api/projects", meta("pega-claims-dev", &[1])).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "draft");
    assert_eq!(body["percent_complete"], 0.0);
    assert_eq!(body["phases"].as_array().unwrap().len(), 1);
    assert_eq!(body["phases"][0]["tasks"].as_array().unwrap().len(), 14);
}

#[tokio::test]
async fn duplicate_project_is_409() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[1])).await;
    let (status, body) = post_json(app, "/api/projects", meta("pega-claims-dev", &[2])).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn invalid_selection_is_400() {
    let dir = TempDir::new().unwrap();
    let (status, _) = post_json(app(&dir), "/api/projects", meta("pega-claims-dev", &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_project_is_404() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(app(&dir), "/api/projects/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn list_filters_by_environment() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[1])).await;
    let mut prod = meta("pega-claims-dev", &[1]);
    prod["environment"] = json!("prod");
    let (status, _) = post_json(app.clone(), "/api/projects", prod).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, all) = get(app.clone(), "/api/projects").await;
    assert_eq!(all.as_array().unwrap().len(), 2);
    let (_, dev) = get(app, "/api/projects?environment=dev").await;
    assert_eq!(dev.as_array().unwrap().len(), 1);
    assert_eq!(dev[0]["environment"], "dev");
}

#[tokio::test]
async fn cancel_blocks_task_transitions() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (_, detail) = post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[1])).await;
    let id = detail["id"].as_u64().unwrap();
    let intake = task_id(&detail, "intake-form");

    let (status, body) = post_json(app.clone(), &format!("/api/projects/{id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, _) = post_json(app, &format!("/api/tasks/{intake}/start"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn delete_removes_project() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (_, detail) = post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[1])).await;
    let id = detail["id"].as_u64().unwrap();

    let (status, _) = send(app.clone(), "DELETE", &format!("/api/projects/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(app, &format!("/api/projects/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blocked_task_cannot_start() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (_, detail) = post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[1])).await;
    let review = task_id(&detail, "architecture-review");

    let (status, body) = post_json(app, &format!("/api/tasks/{review}/start"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("intake-form"));
}

#[tokio::test]
async fn completion_is_gated_on_checklist_and_outputs() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (_, detail) = post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[2])).await;
    let project = detail["id"].as_u64().unwrap();
    let rds = task_id(&detail, "rds-provision");

    let (status, body) = post_json(app.clone(), &format!("/api/tasks/{rds}/start"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["task"]["status"], "in_progress");
    assert_eq!(body["phase_status"], "in_progress");
    assert_eq!(body["project_status"], "active");

    let (status, _) = post_json(app.clone(), &format!("/api/tasks/{rds}/complete"), json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    for i in 0..3 {
        let (status, _) = put_json(
            app.clone(),
            &format!("/api/tasks/{rds}/checklist/{i}"),
            json!({ "checked": true }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = post_json(app.clone(), &format!("/api/tasks/{rds}/complete"), json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("rds_endpoint"));

    let (status, _) = post_json(
        app.clone(),
        &format!("/api/tasks/{rds}/outputs"),
        json!({ "key": "rds_endpoint", "value": "claims.abc123.us-east-1.rds.amazonaws.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_json(
        app.clone(),
        &format!("/api/tasks/{rds}/complete"),
        json!({ "author": "dba@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["task"]["status"], "completed");
    assert_eq!(body["task"]["completed_by"], "dba@example.com");

    let (_, out) = get(app, &format!("/api/projects/{project}/outputs/rds_endpoint")).await;
    assert_eq!(out["phase_number"], 2);
}

#[tokio::test]
async fn task_detail_renders_action_links() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (_, detail) = post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[1])).await;
    let intake = task_id(&detail, "intake-form");

    let (status, body) = get(app.clone(), &format!("/api/tasks/{intake}")).await;
    assert_eq!(status, StatusCode::OK);
    let url = body["actions"][0]["url"].as_str().unwrap();
    assert!(url.contains("pid=CLM"), "{url}");
    assert!(url.ends_with("Onboarding+intake+for+pega-claims-dev"), "{url}");

    let action = body["actions"][0]["action_id"].as_u64().unwrap();
    let (status, link) = get(app, &format!("/api/actions/{action}/link")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(link["url"], url);
}

#[tokio::test]
async fn logs_round_trip_and_empty_note_is_400() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (_, detail) = post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[1])).await;
    let intake = task_id(&detail, "intake-form");
    let uri = format!("/api/tasks/{intake}/logs");

    let (status, log) = post_json(app.clone(), &uri, json!({ "note": "ticket CLM-12 filed", "author": "ana" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(log["log_type"], "note");
    assert_eq!(log["author"], "ana");

    let (status, _) = post_json(app.clone(), &uri, json!({ "note": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, logs) = get(app, &uri).await;
    assert_eq!(logs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn reopen_requires_completed_task() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (_, detail) = post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[1])).await;
    let intake = task_id(&detail, "intake-form");

    let (status, _) = post_json(app, &format!("/api/tasks/{intake}/reopen"), json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn complete_and_reopen_accept_an_empty_body() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (_, detail) = post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[1])).await;
    let intake = task_id(&detail, "intake-form");

    // No body and no content type: the state machine answers, not the extractor.
    for action in ["complete", "reopen"] {
        let (status, body) = send(app.clone(), "POST", &format!("/api/tasks/{intake}/{action}"), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{action}: {body}");
        assert!(body["error"].as_str().unwrap().contains("invalid transition"), "{body}");
    }

    send(app.clone(), "POST", &format!("/api/tasks/{intake}/start"), None).await;
    let (status, body) = send(app, "POST", &format!("/api/tasks/{intake}/complete"), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("unchecked"), "{body}");
}

#[tokio::test]
async fn task_list_filters_by_query() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (_, a) = post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[1, 2])).await;
    let (_, b) = post_json(app.clone(), "/api/projects", meta("pega-billing-dev", &[2])).await;
    let a_id = a["id"].as_u64().unwrap();
    let b_id = b["id"].as_u64().unwrap();
    let intake = task_id(&a, "intake-form");
    post_json(app.clone(), &format!("/api/tasks/{intake}/start"), json!({})).await;

    let (status, all) = get(app.clone(), "/api/tasks").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 24);
    assert_eq!(all[0]["project_name"], "pega-billing-dev");

    let (_, rows) = get(app.clone(), &format!("/api/tasks?project_id={b_id}")).await;
    assert_eq!(rows.as_array().unwrap().len(), 5);

    let (_, rows) = get(app.clone(), &format!("/api/tasks?project_id={a_id}&phase=2")).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|t| t["phase_number"] == 2 && t["project_id"] == a_id));

    let (_, rows) = get(app.clone(), "/api/tasks?status=in_progress").await;
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["key"], "intake-form");

    let (_, rows) = get(app.clone(), "/api/tasks?ownership=App%20Team&phase=1").await;
    let rows = rows.as_array().unwrap();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|t| t["ownership"] == "App Team"));

    let (status, _) = get(app.clone(), "/api/tasks?phase=10").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(app, "/api/tasks?project_id=999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn outputs_upsert_and_export() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (_, detail) = post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[2])).await;
    let id = detail["id"].as_u64().unwrap();

    let (status, _) = get(app.clone(), &format!("/api/projects/{id}/outputs/vpc_id")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    put_json(app.clone(), &format!("/api/projects/{id}/outputs/vpc_id"), json!({ "value": "vpc-1" })).await;
    put_json(app.clone(), &format!("/api/projects/{id}/outputs/namespace"), json!({ "value": "claims" })).await;
    let (status, out) = put_json(
        app.clone(),
        &format!("/api/projects/{id}/outputs/vpc_id"),
        json!({ "value": "vpc-2", "phase_number": 2 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out["value"], "vpc-2");

    let (_, list) = get(app.clone(), &format!("/api/projects/{id}/outputs")).await;
    let keys: Vec<&str> = list.as_array().unwrap().iter().map(|o| o["key"].as_str().unwrap()).collect();
    assert_eq!(keys, vec!["vpc_id", "namespace"]);

    let (status, export) = get(app.clone(), &format!("/api/projects/{id}/export")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(export["project"], "pega-claims-dev");
    assert_eq!(export["environment"], "dev");

    let (status, _) = get(app, &format!("/api/projects/{id}/export?format=xml")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_output_key_is_400() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (_, detail) = post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[1])).await;
    let id = detail["id"].as_u64().unwrap();
    let (status, _) = put_json(app, &format!("/api/projects/{id}/outputs/%7Bbad%7D"), json!({ "value": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn output_phase_outside_range_is_400() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (_, detail) = post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[1])).await;
    let id = detail["id"].as_u64().unwrap();
    let uri = format!("/api/projects/{id}/outputs/vpc_id");

    let (status, body) = put_json(app.clone(), &uri, json!({ "value": "vpc-1", "phase_number": 12 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("phase 12"), "{body}");
    let (status, _) = get(app, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn recompute_is_idempotent_and_stats_count_tasks() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (_, detail) = post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[1])).await;
    let id = detail["id"].as_u64().unwrap();
    let phase = detail["phases"][0]["id"].as_u64().unwrap();

    let (_, first) = post_json(app.clone(), &format!("/api/projects/{id}/recompute"), json!({})).await;
    let (_, second) = post_json(app.clone(), &format!("/api/projects/{id}/recompute"), json!({})).await;
    assert_eq!(first, second);

    let (status, p) = post_json(app.clone(), &format!("/api/phases/{phase}/recompute"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(p["status"], "pending");

    let (status, stats) = get(app, &format!("/api/projects/{id}/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["by_phase"][0]["total"], 14);
    assert_eq!(stats["by_phase"][0]["completed"], 0);
    assert_eq!(stats["timeline"][0]["phase_number"], 1);
    assert_eq!(stats["timeline"][0]["target_start"], "2026-01-05");
    assert_eq!(stats["timeline"][0]["target_end"], "2026-01-26");
    assert_eq!(stats["timeline"][0]["status"], "pending");
}

#[tokio::test]
async fn graph_reports_nodes_and_edges() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (_, detail) = post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[1, 2, 3])).await;
    let id = detail["id"].as_u64().unwrap();

    let (status, graph) = get(app.clone(), &format!("/api/projects/{id}/graph")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(graph["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(graph["nodes"][0]["total"], 14);
    assert_eq!(graph["nodes"][0]["percent"], 0);
    let edges = graph["edges"].as_array().unwrap();
    assert_eq!(edges.len(), 2);
    assert_eq!(edges[0], json!({ "from": 1, "to": 2, "from_status": "pending" }));

    let (status, _) = get(app, "/api/projects/999/graph").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deadlines_upsert_and_feed_the_variance_report() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let (_, detail) = post_json(app.clone(), "/api/projects", meta("pega-claims-dev", &[1, 2])).await;
    let id = detail["id"].as_u64().unwrap();
    let phase = detail["phases"][0]["id"].as_u64().unwrap();
    let intake = task_id(&detail, "intake-form");
    let uri = format!("/api/phases/{phase}/deadline");

    let (status, row) = post_json(
        app.clone(),
        &uri,
        json!({ "agreed_date": "2026-02-01", "actual_date": "2026-02-03" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{row}");
    assert_eq!(row["ownership"], "Platform Team");
    assert_eq!(row["variance_days"], 2);

    // Same owner again replaces the row.
    post_json(
        app.clone(),
        &uri,
        json!({ "ownership": "Platform Team", "agreed_date": "2026-02-01", "actual_date": "2026-02-09" }),
    )
    .await;
    post_json(
        app.clone(),
        &uri,
        json!({ "ownership": "App Team", "agreed_date": "2026-02-01", "actual_date": "2026-01-30" }),
    )
    .await;
    let (_, rows) = get(app.clone(), &format!("/api/phases/{phase}/deadlines")).await;
    assert_eq!(rows.as_array().unwrap().len(), 2);

    let (status, task_row) = post_json(
        app.clone(),
        &format!("/api/tasks/{intake}/deadline"),
        json!({ "planned_date": "2026-01-10", "agreed_date": "2026-01-12" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task_row["variance_days"], Value::Null);

    let (status, report) = get(app.clone(), &format!("/api/projects/{id}/variance")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["phase_deadlines"].as_array().unwrap().len(), 2);
    assert_eq!(report["task_deadlines"].as_array().unwrap().len(), 1);
    assert_eq!(report["stats"]["total_deadlines"], 2);
    assert_eq!(report["stats"]["on_time"], 1);
    assert_eq!(report["stats"]["minor_slip"], 0);
    assert_eq!(report["stats"]["major_slip"], 1);
    assert_eq!(report["stats"]["avg_variance"], 3.0);

    let (status, _) = post_json(app, "/api/phases/999/deadline", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
