use super::*;
use crate::config::LessonPlanConfig;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_state(lesson_plan_url: &str) -> AppState {
    test_state_with_timeout(lesson_plan_url, 5)
}

fn test_state_with_timeout(lesson_plan_url: &str, timeout_secs: u64) -> AppState {
    let config = LessonPlanConfig {
        base_url: lesson_plan_url.to_string(),
        timeout_secs,
        sub_subject: "Civics".to_string(),
    };
    AppState {
        db: Arc::new(Database::open_in_memory().unwrap()),
        lesson_plans: LessonPlanClient::new(&config).unwrap(),
    }
}

async fn send(state: &AppState, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, body)
}

async fn planned_session(state: &AppState, topics: &[&str]) -> i64 {
    let plan: Vec<Value> = topics
        .iter()
        .map(|t| json!({ "topicName": t, "concepts": [format!("{t} intro")] }))
        .collect();
    let (status, body) = send(
        state,
        Method::POST,
        "/sessions",
        Some(json!({
            "chapterName": "Democracy",
            "teacherName": "S. Nair",
            "className": "8",
            "sectionName": "C",
            "subjectName": "Civics",
            "plan": plan,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health() {
    let state = test_state("http://127.0.0.1:1");
    let (status, body) = send(&state, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_allocate_endpoint() {
    let state = test_state("http://127.0.0.1:1");
    let (status, body) = send(
        &state,
        Method::POST,
        "/lesson-plans/allocate",
        Some(json!({
            "duration": 10,
            "topics": [{ "topic": "Rights", "concepts": ["a", "b", "c"], "conceptDetails": ["", "", ""] }]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let concepts = body["topics"][0]["concepts"].as_array().unwrap();
    let durations: Vec<u64> = concepts.iter().map(|c| c["duration"].as_u64().unwrap()).collect();
    assert_eq!(durations, vec![3, 3, 4]);
    assert_eq!(concepts[0]["concept"], "a");
    assert_eq!(concepts[0]["detail"], "");
}

#[tokio::test]
async fn test_allocate_rejects_empty_concepts() {
    let state = test_state("http://127.0.0.1:1");
    let (status, body) = send(
        &state,
        Method::POST,
        "/lesson-plans/allocate",
        Some(json!({ "duration": 30, "topics": [{ "topic": "Rights", "concepts": [] }] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad Request");
    assert!(body["message"].as_str().unwrap().contains("Rights"));
}

#[tokio::test]
async fn test_session_lifecycle_over_http() {
    let state = test_state("http://127.0.0.1:1");
    let id = planned_session(&state, &["T1", "T2", "T3"]).await;

    // ending before starting is refused
    let end_body = json!({
        "completedTopics": ["T2"],
        "incompleteTopics": ["whatever the client thinks"],
        "observations": "Lively discussion",
        "absentees": ["Kiran"],
        "assignmentDetails": "Worksheet 3"
    });
    let (status, _) = send(&state, Method::POST, &format!("/sessions/{id}/end"), Some(end_body.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&state, Method::POST, &format!("/sessions/{id}/start"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "in_progress");

    let (status, report) = send(&state, Method::POST, &format!("/sessions/{id}/end"), Some(end_body.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{report}");
    assert_eq!(report["completedTopics"], json!(["T2"]));
    assert_eq!(report["incompleteTopics"], json!(["T1", "T3"]));
    assert_eq!(report["absentStudents"], json!(["Kiran"]));
    assert_eq!(report["assignmentDetails"], "Worksheet 3");
    assert_eq!(report["teacherName"], "S. Nair");

    let (status, body) = send(&state, Method::POST, &format!("/sessions/{id}/end"), Some(end_body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");

    let (status, fetched) = send(&state, Method::GET, &format!("/session-reports/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, report);

    let (_, session) = send(&state, Method::GET, &format!("/sessions/{id}"), None).await;
    assert_eq!(session["status"], "ended");
    assert_eq!(session["plan"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_end_without_completed_topics() {
    let state = test_state("http://127.0.0.1:1");
    let id = planned_session(&state, &["T1"]).await;
    send(&state, Method::POST, &format!("/sessions/{id}/start"), None).await;

    let (status, body) = send(
        &state,
        Method::POST,
        &format!("/sessions/{id}/end"),
        Some(json!({ "completedTopics": [], "observations": "", "absentees": [] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("at least one topic"));
}

#[tokio::test]
async fn test_plan_entry_toggle_and_freeze() {
    let state = test_state("http://127.0.0.1:1");
    let id = planned_session(&state, &["T1", "T2"]).await;
    let (_, session) = send(&state, Method::GET, &format!("/sessions/{id}"), None).await;
    let entry_id = session["plan"][0]["id"].as_i64().unwrap();

    let uri = format!("/sessions/{id}/plan/{entry_id}");
    let (status, entry) = send(&state, Method::PUT, &uri, Some(json!({ "plannedCompleted": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entry["plannedCompleted"], true);

    send(&state, Method::POST, &format!("/sessions/{id}/start"), None).await;
    send(
        &state,
        Method::POST,
        &format!("/sessions/{id}/end"),
        Some(json!({ "completedTopics": ["T1"] })),
    )
    .await;

    let (status, _) = send(&state, Method::PUT, &uri, Some(json!({ "plannedCompleted": false }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_sessions_filter() {
    let state = test_state("http://127.0.0.1:1");
    let first = planned_session(&state, &["T1"]).await;
    planned_session(&state, &["T1"]).await;
    send(&state, Method::POST, &format!("/sessions/{first}/start"), None).await;

    let (status, body) = send(&state, Method::GET, "/sessions?status=in_progress", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body.as_array().unwrap().iter().map(|s| s["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![first]);

    let (_, all) = send(&state, Method::GET, "/sessions", None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_resources_are_404() {
    let state = test_state("http://127.0.0.1:1");

    for uri in ["/sessions/41", "/session-reports/41", "/lesson-plans/41"] {
        let (status, body) = send(&state, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["error"], "Not Found");
    }
}

#[tokio::test]
async fn test_generate_stores_upstream_output() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/generate-lesson-plan")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"lesson_plan":"1. Warm-up\n2. Discussion"}"#)
        .create_async()
        .await;
    let state = test_state(&server.url());

    let (status, body) = send(
        &state,
        Method::POST,
        "/lesson-plans/generate",
        Some(json!({
            "board": "CBSE",
            "grade": "8",
            "subject": "Social Science",
            "chapter": "Judiciary",
            "duration": 40,
            "topics": [{ "topic": "Courts", "concepts": ["role"], "conceptDetails": ["settle disputes"] }]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["lessonPlan"]["lesson_plan"], "1. Warm-up\n2. Discussion");

    let id = body["id"].as_i64().unwrap();
    let (status, stored) = send(&state, Method::GET, &format!("/lesson-plans/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["generated"], body["lessonPlan"]);
    assert_eq!(stored["request"]["subSubject"], "Civics");
    assert_eq!(stored["request"]["topics"][0]["concepts"][0]["duration"], 40);
}

#[tokio::test]
async fn test_generate_upstream_down_is_502() {
    let state = test_state("http://127.0.0.1:1");

    let (status, body) = send(
        &state,
        Method::POST,
        "/lesson-plans/generate",
        Some(json!({
            "board": "CBSE",
            "grade": "8",
            "subject": "Social Science",
            "chapter": "Judiciary",
            "duration": 40,
            "topics": [{ "topic": "Courts", "concepts": ["role"] }]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Bad Gateway");
}

#[tokio::test]
async fn test_generate_upstream_timeout_is_504() {
    // accepts connections and never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    let state = test_state_with_timeout(&format!("http://{addr}"), 1);

    let (status, body) = send(
        &state,
        Method::POST,
        "/lesson-plans/generate",
        Some(json!({
            "board": "CBSE",
            "grade": "8",
            "subject": "Social Science",
            "chapter": "Judiciary",
            "duration": 40,
            "topics": [{ "topic": "Courts", "concepts": ["role"] }]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"], "Gateway Timeout");
    assert_eq!(body["message"], "lesson-plan service timed out");
}

fn assert_bad_request(status: StatusCode, body: &Value) {
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"], "Bad Request");
    assert!(body["message"].is_string(), "{body}");
}

#[tokio::test]
async fn test_malformed_bodies_are_400_json() {
    let state = test_state("http://127.0.0.1:1");
    let id = planned_session(&state, &["T1"]).await;
    send(&state, Method::POST, &format!("/sessions/{id}/start"), None).await;

    // wrong type
    let (status, body) = send(
        &state,
        Method::POST,
        &format!("/sessions/{id}/end"),
        Some(json!({ "completedTopics": "T1" })),
    )
    .await;
    assert_bad_request(status, &body);

    // missing field
    let (status, body) = send(
        &state,
        Method::POST,
        "/lesson-plans/allocate",
        Some(json!({ "topics": [{ "topic": "Rights", "concepts": ["a"] }] })),
    )
    .await;
    assert_bad_request(status, &body);
    assert!(body["message"].as_str().unwrap().contains("duration"));

    // negative duration
    let (status, body) = send(
        &state,
        Method::POST,
        "/lesson-plans/allocate",
        Some(json!({ "duration": -5, "topics": [{ "topic": "Rights", "concepts": ["a"] }] })),
    )
    .await;
    assert_bad_request(status, &body);

    // the session is untouched by the rejected end
    let (_, session) = send(&state, Method::GET, &format!("/sessions/{id}"), None).await;
    assert_eq!(session["status"], "in_progress");
}

#[tokio::test]
async fn test_malformed_query_and_path_are_400_json() {
    let state = test_state("http://127.0.0.1:1");

    let (status, body) = send(&state, Method::GET, "/sessions?status=bogus", None).await;
    assert_bad_request(status, &body);

    let (status, body) = send(&state, Method::GET, "/sessions/abc", None).await;
    assert_bad_request(status, &body);
}
