// tests/exam_flow_tests.rs

use exam_portal::{config::Config, models::question::QuestionKind, routes, state::AppState};
use sqlx::{PgPool, postgres::PgPoolOptions, types::Json};

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
async fn spawn_app() -> String {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        admin_student_number: None,
        admin_password: None,
    };

    let state = AppState { pool, config };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

async fn test_pool() -> PgPool {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test DB")
}

fn unique(prefix: &str) -> String {
    format!("{}{}", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

/// Logs in (auto-provisioning) and returns (token, student id).
async fn login_student(
    client: &reqwest::Client,
    address: &str,
    student_number: &str,
) -> (String, i64) {
    let body = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "student_number": student_number }))
        .send()
        .await
        .expect("Login failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse login json");

    let token = body["token"].as_str().expect("Token not found").to_string();
    let id = body["student"]["id"].as_i64().expect("Student id not found");
    (token, id)
}

/// Seeds an admin account directly and logs it in for a token.
async fn admin_token(pool: &PgPool, client: &reqwest::Client, address: &str) -> String {
    let student_number = unique("adm");
    let hash = exam_portal::utils::hash::hash_password("admin-pass").unwrap();

    sqlx::query("INSERT INTO students (student_number, role, password) VALUES ($1, 'admin', $2)")
        .bind(&student_number)
        .bind(&hash)
        .execute(pool)
        .await
        .unwrap();

    let body = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "student_number": student_number,
            "password": "admin-pass"
        }))
        .send()
        .await
        .expect("Admin login failed")
        .json::<serde_json::Value>()
        .await
        .unwrap();

    body["token"].as_str().expect("Admin token").to_string()
}

#[allow(clippy::too_many_arguments)]
async fn seed_question(
    pool: &PgPool,
    kind: QuestionKind,
    prompt: &str,
    options: &[&str],
    correct_index: Option<i32>,
    correct_text: Option<&str>,
    points: i32,
    course_name: &str,
) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO questions (prompt, kind, options, correct_index, correct_text, points, course_name) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
    )
    .bind(prompt)
    .bind(kind)
    .bind(Json(
        options.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
    ))
    .bind(correct_index)
    .bind(correct_text)
    .bind(points)
    .bind(course_name)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn set_biodata(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    student_id: i64,
    class_name: &str,
    course: &str,
) {
    let response = client
        .put(format!("{}/api/students/{}", address, student_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "full_name": "Test Student",
            "class_name": class_name,
            "course": course
        }))
        .send()
        .await
        .expect("Biodata update failed");
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn exam_routes_require_a_token() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/exam/start", address))
        .json(&serde_json::json!({ "student_id": 1 }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn login_provisions_student_and_biodata_completes() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let student_number = unique("s_");

    let body = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "student_number": student_number }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();

    assert_eq!(body["has_biodata"], false);
    assert_eq!(body["is_admin"], false);
    let token = body["token"].as_str().unwrap().to_string();
    let id = body["student"]["id"].as_i64().unwrap();

    set_biodata(&client, &address, &token, id, "Class 1A", "Networking").await;

    let again = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "student_number": student_number }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();

    assert_eq!(again["has_biodata"], true);
    // The same account is resumed, not a duplicate.
    assert_eq!(again["student"]["id"].as_i64().unwrap(), id);
}

#[tokio::test]
async fn full_exam_flow_scores_and_locks_the_attempt() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let course = unique("course_");
    let choice_id = seed_question(
        &pool,
        QuestionKind::SingleChoice,
        "Pick b",
        &["a", "b", "c"],
        Some(1),
        None,
        10,
        &course,
    )
    .await;
    let ordering_id = seed_question(
        &pool,
        QuestionKind::Ordering,
        "Order the steps",
        &["one", "two", "three"],
        None,
        None,
        10,
        &course,
    )
    .await;
    let short_id = seed_question(
        &pool,
        QuestionKind::ShortAnswer,
        "Name the device",
        &[],
        None,
        Some("Router"),
        10,
        &course,
    )
    .await;
    let matching_id = seed_question(
        &pool,
        QuestionKind::Matching,
        "Match capitals",
        &[],
        None,
        Some(r#"{"Paris":"France","Tokyo":"Japan"}"#),
        10,
        &course,
    )
    .await;
    let essay_id = seed_question(
        &pool,
        QuestionKind::Essay,
        "Explain packet switching",
        &[],
        None,
        Some("packets routed independently across shared links"),
        10,
        &course,
    )
    .await;

    let student_number = unique("s_");
    let (token, student_id) = login_student(&client, &address, &student_number).await;
    set_biodata(&client, &address, &token, student_id, "Class 1A", &course).await;

    // The public question list is filtered by course and strips answer keys.
    let questions = client
        .get(format!(
            "{}/api/exam/questions?course_name={}",
            address, course
        ))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json::<Vec<serde_json::Value>>()
        .await
        .unwrap();

    assert_eq!(questions.len(), 5);
    for q in &questions {
        assert!(q.get("correct_index").is_none());
        assert!(q.get("correct_text").is_none());
        if q["id"].as_i64() == Some(matching_id) {
            assert_eq!(q["options"], serde_json::json!(["Paris", "Tokyo"]));
            assert_eq!(q["right_values"], serde_json::json!(["France", "Japan"]));
        }
    }

    // Start is idempotent while the attempt is active.
    let started = client
        .post(format!("{}/api/exam/start", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "student_id": student_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(started.status().as_u16(), 201);
    let submission = started.json::<serde_json::Value>().await.unwrap();
    let submission_id = submission["id"].as_i64().unwrap();
    assert_eq!(submission["is_completed"], false);

    let resumed = client
        .post(format!("{}/api/exam/start", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "student_id": student_id }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(resumed["id"].as_i64().unwrap(), submission_id);

    // Submit a fully correct answer map.
    let mut answers = serde_json::Map::new();
    answers.insert(choice_id.to_string(), serde_json::json!(1));
    answers.insert(
        ordering_id.to_string(),
        serde_json::json!(["one", "two", "three"]),
    );
    answers.insert(short_id.to_string(), serde_json::json!("  router "));
    answers.insert(
        matching_id.to_string(),
        serde_json::json!({"Paris": "france", "Tokyo": "JAPAN"}),
    );
    answers.insert(
        essay_id.to_string(),
        serde_json::json!("Each packet is routed independently."),
    );

    let submitted = client
        .post(format!("{}/api/exam/{}/submit", address, submission_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "answers": answers }))
        .send()
        .await
        .unwrap();
    assert_eq!(submitted.status().as_u16(), 200);
    let completed = submitted.json::<serde_json::Value>().await.unwrap();
    assert_eq!(completed["score"].as_i64().unwrap(), 100);
    assert_eq!(completed["is_completed"], true);
    let end_time = completed["end_time"].as_str().unwrap().to_string();

    // A second submit loses the race: the stored result stands.
    let mut wrong = serde_json::Map::new();
    wrong.insert(choice_id.to_string(), serde_json::json!(0));
    let resubmitted = client
        .post(format!("{}/api/exam/{}/submit", address, submission_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "answers": wrong }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(resubmitted["score"].as_i64().unwrap(), 100);
    assert_eq!(resubmitted["end_time"].as_str().unwrap(), end_time);

    // The result endpoint reports the completed attempt.
    let result = client
        .get(format!("{}/api/exam/{}/result", address, submission_id))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(result["score"].as_i64().unwrap(), 100);

    // A completed, non-archived attempt blocks a new start.
    let blocked = client
        .post(format!("{}/api/exam/start", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "student_id": student_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(blocked.status().as_u16(), 403);
}

#[tokio::test]
async fn retake_requires_archive() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let course = unique("course_");
    let choice_id = seed_question(
        &pool,
        QuestionKind::SingleChoice,
        "Pick a",
        &["a", "b"],
        Some(0),
        None,
        10,
        &course,
    )
    .await;

    let student_number = unique("s_");
    let (token, student_id) = login_student(&client, &address, &student_number).await;
    set_biodata(&client, &address, &token, student_id, "Class 1A", &course).await;

    let submission = client
        .post(format!("{}/api/exam/start", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "student_id": student_id }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let first_id = submission["id"].as_i64().unwrap();

    let mut answers = serde_json::Map::new();
    answers.insert(choice_id.to_string(), serde_json::json!(0));
    client
        .post(format!("{}/api/exam/{}/submit", address, first_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "answers": answers }))
        .send()
        .await
        .unwrap();

    let blocked = client
        .post(format!("{}/api/exam/start", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "student_id": student_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(blocked.status().as_u16(), 403);

    // An administrator archives the attempt ("allow retake")...
    let admin = admin_token(&pool, &client, &address).await;
    let archived = client
        .delete(format!("{}/api/admin/submissions/{}", address, first_id))
        .header("Authorization", format!("Bearer {}", admin))
        .send()
        .await
        .unwrap();
    assert_eq!(archived.status().as_u16(), 204);

    // ...and a fresh attempt starts with a new id.
    let restarted = client
        .post(format!("{}/api/exam/start", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "student_id": student_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(restarted.status().as_u16(), 201);
    let second = restarted.json::<serde_json::Value>().await.unwrap();
    assert_ne!(second["id"].as_i64().unwrap(), first_id);
    assert_eq!(second["is_completed"], false);
}

#[tokio::test]
async fn submit_without_course_questions_is_a_client_error() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let student_number = unique("s_");
    let (token, student_id) = login_student(&client, &address, &student_number).await;
    // A course nobody has questions for.
    set_biodata(
        &client,
        &address,
        &token,
        student_id,
        "Class 1A",
        &unique("ghost_"),
    )
    .await;

    let submission = client
        .post(format!("{}/api/exam/start", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "student_id": student_id }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let submission_id = submission["id"].as_i64().unwrap();

    let response = client
        .post(format!("{}/api/exam/{}/submit", address, submission_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "answers": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body = response.json::<serde_json::Value>().await.unwrap();
    assert!(
        body["error"].as_str().unwrap().contains("ghost_"),
        "error should name the missing course"
    );
}
