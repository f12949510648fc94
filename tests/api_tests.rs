// tests/api_tests.rs

mod common;

use common::spawn_app;
use serde_json::{Value, json};

#[tokio::test]
async fn health_check_404() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/random_path_that_does_not_exist"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn register_works() {
    let app = spawn_app().await;
    let unique_name = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);

    let response = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({ "username": unique_name, "password": "password123" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 201);
    let user: Value = response.json().await.unwrap();
    assert_eq!(user["role"], "student");
    assert!(user.get("password").is_none(), "password hash must not leak");
}

#[tokio::test]
async fn register_fails_validation() {
    let app = spawn_app().await;

    // Username too short
    let response = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({ "username": "yo", "password": "password123" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn register_duplicate_conflicts() {
    let app = spawn_app().await;
    let body = json!({ "username": "duplicate", "password": "password123" });

    let first = app.client.post(app.url("/api/auth/register")).json(&body).send().await.unwrap();
    assert_eq!(first.status().as_u16(), 201);

    let second = app.client.post(app.url("/api/auth/register")).json(&body).send().await.unwrap();
    assert_eq!(second.status().as_u16(), 409);
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let app = spawn_app().await;
    app.client
        .post(app.url("/api/auth/register"))
        .json(&json!({ "username": "alice", "password": "password123" }))
        .send()
        .await
        .unwrap();

    let response = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": "alice", "password": "wrong" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/api/practices?course_id=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let response = app.get("/api/practices?course_id=1", "not-a-token").await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn students_cannot_manage() {
    let app = spawn_app().await;
    let (_, student) = app.user_with_role("student").await;

    let response = app
        .post("/api/bank/categories", &student, json!({ "course_id": 1, "name": "Mine" }))
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .post(
            "/api/practices",
            &student,
            json!({
                "course_id": 1,
                "name": "Sneaky",
                "behaviours": ["adaptive"],
                "categories": [1]
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app.get("/api/admin/users", &student).await;
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn bank_category_rules() {
    let app = spawn_app().await;
    let (_, teacher) = app.user_with_role("teacher").await;

    let geo = app.category(&teacher, 1, 0, "Geography").await;
    let capitals = app.category(&teacher, 1, geo, "Capitals").await;
    app.question(&teacher, capitals, "Paris", 1.0).await;

    // Parent from another course bank
    let response = app
        .post(
            "/api/bank/categories",
            &teacher,
            json!({ "course_id": 2, "parent": geo, "name": "Elsewhere" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    // Still holds a subcategory / a question
    let response = app.delete(&format!("/api/bank/categories/{}", geo), &teacher).await;
    assert_eq!(response.status().as_u16(), 409);
    let response = app.delete(&format!("/api/bank/categories/{}", capitals), &teacher).await;
    assert_eq!(response.status().as_u16(), 409);

    let listed: Vec<Value> = app
        .get("/api/bank/categories?course_id=1", &teacher)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    let capitals_row = listed.iter().find(|c| c["id"] == capitals).unwrap();
    assert_eq!(capitals_row["parent"], geo);
    assert_eq!(capitals_row["question_count"], 1);
}

#[tokio::test]
async fn question_text_is_sanitised() {
    let app = spawn_app().await;
    let (_, teacher) = app.user_with_role("teacher").await;
    let cat = app.category(&teacher, 1, 0, "Safety").await;

    let response = app
        .post(
            "/api/bank/questions",
            &teacher,
            json!({
                "category_id": cat,
                "name": "XSS",
                "question_text": "<p>Hi</p><script>alert(1)</script>",
                "answer": "hi"
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let id = response.json::<Value>().await.unwrap()["id"].as_i64().unwrap();

    let stored: String = sqlx::query_scalar("SELECT question_text FROM questions WHERE id = ?1")
        .bind(id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(stored, "<p>Hi</p>");
}

#[tokio::test]
async fn practice_category_trees() {
    let app = spawn_app().await;
    let (_, teacher) = app.user_with_role("teacher").await;
    let (_, student) = app.user_with_role("student").await;

    let geo = app.category(&teacher, 1, 0, "Geography").await;
    let capitals = app.category(&teacher, 1, geo, "Capitals").await;
    let rivers = app.category(&teacher, 1, geo, "Rivers").await;
    let history = app.category(&teacher, 1, 0, "History").await;

    let practice = app.practice(&teacher, 1, &["adaptive"], &[capitals]).await;

    // Students see only the offered branch
    let offered: Vec<Value> = app
        .get(&format!("/api/practices/{}/categories", practice), &student)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(offered.len(), 1);
    assert_eq!(offered[0]["id"], geo);
    assert_eq!(offered[0]["checked"], false);
    let children = offered[0]["children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["id"], capitals);
    assert_eq!(children[0]["checked"], true);

    // Teachers see the whole course tree
    let full: Vec<Value> = app
        .get(&format!("/api/practices/{}/settings/categories", practice), &teacher)
        .await
        .json()
        .await
        .unwrap();
    let root_ids: Vec<i64> = full.iter().map(|n| n["id"].as_i64().unwrap()).collect();
    assert_eq!(root_ids, vec![geo, history]);
    let geo_children: Vec<i64> = full[0]["children"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_i64().unwrap())
        .collect();
    assert_eq!(geo_children, vec![capitals, rivers]);

    let response = app
        .get(&format!("/api/practices/{}/settings/categories", practice), &student)
        .await;
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn practice_crud() {
    let app = spawn_app().await;
    let (_, teacher) = app.user_with_role("teacher").await;
    let (_, student) = app.user_with_role("student").await;

    let a = app.category(&teacher, 1, 0, "A").await;
    let b = app.category(&teacher, 1, 0, "B").await;
    let foreign = app.category(&teacher, 2, 0, "Other course").await;

    // Categories of another course are refused
    let response = app
        .post(
            "/api/practices",
            &teacher,
            json!({
                "course_id": 1,
                "name": "Bad",
                "behaviours": ["adaptive"],
                "categories": [foreign]
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    // Empty behaviour list is refused
    let response = app
        .post(
            "/api/practices",
            &teacher,
            json!({ "course_id": 1, "name": "Bad", "behaviours": [], "categories": [a] }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let id = app
        .practice(&teacher, 1, &["adaptive", "adaptive", "deferredfeedback"], &[a, a])
        .await;

    let practice: Value = app.get(&format!("/api/practices/{}", id), &student).await.json().await.unwrap();
    assert_eq!(practice["behaviours"], json!(["adaptive", "deferredfeedback"]));
    assert_eq!(practice["categories"], json!([a]));
    assert_eq!(practice["intro"], "<p>Warm up</p>");

    let response = app
        .client
        .put(app.url(&format!("/api/practices/{}", id)))
        .bearer_auth(&teacher)
        .json(&json!({
            "name": "Renamed",
            "behaviours": ["immediatefeedback"],
            "categories": [b]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let practice: Value = app.get(&format!("/api/practices/{}", id), &student).await.json().await.unwrap();
    assert_eq!(practice["name"], "Renamed");
    assert_eq!(practice["categories"], json!([b]));

    let listed: Vec<Value> = app.get("/api/practices?course_id=1", &student).await.json().await.unwrap();
    assert_eq!(listed.len(), 1);

    let response = app.delete(&format!("/api/practices/{}", id), &teacher).await;
    assert_eq!(response.status().as_u16(), 204);
    let response = app.get(&format!("/api/practices/{}", id), &student).await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn admin_manages_users() {
    let app = spawn_app().await;
    let (admin_id, admin) = app.user_with_role("admin").await;
    let (_, teacher) = app.user_with_role("teacher").await;

    let response = app.get("/api/admin/users", &teacher).await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .post(
            "/api/admin/users",
            &admin,
            json!({ "username": "newteacher", "password": "secret", "role": "teacher" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let users: Vec<Value> = app.get("/api/admin/users", &admin).await.json().await.unwrap();
    let created = users.iter().find(|u| u["username"] == "newteacher").unwrap();
    assert_eq!(created["role"], "teacher");

    let response = app.delete(&format!("/api/admin/users/{}", admin_id), &admin).await;
    assert_eq!(response.status().as_u16(), 400);
}
