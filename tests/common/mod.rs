// tests/common/mod.rs

#![allow(dead_code)]

use qpractice::{config::Config, routes, state::AppState};
use serde_json::{Value, json};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

pub struct TestApp {
    pub address: String,
    pub pool: SqlitePool,
    pub client: reqwest::Client,
}

/// Spawns the app on a random port over a fresh in-memory database.
pub async fn spawn_app() -> TestApp {
    // A single connection that never closes keeps the in-memory database alive.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        port: 0,
        admin_username: None,
        admin_password: None,
        system_context: true,
    };

    let state = AppState {
        pool: pool.clone(),
        config,
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        pool,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Registers a fresh user, gives it `role` and returns `(user_id, token)`.
    pub async fn user_with_role(&self, role: &str) -> (i64, String) {
        let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
        let password = "password123";

        let user: Value = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Register failed")
            .json()
            .await
            .unwrap();
        let user_id = user["id"].as_i64().expect("Missing user id");

        if role != "student" {
            sqlx::query("UPDATE users SET role = ?1 WHERE id = ?2")
                .bind(role)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .unwrap();
        }

        let login: Value = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Login failed")
            .json()
            .await
            .unwrap();

        (user_id, login["token"].as_str().expect("Token not found").to_string())
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Creates a category through the API and returns its id.
    pub async fn category(&self, token: &str, course_id: i64, parent: i64, name: &str) -> i64 {
        let resp = self
            .post(
                "/api/bank/categories",
                token,
                json!({ "course_id": course_id, "parent": parent, "name": name }),
            )
            .await;
        assert_eq!(resp.status().as_u16(), 201, "category {} not created", name);
        resp.json::<Value>().await.unwrap()["id"].as_i64().unwrap()
    }

    /// Creates a question through the API and returns its id.
    pub async fn question(&self, token: &str, category_id: i64, answer: &str, mark: f64) -> i64 {
        let resp = self
            .post(
                "/api/bank/questions",
                token,
                json!({
                    "category_id": category_id,
                    "name": format!("Q in {}", category_id),
                    "question_text": "<p>What is it?</p>",
                    "answer": answer,
                    "default_mark": mark
                }),
            )
            .await;
        assert_eq!(resp.status().as_u16(), 201);
        resp.json::<Value>().await.unwrap()["id"].as_i64().unwrap()
    }

    /// Creates a practice through the API and returns its id.
    pub async fn practice(&self, token: &str, course_id: i64, behaviours: &[&str], categories: &[i64]) -> i64 {
        let resp = self
            .post(
                "/api/practices",
                token,
                json!({
                    "course_id": course_id,
                    "name": "Weekly practice",
                    "intro": "<p>Warm up</p>",
                    "behaviours": behaviours,
                    "categories": categories
                }),
            )
            .await;
        assert_eq!(resp.status().as_u16(), 201);
        resp.json::<Value>().await.unwrap()["id"].as_i64().unwrap()
    }

    /// Starts a session and returns its id.
    pub async fn start(&self, token: &str, practice_id: i64, behaviour: &str, categories: &[i64]) -> i64 {
        let resp = self
            .post(
                &format!("/api/practices/{}/sessions", practice_id),
                token,
                json!({ "behaviour": behaviour, "categories": categories }),
            )
            .await;
        assert_eq!(resp.status().as_u16(), 201);
        resp.json::<Value>().await.unwrap()["id"].as_i64().unwrap()
    }
}
