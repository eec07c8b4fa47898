#![allow(dead_code)]

use chrono::Duration;
use reqwest::{Client, RequestBuilder, StatusCode};
use school_service::config::SchoolConfig;
use school_service::services::{JwtService, Role};
use school_service::startup::Application;
use secrecy::Secret;
use serde_json::{json, Value};

pub const TEST_JWT_SECRET: &str = "school-test-secret";
pub const ADMIN_ID: &str = "admin-1";
pub const TEACHER_ID: &str = "teacher-1";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: Client,
    jwt: JwtService,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let config = SchoolConfig::for_tests(TEST_JWT_SECRET);

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to accept connections
        let client = Client::new();
        for _ in 0..50 {
            if client
                .get(format!("{}/ready", address))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        Self {
            address,
            port,
            client,
            jwt: JwtService::new(&Secret::new(TEST_JWT_SECRET.to_string())),
        }
    }

    pub fn token(&self, user_id: &str, role: Role) -> String {
        self.jwt
            .issue_token(user_id, role, Duration::hours(1))
            .expect("Failed to issue token")
    }

    pub fn admin_token(&self) -> String {
        self.token(ADMIN_ID, Role::Admin)
    }

    pub fn teacher_token(&self) -> String {
        self.token(TEACHER_ID, Role::Teacher)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn get(&self, path: &str, token: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(token)
    }

    pub fn post(&self, path: &str, token: &str, body: &Value) -> RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(token).json(body)
    }

    pub fn put(&self, path: &str, token: &str, body: &Value) -> RequestBuilder {
        self.client.put(self.url(path)).bearer_auth(token).json(body)
    }

    pub fn delete(&self, path: &str, token: &str) -> RequestBuilder {
        self.client.delete(self.url(path)).bearer_auth(token)
    }

    pub async fn create_student(&self, first: &str, last: &str, class_name: &str) -> String {
        let response = self
            .post(
                "/api/students",
                &self.admin_token(),
                &json!({
                    "firstName": first,
                    "lastName": last,
                    "className": class_name,
                }),
            )
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status(), StatusCode::CREATED);

        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["student"]["_id"]
            .as_str()
            .expect("student id")
            .to_string()
    }

    pub async fn create_fee(&self, body: Value) -> Value {
        let response = self
            .post("/api/fees", &self.admin_token(), &body)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status(), StatusCode::CREATED);

        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["fee"].clone()
    }

    pub async fn get_json(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let response = self
            .get(path, token)
            .send()
            .await
            .expect("Failed to execute request");
        let status = response.status();
        let body = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }
}
