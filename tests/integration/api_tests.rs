//! API integration tests
//!
//! These run against a live server with a freshly bootstrapped admin account.

use reqwest::Client;
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";

/// Credentials from config/default.toml
const ADMIN_USERNAME: &str = "admin";
const ADMIN_PASSWORD: &str = "change-me-now";

/// Helper to get an authenticated client
async fn get_auth_token(client: &Client) -> String {
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "username": ADMIN_USERNAME,
            "password": ADMIN_PASSWORD
        }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

/// Serial numbers unique per test run
fn unique_sr_no(prefix: &str) -> String {
    format!("{}-{}", prefix, chrono::Utc::now().timestamp_micros())
}

async fn create_book(client: &Client, token: &str, name: &str, sr_no: &str) -> Value {
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(token)
        .json(&json!({
            "name": name,
            "department": "Integration Tests",
            "sr_no": sr_no
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);
    response.json().await.expect("Failed to parse response")
}

async fn create_reservation(client: &Client, token: &str, reserver_id: &str, sr_no: &str) -> Value {
    let response = client
        .post(format!("{}/reservations", BASE_URL))
        .bearer_auth(token)
        .json(&json!({
            "reserver_name": "Integration Reader",
            "reserver_id": reserver_id,
            "reserver_role": "student",
            "book_sr_no": sr_no
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);
    response.json().await.expect("Failed to parse response")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_login() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "username": ADMIN_USERNAME,
            "password": ADMIN_PASSWORD
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["role"], "admin");
    assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "username": ADMIN_USERNAME,
            "password": "wrong"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/reservations", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_reservation_lifecycle() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let reserver_id = unique_sr_no("STU");

    let sr_no = unique_sr_no("LIFE");
    let book = create_book(&client, &token, "Lifecycle Book", &sr_no).await;
    assert_eq!(book["status"], "Available");
    let book_id = book["id"].as_i64().unwrap();

    let reservation = create_reservation(&client, &token, &reserver_id, &sr_no).await;
    assert_eq!(reservation["status"], "pending");
    assert_eq!(reservation["book_name"], "Lifecycle Book");
    assert_eq!(reservation["time_remaining"]["expired"], false);
    let reservation_id = reservation["id"].as_i64().unwrap();

    // Confirm allocates the book
    let response = client
        .post(format!("{}/reservations/{}/confirm", BASE_URL, reservation_id))
        .bearer_auth(&token)
        .json(&json!({}))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let allocation: Value = response.json().await.unwrap();
    assert_eq!(allocation["reservation"]["status"], "confirmed");
    assert_eq!(allocation["book"]["status"], "Allocated");

    // Confirming again is an invalid transition
    let response = client
        .post(format!("{}/reservations/{}/confirm", BASE_URL, reservation_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 422);

    // Cancel archives it and frees the book
    let response = client
        .post(format!("{}/reservations/{}/cancel", BASE_URL, reservation_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["outcome"], "archived");
    assert_eq!(outcome["reservation"]["status"], "deleted");

    let response = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    let book: Value = response.json().await.unwrap();
    assert_eq!(book["status"], "Available");

    let response = client
        .get(format!("{}/reservations/archive", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    let archive: Value = response.json().await.unwrap();
    assert!(archive
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r["id"].as_i64() == Some(reservation_id)));
}

#[tokio::test]
#[ignore]
async fn test_confirm_conflict_then_force() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let reserver_id = unique_sr_no("STU");

    let first_sr = unique_sr_no("FIRST");
    let second_sr = unique_sr_no("SECOND");
    create_book(&client, &token, "First Book", &first_sr).await;
    create_book(&client, &token, "Second Book", &second_sr).await;

    let first = create_reservation(&client, &token, &reserver_id, &first_sr).await;
    let second = create_reservation(&client, &token, &reserver_id, &second_sr).await;

    let response = client
        .post(format!("{}/reservations/{}/confirm", BASE_URL, first["id"]))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let response = client
        .post(format!("{}/reservations/{}/confirm", BASE_URL, second["id"]))
        .bearer_auth(&token)
        .json(&json!({ "force": false }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("First Book"));

    let response = client
        .post(format!("{}/reservations/{}/confirm", BASE_URL, second["id"]))
        .bearer_auth(&token)
        .json(&json!({ "force": true }))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let allocation: Value = response.json().await.unwrap();
    assert_eq!(allocation["overrode_conflict"], true);
}

#[tokio::test]
#[ignore]
async fn test_unknown_serial_number_is_rejected() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .post(format!("{}/reservations", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "reserver_name": "Integration Reader",
            "reserver_id": "STU-0",
            "reserver_role": "student",
            "book_sr_no": unique_sr_no("MISSING")
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 422);
}

#[tokio::test]
#[ignore]
async fn test_sweep_and_consistency() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .post(format!("{}/reservations/sweep", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert!(body["removed"].is_u64());

    let response = client
        .get(format!("{}/reservations/consistency", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let report: Value = response.json().await.unwrap();
    assert!(report["orphaned_allocations"].is_array());
}

#[tokio::test]
#[ignore]
async fn test_stats() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/stats", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["books"]["total"].is_number());
    assert!(body["books"]["allocation_rate"].is_number());
    assert!(body["reservations"]["pending"].is_number());
    assert!(body["archive"]["deleted"].is_number());
}
