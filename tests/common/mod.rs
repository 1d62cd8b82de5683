//! Shared test utilities

#![allow(dead_code)]

use agentmarket_assistant::{ClientContext, MemoryStore, TransportClient};
use serde_json::{Value, json};
use wiremock::MockServer;

/// Start a mock backend
pub async fn mock_backend() -> MockServer {
    MockServer::start().await
}

/// Create a context pointed at `server` with in-memory storage
#[must_use]
pub fn test_context(server: &MockServer) -> ClientContext {
    ClientContext::new(&server.uri(), MemoryStore::shared())
}

/// Create a transport pointed at `server` with in-memory storage
#[must_use]
pub fn test_transport(server: &MockServer) -> TransportClient {
    TransportClient::new(test_context(server))
}

/// Product JSON as the catalog returns it
#[must_use]
pub fn product_json(id: i64, name: &str, price: f64) -> Value {
    json!({
        "id": id,
        "name": name,
        "description": format!("{name} description"),
        "price": price,
        "stock_quantity": 3,
        "category_id": 1,
        "condition": "new",
        "is_active": true,
        "is_featured": false
    })
}

/// Seller profile JSON as the login endpoint returns it
#[must_use]
pub fn seller_json(id: i64) -> Value {
    json!({
        "id": id,
        "email": "seller@example.com",
        "username": "seller",
        "full_name": "Test Seller",
        "role": "seller",
        "is_active": true,
        "is_verified": true
    })
}
