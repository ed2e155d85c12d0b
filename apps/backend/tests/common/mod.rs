//! Common test utilities and fixtures for integration tests.
//!
//! # Requirements
//! Integration tests require a PostgreSQL database (set DATABASE_URL env var).

pub mod fixtures;

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use uuid::Uuid;

use review_backend::db::Database;
use review_backend::{build_router, AppState};

/// Test context containing database connection and router.
pub struct TestContext {
    pub db: Arc<Database>,
    app: Router,
}

impl TestContext {
    /// Create a new test context.
    ///
    /// # Panics
    /// Panics if DATABASE_URL is not set or database connection fails.
    pub async fn new() -> Self {
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

        let db = Database::connect(&database_url, 5)
            .await
            .expect("Failed to connect to test database");

        db.run_migrations()
            .await
            .expect("Failed to run migrations");

        let db = Arc::new(db);
        let app = build_router(AppState { db: db.clone() });

        Self { db, app }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.app.clone()).expect("Failed to start test server")
    }

    /// Create a session for a fresh identity and return (identity_id, token).
    pub async fn create_test_identity(&self) -> (String, String) {
        let identity_id = format!("test-{}", Uuid::new_v4());
        let session = self
            .db
            .create_session(&identity_id, None)
            .await
            .expect("Failed to create test session");
        (identity_id, session.token)
    }

    /// Format authorization header value.
    pub fn auth_header_value(token: &str) -> String {
        format!("Bearer {}", token)
    }

    /// Remove everything stored for an identity.
    pub async fn cleanup_identity(&self, identity_id: &str) {
        for table in ["history_records", "schedule_entries", "sessions"] {
            let _ = sqlx::query(&format!("DELETE FROM {} WHERE identity_id = $1", table))
                .bind(identity_id)
                .execute(self.db.pool())
                .await;
        }
    }
}
