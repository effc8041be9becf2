//! Service Module
//!
//! Business logic layer for the exec server.
//! Services orchestrate between repositories and contain domain logic.

pub mod log;
pub mod run;

// Re-export for convenience
pub use log as log_service;
pub use run as run_service;

#[cfg(test)]
pub(crate) mod test_support {
    use petal_core::domain::bundle::Bundle;
    use petal_core::dto::run::StartRunRequest;
    use sqlx::SqlitePool;
    use std::collections::HashMap;

    use crate::db;

    pub async fn pool() -> SqlitePool {
        let pool = db::create_memory_pool().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        pool
    }

    pub fn start_request(content: &[u8], overrides: &[(&str, &str)]) -> StartRunRequest {
        StartRunRequest {
            fab: Bundle::new(content.to_vec()),
            override_config: overrides
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }
}
