use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde_json::{Value, json};

use crate::config::Backend;
use crate::server::AppState;
use crate::types::Table;

/// Probes each backing table and reports per-table status with sample
/// counts. Always answers 200; the per-table flags carry the detail.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut tables = serde_json::Map::new();
    let mut healthy = true;
    for table in [Table::Users, Table::Schedules, Table::Shops] {
        let probe = state.store.ping(table).await;
        healthy &= probe.ok;
        tables.insert(
            table.as_str().to_string(),
            serde_json::to_value(probe).unwrap_or(Value::Null),
        );
    }

    let backend = match state.config.backend {
        Backend::Vika => "vika",
        Backend::Supabase => "supabase",
        Backend::Memory => "memory",
    };

    Json(json!({
        "success": healthy,
        "status": if healthy { "ok" } else { "degraded" },
        "backend": backend,
        "environment": if state.config.production { "production" } else { "development" },
        "timestamp": Utc::now().to_rfc3339(),
        "tables": tables,
    }))
}
