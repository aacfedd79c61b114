// src/probe.rs

use std::fmt;
use tracing::{debug, error, warn};

use crate::db;

/// Result of a single connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Connected { backend: String, schema: String },
    Failed { detail: String },
}

impl ProbeOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, ProbeOutcome::Connected { .. })
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Connected { backend, schema } => {
                write!(f, "Successfully connected to {} database: {}", backend, schema)
            }
            ProbeOutcome::Failed { detail } => write!(f, "Connection failed: {}", detail),
        }
    }
}

/// Open one connection to `database_url`, then close it.
///
/// Never returns an error: every failure is folded into [`ProbeOutcome::Failed`].
pub async fn probe(database_url: &str) -> ProbeOutcome {
    let conn = match db::connect(database_url).await {
        Ok(conn) => conn,
        Err(e) => {
            // the root cause is what the driver said; our context only repeats the target
            let detail = e.root_cause().to_string();
            error!(url = %db::redact_url(database_url), error = %detail, "probe failed");
            return ProbeOutcome::Failed { detail };
        }
    };

    let backend = conn.backend_name().to_string();
    let schema = schema_label(database_url);
    db::close(conn).await;
    debug!(backend = %backend, schema = %schema, "probe connection closed");

    ProbeOutcome::Connected { backend, schema }
}

/// Shown in place of the schema name when the URL does not select one.
pub const NO_SCHEMA: &str = "(no database selected)";

fn schema_label(database_url: &str) -> String {
    db::database_name(database_url).unwrap_or_else(|| {
        warn!(url = %db::redact_url(database_url), "connection URL names no database");
        NO_SCHEMA.to_string()
    })
}
