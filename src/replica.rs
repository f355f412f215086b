/// Replica-database discovery: one read-only query joining session metadata,
/// flow names, and labels within a trailing time window.
use crate::error::PullError;
use crate::units::LabelWindow;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// A session discovered from the replica: label bounds included, anchor not
/// (the anchor comes from the session-timestamps endpoint).
#[derive(Debug, Clone)]
pub struct DiscoveredSession {
    pub session_id: String,
    pub flow_name: String,
    pub window: LabelWindow,
}

/// Trailing UTC window bounding which sessions discovery considers.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DiscoveryWindow {
    /// The window covering the `hours` leading up to `now`.
    pub fn trailing(hours: i64, now: DateTime<Utc>) -> Self {
        Self {
            from: now - Duration::hours(hours),
            to: now,
        }
    }
}

/// Discovery join. The analysis-region label names and the status set are
/// fixed; category, window bounds, and flows arrive as bind parameters.
const DISCOVER_SQL: &str = "\
    SELECT DISTINCT sm.session_id::text AS session_id,
                    uf.name AS flow_name,
                    sl.start_time::float8 AS label_start,
                    sl.end_time::float8 AS label_end
    FROM session_metadata AS sm
    INNER JOIN user_flow AS uf ON sm.user_flow_id = uf.user_flow_id
    INNER JOIN session_labels AS sl
        ON sm.session_id = sl.session_id AND sl.category = $1
    WHERE sm.start_time BETWEEN $2 AND $3
      AND uf.name = ANY($4)
      AND sl.name IN ('VIDEO_ANALYSIS_REGION_CALLER', 'VIDEO_ANALYSIS_REGION_CALLEE')
      AND sm.status IN ('Passed', 'Failed')";

/// Read-only connection to the replica database.
pub struct ReplicaDb {
    pool: PgPool,
}

impl ReplicaDb {
    /// Connect to the replica at the given Postgres URL.
    pub async fn connect(url: &str) -> Result<Self, PullError> {
        let pool = PgPool::connect(url)
            .await
            .map_err(|e| PullError::Db { source: e })?;
        tracing::info!("replica connection established");
        Ok(Self { pool })
    }

    /// Discover sessions with a matching label inside the window, restricted
    /// to the configured flows. All dynamic values are bind parameters.
    pub async fn discover(
        &self,
        window: DiscoveryWindow,
        flows: &[String],
        category: &str,
    ) -> Result<Vec<DiscoveredSession>, PullError> {
        let rows = sqlx::query(DISCOVER_SQL)
            .bind(category)
            .bind(window.from)
            .bind(window.to)
            .bind(flows.to_vec())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PullError::Db { source: e })?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            sessions.push(map_row(row)?);
        }
        tracing::info!(count = sessions.len(), "sessions discovered from replica");
        Ok(sessions)
    }
}

fn map_row(row: &PgRow) -> Result<DiscoveredSession, PullError> {
    let session_id: String = row.try_get("session_id").map_err(db_err)?;
    let flow_name: String = row.try_get("flow_name").map_err(db_err)?;
    let label_start: f64 = row.try_get("label_start").map_err(db_err)?;
    let label_end: f64 = row.try_get("label_end").map_err(db_err)?;

    Ok(DiscoveredSession {
        session_id,
        flow_name,
        window: LabelWindow::new(label_start, label_end),
    })
}

fn db_err(source: sqlx::Error) -> PullError {
    PullError::Db { source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_window_spans_requested_hours() {
        let now = Utc::now();
        let w = DiscoveryWindow::trailing(3, now);
        assert_eq!(w.to, now);
        assert_eq!(w.to - w.from, Duration::hours(3));
    }

    #[test]
    fn test_discover_sql_binds_all_dynamic_values() {
        // Category, both window bounds, and the flow set are placeholders;
        // only fixed label-name and status sets are inline.
        for marker in ["$1", "$2", "$3", "$4"] {
            assert!(DISCOVER_SQL.contains(marker));
        }
        assert!(!DISCOVER_SQL.contains("$5"));
        assert!(DISCOVER_SQL.contains("VIDEO_ANALYSIS_REGION_CALLER"));
        assert!(DISCOVER_SQL.contains("VIDEO_ANALYSIS_REGION_CALLEE"));
    }
}
