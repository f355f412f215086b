/// Remote telemetry API client: session discovery by flow tag, label lookup,
/// capture-start timestamps, and raw time-series download.
///
/// Response-body handling is split into pure functions so the parsing rules
/// (passed-only filter, first-label selection) are testable without a server.
use crate::config::PullerConfig;
use crate::error::PullError;
use crate::units::{EpochSeconds, LabelWindow};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Client for the remote telemetry platform, authenticated via bearer token.
pub struct TelemetryApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
    num_sessions: u32,
    category: String,
}

/// The labeled measurement window for a session, as resolved from the API.
#[derive(Debug, Clone, Copy)]
pub struct Label {
    pub window: LabelWindow,
    /// Absolute start of the label itself, in epoch seconds.
    pub ts_start: EpochSeconds,
}

impl Label {
    /// The session anchor: the absolute instant of relative time zero.
    ///
    /// The label starts `window.start` milliseconds past capture start, so
    /// rewinding its absolute start by that offset recovers the anchor.
    pub fn anchor(&self) -> EpochSeconds {
        self.ts_start.rewind_by(self.window.start)
    }
}

/// Scoped handle to a downloaded raw series file (`<session_id>_temp.csv`).
///
/// Removes the file on drop, so the temp download never outlives the
/// session that fetched it, on success and failure paths alike.
#[derive(Debug)]
pub struct RawDownload {
    path: PathBuf,
}

impl RawDownload {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RawDownload {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// --- Response shapes ---

#[derive(Debug, Deserialize)]
struct SessionList {
    #[serde(default)]
    sessions: Vec<SessionSummary>,
}

#[derive(Debug, Deserialize)]
struct SessionSummary {
    session_id: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<LabelEntry>,
}

#[derive(Debug, Deserialize)]
struct LabelEntry {
    start_time: f64,
    end_time: f64,
    ts_start: f64,
}

#[derive(Debug, Deserialize)]
struct SessionTimestamps {
    #[serde(rename = "capture-started")]
    capture_started: f64,
}

impl TelemetryApi {
    /// Build a client from the loaded configuration.
    pub fn new(cfg: &PullerConfig) -> Result<Self, PullError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| PullError::Http { source: e })?;

        Ok(Self {
            client,
            base_url: cfg.api.base_url.trim_end_matches('/').to_string(),
            token: cfg.api.access_token.clone(),
            num_sessions: cfg.discovery.num_sessions,
            category: cfg.metric.category.clone(),
        })
    }

    /// The configured metric category / time-series key.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// List session ids for a flow, keeping only sessions that passed.
    pub async fn list_passed_sessions(&self, flow: &str) -> Result<Vec<String>, PullError> {
        let url = format!("{}/sessions", self.base_url);
        let params = [
            ("include_all", "true".to_string()),
            ("num_sessions", self.num_sessions.to_string()),
            ("tag", format!("user_flow:{flow}")),
        ];
        let list: SessionList = self
            .get("session list", &url, &params)
            .await?
            .json()
            .await
            .map_err(|e| PullError::Http { source: e })?;
        Ok(passed_session_ids(list))
    }

    /// Resolve the labeled window for a session in the configured category.
    pub async fn find_label(&self, session_id: &str) -> Result<Label, PullError> {
        let url = format!("{}/sessions/{}/label/list", self.base_url, session_id);
        let params = [("category", self.category.clone())];
        let list: LabelList = self
            .get("label list", &url, &params)
            .await?
            .json()
            .await
            .map_err(|e| PullError::Http { source: e })?;
        first_label(list, session_id, &self.category)
    }

    /// The session's capture-start instant, from the timestamps endpoint.
    pub async fn capture_started(&self, session_id: &str) -> Result<EpochSeconds, PullError> {
        let url = format!("{}/sessions/{}/timestamps", self.base_url, session_id);
        let ts: SessionTimestamps = self
            .get("session timestamps", &url, &[])
            .await?
            .json()
            .await
            .map_err(|e| PullError::Http { source: e })?;
        Ok(EpochSeconds(ts.capture_started))
    }

    /// Download the raw series for a session into `<session_id>_temp.csv`.
    ///
    /// A non-success response creates no file. The returned guard removes
    /// the file when dropped.
    pub async fn download_timeseries(&self, session_id: &str) -> Result<RawDownload, PullError> {
        let url = format!(
            "{}/sessions/timeseries/{}/download",
            self.base_url, session_id
        );
        let params = [("key", self.category.clone())];
        let resp = self.get("time-series download", &url, &params).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PullError::Http { source: e })?;

        let path = PathBuf::from(format!("{session_id}_temp.csv"));
        std::fs::write(&path, &bytes).map_err(|e| PullError::Io {
            path: path.clone(),
            source: e,
        })?;
        tracing::info!(session_id, bytes = bytes.len(), "time series downloaded");
        Ok(RawDownload { path })
    }

    async fn get(
        &self,
        what: &'static str,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<reqwest::Response, PullError> {
        let resp = self
            .client
            .get(url)
            .query(params)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PullError::Http { source: e })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(PullError::Unavailable {
                what,
                status: status.as_u16(),
                detail,
            });
        }
        Ok(resp)
    }
}

/// Keep only sessions whose status is `passed`.
fn passed_session_ids(list: SessionList) -> Vec<String> {
    list.sessions
        .into_iter()
        .filter(|s| s.status == "passed")
        .map(|s| s.session_id)
        .collect()
}

/// Select the label for a session. An empty list is NotFound; when several
/// labels share the category the first returned wins.
fn first_label(list: LabelList, session_id: &str, category: &str) -> Result<Label, PullError> {
    if list.labels.len() > 1 {
        tracing::debug!(
            session_id,
            count = list.labels.len(),
            "multiple labels match category, using first"
        );
    }
    let entry = list.labels.into_iter().next().ok_or_else(|| PullError::NotFound {
        what: format!("label with category `{category}` for session {session_id}"),
    })?;
    Ok(Label {
        window: LabelWindow::new(entry.start_time, entry.end_time),
        ts_start: EpochSeconds(entry.ts_start),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_passed_session_filter() {
        let list: SessionList = serde_json::from_value(json!({
            "sessions": [
                {"session_id": "a", "status": "passed"},
                {"session_id": "b", "status": "failed"},
                {"session_id": "c", "status": "passed"},
                {"session_id": "d", "status": "running"},
            ]
        }))
        .unwrap();
        assert_eq!(passed_session_ids(list), vec!["a", "c"]);
    }

    #[test]
    fn test_session_list_tolerates_missing_fields() {
        let list: SessionList = serde_json::from_value(json!({})).unwrap();
        assert!(passed_session_ids(list).is_empty());

        let list: SessionList = serde_json::from_value(json!({
            "sessions": [{"session_id": "a"}]
        }))
        .unwrap();
        // No status field means not passed
        assert!(passed_session_ids(list).is_empty());
    }

    #[test]
    fn test_empty_label_list_is_not_found() {
        let list: LabelList = serde_json::from_value(json!({"labels": []})).unwrap();
        let err = first_label(list, "sess-1", "video_quality_mos").unwrap_err();
        assert!(matches!(err, PullError::NotFound { .. }));
        assert!(err.to_string().contains("video_quality_mos"));
    }

    #[test]
    fn test_first_label_wins_among_duplicates() {
        let list: LabelList = serde_json::from_value(json!({
            "labels": [
                {"start_time": 1000.0, "end_time": 5000.0, "ts_start": 1724668801.0},
                {"start_time": 9000.0, "end_time": 9500.0, "ts_start": 1724668809.0},
            ]
        }))
        .unwrap();
        let label = first_label(list, "sess-1", "video_quality_mos").unwrap();
        assert_eq!(label.window, LabelWindow::new(1000.0, 5000.0));
        assert_eq!(label.ts_start, EpochSeconds(1724668801.0));
    }

    #[test]
    fn test_anchor_rewinds_label_start() {
        let label = Label {
            window: LabelWindow::new(34_500.0, 60_000.0),
            ts_start: EpochSeconds(1724668834.5),
        };
        // Label started 34.5s after capture start
        assert_eq!(label.anchor(), EpochSeconds(1724668800.0));
    }

    #[test]
    fn test_timestamps_field_rename() {
        let ts: SessionTimestamps = serde_json::from_value(json!({
            "capture-started": 1724668800.25,
            "capture-ended": 1724668900.0,
            "capture-complete": 1724668901.0,
        }))
        .unwrap();
        assert_eq!(ts.capture_started, 1724668800.25);
    }

    #[test]
    fn test_raw_download_removed_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sess-1_temp.csv");
        std::fs::write(&path, "Time,Value\n0,1\n").unwrap();

        let guard = RawDownload { path: path.clone() };
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_raw_download_drop_tolerates_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gone_temp.csv");
        std::fs::write(&path, "x").unwrap();

        let guard = RawDownload { path: path.clone() };
        std::fs::remove_file(&path).unwrap();
        drop(guard); // must not panic
    }
}
