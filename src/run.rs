/// Sequential per-session orchestration for both discovery variants.
///
/// Sessions are handled one at a time in discovery order. Every per-session
/// failure is logged and skipped; nothing aborts the run as a whole.
use crate::api::TelemetryApi;
use crate::config::PullerConfig;
use crate::error::PullError;
use crate::extract;
use crate::layout::OutputLayout;
use crate::replica::{DiscoveredSession, DiscoveryWindow, ReplicaDb};
use crate::units::{EpochSeconds, LabelWindow};
use tracing::{info, warn};

/// Outcome counts for one run, logged at the end.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// API discovery variant: list passed sessions per configured flow, then
/// pull each one. The anchor is derived from the label's absolute start.
pub async fn run_api_discovery(
    cfg: &PullerConfig,
    api: &TelemetryApi,
    layout: &OutputLayout,
) -> RunSummary {
    let mut summary = RunSummary::default();

    for flow in &cfg.discovery.flows {
        let session_ids = match api.list_passed_sessions(flow).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(flow = %flow, error = %e, "session discovery failed, skipping flow");
                summary.failed += 1;
                continue;
            }
        };
        if session_ids.is_empty() {
            info!(flow = %flow, "no passed sessions found");
            continue;
        }

        for session_id in &session_ids {
            info!(flow = %flow, session_id = %session_id, "processing session");
            if layout.is_processed(flow, session_id, api.category()) {
                info!(session_id = %session_id, "already processed, skipping");
                summary.skipped += 1;
                continue;
            }
            match pull_api_session(api, layout, flow, session_id).await {
                Ok(()) => summary.processed += 1,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "session skipped");
                    summary.failed += 1;
                }
            }
        }
    }

    summary
}

/// Database discovery variant: one replica query over the trailing window,
/// then pull each discovered session. The anchor comes from the session's
/// capture-started timestamp.
pub async fn run_db_discovery(
    cfg: &PullerConfig,
    api: &TelemetryApi,
    db: &ReplicaDb,
    layout: &OutputLayout,
) -> RunSummary {
    let mut summary = RunSummary::default();

    let window = DiscoveryWindow::trailing(cfg.discovery.window_hours, chrono::Utc::now());
    info!(from = %window.from, to = %window.to, "discovery window");

    let sessions = match db
        .discover(window, &cfg.discovery.flows, api.category())
        .await
    {
        Ok(sessions) => sessions,
        Err(e) => {
            warn!(error = %e, "replica discovery failed");
            summary.failed += 1;
            return summary;
        }
    };
    if sessions.is_empty() {
        info!("no sessions found matching the criteria");
        return summary;
    }

    for session in &sessions {
        info!(
            flow = %session.flow_name,
            session_id = %session.session_id,
            "processing session"
        );
        if layout.is_processed(&session.flow_name, &session.session_id, api.category()) {
            info!(session_id = %session.session_id, "already processed, skipping");
            summary.skipped += 1;
            continue;
        }
        match pull_db_session(api, layout, session).await {
            Ok(()) => summary.processed += 1,
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "session skipped");
                summary.failed += 1;
            }
        }
    }

    summary
}

async fn pull_api_session(
    api: &TelemetryApi,
    layout: &OutputLayout,
    flow: &str,
    session_id: &str,
) -> Result<(), PullError> {
    let label = api.find_label(session_id).await?;
    extract_to_output(api, layout, flow, session_id, label.anchor(), label.window).await
}

async fn pull_db_session(
    api: &TelemetryApi,
    layout: &OutputLayout,
    session: &DiscoveredSession,
) -> Result<(), PullError> {
    // Anchor first: an unavailable timestamps endpoint must not leave a
    // temp download behind.
    let anchor = api.capture_started(&session.session_id).await?;
    extract_to_output(
        api,
        layout,
        &session.flow_name,
        &session.session_id,
        anchor,
        session.window,
    )
    .await
}

/// Shared tail of both variants: download, extract, persist. The raw
/// download guard is dropped on exit, removing the temp file on success and
/// failure alike.
async fn extract_to_output(
    api: &TelemetryApi,
    layout: &OutputLayout,
    flow: &str,
    session_id: &str,
    anchor: EpochSeconds,
    window: LabelWindow,
) -> Result<(), PullError> {
    let raw = api.download_timeseries(session_id).await?;
    let out_path = layout.processed_file(flow, session_id, api.category());
    let report = extract::extract_window(raw.path(), anchor, window, &out_path)?;
    info!(
        session_id,
        rows_read = report.rows_read,
        rows_written = report.rows_written,
        output = %out_path.display(),
        "filtered series saved"
    );
    Ok(())
}
