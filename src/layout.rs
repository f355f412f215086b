use std::path::{Path, PathBuf};

/// Manages the processed-output directory layout.
///
/// All durable artifacts live under a single root (default `processed_data/`),
/// one subdirectory per flow. The existence of a processed file is the sole
/// idempotency record; there is no manifest.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Create a new OutputLayout referencing the given root path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory (e.g. `processed_data/`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one flow's processed files.
    pub fn flow_dir(&self, flow: &str) -> PathBuf {
        self.root.join(flow)
    }

    /// Deterministic path for one session's filtered series:
    /// `<root>/<flow>/<session_id>_<key>.csv`.
    pub fn processed_file(&self, flow: &str, session_id: &str, key: &str) -> PathBuf {
        self.flow_dir(flow).join(format!("{session_id}_{key}.csv"))
    }

    /// Whether the session has already been processed for this flow and key.
    ///
    /// Pure existence check. Content is not validated; a partial file from a
    /// crashed run counts as processed.
    pub fn is_processed(&self, flow: &str, session_id: &str, key: &str) -> bool {
        self.processed_file(flow, session_id, key).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_file_path_shape() {
        let layout = OutputLayout::new("processed_data");
        assert_eq!(
            layout.processed_file("VideoCall_WhatsApp_Android_Caller", "abc-123", "video_quality_mos"),
            PathBuf::from(
                "processed_data/VideoCall_WhatsApp_Android_Caller/abc-123_video_quality_mos.csv"
            )
        );
        assert_eq!(
            layout.flow_dir("FlowA"),
            PathBuf::from("processed_data/FlowA")
        );
    }

    #[test]
    fn test_is_processed_false_when_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(tmp.path().join("processed_data"));
        assert!(!layout.is_processed("FlowA", "sess-1", "video_quality_mos"));
    }

    #[test]
    fn test_is_processed_true_once_file_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(tmp.path().join("processed_data"));

        let path = layout.processed_file("FlowA", "sess-1", "video_quality_mos");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "Time,Value,Absolute_Time\n").unwrap();

        assert!(layout.is_processed("FlowA", "sess-1", "video_quality_mos"));
        // Same session under a different key or flow is still unprocessed
        assert!(!layout.is_processed("FlowA", "sess-1", "audio_quality_mos"));
        assert!(!layout.is_processed("FlowB", "sess-1", "video_quality_mos"));
    }
}
