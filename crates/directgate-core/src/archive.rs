//! Best-effort archive copies of messages

use crate::message::SmtpMessage;
use chrono::Utc;
use directgate_common::config::ProcessingSettings;
use std::path::PathBuf;
use tracing::{debug, warn};
use uuid::Uuid;

/// Writes archive copies into stage folders
///
/// Failures are logged and swallowed; archiving never changes the outcome
/// of a message run.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageArchive;

impl MessageArchive {
    pub fn new() -> Self {
        Self
    }

    /// `<yyyyMMddHHmmss>_<uuid v7>.eml`
    pub fn unique_file_name() -> String {
        format!(
            "{}_{}.eml",
            Utc::now().format("%Y%m%d%H%M%S"),
            Uuid::now_v7().simple()
        )
    }

    /// Copy the message into the settings' folder, if one is configured
    pub async fn copy_to_folder(
        &self,
        message: &dyn SmtpMessage,
        settings: &ProcessingSettings,
    ) -> Option<PathBuf> {
        let folder = settings.copy_folder.as_ref()?;
        let path = folder.join(Self::unique_file_name());

        match message.save_to_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Archived message copy");
                Some(path)
            }
            Err(e) => {
                warn!(
                    folder = %folder.display(),
                    sender = %message.sender(),
                    error = %e,
                    "Failed to archive message copy"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MemoryMessage;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn message() -> MemoryMessage {
        MemoryMessage::new("a@hospital.example", ["b@clinic.example"], "body")
    }

    #[test]
    fn test_unique_file_names() {
        let names: HashSet<_> = (0..1000).map(|_| MessageArchive::unique_file_name()).collect();
        assert_eq!(names.len(), 1000);

        let name = MessageArchive::unique_file_name();
        assert!(name.ends_with(".eml"));
        assert_eq!(name.find('_'), Some(14));
    }

    #[tokio::test]
    async fn test_copy_to_folder() {
        let temp_dir = TempDir::new().unwrap();
        let settings = ProcessingSettings::with_folder(temp_dir.path());

        let path = MessageArchive::new()
            .copy_to_folder(&message(), &settings)
            .await
            .unwrap();
        assert!(path.starts_with(temp_dir.path()));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "body");
    }

    #[tokio::test]
    async fn test_no_folder_is_a_no_op() {
        let result = MessageArchive::new()
            .copy_to_folder(&message(), &ProcessingSettings::default())
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let temp_dir = TempDir::new().unwrap();
        let settings = ProcessingSettings::with_folder(temp_dir.path().join("missing"));

        let result = MessageArchive::new()
            .copy_to_folder(&message(), &settings)
            .await;
        assert!(result.is_none());
    }
}
