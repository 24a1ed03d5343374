//! Message transport abstraction

use async_trait::async_trait;
use directgate_common::types::MailAddress;
use directgate_common::{Error, Result};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// A message as handed to the gateway by the mail transport
///
/// `accept`, `reject` and `abort` have externally visible effects; the
/// pipeline calls at most one of `accept`/`reject` per run, and `abort`
/// only after `accept`.
#[async_trait]
pub trait SmtpMessage: Send + Sync {
    /// Envelope sender (reverse path) as received
    fn sender(&self) -> &str;

    /// Envelope recipients as received
    fn recipients(&self) -> &[String];

    /// Full message text
    fn text(&self) -> &str;

    /// Restrict delivery to the given recipients
    fn set_envelope_recipients(&mut self, recipients: &[MailAddress]);

    /// Replace the message text
    fn update(&mut self, text: &str) -> Result<()>;

    fn accept(&mut self) -> Result<()>;

    fn reject(&mut self) -> Result<()>;

    /// Suppress onward relay of an accepted message
    fn abort(&mut self) -> Result<()>;

    /// Write the current message text to `path`
    async fn save_to_file(&self, path: &Path) -> Result<()>;
}

/// Disposition calls recorded by [`MemoryMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispositionEvent {
    Accepted,
    Rejected,
    Aborted,
}

/// An in-memory message that records what the pipeline did to it
#[derive(Debug, Clone)]
pub struct MemoryMessage {
    sender: String,
    recipients: Vec<String>,
    text: String,
    events: Vec<DispositionEvent>,
    updates: usize,
}

impl MemoryMessage {
    pub fn new<I, S>(sender: impl Into<String>, recipients: I, text: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sender: sender.into(),
            recipients: recipients.into_iter().map(Into::into).collect(),
            text: text.into(),
            events: Vec::new(),
            updates: 0,
        }
    }

    /// Disposition calls in the order they were made
    pub fn events(&self) -> &[DispositionEvent] {
        &self.events
    }

    pub fn is_accepted(&self) -> bool {
        self.events.contains(&DispositionEvent::Accepted)
    }

    pub fn is_rejected(&self) -> bool {
        self.events.contains(&DispositionEvent::Rejected)
    }

    pub fn is_aborted(&self) -> bool {
        self.events.contains(&DispositionEvent::Aborted)
    }

    /// Number of times the text was replaced
    pub fn update_count(&self) -> usize {
        self.updates
    }
}

#[async_trait]
impl SmtpMessage for MemoryMessage {
    fn sender(&self) -> &str {
        &self.sender
    }

    fn recipients(&self) -> &[String] {
        &self.recipients
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn set_envelope_recipients(&mut self, recipients: &[MailAddress]) {
        self.recipients = recipients.iter().map(ToString::to_string).collect();
    }

    fn update(&mut self, text: &str) -> Result<()> {
        self.text = text.to_string();
        self.updates += 1;
        Ok(())
    }

    fn accept(&mut self) -> Result<()> {
        self.events.push(DispositionEvent::Accepted);
        Ok(())
    }

    fn reject(&mut self) -> Result<()> {
        self.events.push(DispositionEvent::Rejected);
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        self.events.push(DispositionEvent::Aborted);
        Ok(())
    }

    async fn save_to_file(&self, path: &Path) -> Result<()> {
        let mut file = fs::File::create(path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to create file: {}", e)))?;

        file.write_all(self.text.as_bytes())
            .await
            .map_err(|e| Error::Storage(format!("Failed to write file: {}", e)))?;

        debug!(path = %path.display(), size = self.text.len(), "Saved message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_message() {
        let temp_dir = TempDir::new().unwrap();
        let mut message = MemoryMessage::new(
            "doctor@hospital.example",
            ["nurse@clinic.example", "lab@clinic.example"],
            "Subject: results\r\n\r\nbody",
        );

        message.set_envelope_recipients(&[MailAddress::new("lab", "clinic.example")]);
        assert_eq!(message.recipients(), ["lab@clinic.example".to_string()]);

        message.update("encrypted").unwrap();
        assert_eq!(message.update_count(), 1);

        let path = temp_dir.path().join("copy.eml");
        message.save_to_file(&path).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "encrypted");

        message.accept().unwrap();
        message.abort().unwrap();
        assert_eq!(
            message.events(),
            [DispositionEvent::Accepted, DispositionEvent::Aborted]
        );
    }
}
