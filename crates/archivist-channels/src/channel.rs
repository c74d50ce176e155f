use archivist_core::{ArchivistResult, ArtifactSink, FileSource, Notifier, OwnerId};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// An upload announced by the transport. Its bytes are fetched only when
/// the pipeline asks the source to save them.
#[derive(Clone)]
pub struct IncomingFile {
    pub display_name: String,
    /// Size declared by the transport, checked against the budget before
    /// anything is downloaded.
    pub size: u64,
    pub source: Arc<dyn FileSource>,
}

impl fmt::Debug for IncomingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingFile")
            .field("display_name", &self.display_name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum MessageContent {
    /// `/name arg1 arg2`; the name is lowercased and any `@botname` suffix
    /// is dropped.
    Command { name: String, args: Vec<String> },
    Text(String),
    File(IncomingFile),
    /// An inline button press.
    Callback { id: String, data: String },
}

#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub sender: OwnerId,
    pub chat_id: i64,
    /// Whether the message came from a one-to-one chat.
    pub private: bool,
    pub content: MessageContent,
}

#[derive(Debug)]
pub enum ChannelEvent {
    MessageReceived(ChannelMessage),
    Disconnected(String),
}

/// Splits a slash command into its name and whitespace-separated args.
pub fn parse_command(text: &str) -> Option<(String, Vec<String>)> {
    let rest = text.trim().strip_prefix('/')?;
    if rest.starts_with(char::is_whitespace) {
        return None;
    }
    let mut words = rest.split_whitespace();
    let head = words.next()?;
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    if name.is_empty() {
        return None;
    }
    Some((name, words.map(str::to_string).collect()))
}

/// A transport the pipeline can talk back through.
#[async_trait]
pub trait Channel: Notifier + ArtifactSink {
    fn name(&self) -> &str;

    /// Acknowledges an inline button press.
    async fn answer_callback(&self, _callback_id: &str, _text: Option<&str>) -> ArchivistResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_command("/authorise 123"),
            Some(("authorise".to_string(), vec!["123".to_string()]))
        );
        assert_eq!(
            parse_command("/ZIP@ArchiverBot"),
            Some(("zip".to_string(), vec![]))
        );
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("/ spaced"), None);
    }
}
