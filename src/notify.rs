use crate::location::location_for_path;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Where the user should go to fix an unavailable download folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    OpenSettings,
}

/// Identity of a committed download, enough to start playing it later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackTarget {
    pub id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: u32,
    pub file_name: String,
    pub path: PathBuf,
}

impl PlaybackTarget {
    pub fn file_url(&self) -> String {
        location_for_path(&self.path)
    }
}

/// Terminal states of a download attempt, presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Unavailable { action: RemediationAction },
    Failed { message: String },
    AlreadyDownloaded { file_name: String },
    Completed { target: PlaybackTarget },
}

impl Notification {
    pub fn event_name(&self) -> &'static str {
        match self {
            Notification::Unavailable { .. } => "external:download:unavailable",
            Notification::Failed { .. } => "external:download:error",
            Notification::AlreadyDownloaded { .. } => "external:download:exists",
            Notification::Completed { .. } => "external:download:complete",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Notification::Unavailable { .. } => "No download folder set",
            Notification::Failed { .. } => "Download failed",
            Notification::AlreadyDownloaded { .. } => "Already downloaded",
            Notification::Completed { .. } => "Download complete",
        }
    }

    pub fn text(&self) -> String {
        match self {
            Notification::Unavailable { .. } => "Tap to set one in settings".to_string(),
            Notification::Failed { message } => message.clone(),
            Notification::AlreadyDownloaded { file_name } => file_name.clone(),
            Notification::Completed { target } => target.file_name.clone(),
        }
    }

    /// Event payload in the shape the front-end listens for.
    pub fn to_event(&self) -> serde_json::Value {
        let mut event = serde_json::json!({
            "event": self.event_name(),
            "title": self.title(),
            "text": self.text(),
            "payload": self,
        });
        if let Notification::Completed { target } = self {
            event["fileUrl"] = serde_json::Value::String(target.file_url());
        }
        event
    }
}

/// Fire-and-forget presentation of download outcomes.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Forwards notifications to a receiver owned by the embedding application.
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if let Err(e) = self.tx.send(notification) {
            warn!(event = e.0.event_name(), "notification receiver dropped");
        }
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        info!(event = notification.event_name(), "{}: {}", notification.title(), notification.text());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_event_carries_playback_identity() {
        let n = Notification::Completed {
            target: PlaybackTarget {
                id: "42".into(),
                title: Some("One More Time".into()),
                artist: Some("Daft Punk".into()),
                album: Some("Discovery".into()),
                duration: 320,
                file_name: "Daft Punk - One More Time (Discovery).mp3".into(),
                path: PathBuf::from("/music/Daft Punk - One More Time (Discovery).mp3"),
            },
        };
        let event = n.to_event();
        assert_eq!(event["event"], "external:download:complete");
        assert_eq!(event["payload"]["kind"], "completed");
        assert_eq!(event["payload"]["target"]["id"], "42");
        assert_eq!(event["payload"]["target"]["duration"], 320);
        assert_eq!(
            event["fileUrl"],
            "file:///music/Daft%20Punk%20-%20One%20More%20Time%20%28Discovery%29.mp3"
        );
    }

    #[tokio::test]
    async fn channel_notifier_delivers_in_order() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(Notification::Unavailable {
            action: RemediationAction::OpenSettings,
        });
        notifier.notify(Notification::Failed {
            message: "Empty download.".into(),
        });
        assert_eq!(rx.recv().await.unwrap().title(), "No download folder set");
        assert_eq!(rx.recv().await.unwrap().text(), "Empty download.");
    }
}
