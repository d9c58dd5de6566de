//! Verified track downloads into a user-chosen music folder.
//!
//! [`TrackCache`] maps tracks onto files in the configured folder, trusting a
//! file only when its length matches the size recorded in the [`Ledger`] when
//! it was downloaded. [`Downloader`] fetches tracks into the folder and keeps
//! the ledger and cache in step.

pub mod cache;
pub mod downloads;
pub mod error;
pub mod key;
pub mod ledger;
pub mod location;
pub mod logging;
pub mod mime;
pub mod notify;
pub mod paths;
pub mod settings;
pub mod track;

pub use cache::{CachedFile, TrackCache};
pub use downloads::{DownloadOutcome, DownloadRequest, Downloader};
pub use error::CacheError;
pub use key::CanonicalKey;
pub use ledger::{JsonLedger, Ledger, MemoryLedger};
pub use location::{FixedLocation, LocationProvider};
pub use notify::{ChannelNotifier, LogNotifier, Notification, Notifier, PlaybackTarget};
pub use settings::{DownloadSettings, SettingsStore};
pub use track::Track;
