//! # Lectio
//!
//! A library for downloading and decrypting a hierarchical catalog of
//! video lessons (trainer -> course -> lesson) delivered as single-key
//! AES-128 encrypted HLS streams.
//!
//! ## Features
//!
//! - Hierarchical catalog resolution against the remote JSON API
//! - Highest-bandwidth variant selection from master playlists
//! - Resumable segment acquisition with on-disk idempotency
//! - Per-segment AES-128-CBC decryption into one ordered stream per lesson

pub mod api;
pub mod builder;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod fetch;
pub mod hls;
pub mod pipeline;
pub mod store;
pub mod transport;

pub use api::ApiClient;
pub use builder::DownloaderConfigBuilder;
pub use config::{DownloaderConfig, PipelineConfig};
pub use credentials::{CookieFile, HeaderProvider};
pub use error::DownloadError;
pub use events::{EventCallback, PipelineEvent, UnitKind};
pub use fetch::{FetchReport, HttpSegmentSource, SegmentSource, fetch_lesson_segments};
pub use hls::decryption::{decrypt_segment, run_decrypt_pass};
pub use hls::key::{KeyFetcher, LessonKey};
pub use hls::playlist::{KeyDescriptor, ManifestResolver, ResolvedManifest, SegmentEntry};
pub use pipeline::{Pipeline, RunSummary, decrypt_pass_all};
pub use store::{ContentStore, LessonStore};
pub use transport::{Transport, create_client};
