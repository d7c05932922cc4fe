// Segment acquisition: skip what the store already holds, download the
// rest through a bounded worker pool.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use crate::error::DownloadError;
use crate::hls::playlist::SegmentEntry;
use crate::store::LessonStore;
use crate::transport::Transport;

#[async_trait]
pub trait SegmentSource: Send + Sync {
    async fn fetch_segment(&self, segment: &SegmentEntry) -> Result<Bytes, DownloadError>;
}

/// Transport-backed segment source used by the real pipeline.
pub struct HttpSegmentSource {
    transport: Transport,
}

impl HttpSegmentSource {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SegmentSource for HttpSegmentSource {
    async fn fetch_segment(&self, segment: &SegmentEntry) -> Result<Bytes, DownloadError> {
        self.transport.get_bytes(segment.uri.clone()).await
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FetchReport {
    pub fetched: usize,
    pub skipped: usize,
}

/// Downloads every segment the store does not already hold, up to
/// `concurrency` in flight at once. Each segment lands in its own file, so
/// concurrent writes cannot collide. The first failure aborts the lesson;
/// blobs fetched so far stay on disk for a resumed run.
///
/// `on_progress` receives `(completed, total)` counts, including skipped
/// segments.
pub async fn fetch_lesson_segments<S: SegmentSource>(
    source: &S,
    lesson: &LessonStore,
    segments: &[SegmentEntry],
    concurrency: usize,
    on_progress: &(dyn Fn(usize, usize) + Send + Sync),
) -> Result<FetchReport, DownloadError> {
    let total = segments.len();
    let done = AtomicUsize::new(0);

    let mut pending = Vec::new();
    let mut skipped = 0usize;
    for segment in segments {
        if lesson.is_segment_present(&segment.file_name).await {
            skipped += 1;
            on_progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);
        } else {
            pending.push(segment);
        }
    }
    let fetched = pending.len();
    debug!(lesson_id = lesson.lesson_id(), total, skipped, fetched, "fetching segments");

    stream::iter(pending)
        .map(|segment| {
            let done = &done;
            async move {
                let bytes = source.fetch_segment(segment).await?;
                lesson.write_segment(&segment.file_name, &bytes).await?;
                on_progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);
                Ok::<_, DownloadError>(())
            }
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect::<Vec<()>>()
        .await?;

    Ok(FetchReport { fetched, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ContentStore;
    use std::collections::HashMap;
    use url::Url;

    struct FakeSource {
        blobs: HashMap<String, Vec<u8>>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(blobs: &[(&str, &[u8])]) -> Self {
            Self {
                blobs: blobs
                    .iter()
                    .map(|(name, bytes)| (name.to_string(), bytes.to_vec()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SegmentSource for FakeSource {
        async fn fetch_segment(&self, segment: &SegmentEntry) -> Result<Bytes, DownloadError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.blobs
                .get(&segment.file_name)
                .cloned()
                .map(Bytes::from)
                .ok_or_else(|| DownloadError::Decode(format!("no blob for {}", segment.file_name)))
        }
    }

    fn entry(sequence: usize, name: &str) -> SegmentEntry {
        SegmentEntry {
            sequence,
            uri: Url::parse(&format!("https://cdn.test/{name}")).unwrap(),
            file_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_skips_present_segments() {
        let root = tempfile::tempdir().unwrap();
        let lesson = ContentStore::new(root.path())
            .ensure_lesson_dir("t", "c", "l")
            .await
            .unwrap();
        lesson.write_segment("seg0.ts", b"already here").await.unwrap();

        let source = FakeSource::new(&[("seg1.ts", b"fresh")]);
        let segments = [entry(0, "seg0.ts"), entry(1, "seg1.ts")];
        let report = fetch_lesson_segments(&source, &lesson, &segments, 2, &|_, _| {})
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.fetched, 1);
        assert_eq!(source.calls.load(Ordering::Relaxed), 1);
        assert_eq!(lesson.read_segment("seg1.ts").await.unwrap(), b"fresh");
        // The present blob was not re-written.
        assert_eq!(
            lesson.read_segment("seg0.ts").await.unwrap(),
            b"already here"
        );
    }

    #[tokio::test]
    async fn test_rerun_performs_no_fetches() {
        let root = tempfile::tempdir().unwrap();
        let lesson = ContentStore::new(root.path())
            .ensure_lesson_dir("t", "c", "l")
            .await
            .unwrap();

        let source = FakeSource::new(&[("seg0.ts", b"a"), ("seg1.ts", b"b")]);
        let segments = [entry(0, "seg0.ts"), entry(1, "seg1.ts")];
        fetch_lesson_segments(&source, &lesson, &segments, 2, &|_, _| {})
            .await
            .unwrap();
        assert_eq!(source.calls.load(Ordering::Relaxed), 2);

        let report = fetch_lesson_segments(&source, &lesson, &segments, 2, &|_, _| {})
            .await
            .unwrap();
        assert_eq!(report.fetched, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(source.calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_progress_reaches_total() {
        let root = tempfile::tempdir().unwrap();
        let lesson = ContentStore::new(root.path())
            .ensure_lesson_dir("t", "c", "l")
            .await
            .unwrap();

        let seen = AtomicUsize::new(0);
        let source = FakeSource::new(&[("seg0.ts", b"a"), ("seg1.ts", b"b")]);
        let segments = [entry(0, "seg0.ts"), entry(1, "seg1.ts")];
        fetch_lesson_segments(&source, &lesson, &segments, 1, &|completed, total| {
            assert_eq!(total, 2);
            seen.fetch_max(completed, Ordering::Relaxed);
        })
        .await
        .unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_failure_leaves_fetched_segments_on_disk() {
        let root = tempfile::tempdir().unwrap();
        let lesson = ContentStore::new(root.path())
            .ensure_lesson_dir("t", "c", "l")
            .await
            .unwrap();

        // seg1.ts is missing from the source, so the pass fails.
        let source = FakeSource::new(&[("seg0.ts", b"a")]);
        let segments = [entry(0, "seg0.ts"), entry(1, "seg1.ts")];
        let result =
            fetch_lesson_segments(&source, &lesson, &segments, 1, &|_, _| {}).await;
        assert!(result.is_err());

        // What was fetched before the failure remains valid for resume.
        assert!(lesson.is_segment_present("seg0.ts").await);
    }
}
