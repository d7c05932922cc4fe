// Pipeline orchestrator: drives the trainer -> course -> lesson -> segment
// traversal. Failures are isolated per unit so one bad item does not abort
// a batch run; already-fetched segments stay on disk for resume.

use std::fmt;

use tokio::fs;
use tracing::{error, info, warn};
use url::Url;

use crate::api::ApiClient;
use crate::api::models::{CourseData, Envelope, TrainerData};
use crate::config::PipelineConfig;
use crate::error::DownloadError;
use crate::events::{EventCallback, PipelineEvent, UnitKind};
use crate::fetch::{HttpSegmentSource, fetch_lesson_segments};
use crate::hls::decryption::run_decrypt_pass;
use crate::hls::key::KeyFetcher;
use crate::hls::playlist::ManifestResolver;
use crate::store::{ContentStore, LessonStore};
use crate::transport::Transport;

/// Per-run outcome counts. A lesson counts as completed only once its
/// decrypted output exists; everything else is reported and skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub lessons_completed: usize,
    pub lessons_failed: usize,
    pub courses_failed: usize,
    pub trainers_failed: usize,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.lessons_failed > 0 || self.courses_failed > 0 || self.trainers_failed > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lessons completed, {} lessons failed, {} courses failed, {} trainers failed",
            self.lessons_completed, self.lessons_failed, self.courses_failed, self.trainers_failed
        )
    }
}

pub struct Pipeline {
    api: ApiClient,
    manifests: ManifestResolver,
    keys: KeyFetcher,
    segments: HttpSegmentSource,
    store: ContentStore,
    config: PipelineConfig,
    on_event: Option<EventCallback>,
}

impl Pipeline {
    pub fn new(
        transport: Transport,
        base_url: Url,
        store: ContentStore,
        config: PipelineConfig,
    ) -> Self {
        Self {
            api: ApiClient::new(transport.clone(), base_url),
            manifests: ManifestResolver::new(transport.clone()),
            keys: KeyFetcher::new(transport.clone()),
            segments: HttpSegmentSource::new(transport),
            store,
            config,
            on_event: None,
        }
    }

    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.on_event = Some(callback);
        self
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(callback) = &self.on_event {
            callback(event);
        }
    }

    /// Processes every trainer in the input list; sibling units continue
    /// past a failed one.
    pub async fn run(&self, trainer_ids: &[String]) -> RunSummary {
        let mut summary = RunSummary::default();
        for trainer_id in trainer_ids {
            if let Err(e) = self.process_trainer(trainer_id, &mut summary).await {
                error!(trainer_id, error = %e, "trainer failed");
                summary.trainers_failed += 1;
                self.emit(PipelineEvent::UnitFailed {
                    unit: UnitKind::Trainer,
                    id: trainer_id.clone(),
                    error: e.to_string(),
                });
            }
        }
        info!(%summary, "run finished");
        summary
    }

    async fn process_trainer(
        &self,
        trainer_id: &str,
        summary: &mut RunSummary,
    ) -> Result<(), DownloadError> {
        let trainer = self.api.resolve_trainer(trainer_id).await?;
        let trainer_dir = self.store.ensure_trainer_dir(trainer_id).await?;
        self.store.write_metadata(&trainer_dir, &trainer.metadata).await?;

        info!(trainer_id, courses = trainer.courses.len(), "processing trainer");
        self.emit(PipelineEvent::TrainerStarted {
            trainer_id: trainer_id.to_string(),
            courses: trainer.courses.len(),
        });

        let total = trainer.courses.len();
        for (index, course_id) in trainer.courses.iter().enumerate() {
            if let Err(e) = self
                .process_course(trainer_id, course_id, index, total, summary)
                .await
            {
                error!(course_id, error = %e, "course failed");
                summary.courses_failed += 1;
                self.emit(PipelineEvent::UnitFailed {
                    unit: UnitKind::Course,
                    id: course_id.clone(),
                    error: e.to_string(),
                });
            }
        }

        self.emit(PipelineEvent::TrainerFinished {
            trainer_id: trainer_id.to_string(),
        });
        Ok(())
    }

    async fn process_course(
        &self,
        trainer_id: &str,
        course_id: &str,
        index: usize,
        total: usize,
        summary: &mut RunSummary,
    ) -> Result<(), DownloadError> {
        let course = self.api.resolve_course(course_id).await?;
        let course_dir = self.store.ensure_course_dir(trainer_id, course_id).await?;
        self.store.write_metadata(&course_dir, &course.metadata).await?;

        info!(
            course_id,
            course = index + 1,
            total,
            title = course.title.as_deref().unwrap_or(""),
            lessons = course.lessons.len(),
            "processing course"
        );
        self.emit(PipelineEvent::CourseStarted {
            course_id: course_id.to_string(),
            index,
            total,
            title: course.title.clone().or_else(|| course.highlights.clone()),
            lessons: course.lessons.len(),
        });

        let lesson_total = course.lessons.len();
        for (lesson_index, lesson_id) in course.lessons.iter().enumerate() {
            match self
                .process_lesson(trainer_id, course_id, lesson_id, lesson_index, lesson_total)
                .await
            {
                Ok(()) => summary.lessons_completed += 1,
                Err(e) => {
                    error!(lesson_id, error = %e, "lesson failed");
                    summary.lessons_failed += 1;
                    self.emit(PipelineEvent::UnitFailed {
                        unit: UnitKind::Lesson,
                        id: lesson_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.emit(PipelineEvent::CourseFinished {
            course_id: course_id.to_string(),
        });
        Ok(())
    }

    async fn process_lesson(
        &self,
        trainer_id: &str,
        course_id: &str,
        lesson_id: &str,
        index: usize,
        total: usize,
    ) -> Result<(), DownloadError> {
        let lesson = self.api.resolve_lesson(lesson_id).await?;
        let store = self
            .store
            .ensure_lesson_dir(trainer_id, course_id, lesson_id)
            .await?;
        store.write_metadata(&lesson.metadata).await?;

        let manifest = self.manifests.resolve(&lesson.token).await?;
        // The key is fetched once per lesson, regardless of how many
        // segments are already on disk.
        let key = self.keys.fetch(&manifest.key).await?;
        store.write_key(&key).await?;

        let file_names: Vec<String> = manifest
            .segments
            .iter()
            .map(|segment| segment.file_name.clone())
            .collect();
        store.write_segment_index(&file_names).await?;

        info!(
            lesson_id,
            lesson = index + 1,
            total,
            segments = manifest.segments.len(),
            bandwidth = manifest.bandwidth,
            "processing lesson"
        );
        self.emit(PipelineEvent::LessonStarted {
            lesson_id: lesson_id.to_string(),
            index,
            total,
            segments: manifest.segments.len(),
        });

        let progress = {
            let on_event = self.on_event.clone();
            let lesson_id = lesson_id.to_string();
            move |completed: usize, total: usize| {
                if let Some(callback) = &on_event {
                    callback(PipelineEvent::SegmentProgress {
                        lesson_id: lesson_id.clone(),
                        completed,
                        total,
                    });
                }
            }
        };
        fetch_lesson_segments(
            &self.segments,
            &store,
            &manifest.segments,
            self.config.segment_concurrency,
            &progress,
        )
        .await?;

        let bytes = run_decrypt_pass(&store).await?;
        self.emit(PipelineEvent::LessonDecrypted {
            lesson_id: lesson_id.to_string(),
            bytes,
        });
        self.emit(PipelineEvent::LessonCompleted {
            lesson_id: lesson_id.to_string(),
        });
        Ok(())
    }
}

/// Re-runs decryption over on-disk state only, without touching the
/// network. Discovery is driven by the metadata snapshots the download
/// stage wrote, never by directory listings.
pub async fn decrypt_pass_all(
    store: &ContentStore,
    trainer_ids: &[String],
    on_event: Option<EventCallback>,
) -> RunSummary {
    let emit = |event: PipelineEvent| {
        if let Some(callback) = &on_event {
            callback(event);
        }
    };

    let mut summary = RunSummary::default();
    for trainer_id in trainer_ids {
        let trainer_dir = store.trainer_dir(trainer_id);
        let envelope: Envelope<TrainerData> = match store
            .read_metadata(&trainer_dir)
            .await
            .and_then(|value| serde_json::from_value(value).map_err(DownloadError::from))
        {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(trainer_id, error = %e, "cannot read trainer snapshot");
                summary.trainers_failed += 1;
                emit(PipelineEvent::UnitFailed {
                    unit: UnitKind::Trainer,
                    id: trainer_id.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        for course in &envelope.data.courses {
            let course_dir = store.course_dir(trainer_id, &course.id);
            if !fs::try_exists(&course_dir).await.unwrap_or(false) {
                warn!(course_id = %course.id, "course directory missing, skipping");
                continue;
            }
            let course_envelope: Envelope<CourseData> = match store
                .read_metadata(&course_dir)
                .await
                .and_then(|value| serde_json::from_value(value).map_err(DownloadError::from))
            {
                Ok(envelope) => envelope,
                Err(e) => {
                    error!(course_id = %course.id, error = %e, "cannot read course snapshot");
                    summary.courses_failed += 1;
                    emit(PipelineEvent::UnitFailed {
                        unit: UnitKind::Course,
                        id: course.id.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            for lesson in &course_envelope.data.lessons {
                let lesson_dir = store.lesson_dir(trainer_id, &course.id, &lesson.id);
                if !fs::try_exists(&lesson_dir).await.unwrap_or(false) {
                    warn!(lesson_id = %lesson.id, "lesson directory missing, skipping");
                    continue;
                }
                let result = async {
                    let lesson_store = LessonStore::open(lesson_dir.clone())?;
                    run_decrypt_pass(&lesson_store).await
                }
                .await;
                match result {
                    Ok(bytes) => {
                        summary.lessons_completed += 1;
                        emit(PipelineEvent::LessonDecrypted {
                            lesson_id: lesson.id.clone(),
                            bytes,
                        });
                        emit(PipelineEvent::LessonCompleted {
                            lesson_id: lesson.id.clone(),
                        });
                    }
                    Err(e) => {
                        error!(lesson_id = %lesson.id, error = %e, "decrypt pass failed");
                        summary.lessons_failed += 1;
                        emit(PipelineEvent::UnitFailed {
                            unit: UnitKind::Lesson,
                            id: lesson.id.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
    }
    info!(%summary, "decrypt pass finished");
    summary
}
