// Hierarchy resolver: walks trainer -> course -> lesson references against
// the remote API. Each resolve call is exactly one request; children come
// back as id references and are never fetched eagerly.

pub mod models;

use tracing::debug;
use url::Url;

use crate::error::DownloadError;
use crate::transport::Transport;

pub use models::{Course, Envelope, Lesson, Trainer, VideoToken};

use models::{CourseData, LessonData, TrainerData};

pub struct ApiClient {
    transport: Transport,
    base: Url,
}

impl ApiClient {
    /// `base` is the service root; endpoints resolve as `{base}/api/...`.
    pub fn new(transport: Transport, base: Url) -> Self {
        Self { transport, base }
    }

    fn endpoint(&self, path: &str, param: &str, id: &str) -> Result<Url, DownloadError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| DownloadError::Url(format!("cannot resolve {path} against {}: {e}", self.base)))?;
        url.query_pairs_mut().append_pair(param, id);
        Ok(url)
    }

    /// Fetches trainer metadata plus its course references.
    pub async fn resolve_trainer(&self, trainer_id: &str) -> Result<Trainer, DownloadError> {
        let url = self.endpoint("api/courses", "trainer_id", trainer_id)?;
        let metadata = self.transport.get_json(url).await?;
        let envelope: Envelope<TrainerData> = serde_json::from_value(metadata.clone())?;
        debug!(trainer_id, courses = envelope.data.courses.len(), "resolved trainer");
        Ok(Trainer {
            id: trainer_id.to_string(),
            metadata,
            courses: envelope.data.courses.into_iter().map(|c| c.id).collect(),
        })
    }

    /// Fetches course metadata plus its lesson references.
    pub async fn resolve_course(&self, course_id: &str) -> Result<Course, DownloadError> {
        let url = self.endpoint("api/course", "course_id", course_id)?;
        let metadata = self.transport.get_json(url).await?;
        let envelope: Envelope<CourseData> = serde_json::from_value(metadata.clone())?;
        debug!(course_id, lessons = envelope.data.lessons.len(), "resolved course");
        Ok(Course {
            id: course_id.to_string(),
            metadata,
            title: envelope.data.title,
            highlights: envelope.data.highlights,
            lessons: envelope.data.lessons.into_iter().map(|l| l.id).collect(),
        })
    }

    /// Fetches lesson metadata including the video token. The manifest
    /// itself is the manifest resolver's job.
    pub async fn resolve_lesson(&self, lesson_id: &str) -> Result<Lesson, DownloadError> {
        let url = self.endpoint("api/video", "lesson_id", lesson_id)?;
        let metadata = self.transport.get_json(url).await?;
        let envelope: Envelope<LessonData> = serde_json::from_value(metadata.clone())?;
        debug!(lesson_id, "resolved lesson");
        Ok(Lesson {
            id: lesson_id.to_string(),
            metadata,
            token: envelope.data.token,
        })
    }
}
