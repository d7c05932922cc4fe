use std::sync::Arc;

/// Progress notifications emitted by the pipeline. Consumers (the CLI's
/// progress bars) subscribe through an [`EventCallback`]; logging stays
/// independent of this channel.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    TrainerStarted {
        trainer_id: String,
        courses: usize,
    },
    TrainerFinished {
        trainer_id: String,
    },
    CourseStarted {
        course_id: String,
        index: usize,
        total: usize,
        title: Option<String>,
        lessons: usize,
    },
    CourseFinished {
        course_id: String,
    },
    LessonStarted {
        lesson_id: String,
        index: usize,
        total: usize,
        segments: usize,
    },
    SegmentProgress {
        lesson_id: String,
        completed: usize,
        total: usize,
    },
    LessonDecrypted {
        lesson_id: String,
        bytes: u64,
    },
    LessonCompleted {
        lesson_id: String,
    },
    UnitFailed {
        unit: UnitKind,
        id: String,
        error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Trainer,
    Course,
    Lesson,
}

pub type EventCallback = Arc<dyn Fn(PipelineEvent) + Send + Sync>;
