// Progress rendering: maps pipeline events onto indicatif bars. Logging
// stays authoritative; bars are cosmetic and optional.

use std::collections::HashMap;
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use lectio_engine::{PipelineEvent, UnitKind};

pub struct ProgressManager {
    multi: MultiProgress,
    enabled: bool,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressManager {
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            enabled: true,
            bars: Mutex::new(HashMap::new()),
        }
    }

    pub fn new_disabled(multi: MultiProgress) -> Self {
        Self {
            multi,
            enabled: false,
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn lesson_style() -> ProgressStyle {
        ProgressStyle::with_template("{prefix} [{bar:40}] {pos}/{len} ({eta})")
            .expect("valid progress template")
            .progress_chars("=> ")
    }

    pub fn handle_event(&self, event: PipelineEvent) {
        if !self.enabled {
            return;
        }
        match event {
            PipelineEvent::CourseStarted {
                course_id,
                index,
                total,
                title,
                ..
            } => {
                let title = title.unwrap_or_else(|| course_id.clone());
                let _ = self
                    .multi
                    .println(format!("course {}/{}: {}", index + 1, total, title));
            }
            PipelineEvent::LessonStarted {
                lesson_id,
                index,
                total,
                segments,
            } => {
                let bar = self.multi.add(ProgressBar::new(segments as u64));
                bar.set_style(Self::lesson_style());
                bar.set_prefix(format!("lesson {}/{} {}", index + 1, total, lesson_id));
                self.bars.lock().unwrap().insert(lesson_id, bar);
            }
            PipelineEvent::SegmentProgress {
                lesson_id,
                completed,
                ..
            } => {
                if let Some(bar) = self.bars.lock().unwrap().get(&lesson_id) {
                    bar.set_position(completed as u64);
                }
            }
            PipelineEvent::LessonCompleted { lesson_id } => {
                if let Some(bar) = self.bars.lock().unwrap().remove(&lesson_id) {
                    bar.finish_and_clear();
                }
            }
            PipelineEvent::UnitFailed {
                unit: UnitKind::Lesson,
                id,
                ..
            } => {
                if let Some(bar) = self.bars.lock().unwrap().remove(&id) {
                    bar.abandon_with_message("failed");
                }
            }
            _ => {}
        }
    }
}
