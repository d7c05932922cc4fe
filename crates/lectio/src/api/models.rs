// Typed views over the consumed subsets of the remote API's JSON
// envelopes. The full raw envelope is kept alongside as `metadata` so the
// on-disk snapshots lose nothing.

use serde::Deserialize;
use serde_json::Value;

/// Every endpoint wraps its payload in `{"data": ...}`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// A child resource reference: an id to resolve later, never an eagerly
/// fetched body.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct TrainerData {
    pub courses: Vec<ResourceRef>,
}

#[derive(Debug, Deserialize)]
pub struct CourseData {
    pub lessons: Vec<ResourceRef>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub highlights: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LessonData {
    pub token: VideoToken,
}

/// Opaque access parameters for the lesson's adaptive manifest: the master
/// manifest URL and the querystring that must accompany every
/// manifest-derived fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoToken {
    pub url: String,
    pub token_querystring: String,
}

/// A resolved trainer: metadata snapshot plus course references.
#[derive(Debug)]
pub struct Trainer {
    pub id: String,
    pub metadata: Value,
    pub courses: Vec<String>,
}

/// A resolved course: metadata snapshot plus lesson references.
#[derive(Debug)]
pub struct Course {
    pub id: String,
    pub metadata: Value,
    pub title: Option<String>,
    pub highlights: Option<String>,
    pub lessons: Vec<String>,
}

/// A resolved lesson: metadata snapshot plus the video token. The manifest
/// is not resolved here.
#[derive(Debug)]
pub struct Lesson {
    pub id: String,
    pub metadata: Value,
    pub token: VideoToken,
}
