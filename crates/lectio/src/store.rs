// Filesystem persistence: per-entity directories, metadata snapshots, key
// material, raw segment blobs, the ordered segment index, and the
// decrypted output stream.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::DownloadError;
use crate::hls::key::LessonKey;

pub const METADATA_FILE: &str = "metadata.json";
const KEY_FILE: &str = "key.bin";
const IV_FILE: &str = "iv.bin";
const SEGMENT_INDEX_FILE: &str = "segments.json";
const DECRYPTED_SUFFIX: &str = "decrypted";

/// Root of the on-disk layout:
/// `root/{trainer}/metadata.json`,
/// `root/{trainer}/{course}/metadata.json`,
/// `root/{trainer}/{course}/{lesson}/{metadata.json,key.bin,iv.bin,segments.json,<segments>,<lesson>.decrypted}`.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trainer_dir(&self, trainer_id: &str) -> PathBuf {
        self.root.join(trainer_id)
    }

    pub fn course_dir(&self, trainer_id: &str, course_id: &str) -> PathBuf {
        self.trainer_dir(trainer_id).join(course_id)
    }

    pub fn lesson_dir(&self, trainer_id: &str, course_id: &str, lesson_id: &str) -> PathBuf {
        self.course_dir(trainer_id, course_id).join(lesson_id)
    }

    pub async fn ensure_trainer_dir(&self, trainer_id: &str) -> Result<PathBuf, DownloadError> {
        let dir = self.trainer_dir(trainer_id);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    pub async fn ensure_course_dir(
        &self,
        trainer_id: &str,
        course_id: &str,
    ) -> Result<PathBuf, DownloadError> {
        let dir = self.course_dir(trainer_id, course_id);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    pub async fn ensure_lesson_dir(
        &self,
        trainer_id: &str,
        course_id: &str,
        lesson_id: &str,
    ) -> Result<LessonStore, DownloadError> {
        let dir = self.lesson_dir(trainer_id, course_id, lesson_id);
        fs::create_dir_all(&dir).await?;
        Ok(LessonStore {
            lesson_id: lesson_id.to_string(),
            dir,
        })
    }

    /// Overwrites the raw API envelope snapshot for a trainer or course
    /// directory.
    pub async fn write_metadata(&self, dir: &Path, metadata: &Value) -> Result<(), DownloadError> {
        write_metadata_file(dir, metadata).await
    }

    pub async fn read_metadata(&self, dir: &Path) -> Result<Value, DownloadError> {
        let bytes = fs::read(dir.join(METADATA_FILE)).await?;
        serde_json::from_slice(&bytes).map_err(DownloadError::from)
    }
}

async fn write_metadata_file(dir: &Path, metadata: &Value) -> Result<(), DownloadError> {
    let bytes = serde_json::to_vec_pretty(metadata)?;
    fs::write(dir.join(METADATA_FILE), bytes).await?;
    Ok(())
}

/// Handle on one lesson's directory.
#[derive(Debug, Clone)]
pub struct LessonStore {
    lesson_id: String,
    dir: PathBuf,
}

impl LessonStore {
    /// Opens an existing lesson directory; the lesson id is the directory
    /// name.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        let dir = dir.into();
        let lesson_id = dir
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                DownloadError::Decode(format!("lesson directory {} has no valid name", dir.display()))
            })?;
        Ok(Self { lesson_id, dir })
    }

    pub fn lesson_id(&self) -> &str {
        &self.lesson_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn write_metadata(&self, metadata: &Value) -> Result<(), DownloadError> {
        write_metadata_file(&self.dir, metadata).await
    }

    /// Persists key material as raw bytes; the decrypt pass never
    /// re-parses hex.
    pub async fn write_key(&self, key: &LessonKey) -> Result<(), DownloadError> {
        fs::write(self.dir.join(KEY_FILE), key.key).await?;
        fs::write(self.dir.join(IV_FILE), key.iv).await?;
        Ok(())
    }

    pub async fn read_key(&self) -> Result<LessonKey, DownloadError> {
        let key = read_exact_16(&self.dir.join(KEY_FILE)).await?;
        let iv = read_exact_16(&self.dir.join(IV_FILE)).await?;
        Ok(LessonKey { key, iv })
    }

    pub async fn has_key(&self) -> bool {
        fs::try_exists(self.dir.join(KEY_FILE)).await.unwrap_or(false)
            && fs::try_exists(self.dir.join(IV_FILE)).await.unwrap_or(false)
    }

    /// A segment counts as acquired once its blob exists under its final
    /// name, independent of decryption state.
    pub async fn is_segment_present(&self, file_name: &str) -> bool {
        fs::try_exists(self.dir.join(file_name)).await.unwrap_or(false)
    }

    /// Writes a segment blob through a temporary name so an interrupted
    /// write is never reported as present.
    pub async fn write_segment(&self, file_name: &str, bytes: &[u8]) -> Result<(), DownloadError> {
        let final_path = self.dir.join(file_name);
        let tmp_path = self.dir.join(format!("{file_name}.part"));
        fs::write(&tmp_path, bytes).await?;
        fs::rename(&tmp_path, &final_path).await?;
        debug!(lesson_id = %self.lesson_id, file_name, bytes = bytes.len(), "wrote segment");
        Ok(())
    }

    pub async fn read_segment(&self, file_name: &str) -> Result<Vec<u8>, DownloadError> {
        fs::read(self.dir.join(file_name)).await.map_err(DownloadError::from)
    }

    /// Persists the manifest-ordered segment file names; the decrypt pass
    /// iterates this index rather than scanning the directory.
    pub async fn write_segment_index(&self, file_names: &[String]) -> Result<(), DownloadError> {
        let bytes = serde_json::to_vec_pretty(file_names)?;
        fs::write(self.dir.join(SEGMENT_INDEX_FILE), bytes).await?;
        Ok(())
    }

    pub async fn read_segment_index(&self) -> Result<Vec<String>, DownloadError> {
        let bytes = fs::read(self.dir.join(SEGMENT_INDEX_FILE)).await?;
        serde_json::from_slice(&bytes).map_err(DownloadError::from)
    }

    pub async fn has_segment_index(&self) -> bool {
        fs::try_exists(self.dir.join(SEGMENT_INDEX_FILE))
            .await
            .unwrap_or(false)
    }

    pub fn decrypted_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}.{DECRYPTED_SUFFIX}", self.lesson_id))
    }

    /// Truncates/creates the decrypted output. Must be called once before
    /// any decrypt pass; appends happen in strict segment order.
    pub async fn init_decrypted_output(&self) -> Result<DecryptedOutput, DownloadError> {
        let file = fs::File::create(self.decrypted_path()).await?;
        Ok(DecryptedOutput { file })
    }
}

async fn read_exact_16(path: &Path) -> Result<[u8; 16], DownloadError> {
    let bytes = fs::read(path).await?;
    <[u8; 16]>::try_from(bytes.as_slice()).map_err(|_| {
        DownloadError::Decode(format!(
            "{} has length {}, expected 16",
            path.display(),
            bytes.len()
        ))
    })
}

/// Append-only handle on a lesson's decrypted output file.
#[derive(Debug)]
pub struct DecryptedOutput {
    file: fs::File,
}

impl DecryptedOutput {
    pub async fn append(&mut self, bytes: &[u8]) -> Result<(), DownloadError> {
        self.file.write_all(bytes).await?;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<(), DownloadError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn lesson_store(root: &Path) -> LessonStore {
        ContentStore::new(root)
            .ensure_lesson_dir("t1", "c1", "l1")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ensure_dirs_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let store = ContentStore::new(root.path());
        let first = store.ensure_lesson_dir("t1", "c1", "l1").await.unwrap();
        let second = store.ensure_lesson_dir("t1", "c1", "l1").await.unwrap();
        assert_eq!(first.dir(), second.dir());
        assert_eq!(first.dir(), store.lesson_dir("t1", "c1", "l1"));
    }

    #[tokio::test]
    async fn test_key_roundtrip() {
        let root = tempfile::tempdir().unwrap();
        let lesson = lesson_store(root.path()).await;
        let key = LessonKey {
            key: *b"0123456789abcdef",
            iv: *b"fedcba9876543210",
        };
        assert!(!lesson.has_key().await);
        lesson.write_key(&key).await.unwrap();
        assert!(lesson.has_key().await);
        assert_eq!(lesson.read_key().await.unwrap(), key);
    }

    #[tokio::test]
    async fn test_segment_write_is_atomic_and_visible() {
        let root = tempfile::tempdir().unwrap();
        let lesson = lesson_store(root.path()).await;

        assert!(!lesson.is_segment_present("seg0.ts").await);
        lesson.write_segment("seg0.ts", b"payload").await.unwrap();
        assert!(lesson.is_segment_present("seg0.ts").await);
        assert_eq!(lesson.read_segment("seg0.ts").await.unwrap(), b"payload");
        // No temporary file left behind.
        assert!(!lesson.is_segment_present("seg0.ts.part").await);
    }

    #[tokio::test]
    async fn test_segment_index_preserves_order() {
        let root = tempfile::tempdir().unwrap();
        let lesson = lesson_store(root.path()).await;
        let names = vec![
            "seg2.ts".to_string(),
            "seg0.ts".to_string(),
            "seg1.ts".to_string(),
        ];
        lesson.write_segment_index(&names).await.unwrap();
        assert_eq!(lesson.read_segment_index().await.unwrap(), names);
    }

    #[tokio::test]
    async fn test_init_truncates_decrypted_output() {
        let root = tempfile::tempdir().unwrap();
        let lesson = lesson_store(root.path()).await;

        let mut out = lesson.init_decrypted_output().await.unwrap();
        out.append(b"stale output").await.unwrap();
        out.finish().await.unwrap();

        let mut out = lesson.init_decrypted_output().await.unwrap();
        out.append(b"fresh").await.unwrap();
        out.finish().await.unwrap();

        let contents = fs::read(lesson.decrypted_path()).await.unwrap();
        assert_eq!(contents, b"fresh");
    }

    #[tokio::test]
    async fn test_metadata_roundtrip() {
        let root = tempfile::tempdir().unwrap();
        let store = ContentStore::new(root.path());
        let dir = store.ensure_trainer_dir("t1").await.unwrap();
        let metadata = serde_json::json!({"data": {"courses": [{"id": "c1"}]}});
        store.write_metadata(&dir, &metadata).await.unwrap();
        assert_eq!(store.read_metadata(&dir).await.unwrap(), metadata);
    }
}
