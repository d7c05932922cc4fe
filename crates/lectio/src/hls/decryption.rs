// Segment decryption: every segment is an independently decryptable unit.

use aes::Aes128;
use cipher::{BlockModeDecrypt, KeyIvInit, block_padding::NoPadding};
use tracing::debug;

use crate::error::DownloadError;
use crate::hls::key::LessonKey;
use crate::store::LessonStore;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Decrypts one segment with a cipher freshly keyed from the lesson's
/// key/IV. CBC state never carries across segment boundaries. No padding
/// is removed; the transport-stream container downstream tolerates
/// block-aligned trailing bytes.
pub fn decrypt_segment(data: &[u8], key: &LessonKey) -> Result<Vec<u8>, DownloadError> {
    if data.len() % 16 != 0 {
        return Err(DownloadError::Decode(format!(
            "segment length {} is not block-aligned",
            data.len()
        )));
    }
    let mut buffer = data.to_vec();
    let cipher = Aes128CbcDec::new_from_slices(&key.key, &key.iv)
        .map_err(|e| DownloadError::Decode(format!("failed to initialize AES decryptor: {e}")))?;
    let decrypted_len = cipher
        .decrypt_padded::<NoPadding>(&mut buffer)
        .map_err(|e| DownloadError::Decode(format!("decryption failed: {e}")))?
        .len();
    buffer.truncate(decrypted_len);
    Ok(buffer)
}

/// Runs a full decrypt pass over a lesson: truncates the output, then
/// appends each indexed segment's plaintext in manifest order. A pass
/// always restarts from the first segment; partial output from an
/// interrupted run is never resumed.
pub async fn run_decrypt_pass(lesson: &LessonStore) -> Result<u64, DownloadError> {
    let key = lesson.read_key().await?;
    let index = lesson.read_segment_index().await?;
    let mut output = lesson.init_decrypted_output().await?;
    let mut total = 0u64;
    for file_name in &index {
        let data = lesson.read_segment(file_name).await?;
        let plaintext = decrypt_segment(&data, &key)?;
        total += plaintext.len() as u64;
        output.append(&plaintext).await?;
    }
    output.finish().await?;
    debug!(lesson_id = lesson.lesson_id(), bytes = total, "decrypt pass complete");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ContentStore;
    use cipher::BlockModeEncrypt;

    type Aes128CbcEnc = cbc::Encryptor<Aes128>;

    const KEY: LessonKey = LessonKey {
        key: *b"0123456789abcdef",
        iv: *b"fedcba9876543210",
    };

    const PLAIN0: &[u8; 16] = b"first segment!!\n";
    const PLAIN1: &[u8; 16] = b"second segment!\n";

    fn encrypt(plaintext: &[u8]) -> Vec<u8> {
        let mut buffer = plaintext.to_vec();
        Aes128CbcEnc::new_from_slices(&KEY.key, &KEY.iv)
            .unwrap()
            .encrypt_padded::<NoPadding>(&mut buffer, plaintext.len())
            .unwrap();
        buffer
    }

    #[test]
    fn test_round_trip() {
        let ciphertext = encrypt(PLAIN0);
        assert_ne!(ciphertext, PLAIN0);
        assert_eq!(decrypt_segment(&ciphertext, &KEY).unwrap(), PLAIN0);
    }

    #[test]
    fn test_segments_decrypt_independently() {
        // Each segment is encrypted against the same starting IV; the
        // concatenated plaintexts must come out of independent decrypts,
        // not one CBC stream across the boundary.
        let joined: Vec<u8> = [
            decrypt_segment(&encrypt(PLAIN0), &KEY).unwrap(),
            decrypt_segment(&encrypt(PLAIN1), &KEY).unwrap(),
        ]
        .concat();
        let expected: Vec<u8> = [PLAIN0.as_slice(), PLAIN1.as_slice()].concat();
        assert_eq!(joined, expected);
    }

    #[test]
    fn test_rejects_unaligned_segment() {
        let err = decrypt_segment(b"short", &KEY).unwrap_err();
        assert!(matches!(err, DownloadError::Decode(_)));
    }

    async fn seeded_lesson(root: &std::path::Path) -> crate::store::LessonStore {
        let lesson = ContentStore::new(root)
            .ensure_lesson_dir("t1", "c1", "l1")
            .await
            .unwrap();
        lesson.write_key(&KEY).await.unwrap();
        lesson.write_segment("seg0.ts", &encrypt(PLAIN0)).await.unwrap();
        lesson.write_segment("seg1.ts", &encrypt(PLAIN1)).await.unwrap();
        lesson
            .write_segment_index(&["seg0.ts".to_string(), "seg1.ts".to_string()])
            .await
            .unwrap();
        lesson
    }

    #[tokio::test]
    async fn test_decrypt_pass_concatenates_in_index_order() {
        let root = tempfile::tempdir().unwrap();
        let lesson = seeded_lesson(root.path()).await;

        let total = run_decrypt_pass(&lesson).await.unwrap();
        assert_eq!(total, 32);

        let output = tokio::fs::read(lesson.decrypted_path()).await.unwrap();
        let expected: Vec<u8> = [PLAIN0.as_slice(), PLAIN1.as_slice()].concat();
        assert_eq!(output, expected);
    }

    #[tokio::test]
    async fn test_decrypt_pass_is_repeatable() {
        let root = tempfile::tempdir().unwrap();
        let lesson = seeded_lesson(root.path()).await;

        run_decrypt_pass(&lesson).await.unwrap();
        let first = tokio::fs::read(lesson.decrypted_path()).await.unwrap();

        run_decrypt_pass(&lesson).await.unwrap();
        let second = tokio::fs::read(lesson.decrypted_path()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
    }
}
