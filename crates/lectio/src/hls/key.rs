// Key material for AES-128 lessons: one key and one IV, shared by every
// segment of the lesson.

use tracing::debug;

use crate::error::DownloadError;
use crate::hls::playlist::KeyDescriptor;
use crate::transport::Transport;

/// Raw key material. The IV comes verbatim from the manifest's key
/// descriptor, never derived from segment sequence numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonKey {
    pub key: [u8; 16],
    pub iv: [u8; 16],
}

pub struct KeyFetcher {
    transport: Transport,
}

impl KeyFetcher {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Fetches the raw key bytes once per lesson and decodes the
    /// descriptor's hex IV.
    pub async fn fetch(&self, descriptor: &KeyDescriptor) -> Result<LessonKey, DownloadError> {
        let bytes = self.transport.get_bytes(descriptor.uri.clone()).await?;
        if bytes.len() != 16 {
            return Err(DownloadError::Decode(format!(
                "decryption key from {} has length {}, expected 16",
                descriptor.uri,
                bytes.len()
            )));
        }
        let mut key = [0u8; 16];
        key.copy_from_slice(&bytes);
        let iv = parse_iv(&descriptor.iv_hex)?;
        debug!(uri = %descriptor.uri, "fetched lesson key");
        Ok(LessonKey { key, iv })
    }
}

/// Decodes a manifest IV attribute, tolerating the usual `0x` prefix.
pub fn parse_iv(iv_hex: &str) -> Result<[u8; 16], DownloadError> {
    let trimmed = iv_hex.trim_start_matches("0x").trim_start_matches("0X");
    let mut iv = [0u8; 16];
    hex::decode_to_slice(trimmed, &mut iv)
        .map_err(|e| DownloadError::Decode(format!("failed to parse IV '{iv_hex}': {e}")))?;
    Ok(iv)
}
