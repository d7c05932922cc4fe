// Manifest resolution: master playlist fetch, highest-bandwidth variant
// selection, variant playlist fetch, ordered segment extraction.

use m3u8_rs::{MasterPlaylist, MediaPlaylist, Playlist, VariantStream};
use tracing::debug;
use url::Url;

use crate::api::VideoToken;
use crate::error::DownloadError;
use crate::transport::Transport;

/// One media segment of a variant playlist. The sequence index is the
/// segment's position in the manifest; decryption output follows it.
#[derive(Debug, Clone)]
pub struct SegmentEntry {
    pub sequence: usize,
    /// Absolute fetch URL, token querystring included.
    pub uri: Url,
    /// Deterministic on-disk name derived from the manifest URI.
    pub file_name: String,
}

/// The single key descriptor of a variant playlist.
#[derive(Debug, Clone)]
pub struct KeyDescriptor {
    pub uri: Url,
    pub iv_hex: String,
}

/// Everything the fetch and decrypt stages need for one lesson.
#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    pub segments: Vec<SegmentEntry>,
    pub key: KeyDescriptor,
    pub bandwidth: u64,
}

pub struct ManifestResolver {
    transport: Transport,
}

impl ManifestResolver {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Resolves a lesson's video token down to its ordered segment list
    /// and key descriptor.
    pub async fn resolve(&self, token: &VideoToken) -> Result<ResolvedManifest, DownloadError> {
        let master_url = Url::parse(&token.url)
            .map_err(|e| DownloadError::Url(format!("invalid master manifest URL {}: {e}", token.url)))?;

        let text = self
            .transport
            .get_text(with_token_query(master_url.clone(), &token.token_querystring))
            .await?;
        let master = parse_master(&text)?;
        let variant = select_best_variant(&master)?;
        debug!(bandwidth = variant.bandwidth, uri = %variant.uri, "selected highest-bandwidth variant");

        let variant_url = master_url.join(&variant.uri).map_err(|e| {
            DownloadError::Url(format!(
                "cannot resolve variant URI {} against {master_url}: {e}",
                variant.uri
            ))
        })?;
        let text = self
            .transport
            .get_text(with_token_query(variant_url.clone(), &token.token_querystring))
            .await?;
        let media = parse_media(&text)?;
        let (segments, key) = extract_segments_and_key(&media, &variant_url, &token.token_querystring)?;
        debug!(segments = segments.len(), "resolved variant playlist");

        Ok(ResolvedManifest {
            segments,
            key,
            bandwidth: variant.bandwidth,
        })
    }
}

/// Appends the token querystring to a URL, keeping any query the URL
/// already carries.
pub(crate) fn with_token_query(mut url: Url, token_query: &str) -> Url {
    if token_query.is_empty() {
        return url;
    }
    let merged = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{token_query}"),
        _ => token_query.to_string(),
    };
    url.set_query(Some(&merged));
    url
}

pub fn parse_master(text: &str) -> Result<MasterPlaylist, DownloadError> {
    match m3u8_rs::parse_playlist_res(text.as_bytes()) {
        Ok(Playlist::MasterPlaylist(playlist)) => Ok(playlist),
        // A media playlist offers no variants to choose between.
        Ok(Playlist::MediaPlaylist(_)) => Err(DownloadError::NotVariant(0)),
        Err(e) => Err(DownloadError::Decode(format!(
            "failed to parse master playlist: {e}"
        ))),
    }
}

pub fn parse_media(text: &str) -> Result<MediaPlaylist, DownloadError> {
    match m3u8_rs::parse_playlist_res(text.as_bytes()) {
        Ok(Playlist::MediaPlaylist(playlist)) => Ok(playlist),
        Ok(Playlist::MasterPlaylist(_)) => Err(DownloadError::Decode(
            "expected media playlist, got master".to_string(),
        )),
        Err(e) => Err(DownloadError::Decode(format!(
            "failed to parse media playlist: {e}"
        ))),
    }
}

/// Picks the variant with the maximum declared bandwidth; ties keep the
/// first one encountered in manifest order.
pub fn select_best_variant(master: &MasterPlaylist) -> Result<&VariantStream, DownloadError> {
    if master.variants.len() <= 1 {
        return Err(DownloadError::NotVariant(master.variants.len()));
    }
    let mut best = &master.variants[0];
    for variant in &master.variants[1..] {
        if variant.bandwidth > best.bandwidth {
            best = variant;
        }
    }
    Ok(best)
}

/// Extracts the ordered segment list and the single key descriptor from a
/// variant playlist. URIs resolve against the playlist's own URL.
pub fn extract_segments_and_key(
    media: &MediaPlaylist,
    variant_url: &Url,
    token_query: &str,
) -> Result<(Vec<SegmentEntry>, KeyDescriptor), DownloadError> {
    let mut segments = Vec::with_capacity(media.segments.len());
    let mut keys: Vec<&m3u8_rs::Key> = Vec::new();

    for (sequence, segment) in media.segments.iter().enumerate() {
        if let Some(key) = &segment.key {
            if !keys
                .iter()
                .any(|k| k.uri == key.uri && k.iv == key.iv && k.method == key.method)
            {
                keys.push(key);
            }
        }
        let uri = variant_url.join(&segment.uri).map_err(|e| {
            DownloadError::Url(format!(
                "cannot resolve segment URI {} against {variant_url}: {e}",
                segment.uri
            ))
        })?;
        let file_name = segment_file_name(&uri, sequence);
        segments.push(SegmentEntry {
            sequence,
            uri: with_token_query(uri, token_query),
            file_name,
        });
    }

    if keys.len() != 1 {
        return Err(DownloadError::KeyCount(keys.len()));
    }
    let key = keys[0];
    if key.method != m3u8_rs::KeyMethod::AES128 {
        return Err(DownloadError::Decode(format!(
            "unsupported key method {:?}",
            key.method
        )));
    }
    let key_uri = key
        .uri
        .as_deref()
        .ok_or_else(|| DownloadError::Decode("key descriptor has no URI".to_string()))?;
    let iv_hex = key
        .iv
        .clone()
        .ok_or_else(|| DownloadError::Decode("key descriptor has no IV".to_string()))?;
    let uri = variant_url.join(key_uri).map_err(|e| {
        DownloadError::Url(format!(
            "cannot resolve key URI {key_uri} against {variant_url}: {e}"
        ))
    })?;

    Ok((
        segments,
        KeyDescriptor {
            uri: with_token_query(uri, token_query),
            iv_hex,
        },
    ))
}

fn segment_file_name(url: &Url, sequence: usize) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .unwrap_or_else(|| format!("segment{sequence}.ts"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=500,RESOLUTION=640x360\n\
low/index.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=1500,RESOLUTION=1920x1080\n\
high/index.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=1000,RESOLUTION=1280x720\n\
mid/index.m3u8\n";

    const VARIANT: &str = "#EXTM3U\n\
#EXT-X-VERSION:3\n\
#EXT-X-TARGETDURATION:10\n\
#EXT-X-MEDIA-SEQUENCE:0\n\
#EXT-X-KEY:METHOD=AES-128,URI=\"enc.key\",IV=0x00112233445566778899aabbccddeeff\n\
#EXTINF:9.0,\n\
segment0.ts\n\
#EXTINF:9.0,\n\
segment1.ts\n\
#EXT-X-ENDLIST\n";

    fn base_url() -> Url {
        Url::parse("https://cdn.example.com/v1/high/index.m3u8").unwrap()
    }

    #[test]
    fn test_selects_maximum_bandwidth() {
        let master = parse_master(MASTER).unwrap();
        let variant = select_best_variant(&master).unwrap();
        assert_eq!(variant.bandwidth, 1500);
        assert_eq!(variant.uri, "high/index.m3u8");
    }

    #[test]
    fn test_bandwidth_tie_keeps_first() {
        let master = parse_master(
            "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=800\n\
first/index.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=800\n\
second/index.m3u8\n",
        )
        .unwrap();
        let variant = select_best_variant(&master).unwrap();
        assert_eq!(variant.uri, "first/index.m3u8");
    }

    #[test]
    fn test_single_variant_is_rejected() {
        let master = parse_master(
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=500\nonly/index.m3u8\n",
        )
        .unwrap();
        let err = select_best_variant(&master).unwrap_err();
        assert!(matches!(err, DownloadError::NotVariant(1)));
    }

    #[test]
    fn test_media_playlist_is_not_a_variant_playlist() {
        let err = parse_master(VARIANT).unwrap_err();
        assert!(matches!(err, DownloadError::NotVariant(0)));
    }

    #[test]
    fn test_extracts_ordered_segments_and_key() {
        let media = parse_media(VARIANT).unwrap();
        let (segments, key) =
            extract_segments_and_key(&media, &base_url(), "token=abc").unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].sequence, 0);
        assert_eq!(segments[0].file_name, "segment0.ts");
        assert_eq!(
            segments[0].uri.as_str(),
            "https://cdn.example.com/v1/high/segment0.ts?token=abc"
        );
        assert_eq!(segments[1].file_name, "segment1.ts");

        assert_eq!(
            key.uri.as_str(),
            "https://cdn.example.com/v1/high/enc.key?token=abc"
        );
        assert_eq!(key.iv_hex, "0x00112233445566778899aabbccddeeff");
    }

    #[test]
    fn test_zero_keys_is_rejected() {
        let media = parse_media(
            "#EXTM3U\n\
#EXT-X-VERSION:3\n\
#EXT-X-TARGETDURATION:10\n\
#EXTINF:9.0,\n\
segment0.ts\n\
#EXT-X-ENDLIST\n",
        )
        .unwrap();
        let err = extract_segments_and_key(&media, &base_url(), "").unwrap_err();
        assert!(matches!(err, DownloadError::KeyCount(0)));
    }

    #[test]
    fn test_multiple_keys_are_rejected() {
        let media = parse_media(
            "#EXTM3U\n\
#EXT-X-VERSION:3\n\
#EXT-X-TARGETDURATION:10\n\
#EXT-X-KEY:METHOD=AES-128,URI=\"first.key\",IV=0x00000000000000000000000000000001\n\
#EXTINF:9.0,\n\
segment0.ts\n\
#EXT-X-KEY:METHOD=AES-128,URI=\"second.key\",IV=0x00000000000000000000000000000002\n\
#EXTINF:9.0,\n\
segment1.ts\n\
#EXT-X-ENDLIST\n",
        )
        .unwrap();
        let err = extract_segments_and_key(&media, &base_url(), "").unwrap_err();
        assert!(matches!(err, DownloadError::KeyCount(2)));
    }

    #[test]
    fn test_token_query_merges_with_existing_query() {
        let url = Url::parse("https://cdn.example.com/seg.ts?range=0-99").unwrap();
        let merged = with_token_query(url, "token=abc");
        assert_eq!(merged.query(), Some("range=0-99&token=abc"));

        let url = Url::parse("https://cdn.example.com/seg.ts").unwrap();
        assert_eq!(with_token_query(url.clone(), "").as_str(), url.as_str());
    }
}
