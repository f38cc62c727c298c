//! Source protocol detection and segment naming.

use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

pub const MANIFEST_FILE: &str = "filelist.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaProtocol {
    /// `.ts` source: numbered segments fetched until the origin runs out.
    Segmented,
    /// `.mp4` source: one file streamed as-is.
    Direct,
}

impl MediaProtocol {
    /// Decides by the extension of the URL path; query and fragment are ignored.
    pub fn detect(url: &Url) -> Option<Self> {
        let name = file_name(url)?.to_ascii_lowercase();
        if name.ends_with(".ts") {
            Some(MediaProtocol::Segmented)
        } else if name.ends_with(".mp4") {
            Some(MediaProtocol::Direct)
        } else {
            None
        }
    }
}

/// Last path component of `url`, still percent-encoded.
pub fn file_name(url: &Url) -> Option<&str> {
    url.path_segments()?.next_back().filter(|s| !s.is_empty())
}

/// Address of a sibling file in the same directory as `url`.
pub fn sibling_url(url: &Url, name: &str) -> Url {
    let mut sibling = url.clone();
    let dir = url.path().rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    sibling.set_path(&format!("{}/{}", dir, name));
    sibling.set_query(None);
    sibling.set_fragment(None);
    sibling
}

/// Naming pattern of a numbered segment sequence.
///
/// Two conventions are recognised:
/// - `media_<token>` where the last `_` token becomes `{n}.ts`
/// - `segment-<token>[-rest]` where the second `-` token becomes `{n}`
///
/// The index is zero-padded to the number of leading digits of the replaced
/// token, so `media_000.ts` continues with `media_001.ts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTemplate {
    prefix: String,
    suffix: String,
    width: usize,
}

impl SegmentTemplate {
    pub fn derive(file_name: &str) -> Option<Self> {
        if file_name.starts_with("media_") {
            let (head, token) = file_name.rsplit_once('_')?;
            return Some(Self {
                prefix: format!("{}_", head),
                suffix: ".ts".to_string(),
                width: digit_width(token),
            });
        }

        if file_name.starts_with("segment") {
            let mut parts = file_name.splitn(3, '-');
            let head = parts.next()?;
            let token = parts.next()?;
            let suffix = parts.next().map(|rest| format!("-{}", rest)).unwrap_or_default();
            return Some(Self {
                prefix: format!("{}-", head),
                suffix,
                width: digit_width(token),
            });
        }

        None
    }

    pub fn segment_name(&self, index: u32) -> String {
        format!("{}{:0width$}{}", self.prefix, index, self.suffix, width = self.width)
    }
}

impl fmt::Display for SegmentTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{n}}{}", self.prefix, self.suffix)
    }
}

fn digit_width(token: &str) -> usize {
    token.chars().take_while(|c| c.is_ascii_digit()).count().max(1)
}

/// Writes an ffmpeg concat list of `files` (relative to `dir`) in the given
/// order and returns its path.
pub async fn write_manifest(dir: &Path, files: &[String]) -> std::io::Result<PathBuf> {
    let path = dir.join(MANIFEST_FILE);
    let mut body = files
        .iter()
        .map(|f| format!("file '{}'", f.replace('\'', "'\\''")))
        .collect::<Vec<_>>()
        .join("\n");
    body.push('\n');
    tokio::fs::write(&path, body).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn detects_protocol_from_path_extension() {
        assert_eq!(
            MediaProtocol::detect(&url("https://cdn.example.com/live/media_000.ts")),
            Some(MediaProtocol::Segmented)
        );
        assert_eq!(
            MediaProtocol::detect(&url("https://cdn.example.com/vod/movie.MP4?sig=abc")),
            Some(MediaProtocol::Direct)
        );
        assert_eq!(MediaProtocol::detect(&url("https://cdn.example.com/vod/movie.mkv")), None);
        assert_eq!(MediaProtocol::detect(&url("https://cdn.example.com/vod/")), None);
    }

    #[test]
    fn media_template_replaces_last_underscore_token() {
        let template = SegmentTemplate::derive("media_000.ts").unwrap();
        assert_eq!(template.to_string(), "media_{n}.ts");
        assert_eq!(template.segment_name(1), "media_001.ts");
        assert_eq!(template.segment_name(1234), "media_1234.ts");

        let template = SegmentTemplate::derive("media_720p_5.ts").unwrap();
        assert_eq!(template.to_string(), "media_720p_{n}.ts");
        assert_eq!(template.segment_name(12), "media_720p_12.ts");
    }

    #[test]
    fn segment_template_replaces_second_hyphen_token() {
        let template = SegmentTemplate::derive("segment-000-x").unwrap();
        assert_eq!(template.to_string(), "segment-{n}-x");
        assert_eq!(template.segment_name(7), "segment-007-x");

        let template = SegmentTemplate::derive("segment-1-v1-a1.ts").unwrap();
        assert_eq!(template.to_string(), "segment-{n}-v1-a1.ts");
        assert_eq!(template.segment_name(2), "segment-2-v1-a1.ts");
    }

    #[test]
    fn unrecognised_names_have_no_template() {
        assert_eq!(SegmentTemplate::derive("chunk_001.ts"), None);
        assert_eq!(SegmentTemplate::derive("segment.ts"), None);
        assert_eq!(SegmentTemplate::derive("index.ts"), None);
    }

    #[test]
    fn sibling_url_stays_in_the_same_directory() {
        let base = url("https://cdn.example.com/live/abc/media_000.ts?token=1#t");
        assert_eq!(
            sibling_url(&base, "media_001.ts").as_str(),
            "https://cdn.example.com/live/abc/media_001.ts"
        );
    }

    #[tokio::test]
    async fn manifest_lists_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec!["000001.ts".to_string(), "000002.ts".to_string()];

        let path = write_manifest(dir.path(), &files).await.unwrap();

        let body = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(body, "file '000001.ts'\nfile '000002.ts'\n");
        assert_eq!(path.file_name().unwrap(), MANIFEST_FILE);
    }
}
