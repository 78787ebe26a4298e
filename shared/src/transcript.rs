use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

/// One timestamped line of transcribed speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptSegment {
    /// Seconds from the start of the episode.
    pub timestamp: u64,
    pub text: String,
    pub speaker: Option<String>,
}

/// An immutable snapshot of the transcript file on disk.
///
/// The transcription job writes the file while we read it, so every load
/// re-derives a fresh snapshot; callers decide whether to adopt it. `load`
/// never fails: the worst outcome is an empty segment list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub items: Vec<TranscriptSegment>,
    /// The backing file exists.
    pub started: bool,
    /// A complete, well-formed document was parsed.
    pub loaded: bool,
    /// Segments were recovered from an incomplete document.
    pub partial: bool,
}

/// Document shape produced by the transcription tool.
#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    timestamp: String,
    text: String,
    #[serde(default)]
    speaker: Option<String>,
}

/// Brace-delimited fragments carrying both required fields, in either order.
/// Nested braces inside segment text are not expected from the tool; a
/// fragment that still fails to parse is skipped, not fatal.
static FRAGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\{[^{}]*"timestamp"[^{}]*"text"[^{}]*\}|\{[^{}]*"text"[^{}]*"timestamp"[^{}]*\}"#,
    )
    .expect("fragment regex")
});

static LINE_TIMESTAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2}):(\d{2})").expect("line timestamp regex"));

static SPEAKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)speaker\s*\d+").expect("speaker regex"));

/// Converts the tool's "MM:SS" timestamps to seconds. Extra trailing
/// components are ignored, matching the document format.
pub fn parse_timestamp(raw: &str) -> Option<u64> {
    let mut parts = raw.split(':');
    let minutes: u64 = parts.next()?.trim().parse().ok()?;
    let seconds: u64 = parts.next()?.trim().parse().ok()?;
    Some(minutes * 60 + seconds)
}

impl Transcript {
    /// Read the transcript file and extract whatever segments it holds.
    ///
    /// Safe to call once a second against a file another process is still
    /// appending to; in that append-only case the item count never goes
    /// backwards between calls on the same content.
    pub fn load(path: &Path) -> Transcript {
        if !path.exists() {
            return Transcript::default();
        }

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("failed to read transcript {}: {}", path.display(), err);
                return Transcript {
                    started: true,
                    ..Transcript::default()
                };
            }
        };

        match serde_json::from_str::<RawDocument>(&raw) {
            Ok(doc) => {
                let items = convert_items(doc.items);
                // An empty items array means the tool has produced nothing
                // usable yet; do not report the transcript as loaded.
                let loaded = !items.is_empty();
                Transcript {
                    items,
                    started: true,
                    loaded,
                    partial: false,
                }
            }
            Err(err) => {
                debug!(
                    "strict parse of {} failed ({}), extracting partial segments",
                    path.display(),
                    err
                );
                let items = if raw.contains("\"items\"") {
                    extract_fragments(&raw)
                } else {
                    extract_lines(&raw)
                };
                Transcript {
                    items,
                    started: true,
                    loaded: false,
                    partial: true,
                }
            }
        }
    }
}

fn convert_items(items: Vec<RawItem>) -> Vec<TranscriptSegment> {
    items
        .into_iter()
        .filter_map(|item| {
            let Some(timestamp) = parse_timestamp(&item.timestamp) else {
                warn!("skipping segment with bad timestamp {:?}", item.timestamp);
                return None;
            };
            Some(TranscriptSegment {
                timestamp,
                text: item.text,
                speaker: item.speaker,
            })
        })
        .collect()
}

/// Tolerant extraction for a document that is still being written: scan for
/// individually well-formed `{..timestamp..text..}` fragments and parse each
/// one on its own, discarding anything unparsable without aborting the scan.
fn extract_fragments(raw: &str) -> Vec<TranscriptSegment> {
    FRAGMENT_RE
        .find_iter(raw)
        .filter_map(|m| serde_json::from_str::<RawItem>(m.as_str()).ok())
        .filter_map(|item| {
            let timestamp = parse_timestamp(&item.timestamp)?;
            Some(TranscriptSegment {
                timestamp,
                text: item.text,
                speaker: item.speaker,
            })
        })
        .collect()
}

/// Last-resort heuristic for plain streaming output: any line carrying an
/// mm:ss token becomes a segment, text is the remainder of the line.
fn extract_lines(raw: &str) -> Vec<TranscriptSegment> {
    raw.lines()
        .filter_map(|line| {
            let m = LINE_TIMESTAMP_RE.find(line)?;
            let timestamp = parse_timestamp(m.as_str())?;
            let text = line[m.end()..].trim().to_string();
            if text.is_empty() {
                return None;
            }
            let speaker = SPEAKER_RE.find(line).map(|s| s.as_str().to_string());
            Some(TranscriptSegment {
                timestamp,
                text,
                speaker,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_transcript(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_is_not_started() {
        let t = Transcript::load(Path::new("/nonexistent/transcript.json"));
        assert!(!t.started);
        assert!(!t.loaded);
        assert!(!t.partial);
        assert!(t.items.is_empty());
    }

    #[test]
    fn complete_document_loads_with_converted_timestamps() {
        let file = write_transcript(
            r#"{"items":[
                {"timestamp":"00:00","text":"intro"},
                {"timestamp":"01:05","text":"body","speaker":"Speaker 2"}
            ]}"#,
        );
        let t = Transcript::load(file.path());
        assert!(t.started && t.loaded && !t.partial);
        assert_eq!(t.items.len(), 2);
        assert_eq!(t.items[1].timestamp, 65);
        assert_eq!(t.items[1].speaker.as_deref(), Some("Speaker 2"));
    }

    #[test]
    fn empty_items_array_is_not_loaded() {
        let file = write_transcript(r#"{"items":[]}"#);
        let t = Transcript::load(file.path());
        assert!(t.started);
        assert!(!t.loaded);
        assert!(t.items.is_empty());
    }

    #[test]
    fn truncated_document_recovers_complete_segments() {
        let file = write_transcript(
            r#"{"items":[{"timestamp":"00:05","text":"hello"},{"timestamp":"00:1"#,
        );
        let t = Transcript::load(file.path());
        assert!(t.started);
        assert!(!t.loaded);
        assert!(t.partial);
        assert_eq!(t.items.len(), 1);
        assert_eq!(t.items[0].timestamp, 5);
        assert_eq!(t.items[0].text, "hello");
    }

    #[test]
    fn fragments_amid_garbage_extract_in_document_order() {
        let file = write_transcript(concat!(
            "{\"items\": [ garbage,, \n",
            "{\"timestamp\":\"00:10\",\"text\":\"one\"}",
            " ,,, broken {not json} ",
            "{\"text\":\"two\",\"timestamp\":\"00:20\"}",
            "{\"timestamp\":\"oops\",\"text\":\"bad ts\"}",
            "{\"timestamp\":\"00:30\",\"text\":\"three\",\"speaker\":\"Speaker 1\"}",
        ));
        let t = Transcript::load(file.path());
        assert!(t.partial);
        let texts: Vec<_> = t.items.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
        assert_eq!(t.items[2].speaker.as_deref(), Some("Speaker 1"));
    }

    #[test]
    fn reload_of_unchanged_file_is_identical() {
        let file = write_transcript(
            r#"{"items":[{"timestamp":"00:10","text":"one"},{"timestamp":"00:2"#,
        );
        let first = Transcript::load(file.path());
        let second = Transcript::load(file.path());
        assert_eq!(first, second);
    }

    #[test]
    fn appending_segments_never_shrinks_the_snapshot() {
        let mut file = write_transcript(
            r#"{"items":[{"timestamp":"00:10","text":"one"},{"timestamp":"00:2"#,
        );
        let before = Transcript::load(file.path()).items.len();
        file.write_all(br#"0","text":"two"},{"timestamp":"00:3"#)
            .unwrap();
        file.flush().unwrap();
        let after = Transcript::load(file.path()).items.len();
        assert!(after >= before);
        assert_eq!(after, 2);
    }

    #[test]
    fn streaming_text_falls_back_to_line_heuristic() {
        let file = write_transcript(
            "intro line without time\n00:05 Speaker 1 hello there\n01:30 and more\n",
        );
        let t = Transcript::load(file.path());
        assert!(t.partial && !t.loaded);
        assert_eq!(t.items.len(), 2);
        assert_eq!(t.items[0].timestamp, 5);
        assert_eq!(t.items[0].speaker.as_deref(), Some("Speaker 1"));
        assert_eq!(t.items[1].timestamp, 90);
        assert_eq!(t.items[1].text, "and more");
    }

    #[test]
    fn timestamp_parsing() {
        assert_eq!(parse_timestamp("00:05"), Some(5));
        assert_eq!(parse_timestamp("10:30"), Some(630));
        assert_eq!(parse_timestamp("90:00"), Some(5400));
        assert_eq!(parse_timestamp("nonsense"), None);
        assert_eq!(parse_timestamp("12"), None);
    }
}
