use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

pub const DEFAULT_GROUP: &str = "Genel";
pub const DEFAULT_NAME: &str = "Bilinmeyen";

const EXTINF_MARKER: &str = "#EXTINF";

lazy_static! {
    static ref GROUP_TITLE: Regex = Regex::new(r#"group-title="([^"]*)""#).unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChannelRecord {
    pub group: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub selected: bool,
}

impl ChannelRecord {
    pub fn new(group: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            url: url.into(),
            selected: false,
        }
    }
}

/// Parser state between lines. At most one `#EXTINF` is waiting for its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseState {
    Idle,
    PendingMetadata { group: String, name: String },
}

/// Incremental M3U parser.
///
/// Lines can be fed one at a time (text or bytes) or as arbitrary byte chunks,
/// e.g. straight from a streamed HTTP body. Malformed input never errors; lines
/// that don't fit are dropped.
#[derive(Debug)]
pub struct Parser {
    state: ParseState,
    records: Vec<ChannelRecord>,
    partial: Vec<u8>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: ParseState::Idle,
            records: Vec::new(),
            partial: Vec::new(),
        }
    }

    pub fn feed_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        if line.starts_with(EXTINF_MARKER) {
            let (group, name) = parse_extinf(line);
            if let ParseState::PendingMetadata { name: lost, .. } = &self.state {
                debug!("Discarding #EXTINF without URL: name=\"{}\"", lost);
            }
            self.state = ParseState::PendingMetadata { group, name };
        } else if !line.starts_with('#') {
            match std::mem::replace(&mut self.state, ParseState::Idle) {
                ParseState::PendingMetadata { group, name } => {
                    self.records.push(ChannelRecord::new(group, name, line));
                }
                ParseState::Idle => {
                    debug!("Ignoring URL line without #EXTINF: {}", line);
                }
            }
        }
    }

    /// Feeds one raw line. Invalid UTF-8 sequences are dropped, the rest of the line is kept.
    pub fn feed_bytes_line(&mut self, line: &[u8]) {
        match std::str::from_utf8(line) {
            Ok(text) => self.feed_line(text),
            Err(_) => {
                let text = decode_valid_parts(line);
                debug!("Dropped invalid UTF-8 bytes from line: {}", text);
                self.feed_line(&text);
            }
        }
    }

    /// Feeds a chunk of a byte stream. Chunk boundaries may fall anywhere,
    /// including inside a line or a multi-byte character.
    pub fn feed_chunk(&mut self, chunk: &[u8]) {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            if self.partial.is_empty() {
                self.feed_bytes_line(head);
            } else {
                let mut line = std::mem::take(&mut self.partial);
                line.extend_from_slice(head);
                self.feed_bytes_line(&line);
            }
            rest = &tail[1..];
        }
        self.partial.extend_from_slice(rest);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flushes any buffered partial line and returns the records. A trailing
    /// `#EXTINF` that never got a URL is dropped.
    pub fn finish(mut self) -> Vec<ChannelRecord> {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.feed_bytes_line(&line);
        }
        if let ParseState::PendingMetadata { name, .. } = &self.state {
            debug!("Discarding trailing #EXTINF without URL: name=\"{}\"", name);
        }
        self.records
    }
}

fn decode_valid_parts(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

fn parse_extinf(line: &str) -> (String, String) {
    let group = GROUP_TITLE
        .captures(line)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| DEFAULT_GROUP.to_string());

    let name = match line.rsplit_once(',') {
        Some((_, name)) => name.trim().to_string(),
        None => DEFAULT_NAME.to_string(),
    };

    (group, name)
}

pub fn parse_m3u(content: &str) -> Vec<ChannelRecord> {
    parse_lines(content.lines())
}

pub fn parse_m3u_bytes(content: &[u8]) -> Vec<ChannelRecord> {
    let mut parser = Parser::new();
    parser.feed_chunk(content);
    parser.finish()
}

pub fn parse_lines<I, S>(lines: I) -> Vec<ChannelRecord>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = Parser::new();
    for line in lines {
        parser.feed_line(line.as_ref());
    }
    parser.finish()
}
