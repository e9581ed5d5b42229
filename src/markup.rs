//! Markdown-ish reply text to Telegram HTML.
//!
//! Backends answer in Markdown and our own replies use `**bold**` too.
//! Telegram's HTML mode is the forgiving one, so we escape everything and
//! then re-introduce the few tags we understand: bold, inline code, fenced
//! code blocks and links.

use std::sync::LazyLock;

use regex::Regex;

/// Telegram caps a message at 4096 characters; leave room for markup.
pub const MAX_CHUNK_CHARS: usize = 4000;

static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^\n]+?)\*\*").expect("bold pattern is valid"));
static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[([^\]\n]+)\]\((https?://[^\s)"]+)\)"#).expect("link pattern is valid")
});

/// Escape a string for safe inclusion in HTML content.
fn html_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            _ => result.push(c),
        }
    }
    result
}

pub fn to_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for (i, segment) in text.split("```").enumerate() {
        if i % 2 == 1 {
            out.push_str("<pre>");
            out.push_str(&html_escape(strip_fence_language(segment).trim_end_matches('\n')));
            out.push_str("</pre>");
        } else {
            out.push_str(&inline_html(segment));
        }
    }
    out
}

/// Drop a leading "rust\n" style language tag from a fenced block.
fn strip_fence_language(block: &str) -> &str {
    match block.split_once('\n') {
        Some((tag, rest))
            if tag
                .trim()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '#' | '_')) =>
        {
            rest
        }
        _ => block,
    }
}

fn inline_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, segment) in text.split('`').enumerate() {
        if i % 2 == 1 {
            out.push_str("<code>");
            out.push_str(&html_escape(segment));
            out.push_str("</code>");
        } else {
            let escaped = html_escape(segment);
            let bolded = BOLD.replace_all(&escaped, "<b>$1</b>");
            out.push_str(&LINK.replace_all(&bolded, r#"<a href="$2">$1</a>"#));
        }
    }
    out
}

/// Split `text` into pieces of at most `max_chars` characters, preferring
/// line breaks as cut points.
///
/// A cut inside a fenced code block closes the fence at the end of one piece
/// and reopens it at the start of the next, so every piece renders on its own.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut splitter = ChunkSplitter::new(max_chars);
    for line in text.split_inclusive('\n') {
        splitter.push_line(line);
    }
    splitter.finish()
}

const FENCE: &str = "```";
const REOPEN: &str = "```\n";

struct ChunkSplitter {
    max_chars: usize,
    chunks: Vec<String>,
    current: String,
    current_len: usize,
    /// Bytes at the start of `current` carried over from the previous chunk.
    carried: usize,
    in_fence: bool,
    /// Byte range of the line that opened the current fence, if it's in `current`.
    opener: Option<(usize, usize)>,
}

impl ChunkSplitter {
    fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
            carried: 0,
            in_fence: false,
            opener: None,
        }
    }

    fn push_line(&mut self, line: &str) {
        let toggles = line.matches(FENCE).count() % 2 == 1;
        let open_after = self.in_fence != toggles;
        // Room for either the closing fence line or the fence a cut would add.
        let reserve = if open_after { REOPEN.len() } else { 0 };

        let max = self.max_chars;
        let fits = move |len: usize, extra: &str| len + extra.chars().count() + reserve <= max;
        if !fits(self.current_len, line) && self.has_content() {
            self.cut();
        }

        let mut rest = line;
        while !rest.is_empty() && !fits(self.current_len, rest) {
            let closing = if self.in_fence { FENCE.len() } else { 0 };
            let room = self.max_chars.saturating_sub(self.current_len + closing).max(1);
            let at = rest.char_indices().nth(room).map_or(rest.len(), |(i, _)| i);
            let (piece, tail) = rest.split_at(at);
            self.current.push_str(piece);
            self.current_len += piece.chars().count();
            self.cut();
            rest = tail;
        }

        let start = self.current.len();
        self.current.push_str(rest);
        self.current_len += rest.chars().count();

        if toggles {
            self.opener = open_after.then_some((start, self.current.len()));
        }
        self.in_fence = open_after;
    }

    fn has_content(&self) -> bool {
        self.current.len() > self.carried
    }

    fn cut(&mut self) {
        let mut chunk = std::mem::take(&mut self.current);
        self.current_len = 0;
        self.carried = 0;

        if self.in_fence {
            match self.opener {
                // Nothing after the opening line yet: move it to the next chunk whole.
                Some((start, end)) if end == chunk.len() => {
                    self.current = chunk.split_off(start);
                }
                _ => {
                    chunk.push_str(FENCE);
                    self.current = REOPEN.to_string();
                }
            }
            self.current_len = self.current.chars().count();
            self.carried = self.current.len();
            self.opener = Some((0, self.current.len()));
        }

        if !chunk.trim().is_empty() {
            self.chunks.push(chunk);
        }
    }

    fn finish(mut self) -> Vec<String> {
        if !self.current[self.carried..].trim().is_empty() {
            self.chunks.push(self.current);
        }
        self.chunks
    }
}
