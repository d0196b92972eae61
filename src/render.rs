//! Incremental rendering of model text that contains textual escape markers.
//!
//! The model is told it may colour its output with `\033[31m`-style markers.
//! They arrive as literal text (backslash, `0`, `3`, `3`) and may be split
//! across stream deltas, so text is buffered until a marker is complete or a
//! length bound is hit, then translated to real ESC bytes and emitted.

use std::sync::LazyLock;

use regex::Regex;

/// Complete marker: `\033[` digits (`;` digits)* `m`.
static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\033\[(\d+(?:;\d+)*)m").expect("valid marker regex"));

const MARKER_START: &str = r"\033[";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlushThresholds {
    /// Emit once this many bytes are pending and no marker has started.
    pub lower: usize,
    /// Emit regardless once this many bytes are pending.
    pub upper: usize,
}

impl FlushThresholds {
    pub const INTERACTIVE: Self = Self {
        lower: 20,
        upper: 30,
    };

    pub const INTERPRETATION: Self = Self {
        lower: 80,
        upper: 100,
    };
}

/// Per-stream render buffer. Never shared between turns.
///
/// Known limitation: a marker longer than `upper`, or one that the model
/// never terminates, is printed literally.
#[derive(Debug)]
pub struct EscapeBuffer {
    pending: String,
    thresholds: FlushThresholds,
}

impl EscapeBuffer {
    pub fn new(thresholds: FlushThresholds) -> Self {
        Self {
            pending: String::new(),
            thresholds,
        }
    }

    /// Add a fragment; returns translated text when it is safe to print.
    pub fn append(&mut self, fragment: &str) -> Option<String> {
        self.pending.push_str(fragment);

        if MARKER.is_match(&self.pending) {
            return self.emit_holding_tail();
        }

        let started = self.pending.contains(MARKER_START);
        if started && self.pending.len() > self.thresholds.upper {
            // Keep a trailing partial marker whole unless it alone is over the bound.
            return match incomplete_tail_start(&self.pending) {
                Some(start) if start > 0 && self.pending.len() - start <= self.thresholds.upper => {
                    self.emit_holding_tail()
                }
                _ => self.emit_all(),
            };
        }
        if !started && self.pending.len() > self.thresholds.lower {
            return self.emit_holding_tail();
        }
        None
    }

    /// Stream ended: emit whatever is left, partial markers as literal text.
    pub fn flush(&mut self) -> Option<String> {
        self.emit_all()
    }

    fn emit_all(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let out = translate(&self.pending);
        self.pending.clear();
        Some(out)
    }

    fn emit_holding_tail(&mut self) -> Option<String> {
        let hold = incomplete_tail_start(&self.pending).unwrap_or(self.pending.len());
        if hold == 0 {
            return None;
        }
        let tail = self.pending.split_off(hold);
        let out = translate(&self.pending);
        self.pending = tail;
        Some(out)
    }
}

/// Replace every complete textual marker with the real control sequence.
pub fn translate(text: &str) -> String {
    MARKER.replace_all(text, "\x1b[${1}m").into_owned()
}

/// Byte offset of a trailing fragment that could still grow into a marker.
fn incomplete_tail_start(text: &str) -> Option<usize> {
    let start = text.rfind('\\')?;
    is_marker_prefix(&text[start..]).then_some(start)
}

#[derive(Clone, Copy)]
enum MarkerState {
    Backslash,
    Zero,
    Three,
    ThreeThree,
    Bracket,
    Digits,
    Separator,
}

/// True if `s` is a proper prefix of a marker (not a complete one).
fn is_marker_prefix(s: &str) -> bool {
    let mut bytes = s.bytes();
    if bytes.next() != Some(b'\\') {
        return false;
    }
    let mut state = MarkerState::Backslash;
    for b in bytes {
        state = match (state, b) {
            (MarkerState::Backslash, b'0') => MarkerState::Zero,
            (MarkerState::Zero, b'3') => MarkerState::Three,
            (MarkerState::Three, b'3') => MarkerState::ThreeThree,
            (MarkerState::ThreeThree, b'[') => MarkerState::Bracket,
            (MarkerState::Bracket | MarkerState::Digits | MarkerState::Separator, b'0'..=b'9') => {
                MarkerState::Digits
            }
            (MarkerState::Digits, b';') => MarkerState::Separator,
            _ => return false,
        };
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(buffer: &mut EscapeBuffer, fragments: &[&str]) -> String {
        let mut out = String::new();
        for fragment in fragments {
            if let Some(text) = buffer.append(fragment) {
                out.push_str(&text);
            }
        }
        if let Some(text) = buffer.flush() {
            out.push_str(&text);
        }
        out
    }

    #[test]
    fn test_plain_text_is_preserved() {
        let fragments = [
            "Hello", ", this is ", "a fairly long answer ", "with a backslash \\ ", "and ",
            "some C:\\paths\\0 ", "in it.", "\\", "03", " tail",
        ];
        let expected: String = fragments.concat();
        for thresholds in [FlushThresholds::INTERACTIVE, FlushThresholds::INTERPRETATION] {
            let mut buffer = EscapeBuffer::new(thresholds);
            assert_eq!(feed(&mut buffer, &fragments), expected);
            assert!(buffer.pending.as_str().is_empty());
        }
    }

    #[test]
    fn test_short_text_waits_for_lower_bound() {
        let mut buffer = EscapeBuffer::new(FlushThresholds::INTERACTIVE);
        assert_eq!(buffer.append("short"), None);
        assert_eq!(buffer.append(" and more"), None);
        assert_eq!(buffer.append(" text!!"), Some("short and more text!!".to_string()));
    }

    #[test]
    fn test_marker_in_one_fragment() {
        let mut buffer = EscapeBuffer::new(FlushThresholds::INTERACTIVE);
        assert_eq!(
            buffer.append(r"\033[31mred\033[0m"),
            Some("\x1b[31mred\x1b[0m".to_string())
        );
        assert!(buffer.pending.as_str().is_empty());
    }

    #[test]
    fn test_marker_split_across_fragments() {
        let marker = r"\033[1;32m";
        for split_count in 1..marker.len() {
            let mut fragments: Vec<&str> = Vec::new();
            let mut rest = marker;
            while !rest.is_empty() {
                let take = split_count.min(rest.len());
                let (head, tail) = rest.split_at(take);
                fragments.push(head);
                rest = tail;
            }
            let mut all = vec!["ok "];
            all.extend(fragments);
            all.push("done");

            let mut buffer = EscapeBuffer::new(FlushThresholds::INTERACTIVE);
            let out = feed(&mut buffer, &all);
            assert_eq!(out, "ok \x1b[1;32mdone", "split every {split_count} bytes");
            assert!(!out.contains(r"\033"));
        }
    }

    #[test]
    fn test_trailing_partial_marker_is_held() {
        let mut buffer = EscapeBuffer::new(FlushThresholds::INTERACTIVE);
        let out = buffer.append(r"\033[33mwarn\033[0m then \03");
        assert_eq!(out.as_deref(), Some("\x1b[33mwarn\x1b[0m then "));
        assert_eq!(buffer.pending.as_str(), r"\03");
        assert_eq!(buffer.append("3[0m"), Some("\x1b[0m".to_string()));
    }

    #[test]
    fn test_unterminated_marker_hits_upper_bound() {
        let mut buffer = EscapeBuffer::new(FlushThresholds::INTERACTIVE);
        assert_eq!(buffer.append(r"\033[31"), None);
        assert_eq!(buffer.append(" still going"), None);
        let out = buffer.append(" and going on");
        assert_eq!(out.as_deref(), Some(r"\033[31 still going and going on"));
        assert!(buffer.pending.as_str().is_empty());
    }

    #[test]
    fn test_marker_started_past_upper_bound_stays_whole() {
        let mut buffer = EscapeBuffer::new(FlushThresholds::INTERACTIVE);
        let out = feed(&mut buffer, &["abcdefghijklmnopqrst", r"uvwxyz\033[3", "1mred"]);
        assert_eq!(out, "abcdefghijklmnopqrstuvwxyz\x1b[31mred");

        let mut buffer = EscapeBuffer::new(FlushThresholds::INTERACTIVE);
        assert_eq!(
            buffer.append(r"abcdefghijklmnopqrstuvwxyz\033[3"),
            Some("abcdefghijklmnopqrstuvwxyz".to_string())
        );
        assert_eq!(buffer.pending.as_str(), r"\033[3");
    }

    #[test]
    fn test_overlong_partial_marker_is_still_bounded() {
        let mut buffer = EscapeBuffer::new(FlushThresholds::INTERACTIVE);
        let marker = r"\033[1;2;3;4;5;6;7;8;9;10;11;12";
        assert!(marker.len() > FlushThresholds::INTERACTIVE.upper);
        assert_eq!(buffer.append(marker), Some(marker.to_string()));
        assert!(buffer.pending.as_str().is_empty());
    }

    #[test]
    fn test_flush_emits_partial_marker_literally() {
        let mut buffer = EscapeBuffer::new(FlushThresholds::INTERPRETATION);
        assert_eq!(buffer.append(r"bye \033["), None);
        assert_eq!(buffer.flush(), Some(r"bye \033[".to_string()));
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_marker_prefix_states() {
        for prefix in [r"\", r"\0", r"\03", r"\033", r"\033[", r"\033[3", r"\033[1;", r"\033[1;4"] {
            assert!(is_marker_prefix(prefix), "{prefix}");
        }
        for other in [r"\n", r"\033[m", r"\033[1;;", r"\033[1m", r"\0x"] {
            assert!(!is_marker_prefix(other), "{other}");
        }
    }
}
