//! Whitespace-normalizing, rune-counting text builder.
//!
//! Paragraph text is assembled through this writer so that style-event
//! offsets line up with renderer-visible character indices: counts are in
//! code points, runs of whitespace collapse to a single space, and a
//! trailing space stays pending until the next visible content claims it.

#[derive(Debug, Default)]
pub struct TextBuilder {
    buf: String,
    runes: usize,
    pending_space: bool,
    /// Leading whitespace is dropped until visible content appears, and
    /// again right after a structural newline.
    trim_leading: bool,
    preserve: bool,
}

impl TextBuilder {
    pub fn new() -> Self {
        Self {
            trim_leading: true,
            ..Self::default()
        }
    }

    /// Code points emitted so far. Pending whitespace is not counted until
    /// something claims it.
    pub fn rune_count(&self) -> usize {
        self.runes
    }

    /// Flushes any pending space and returns the offset where the next
    /// write will land. Segment starts are recorded through this.
    pub fn mark(&mut self) -> usize {
        self.flush_pending();
        self.runes
    }

    fn flush_pending(&mut self) {
        if self.pending_space {
            self.buf.push(' ');
            self.runes += 1;
            self.pending_space = false;
        }
    }

    /// In preserve mode (code blocks) whitespace passes through untouched.
    pub fn set_preserve_whitespace(&mut self, preserve: bool) {
        self.preserve = preserve;
    }

    /// Keeps the leading space of the next write; used to continue text
    /// after an inline item without losing the separating space.
    pub fn continue_after_inline(&mut self) {
        self.trim_leading = false;
    }

    pub fn write_str(&mut self, s: &str) {
        if self.preserve {
            self.flush_pending();
            for ch in s.chars() {
                self.buf.push(ch);
                self.runes += 1;
            }
            self.trim_leading = false;
            return;
        }
        for ch in s.chars() {
            if ch.is_whitespace() {
                if !self.trim_leading {
                    self.pending_space = true;
                }
            } else {
                self.flush_pending();
                self.buf.push(ch);
                self.runes += 1;
                self.trim_leading = false;
            }
        }
    }

    /// Bypasses normalization for structural characters (title breaks).
    /// Pending whitespace before a structural newline is dropped.
    pub fn write_raw(&mut self, ch: char) {
        self.pending_space = false;
        self.buf.push(ch);
        self.runes += 1;
        self.trim_leading = true;
    }

    /// Cuts the text collected so far (for mixed-content chunking) while
    /// the rune counter keeps running across the whole entry.
    pub fn take_chunk(&mut self) -> String {
        self.flush_pending();
        self.trim_leading = false;
        std::mem::take(&mut self.buf)
    }

    /// Finishes the paragraph; trailing pending whitespace is dropped.
    pub fn finish(self) -> String {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_runs() {
        let mut w = TextBuilder::new();
        w.write_str("  hello \t\n  world ");
        assert_eq!(w.finish(), "hello world");
    }

    #[test]
    fn rune_counts_are_code_points() {
        let mut w = TextBuilder::new();
        w.write_str("жаба");
        assert_eq!(w.rune_count(), 4);
        assert_eq!(w.finish().chars().count(), 4);
    }

    #[test]
    fn mark_claims_pending_space() {
        let mut w = TextBuilder::new();
        w.write_str("one ");
        assert_eq!(w.rune_count(), 3);
        // The pending space becomes visible at the next segment start.
        assert_eq!(w.mark(), 4);
        w.write_str("two");
        assert_eq!(w.finish(), "one two");
    }

    #[test]
    fn preserve_mode_keeps_internal_whitespace() {
        let mut w = TextBuilder::new();
        w.write_str("before ");
        w.mark();
        w.set_preserve_whitespace(true);
        w.write_str("a  b\n c");
        w.set_preserve_whitespace(false);
        assert_eq!(w.finish(), "before a  b\n c");
    }

    #[test]
    fn raw_newline_restarts_leading_trim() {
        let mut w = TextBuilder::new();
        w.write_str("first ");
        w.write_raw('\n');
        w.write_str("  second");
        assert_eq!(w.finish(), "first\nsecond");
    }

    #[test]
    fn chunking_keeps_global_offsets() {
        let mut w = TextBuilder::new();
        w.write_str("see ");
        let chunk = w.take_chunk();
        assert_eq!(chunk, "see ");
        // An inline item sits here; following text keeps its offset base.
        w.continue_after_inline();
        w.write_str(" next");
        assert_eq!(w.rune_count(), 9);
        assert_eq!(w.finish(), " next");
    }
}
