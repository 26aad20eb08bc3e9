//! The content accumulator: size-bounded text buckets that entries
//! back-reference by `(bucket name, offset)`.

/// Upper bound on the accumulated byte size of one content bucket. A single
/// oversize paragraph still goes out, alone in its own bucket.
pub const MAX_CONTENT_FRAGMENT_SIZE: usize = 8192;

#[derive(Debug)]
pub struct ContentAccumulator {
    seq: u32,
    name: String,
    paragraphs: Vec<String>,
    size: usize,
    finished: Vec<(String, Vec<String>)>,
}

impl ContentAccumulator {
    /// `start` is the first bucket number to mint (normally 1).
    pub fn new(start: u32) -> Self {
        Self {
            seq: start,
            name: format!("content_{start}"),
            paragraphs: Vec::new(),
            size: 0,
            finished: Vec::new(),
        }
    }

    /// Appends one paragraph and returns its back-reference. Opens a new
    /// bucket first when the text would push the current one past the size
    /// bound.
    pub fn add(&mut self, text: &str) -> (String, usize) {
        if !self.paragraphs.is_empty() && self.size + text.len() > MAX_CONTENT_FRAGMENT_SIZE {
            self.flush();
        }
        if text.len() > MAX_CONTENT_FRAGMENT_SIZE {
            log::warn!(
                "paragraph of {} bytes exceeds the content bucket bound; emitting an oversize bucket",
                text.len()
            );
        }
        let offset = self.paragraphs.len();
        self.paragraphs.push(text.to_string());
        self.size += text.len();
        (self.name.clone(), offset)
    }

    fn flush(&mut self) {
        let name = std::mem::replace(&mut self.name, String::new());
        let paragraphs = std::mem::take(&mut self.paragraphs);
        self.finished.push((name, paragraphs));
        self.seq += 1;
        self.name = format!("content_{}", self.seq);
        self.size = 0;
    }

    /// Flushes the current bucket and returns every finished bucket in
    /// creation order. Empty buckets are never emitted.
    pub fn finish(mut self) -> Vec<(String, Vec<String>)> {
        if !self.paragraphs.is_empty() {
            self.flush();
        }
        self.finished
    }
}
