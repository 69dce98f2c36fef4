use serde::Deserialize;
use thiserror::Error;

/// Smallest number of lines a `LineStream` can put back.
pub const MIN_PUTBACK_CAPACITY: usize = 8;

/// Errors raised by a `LineStream`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The caller asked to put back more lines than the stream still remembers.
    #[error("cannot put back {requested} line(s), only {retained} retained")]
    RetractionUnderflow { requested: usize, retained: usize },
}

/// Text encoding used to decode individual lines.
///
/// Both variants accept arbitrary bytes. `Latin1` maps every byte to exactly
/// one code point and is the right choice for sanitizer output, which may
/// echo raw fuzz input.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LineEncoding {
    #[default]
    #[serde(rename = "latin-1", alias = "latin1")]
    Latin1,
    Utf8Lossy,
}

impl LineEncoding {
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            LineEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            LineEncoding::Utf8Lossy => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// Fixed-capacity ring of the byte lengths of the most recently read lines.
#[derive(Debug, Clone)]
struct LineHistory {
    lengths: Box<[usize]>,
    newest: usize,
    len: usize,
}

impl LineHistory {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            lengths: vec![0; capacity].into_boxed_slice(),
            newest: capacity - 1,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.lengths.len()
    }

    fn push(&mut self, length: usize) {
        self.newest = (self.newest + 1) % self.capacity();
        self.lengths[self.newest] = length;
        self.len = (self.len + 1).min(self.capacity());
    }

    fn pop(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        let length = self.lengths[self.newest];
        self.newest = (self.newest + self.capacity() - 1) % self.capacity();
        self.len -= 1;
        Some(length)
    }
}

/// Snapshot of a `LineStream` cursor, produced by [`LineStream::tell`].
///
/// The snapshot includes the put-back history, so seeking to it restores a
/// stream on which `putback_line` behaves exactly as it did at `tell` time.
#[derive(Debug, Clone)]
pub struct StreamPosition {
    offset: usize,
    history: LineHistory,
}

impl StreamPosition {
    /// Byte offset into the underlying buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Line-oriented view over a raw byte buffer that can put lines back.
///
/// Every line read is decoded with the configured [`LineEncoding`] and its
/// byte length (terminator included) is remembered in a bounded history.
/// `putback_line` rewinds the cursor by the remembered lengths, so reading
/// the same number of lines again yields identical text.
///
/// Returned lines never contain the trailing `\n` or `\r\n`.
#[derive(Debug)]
pub struct LineStream<'a> {
    data: &'a [u8],
    offset: usize,
    history: LineHistory,
    encoding: LineEncoding,
}

impl<'a> LineStream<'a> {
    /// Creates a stream with the minimum put-back capacity and latin-1 decoding.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_options(data, MIN_PUTBACK_CAPACITY, LineEncoding::default())
    }

    /// Creates a stream remembering up to `putback_capacity` lines.
    ///
    /// Capacities below [`MIN_PUTBACK_CAPACITY`] are raised to it.
    pub fn with_options(data: &'a [u8], putback_capacity: usize, encoding: LineEncoding) -> Self {
        Self {
            data,
            offset: 0,
            history: LineHistory::with_capacity(putback_capacity.max(MIN_PUTBACK_CAPACITY)),
            encoding,
        }
    }

    pub fn putback_capacity(&self) -> usize {
        self.history.capacity()
    }

    /// Number of lines that can currently be put back.
    pub fn retained(&self) -> usize {
        self.history.len
    }

    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Reads the next line, or `None` once the buffer is exhausted.
    pub fn read_line(&mut self) -> Option<String> {
        if self.is_exhausted() {
            return None;
        }

        let rest = &self.data[self.offset..];
        let consumed = match rest.iter().position(|&b| b == b'\n') {
            Some(newline) => newline + 1,
            None => rest.len(),
        };

        let mut text = &rest[..consumed];
        if let Some(stripped) = text.strip_suffix(b"\n") {
            text = stripped.strip_suffix(b"\r").unwrap_or(stripped);
        }

        self.offset += consumed;
        self.history.push(consumed);
        Some(self.encoding.decode(text))
    }

    /// Puts the last `count` lines back onto the stream.
    ///
    /// Nothing is rewound when `count` exceeds [`LineStream::retained`].
    pub fn putback_line(&mut self, count: usize) -> Result<(), StreamError> {
        if count > self.history.len {
            return Err(StreamError::RetractionUnderflow {
                requested: count,
                retained: self.history.len,
            });
        }

        let mut rewind = 0;
        for _ in 0..count {
            rewind += self.history.pop().unwrap_or(0);
        }
        self.offset -= rewind;
        Ok(())
    }

    pub fn tell(&self) -> StreamPosition {
        StreamPosition {
            offset: self.offset,
            history: self.history.clone(),
        }
    }

    pub fn seek(&mut self, position: &StreamPosition) {
        self.offset = position.offset.min(self.data.len());
        self.history = position.history.clone();
    }
}

impl Iterator for LineStream<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.read_line()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_lines_without_terminators() {
        let mut stream = LineStream::new(b"first\r\nsecond\nthird");
        assert_eq!(stream.read_line().as_deref(), Some("first"));
        assert_eq!(stream.read_line().as_deref(), Some("second"));
        assert_eq!(stream.read_line().as_deref(), Some("third"));
        assert_eq!(stream.read_line(), None);
        assert_eq!(stream.read_line(), None, "reading past the end stays empty");
    }

    #[test]
    fn blank_lines_are_returned_as_empty_strings() {
        let lines: Vec<String> = LineStream::new(b"a\n\nb\n").collect();
        assert_eq!(lines, vec!["a", "", "b"]);
    }

    #[test]
    fn small_capacity_is_clamped_to_minimum() {
        let stream = LineStream::with_options(b"", 2, LineEncoding::Latin1);
        assert_eq!(stream.putback_capacity(), MIN_PUTBACK_CAPACITY);

        let stream = LineStream::with_options(b"", 32, LineEncoding::Latin1);
        assert_eq!(stream.putback_capacity(), 32);
    }

    #[test]
    fn putback_rereads_identical_lines() {
        let mut stream = LineStream::new(b"one\ntwo\nthree\nfour\n");
        stream.read_line();
        let second = stream.read_line();
        let third = stream.read_line();

        stream.putback_line(2).unwrap();
        assert_eq!(stream.read_line(), second);
        assert_eq!(stream.read_line(), third);
        assert_eq!(stream.read_line().as_deref(), Some("four"));
    }

    #[test]
    fn putback_beyond_history_fails() {
        let mut stream = LineStream::new(b"one\ntwo\n");
        stream.read_line();

        assert_eq!(
            stream.putback_line(2),
            Err(StreamError::RetractionUnderflow {
                requested: 2,
                retained: 1
            })
        );
        assert_eq!(
            stream.read_line().as_deref(),
            Some("two"),
            "a failed put back must not move the cursor"
        );
    }

    #[test]
    fn history_evicts_oldest_lines() {
        let data: String = (0..12).map(|i| format!("line {i}\n")).collect();
        let mut stream = LineStream::new(data.as_bytes());
        for _ in 0..12 {
            stream.read_line();
        }
        assert_eq!(stream.retained(), MIN_PUTBACK_CAPACITY);
        assert!(stream.putback_line(MIN_PUTBACK_CAPACITY + 1).is_err());

        stream.putback_line(MIN_PUTBACK_CAPACITY).unwrap();
        assert_eq!(stream.read_line().as_deref(), Some("line 4"));
    }

    #[test]
    fn reading_at_end_does_not_consume_history() {
        let mut stream = LineStream::new(b"only\n");
        stream.read_line();
        assert_eq!(stream.read_line(), None);
        stream.putback_line(1).unwrap();
        assert_eq!(stream.read_line().as_deref(), Some("only"));
    }

    #[test]
    fn seek_restores_offset_and_history() {
        let mut stream = LineStream::new(b"a\nb\nc\nd\n");
        stream.read_line();
        stream.read_line();
        let position = stream.tell();

        stream.read_line();
        stream.read_line();
        stream.putback_line(3).unwrap();
        assert_eq!(stream.read_line().as_deref(), Some("b"));

        stream.seek(&position);
        assert_eq!(stream.retained(), 2);
        assert_eq!(stream.read_line().as_deref(), Some("c"));
        stream.putback_line(3).unwrap();
        assert_eq!(stream.read_line().as_deref(), Some("a"));
    }

    #[test]
    fn latin1_preserves_arbitrary_bytes() {
        let mut stream = LineStream::new(&[0xff, 0x00, 0xe9, b'\n']);
        let line = stream.read_line().unwrap();
        assert_eq!(line.chars().map(|c| c as u32).collect::<Vec<_>>(), vec![0xff, 0x00, 0xe9]);
    }

    #[test]
    fn utf8_lossy_never_fails() {
        let mut stream =
            LineStream::with_options(&[b'o', b'k', 0xff, b'\n'], 8, LineEncoding::Utf8Lossy);
        assert_eq!(stream.read_line().as_deref(), Some("ok\u{fffd}"));
    }
}
