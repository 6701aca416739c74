// src/io/framer.rs
//
// Delimiter-based line framing for byte streams read from a device link.
// Bytes are buffered across reads so a line interrupted by a read timeout
// is completed by the next read instead of being handed out half-received.

/// CR LF, the terminator the scale appends to every frame
pub const CRLF: &[u8] = b"\r\n";

/// Lines longer than this without a terminator are force-split
pub const MAX_LINE_LENGTH: usize = 256;

/// Stateful line splitter. Emitted lines keep their delimiter.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    delimiter: Vec<u8>,
    max_length: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        LineFramer::crlf()
    }
}

impl LineFramer {
    pub fn new(delimiter: Vec<u8>, max_length: usize) -> Self {
        LineFramer {
            buffer: Vec::new(),
            delimiter,
            max_length,
        }
    }

    pub fn crlf() -> Self {
        LineFramer::new(CRLF.to_vec(), MAX_LINE_LENGTH)
    }

    /// Feed raw bytes into the framer.
    /// Returns any complete lines, delimiter included.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();

        for &byte in data {
            self.buffer.push(byte);

            if self.buffer.ends_with(&self.delimiter) {
                lines.push(std::mem::take(&mut self.buffer));
                continue;
            }

            // Force split on max length
            if self.buffer.len() >= self.max_length {
                lines.push(std::mem::take(&mut self.buffer));
            }
        }

        lines
    }

    /// Number of buffered bytes still waiting for a delimiter
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial line.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crlf_framing() {
        let mut framer = LineFramer::crlf();

        let lines = framer.feed(b"+  1.00 g \r\n+  2.00 g \r\n");

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], b"+  1.00 g \r\n".to_vec());
        assert_eq!(lines[1], b"+  2.00 g \r\n".to_vec());
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_line_split_across_reads() {
        let mut framer = LineFramer::crlf();

        assert!(framer.feed(b"+  12.").is_empty());
        assert_eq!(framer.pending(), 6);
        assert!(framer.feed(b"5 g \r").is_empty());

        let lines = framer.feed(b"\n+");
        assert_eq!(lines, vec![b"+  12.5 g \r\n".to_vec()]);
        assert_eq!(framer.pending(), 1);
    }

    #[test]
    fn test_lone_lf_is_not_a_terminator() {
        let mut framer = LineFramer::crlf();
        assert!(framer.feed(b"abc\ndef").is_empty());
        assert_eq!(framer.feed(b"\r\n"), vec![b"abc\ndef\r\n".to_vec()]);
    }

    #[test]
    fn test_max_length_force_split() {
        let mut framer = LineFramer::new(CRLF.to_vec(), 5);

        let lines = framer.feed(b"1234567");

        assert_eq!(lines, vec![b"12345".to_vec()]);
        assert_eq!(framer.pending(), 2);

        framer.clear();
        assert_eq!(framer.pending(), 0);
    }
}
