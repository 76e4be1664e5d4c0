//! Incremental UTF-8 decoding for chunked bodies.
//!
//! A network chunk may end in the middle of a multi-byte sequence. Those trailing bytes are held
//! back and prepended to the next chunk instead of being replaced, so the decoded text does not
//! depend on where the chunk boundaries fall. Genuinely invalid bytes become U+FFFD.

const BOM: char = '\u{FEFF}';

#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
    started: bool,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `chunk` as possible, carrying an incomplete trailing sequence over.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let joined;
        let mut input: &[u8] = if self.pending.is_empty() {
            chunk
        } else {
            let mut buf = std::mem::take(&mut self.pending);
            buf.extend_from_slice(chunk);
            joined = buf;
            &joined
        };

        let mut out = String::with_capacity(input.len());
        loop {
            match std::str::from_utf8(input) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    if let Ok(s) = std::str::from_utf8(valid) {
                        out.push_str(s);
                    }
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[bad..];
                        }
                        None => {
                            // incomplete sequence at the very end
                            self.pending = rest.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        self.strip_bom(out)
    }

    /// Flush whatever is still held back. An unfinished sequence decodes lossily.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let tail = std::mem::take(&mut self.pending);
        let out = String::from_utf8_lossy(&tail).into_owned();
        self.strip_bom(out)
    }

    /// Number of bytes carried into the next chunk.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn strip_bom(&mut self, mut out: String) -> String {
        if !self.started && !out.is_empty() {
            self.started = true;
            if out.starts_with(BOM) {
                out.replace_range(..BOM.len_utf8(), "");
            }
        }
        out
    }
}
