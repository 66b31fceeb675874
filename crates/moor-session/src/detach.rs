//! Detach sequence scanning for the local input stream.

/// Result of feeding one byte to the scanner.
#[derive(Debug, PartialEq, Eq)]
pub enum Scan {
    /// Byte extended a partial match; nothing to forward yet.
    Buffered,
    /// Forward these bytes to the remote side. Contains any previously
    /// buffered partial match followed by the current byte when it did not
    /// restart a match.
    Emit(Vec<u8>),
    /// The full detach sequence was seen. None of its bytes were forwarded.
    Detach,
}

/// Sliding-window matcher for the configured detach key sequence.
///
/// Bytes that extend a partial match are withheld from the remote side; a
/// broken partial match replays the withheld prefix and re-tests the
/// breaking byte against the start of the sequence, so overlapping input
/// (e.g. sequence `P,Q` fed `P,P,Q`) still detaches without an extra
/// keystroke.
#[derive(Debug)]
pub struct DetachScanner {
    sequence: Vec<u8>,
    progress: usize,
}

impl DetachScanner {
    /// Returns None for an empty sequence: scanning is disabled and input
    /// passes through untouched.
    #[must_use]
    pub fn new(sequence: &[u8]) -> Option<Self> {
        if sequence.is_empty() {
            return None;
        }
        Some(Self {
            sequence: sequence.to_vec(),
            progress: 0,
        })
    }

    /// Feed a single input byte.
    pub fn feed(&mut self, byte: u8) -> Scan {
        if byte == self.sequence[self.progress] {
            self.progress += 1;
            if self.progress == self.sequence.len() {
                self.progress = 0;
                return Scan::Detach;
            }
            return Scan::Buffered;
        }

        // Broken partial match: replay what was withheld, then give the
        // breaking byte a chance to start a new match.
        let mut emit = self.sequence[..self.progress].to_vec();
        if byte == self.sequence[0] {
            self.progress = 1;
        } else {
            self.progress = 0;
            emit.push(byte);
        }
        Scan::Emit(emit)
    }

    /// Scan a chunk of input, appending forwardable bytes to `forward`.
    /// Returns true if the detach sequence completed; scanning stops there
    /// and any trailing bytes in the chunk are dropped.
    pub fn scan(&mut self, chunk: &[u8], forward: &mut Vec<u8>) -> bool {
        for &byte in chunk {
            match self.feed(byte) {
                Scan::Buffered => {}
                Scan::Emit(bytes) => forward.extend_from_slice(&bytes),
                Scan::Detach => return true,
            }
        }
        false
    }
}
