/// Incremental BLAKE3 checksum over a byte stream.
///
/// Both ends of a transfer feed every byte they write or read through one of
/// these; the trailer carries the writer's digest so the reader can tell a
/// damaged stream from a complete one.
#[derive(Clone, Debug, Default)]
pub struct StreamChecksum {
    hasher: blake3::Hasher,
    len: u64,
}

impl StreamChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes fed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Digest of everything fed so far. Does not reset the state.
    pub fn digest(&self) -> [u8; 32] {
        *self.hasher.finalize().as_bytes()
    }
}
