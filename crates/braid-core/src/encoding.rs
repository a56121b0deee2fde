//! Canonical big-endian encoding for consensus-critical preimages.
//!
//! Vertex ids and signature hashes are computed over these bytes, so the
//! layout is fixed here by hand instead of delegated to a serializer.

#[derive(Default)]
pub struct CanonicalWriter {
    buf: Vec<u8>,
}

impl CanonicalWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// IEEE-754 bit pattern, big-endian.
    pub fn f64(&mut self, v: f64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_bits().to_be_bytes());
        self
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Length-prefixed (u32) byte string.
    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.u32(bytes.len() as u32);
        self.raw(bytes)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_big_endian_with_length_prefix() {
        let mut w = CanonicalWriter::new();
        w.u8(1).u32(2).bytes(b"ab");
        assert_eq!(w.finish(), vec![1, 0, 0, 0, 2, 0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn float_encoding_is_bit_exact() {
        let mut w = CanonicalWriter::new();
        w.f64(1.5);
        assert_eq!(w.finish(), 1.5f64.to_bits().to_be_bytes().to_vec());
    }
}
