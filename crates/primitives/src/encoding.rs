//! Little-endian byte codec for the wallet file format.

#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16_le(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32_le(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64_le(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Appends `len` zero bytes.
    pub fn write_zeros(&mut self, len: usize) {
        self.buf.resize(self.buf.len() + len, 0);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnexpectedEof,
    InvalidData(&'static str),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::UnexpectedEof => write!(f, "unexpected end of input"),
            DecodeError::InvalidData(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for DecodeError {}

pub struct Decoder<'a> {
    input: &'a [u8],
    cursor: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, cursor: 0 }
    }

    /// Bytes consumed so far.  Useful for diagnosing where in a stream a
    /// decode failure occurred.
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.input.len().saturating_sub(self.cursor)
    }

    pub fn is_empty(&self) -> bool {
        self.cursor >= self.input.len()
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        let start = self.cursor;
        self.cursor += len;
        Ok(&self.input[start..start + len])
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_slice(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.read_slice(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_u32_le()? as i32)
    }

    pub fn read_u64_le(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_slice(8)?;
        Ok(u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    pub fn read_i64_le(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_u64_le()? as i64)
    }

    pub fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self.read_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        Ok(self.read_slice(len)?.to_vec())
    }

    /// Advances past `len` bytes without copying them out.
    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.read_slice(len).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_primitives() {
        let mut encoder = Encoder::new();
        encoder.write_u8(0xab);
        encoder.write_u16_le(0x1234);
        encoder.write_u32_le(0xdeadbeef);
        encoder.write_i32_le(-7);
        encoder.write_u64_le(0x0102030405060708);
        encoder.write_i64_le(-1);
        encoder.write_bytes(&[9, 9, 9]);
        let bytes = encoder.into_inner();

        let mut decoder = Decoder::new(&bytes);
        assert_eq!(decoder.read_u8().unwrap(), 0xab);
        assert_eq!(decoder.read_u16_le().unwrap(), 0x1234);
        assert_eq!(decoder.read_u32_le().unwrap(), 0xdeadbeef);
        assert_eq!(decoder.read_i32_le().unwrap(), -7);
        assert_eq!(decoder.read_u64_le().unwrap(), 0x0102030405060708);
        assert_eq!(decoder.read_i64_le().unwrap(), -1);
        assert_eq!(decoder.read_bytes(3).unwrap(), vec![9, 9, 9]);
        assert!(decoder.is_empty());
    }

    #[test]
    fn position_tracks_consumed_bytes() {
        let bytes = [1u8, 2, 3, 4, 5, 6];
        let mut decoder = Decoder::new(&bytes);
        assert_eq!(decoder.position(), 0);
        decoder.read_u32_le().unwrap();
        assert_eq!(decoder.position(), 4);
        assert_eq!(decoder.remaining(), 2);
        assert_eq!(decoder.read_u32_le(), Err(DecodeError::UnexpectedEof));
        // A failed read consumes nothing.
        assert_eq!(decoder.position(), 4);
    }

    #[test]
    fn skip_advances_cursor() {
        let bytes = [0u8; 8];
        let mut decoder = Decoder::new(&bytes);
        decoder.skip(6).unwrap();
        assert_eq!(decoder.position(), 6);
        assert_eq!(decoder.skip(3), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn write_zeros_pads() {
        let mut encoder = Encoder::new();
        encoder.write_u8(1);
        encoder.write_zeros(4);
        assert_eq!(encoder.into_inner(), vec![1, 0, 0, 0, 0]);
    }
}
