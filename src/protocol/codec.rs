//! Binary codec
//!
//! Varints carry 7 bits per byte, least significant group first, with `0x80`
//! set on every byte except the last. Strings and byte blobs are prefixed with
//! their length as a varint. Fixed-width integers are little-endian.

use crate::exceptions::ProtocolError;
use crate::protocol::consts::MAX_VARINT_LEN;

/// Appends `value` as a varint, returns the number of bytes written
pub fn write_varint(buf: &mut Vec<u8>, mut value: u32) -> usize {
    let mut written = 0;
    while value >= 0x80 {
        buf.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
        written += 1;
    }
    buf.push(value as u8);
    written + 1
}

/// Decodes a varint from the start of `buf`
///
/// Returns the value and the number of bytes consumed. A fifth byte with the
/// continuation bit or with bits beyond the 32nd is rejected as
/// [`ProtocolError::MalformedVarint`].
pub fn read_varint(buf: &[u8]) -> Result<(u32, usize), ProtocolError> {
    let mut result: u32 = 0;

    for i in 0..MAX_VARINT_LEN {
        let byte = *buf.get(i).ok_or(ProtocolError::TruncatedData {
            needed: i + 1,
            available: buf.len(),
        })?;

        if i == MAX_VARINT_LEN - 1 && byte & 0x70 != 0 {
            return Err(ProtocolError::MalformedVarint);
        }
        result |= u32::from(byte & 0x7F) << (7 * i);

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(ProtocolError::MalformedVarint)
}

/// Appends a varint length prefix followed by the raw bytes
pub fn write_bytes(buf: &mut Vec<u8>, data: &[u8]) -> usize {
    let prefix = write_varint(buf, data.len() as u32);
    buf.extend_from_slice(data);
    prefix + data.len()
}

/// Reads a varint-prefixed byte blob, borrowing it from `buf`
pub fn read_bytes(buf: &[u8]) -> Result<(&[u8], usize), ProtocolError> {
    let (length, prefix) = read_varint(buf)?;
    let length = length as usize;
    let rest = &buf[prefix..];

    if rest.len() < length {
        return Err(ProtocolError::TruncatedData {
            needed: length,
            available: rest.len(),
        });
    }

    Ok((&rest[..length], prefix + length))
}

/// Appends a varint-prefixed UTF-8 string
pub fn write_string(buf: &mut Vec<u8>, s: &str) -> usize {
    write_bytes(buf, s.as_bytes())
}

/// Reads a varint-prefixed UTF-8 string
pub fn read_string(buf: &[u8]) -> Result<(String, usize), ProtocolError> {
    let (bytes, consumed) = read_bytes(buf)?;
    let s = String::from_utf8(bytes.to_vec())?;
    Ok((s, consumed))
}

/// Sequential reader over a payload
///
/// Keeps the offset so packet decoders can read fields one after another.
#[derive(Debug)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not consumed yet
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_fixed(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::TruncatedData {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.read_fixed(1)?[0])
    }

    pub fn read_u32_le(&mut self) -> Result<u32, ProtocolError> {
        let bytes = self.read_fixed(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, ProtocolError> {
        let bytes = self.read_fixed(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_varint(&mut self) -> Result<u32, ProtocolError> {
        let (value, consumed) = read_varint(&self.buf[self.pos..])?;
        self.pos += consumed;
        Ok(value)
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], ProtocolError> {
        let (bytes, consumed) = read_bytes(&self.buf[self.pos..])?;
        self.pos += consumed;
        Ok(bytes)
    }

    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let (s, consumed) = read_string(&self.buf[self.pos..])?;
        self.pos += consumed;
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_roundtrip_on_boundaries() {
        let values = [
            0u32,
            1,
            0x7F,
            0x80,
            300,
            0x3FFF,
            0x4000,
            0x1F_FFFF,
            0x20_0000,
            0x0FFF_FFFF,
            0x1000_0000,
            u32::MAX,
        ];

        for value in values {
            let mut buf = Vec::new();
            let written = write_varint(&mut buf, value);
            assert_eq!(written, buf.len());
            assert!(written <= MAX_VARINT_LEN);
            assert_eq!(read_varint(&buf).unwrap(), (value, written));
        }
    }

    #[test]
    fn varint_known_encodings() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 300);
        assert_eq!(buf, vec![0xAC, 0x02]);

        buf.clear();
        write_varint(&mut buf, u32::MAX);
        assert_eq!(buf, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn varint_rejects_sixth_byte() {
        let buf = [0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(matches!(
            read_varint(&buf),
            Err(ProtocolError::MalformedVarint)
        ));
    }

    #[test]
    fn varint_truncated_input() {
        assert!(matches!(
            read_varint(&[0x80, 0x80]),
            Err(ProtocolError::TruncatedData { .. })
        ));
        assert!(matches!(
            read_varint(&[]),
            Err(ProtocolError::TruncatedData { .. })
        ));
    }

    #[test]
    fn varint_fifth_byte_overflowing_u32_is_rejected() {
        assert!(matches!(
            read_varint(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7F]),
            Err(ProtocolError::MalformedVarint)
        ));
        assert!(matches!(
            read_varint(&[0x80, 0x80, 0x80, 0x80, 0x10]),
            Err(ProtocolError::MalformedVarint)
        ));
        assert_eq!(
            read_varint(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]).unwrap(),
            (u32::MAX, 5)
        );
    }

    #[test]
    fn read_varint_ignores_trailing_bytes() {
        assert_eq!(read_varint(&[0x05, 0xFF, 0xFF]).unwrap(), (5, 1));
    }

    #[test]
    fn string_roundtrip() {
        for s in ["", "en-US", "héllo wörld", &"x".repeat(200)] {
            let mut buf = Vec::new();
            let written = write_string(&mut buf, s);
            assert_eq!(written, buf.len());
            assert_eq!(read_string(&buf).unwrap(), (s.to_string(), written));
        }
    }

    #[test]
    fn string_length_exceeding_buffer_is_truncated() {
        let buf = [0x05, b'a', b'b'];
        match read_string(&buf) {
            Err(ProtocolError::TruncatedData { needed, available }) => {
                assert_eq!(needed, 5);
                assert_eq!(available, 2);
            }
            other => panic!("expected TruncatedData, got {other:?}"),
        }
    }

    #[test]
    fn string_rejects_invalid_utf8() {
        let buf = [0x02, 0xC3, 0x28];
        assert!(matches!(
            read_string(&buf),
            Err(ProtocolError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn reader_walks_mixed_fields() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(-3i32).to_le_bytes());
        write_string(&mut buf, "name");
        write_bytes(&mut buf, &[1, 2, 3]);
        write_varint(&mut buf, 1000);

        let mut reader = PacketReader::new(&buf);
        assert_eq!(reader.read_i32_le().unwrap(), -3);
        assert_eq!(reader.read_string().unwrap(), "name");
        assert_eq!(reader.read_bytes().unwrap(), &[1, 2, 3]);
        assert_eq!(reader.read_varint().unwrap(), 1000);
        assert!(reader.is_empty());
        assert!(reader.read_u8().is_err());
    }
}
