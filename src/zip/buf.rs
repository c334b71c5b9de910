//! Little-endian cursor over a bounded byte buffer.
//!
//! Every read shrinks the remaining slice; reading past the end is a
//! format error rather than a panic.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, ZipError};

#[derive(Debug, Clone, Copy)]
pub(crate) struct ReadBuf<'a>(&'a [u8]);

impl<'a> ReadBuf<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self(data)
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn as_slice(&self) -> &'a [u8] {
        self.0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.0.len() {
            return Err(ZipError::format(format!(
                "read of {n} bytes overruns buffer of {}",
                self.0.len()
            )));
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Ok(head)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Splits off the next `n` bytes as their own cursor.
    pub(crate) fn sub(&mut self, n: usize) -> Result<ReadBuf<'a>> {
        self.take(n).map(ReadBuf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_fields_in_order() {
        let data = [
            0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02,
            0x01,
        ];
        let mut b = ReadBuf::new(&data);
        assert_eq!(b.u8().unwrap(), 0x01);
        assert_eq!(b.u16().unwrap(), 0x1234);
        assert_eq!(b.u32().unwrap(), 0x1234_5678);
        assert_eq!(b.u64().unwrap(), 0x0102_0304_0506_0708);
        assert!(b.is_empty());
    }

    #[test]
    fn overrun_is_a_format_error() {
        let mut b = ReadBuf::new(&[1, 2, 3]);
        assert!(matches!(b.u32(), Err(ZipError::Format(_))));
        // a failed read consumes nothing
        assert_eq!(b.len(), 3);
        assert_eq!(b.u16().unwrap(), 0x0201);
    }

    #[test]
    fn sub_splits_off_a_bounded_cursor() {
        let mut b = ReadBuf::new(&[1, 0, 2, 0, 3]);
        let mut head = b.sub(2).unwrap();
        assert_eq!(head.u16().unwrap(), 1);
        assert!(head.u8().is_err());
        assert_eq!(b.as_slice(), &[2, 0, 3]);
        assert!(b.sub(4).is_err());
    }
}
