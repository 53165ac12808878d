//! Big-endian byte cursor over raw class-file input.

use crate::error::{ClassFileError, Result};

pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub(crate) fn read_u1(&mut self) -> Result<u8> {
        if self.remaining() < 1 {
            return Err(ClassFileError::UnexpectedEof(self.pos));
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub(crate) fn read_u2(&mut self) -> Result<u16> {
        if self.remaining() < 2 {
            return Err(ClassFileError::UnexpectedEof(self.pos));
        }
        let v = u16::from_be_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    pub(crate) fn read_u4(&mut self) -> Result<u32> {
        if self.remaining() < 4 {
            return Err(ClassFileError::UnexpectedEof(self.pos));
        }
        let v = u32::from_be_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(v)
    }

    pub(crate) fn read_i1(&mut self) -> Result<i8> {
        Ok(self.read_u1()? as i8)
    }

    pub(crate) fn read_i2(&mut self) -> Result<i16> {
        Ok(self.read_u2()? as i16)
    }

    pub(crate) fn read_i4(&mut self) -> Result<i32> {
        Ok(self.read_u4()? as i32)
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ClassFileError::UnexpectedEof(self.pos));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }
}

/// Big-endian append helpers for emission.
pub(crate) trait WriteBytes {
    fn put_u1(&mut self, v: u8);
    fn put_u2(&mut self, v: u16);
    fn put_u4(&mut self, v: u32);
}

impl WriteBytes for Vec<u8> {
    fn put_u1(&mut self, v: u8) {
        self.push(v);
    }

    fn put_u2(&mut self, v: u16) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_u4(&mut self, v: u32) {
        self.extend_from_slice(&v.to_be_bytes());
    }
}
