// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io::{self, Read, Seek, SeekFrom};

/// View of `[start, start + len)` of the underlying stream
///
/// Positions are relative to `start`. Reads stop at the end of the
/// range and seeking before its start is an error.
pub struct Section<'a, R> {
    reader: &'a mut R,
    start: u64,
    len: u64,
    position: u64,
}

impl<'a, R: Seek> Section<'a, R> {
    pub(crate) fn new(reader: &'a mut R, start: u64, len: u64) -> io::Result<Self> {
        reader.seek(SeekFrom::Start(start))?;
        Ok(Self {
            reader,
            start,
            len,
            position: 0,
        })
    }
}

impl<R> Section<'_, R> {
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.position)
    }
}

impl<R: Read> Read for Section<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(0);
        }

        let max = buf.len().min(remaining.try_into().unwrap_or(usize::MAX));
        let read = self.reader.read(&mut buf[..max])?;
        self.position += read as u64;
        Ok(read)
    }
}

impl<R: Seek> Seek for Section<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
            SeekFrom::End(offset) => self.len.checked_add_signed(offset),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of section"))?;

        self.reader.seek(SeekFrom::Start(self.start + target))?;
        self.position = target;
        Ok(target)
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn bounded() {
        let mut cursor = Cursor::new(b"0123456789".to_vec());
        let mut section = Section::new(&mut cursor, 3, 4).unwrap();

        let mut read = String::new();
        section.read_to_string(&mut read).unwrap();
        assert_eq!(read, "3456");
        assert_eq!(section.remaining(), 0);

        assert_eq!(section.seek(SeekFrom::End(-1)).unwrap(), 3);
        read.clear();
        section.read_to_string(&mut read).unwrap();
        assert_eq!(read, "6");

        // Past the end reads nothing, before the start fails
        section.seek(SeekFrom::Start(10)).unwrap();
        assert_eq!(section.read(&mut [0; 4]).unwrap(), 0);
        assert!(section.seek(SeekFrom::Current(-20)).is_err());
    }
}
