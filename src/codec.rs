// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Little-endian stream codec for the persisted hash-function format.
//!
//! Every scalar in the on-disk format is written little-endian regardless of
//! host byte order; `byteorder` performs the swap at the boundary on
//! big-endian machines, so files are bit-identical across hosts.

use std::io;
use std::io::Read;
use std::io::Write;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;

use crate::error::Error;

pub(crate) struct CodecWriter<W: Write> {
    out: W,
}

impl<W: Write> CodecWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write_u32(&mut self, n: u32) -> Result<(), Error> {
        self.out
            .write_u32::<LittleEndian>(n)
            .map_err(|e| Error::io("failed to write u32", e))
    }

    pub fn write_u64(&mut self, n: u64) -> Result<(), Error> {
        self.out
            .write_u64::<LittleEndian>(n)
            .map_err(|e| Error::io("failed to write u64", e))
    }

    pub fn write_f64(&mut self, n: f64) -> Result<(), Error> {
        self.out
            .write_f64::<LittleEndian>(n)
            .map_err(|e| Error::io("failed to write f64", e))
    }

    /// Write a whole slice of 64-bit words, each little-endian.
    pub fn write_u64_slice(&mut self, words: &[u64]) -> Result<(), Error> {
        for &word in words {
            self.write_u64(word)?;
        }
        Ok(())
    }

    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.out
            .flush()
            .map_err(|e| Error::io("failed to flush output stream", e))
    }
}

pub(crate) struct CodecReader<R: Read> {
    inner: R,
}

impl<R: Read> CodecReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, Error> {
        self.inner
            .read_u32::<LittleEndian>()
            .map_err(|e| read_error(e, field))
    }

    pub fn read_u64(&mut self, field: &'static str) -> Result<u64, Error> {
        self.inner
            .read_u64::<LittleEndian>()
            .map_err(|e| read_error(e, field))
    }

    pub fn read_f64(&mut self, field: &'static str) -> Result<f64, Error> {
        self.inner
            .read_f64::<LittleEndian>()
            .map_err(|e| read_error(e, field))
    }

    /// Read `count` little-endian 64-bit words.
    pub fn read_u64_vec(&mut self, count: usize, field: &'static str) -> Result<Vec<u64>, Error> {
        let mut words = vec![0u64; count];
        for word in &mut words {
            *word = self.read_u64(field)?;
        }
        Ok(words)
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

/// Truncated streams surface as malformed data; everything else is plain I/O.
pub(crate) fn read_error(e: io::Error, field: &'static str) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::insufficient_data(field)
    } else {
        Error::io("failed to read from input stream", e).with_context("field", field)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_scalar_round_trip() {
        let mut bytes = Vec::new();
        {
            let mut w = CodecWriter::new(&mut bytes);
            w.write_f64(2.0).unwrap();
            w.write_u32(25).unwrap();
            w.write_u64(0xDEAD_BEEF_0123_4567).unwrap();
        }

        let mut r = CodecReader::new(Cursor::new(&bytes));
        assert_eq!(r.read_f64("gamma").unwrap(), 2.0);
        assert_eq!(r.read_u32("nb_levels").unwrap(), 25);
        assert_eq!(r.read_u64("nelem").unwrap(), 0xDEAD_BEEF_0123_4567);
    }

    #[test]
    fn test_layout_is_little_endian() {
        let mut bytes = Vec::new();
        CodecWriter::new(&mut bytes).write_u64(0x0102_0304_0506_0708).unwrap();
        assert_eq!(bytes, [0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_truncated_stream_is_malformed() {
        let mut r = CodecReader::new(Cursor::new(&[0u8; 3]));
        let err = r.read_u64("size").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedDeserializeData);
    }
}
