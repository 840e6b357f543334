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

use std::hash::Hash;
use std::io;
use std::io::Read;
use std::io::Write;

/// A value the hash function can be built over.
///
/// Keys need equality and hashability for the cascade and the fallback map,
/// a fixed-width little-endian byte encoding for the persisted format and
/// the level spill files, and a total order used to assign fallback-map
/// indices reproducibly. The canonical key type is `u64`.
pub trait Key: Copy + Eq + Ord + Hash + Send + Sync + 'static {
    /// Serialized width in bytes.
    const WIDTH: usize;

    /// Writes the key's little-endian encoding.
    fn write_le<W: Write>(&self, out: &mut W) -> io::Result<()>;

    /// Reads a key written by [`write_le`](Self::write_le).
    fn read_le<R: Read>(input: &mut R) -> io::Result<Self>;
}

impl Key for u64 {
    const WIDTH: usize = 8;

    fn write_le<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.to_le_bytes())
    }

    fn read_le<R: Read>(input: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; 8];
        input.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

impl Key for u32 {
    const WIDTH: usize = 4;

    fn write_le<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.to_le_bytes())
    }

    fn read_le<R: Read>(input: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; 4];
        input.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}

impl Key for i64 {
    const WIDTH: usize = 8;

    fn write_le<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.to_le_bytes())
    }

    fn read_le<R: Read>(input: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; 8];
        input.read_exact(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }
}
