//! The fixed-width footer that anchors the whole container.
//!
//! The last [`TRAILER_SIZE`] bytes of a finished container are a little-endian
//! `u64` giving the file offset where the serialized index begins.  Nothing
//! else is needed to find the index: there is no header and no leading magic,
//! so a container can sit on the tail of any pre-existing file.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub const TRAILER_SIZE: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub index_offset: u64,
}

impl Trailer {
    pub fn new(index_offset: u64) -> Self {
        Self { index_offset }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(self.index_offset)
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            index_offset: reader.read_u64::<LittleEndian>()?,
        })
    }

    /// Where the trailer starts in a file of `file_len` bytes, or `None` if
    /// the file is too short to hold one.
    pub fn position_in(file_len: u64) -> Option<u64> {
        file_len.checked_sub(TRAILER_SIZE)
    }

    /// Length of the serialized index, given the trailer position.
    ///
    /// `None` when the recorded offset points past the trailer itself.
    pub fn index_len(&self, trailer_pos: u64) -> Option<u64> {
        trailer_pos.checked_sub(self.index_offset)
    }
}
