//! Block codecs: identity, streaming encoders, and streaming decoders.
//!
//! # Identity rules
//! Every block records its codec by lowercase name in the container index
//! (`"none"`, `"zstd"`, `"lz4"`, `"brotli"`).  Records written without a
//! `codec` field are read as `zstd`.
//!
//! # Streaming
//! Blocks are compressed straight from the source reader into the container
//! file and decompressed straight from a length-bounded file view.  No codec
//! ever buffers a whole block in memory.
//!
//! Each block is an independent stream: no dictionary or state is shared
//! between blocks.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default compression level (zstd level / brotli quality).
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// zstd frame magic, little-endian on disk.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
/// LZ4 frame magic, little-endian on disk.
pub const LZ4_MAGIC: [u8; 4] = [0x04, 0x22, 0x4D, 0x18];

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_LG_WINDOW: i32 = 22;

// ── CodecId ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecId {
    /// Payload stored verbatim.
    None,
    #[default]
    Zstd,
    Lz4,
    Brotli,
}

impl CodecId {
    pub const ALL: [CodecId; 4] = [CodecId::None, CodecId::Zstd, CodecId::Lz4, CodecId::Brotli];

    /// Name as written into the index.
    pub fn name(self) -> &'static str {
        match self {
            CodecId::None   => "none",
            CodecId::Zstd   => "zstd",
            CodecId::Lz4    => "lz4",
            CodecId::Brotli => "brotli",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none"   => Some(CodecId::None),
            "zstd"   => Some(CodecId::Zstd),
            "lz4"    => Some(CodecId::Lz4),
            "brotli" => Some(CodecId::Brotli),
            _        => None,
        }
    }

    /// Leading bytes every stream of this codec starts with, if it has any.
    pub fn frame_magic(self) -> Option<[u8; 4]> {
        match self {
            CodecId::Zstd => Some(ZSTD_MAGIC),
            CodecId::Lz4  => Some(LZ4_MAGIC),
            CodecId::None | CodecId::Brotli => None,
        }
    }

    /// Compress everything `source` yields into `sink`.
    ///
    /// The stream is finished before returning, so `sink` holds one complete,
    /// self-contained frame.  Returns the number of uncompressed bytes read
    /// from `source`.
    pub fn encode<R, W>(self, level: i32, source: &mut R, sink: W) -> Result<u64, CodecError>
    where
        R: Read + ?Sized,
        W: Write,
    {
        match self {
            CodecId::None => {
                let mut sink = sink;
                Ok(io::copy(source, &mut sink)?)
            }
            CodecId::Zstd => {
                let mut enc = zstd::stream::write::Encoder::new(sink, level)
                    .map_err(|e| CodecError::Compression(e.to_string()))?;
                enc.include_checksum(true)
                    .map_err(|e| CodecError::Compression(e.to_string()))?;
                let n = io::copy(source, &mut enc)?;
                enc.finish()
                    .map_err(|e| CodecError::Compression(e.to_string()))?;
                Ok(n)
            }
            CodecId::Lz4 => {
                let info = lz4_flex::frame::FrameInfo::new().content_checksum(true);
                let mut enc = lz4_flex::frame::FrameEncoder::with_frame_info(info, sink);
                let n = io::copy(source, &mut enc)?;
                enc.finish()
                    .map_err(|e| CodecError::Compression(e.to_string()))?;
                Ok(n)
            }
            CodecId::Brotli => {
                let params = brotli::enc::BrotliEncoderParams {
                    quality: level.clamp(0, 11),
                    lgwin:   BROTLI_LG_WINDOW,
                    ..Default::default()
                };
                let mut sink = sink;
                let mut counted = (&mut *source).take(u64::MAX);
                brotli::BrotliCompress(&mut counted, &mut sink, &params)?;
                Ok(u64::MAX - counted.limit())
            }
        }
    }

    /// Wrap `compressed` in a streaming decoder for this codec.
    ///
    /// Codecs with a frame magic check it here, so a block whose bytes are
    /// not a stream of the recorded codec fails before the first read.
    /// Other corruption, including a zstd or lz4 content checksum mismatch,
    /// surfaces from `read` as `io::ErrorKind::InvalidData`.
    pub fn decoder<R>(self, compressed: R) -> Result<Box<dyn Read + Send>, CodecError>
    where
        R: Read + Send + 'static,
    {
        let inner: Box<dyn Read + Send> = match self.frame_magic() {
            Some(expected) => Box::new(check_magic(self, expected, compressed)?),
            None => Box::new(compressed),
        };

        let reader: Box<dyn Read + Send> = match self {
            CodecId::None => inner,
            CodecId::Zstd => Box::new(DecodeErrors(
                zstd::stream::read::Decoder::new(inner)
                    .map_err(|e| CodecError::Decompression(e.to_string()))?,
            )),
            CodecId::Lz4 => Box::new(DecodeErrors(lz4_flex::frame::FrameDecoder::new(inner))),
            CodecId::Brotli => Box::new(DecodeErrors(brotli::Decompressor::new(
                inner,
                BROTLI_BUFFER_SIZE,
            ))),
        };
        Ok(reader)
    }
}

impl std::fmt::Display for CodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// zstd and lz4 report some frame errors as `ErrorKind::Other`; re-kind
/// them as `InvalidData` so every decoder fails the same way.
struct DecodeErrors<D>(D);

impl<D: Read> Read for DecodeErrors<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf).map_err(|e| match e.kind() {
            io::ErrorKind::Other => io::Error::new(io::ErrorKind::InvalidData, e.to_string()),
            _ => e,
        })
    }
}

/// Read the leading magic off `compressed` and hand back a reader that
/// replays it in front of the remaining bytes.
fn check_magic<R: Read>(
    codec:          CodecId,
    expected:       [u8; 4],
    mut compressed: R,
) -> Result<io::Chain<io::Cursor<[u8; 4]>, R>, CodecError> {
    let mut magic = [0u8; 4];
    match compressed.read_exact(&mut magic) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(CodecError::Decompression(format!(
                "{codec} block is shorter than its frame magic"
            )));
        }
        Err(e) => return Err(CodecError::Io(e)),
    }
    if magic != expected {
        return Err(CodecError::Decompression(format!(
            "{codec} frame magic mismatch: found {magic:02x?}"
        )));
    }
    Ok(io::Cursor::new(magic).chain(compressed))
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Sort an error returned while reading a decoder: corrupt or truncated
    /// block data becomes `Decompression`, anything else stays `Io`.
    pub fn from_read(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                CodecError::Decompression(e.to_string())
            }
            _ => CodecError::Io(e),
        }
    }
}
