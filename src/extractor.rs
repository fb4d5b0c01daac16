//! Read side: discover the index of a finished container and stream blocks
//! back out.
//!
//! [`Extractor::open`] reads the last 8 bytes of the file, follows them to
//! the serialized index, decodes it once and drops its file handle.  The
//! extractor is immutable from then on and can be shared freely between
//! threads.
//!
//! Every [`Extractor::reader`] call opens its own file handle, seeks it to
//! the block, caps it at the block's compressed length and puts the block's
//! decoder on top.  Readers never share a handle or a seek position, so any
//! number of them can stream at once, at the cost of one open descriptor per
//! live reader.

use std::ffi::OsStr;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::codec::CodecError;
use crate::error::{ContainerError, IoContext, Result};
use crate::index::{BlockDescriptor, ContainerIndex, FORMAT_VERSION};
use crate::trailer::{Trailer, TRAILER_SIZE};

/// Copy buffer used by [`Extractor::extract_all`].
const EXTRACT_CHUNK: usize = 64 * 1024;

// ── Extractor ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Extractor {
    path:         PathBuf,
    index:        ContainerIndex,
    index_offset: u64,
}

impl Extractor {
    /// Open a finished container.
    ///
    /// Fails with [`ContainerError::Malformed`] when the file cannot hold a
    /// trailer, the trailer points outside the file, the index does not
    /// decode, or a block range runs into the index.  Fails with
    /// [`ContainerError::VersionMismatch`] when the index was written by a
    /// different format version.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let (trailer, index_bytes) = read_index_bytes(&path)?;

        let found = ContainerIndex::probe_version(&index_bytes)
            .map_err(|e| ContainerError::malformed(&path, format!("index does not decode: {e}")))?;
        if found != FORMAT_VERSION {
            return Err(ContainerError::VersionMismatch {
                path,
                expected: FORMAT_VERSION.to_owned(),
                found,
            });
        }

        let index = ContainerIndex::from_bytes(&index_bytes)
            .map_err(|e| ContainerError::malformed(&path, format!("index does not decode: {e}")))?;
        if let Some((name, block)) = index.first_block_past(trailer.index_offset) {
            return Err(ContainerError::malformed(
                &path,
                format!(
                    "block {name:?} ({} + {} bytes) overruns the index at {}",
                    block.start_offset, block.compressed_length, trailer.index_offset
                ),
            ));
        }

        info!(
            path = ?path,
            blocks = index.len(),
            index_offset = trailer.index_offset,
            "container opened"
        );
        Ok(Self { path, index, index_offset: trailer.index_offset })
    }

    // ── Streaming ────────────────────────────────────────────────────────────

    /// Open an independent decompressing stream over block `name`.
    ///
    /// An unknown name fails with [`ContainerError::NotFound`] without
    /// touching the file.
    pub fn reader(&self, name: &str) -> Result<BlockReader> {
        let descriptor = *self
            .index
            .get(name)
            .ok_or_else(|| ContainerError::NotFound(name.to_owned()))?;

        let mut file = File::open(&self.path).io_context("open block", &self.path, None)?;
        file.seek(SeekFrom::Start(descriptor.start_offset))
            .io_context("seek to block", &self.path, Some(descriptor.start_offset))?;
        let bounded = file.take(descriptor.compressed_length);

        let inner = descriptor
            .codec
            .decoder(bounded)
            .map_err(|e| self.block_error(name, &descriptor, e))?;

        debug!(
            block = name,
            start_offset = descriptor.start_offset,
            compressed_length = descriptor.compressed_length,
            codec = %descriptor.codec,
            "block reader opened"
        );
        Ok(BlockReader {
            name: name.to_owned(),
            descriptor,
            inner: Some(inner),
        })
    }

    /// Decompress block `name` fully into memory.
    ///
    /// Corrupt or truncated block data fails with [`ContainerError::Codec`];
    /// a failing file read fails with [`ContainerError::Io`].
    pub fn read_all(&self, name: &str) -> Result<Vec<u8>> {
        let mut reader = self.reader(name)?;
        let mut out = Vec::new();
        reader
            .read_to_end(&mut out)
            .map_err(|e| self.block_error(name, &reader.descriptor, CodecError::from_read(e)))?;
        reader.close();
        Ok(out)
    }

    /// Write every block to `dest/<name>`, creating `dest` if needed.
    /// Returns the number of blocks written.
    ///
    /// Names that are not a single plain file name are refused rather than
    /// resolved outside `dest`.
    pub fn extract_all<P: AsRef<Path>>(&self, dest: P) -> Result<usize> {
        let dest = dest.as_ref();
        std::fs::create_dir_all(dest).io_context("create directory", dest, None)?;

        for name in self.names() {
            if Path::new(name).file_name() != Some(OsStr::new(name)) {
                return Err(ContainerError::InvalidName(PathBuf::from(name)));
            }
            let mut reader = self.reader(name)?;
            let out_path = dest.join(name);
            let mut out = File::create(&out_path).io_context("create", &out_path, None)?;
            let mut buf = vec![0u8; EXTRACT_CHUNK];
            loop {
                let n = match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        return Err(self.block_error(name, &reader.descriptor, CodecError::from_read(e)));
                    }
                };
                out.write_all(&buf[..n]).io_context("extract", &out_path, None)?;
            }
            debug!(block = name, path = ?out_path, "block extracted");
        }
        Ok(self.len())
    }

    /// Attach block context to a codec failure: I/O stays `Io`, everything
    /// else is reported against the block name.
    fn block_error(&self, name: &str, descriptor: &BlockDescriptor, e: CodecError) -> ContainerError {
        match e {
            CodecError::Io(e) => {
                ContainerError::io("read block", &self.path, Some(descriptor.start_offset), e)
            }
            other => ContainerError::Codec { name: name.to_owned(), source: other },
        }
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format_version(&self) -> &str {
        &self.index.format_version
    }

    /// File offset of the serialized index, as recorded in the trailer.
    pub fn index_offset(&self) -> u64 {
        self.index_offset
    }

    pub fn index(&self) -> &ContainerIndex {
        &self.index
    }

    /// Block names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.names()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&BlockDescriptor> {
        self.index.get(name)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Read the trailer and the raw index bytes it points at.  The handle is
/// dropped before returning.
fn read_index_bytes(path: &Path) -> Result<(Trailer, Vec<u8>)> {
    let mut file = File::open(path).io_context("open", path, None)?;
    let file_len = file.metadata().io_context("stat", path, None)?.len();

    let trailer_pos = Trailer::position_in(file_len).ok_or_else(|| {
        ContainerError::malformed(
            path,
            format!("{file_len} bytes is too short for the {TRAILER_SIZE}-byte trailer"),
        )
    })?;
    file.seek(SeekFrom::Start(trailer_pos))
        .io_context("seek to trailer", path, Some(trailer_pos))?;
    let trailer = Trailer::read(&mut file).io_context("read trailer", path, Some(trailer_pos))?;

    let index_len = trailer.index_len(trailer_pos).ok_or_else(|| {
        ContainerError::malformed(
            path,
            format!(
                "index offset {} lies past the trailer at {trailer_pos}",
                trailer.index_offset
            ),
        )
    })?;
    let index_len = usize::try_from(index_len)
        .map_err(|_| ContainerError::malformed(path, format!("index of {index_len} bytes is too large")))?;

    file.seek(SeekFrom::Start(trailer.index_offset))
        .io_context("seek to index", path, Some(trailer.index_offset))?;
    let mut index_bytes = vec![0u8; index_len];
    file.read_exact(&mut index_bytes)
        .io_context("read index", path, Some(trailer.index_offset))?;

    Ok((trailer, index_bytes))
}

// ── BlockReader ──────────────────────────────────────────────────────────────

/// Decompressing stream over one block, owning its own file handle.
///
/// `opened -> streaming -> closed`: [`close`](Self::close) (or drop) releases
/// the handle, and any read after that fails.
pub struct BlockReader {
    name:       String,
    descriptor: BlockDescriptor,
    inner:      Option<Box<dyn Read + Send>>,
}

impl BlockReader {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &BlockDescriptor {
        &self.descriptor
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Release the decoder and its file handle.  Idempotent.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            debug!(block = %self.name, "block reader closed");
        }
    }
}

impl Read for BlockReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(inner) => inner.read(buf),
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("block reader for {:?} is closed", self.name),
            )),
        }
    }
}

impl fmt::Debug for BlockReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockReader")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .field("closed", &self.is_closed())
            .finish()
    }
}
