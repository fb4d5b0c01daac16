//! Write side: append named, compressed blocks to the tail of a file.
//!
//! [`Appender`] opens an existing file, streams each appended source through
//! a compressor straight onto end-of-file, and keeps the index in memory.
//! [`Appender::close`] writes the index and the 8-byte trailer exactly once.
//!
//! All mutating calls take `&self` and serialize on one mutex, so an
//! `Arc<Appender>` can be fed from several threads.  Blocks land one at a
//! time regardless.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::codec::{CodecError, CodecId, DEFAULT_COMPRESSION_LEVEL};
use crate::counting::CountingWriter;
use crate::error::{ContainerError, IoContext, Result};
use crate::index::{BlockDescriptor, ContainerIndex};
use crate::trailer::Trailer;

// ── AppendOptions ────────────────────────────────────────────────────────────

/// Configuration for [`Appender::with_options`].
#[derive(Debug, Clone)]
pub struct AppendOptions {
    /// Codec used by `append_stream` / `append_file`.
    pub codec:         CodecId,
    /// zstd level or brotli quality; ignored by the other codecs.
    pub level:         i32,
    /// `fsync` the container after the trailer is written.
    pub sync_on_close: bool,
}

impl Default for AppendOptions {
    fn default() -> Self {
        Self {
            codec:         CodecId::Zstd,
            level:         DEFAULT_COMPRESSION_LEVEL,
            sync_on_close: false,
        }
    }
}

// ── Appender ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct AppendState {
    /// `None` once the container has been closed.
    file:  Option<File>,
    index: ContainerIndex,
}

#[derive(Debug)]
pub struct Appender {
    path:    PathBuf,
    options: AppendOptions,
    state:   Mutex<AppendState>,
}

impl Appender {
    /// Open `path` for appending with default options.
    ///
    /// The file must already exist; it is never created here.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_options(path, AppendOptions::default())
    }

    pub fn with_options<P: AsRef<Path>>(path: P, options: AppendOptions) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .io_context("open for append", &path, None)?;

        debug!(path = ?path, codec = %options.codec, level = options.level, "appender opened");
        Ok(Self {
            path,
            options,
            state: Mutex::new(AppendState {
                file:  Some(file),
                index: ContainerIndex::default(),
            }),
        })
    }

    // ── Appends ──────────────────────────────────────────────────────────────

    /// Compress everything `source` yields onto the end of the file and
    /// record it under `name`.
    pub fn append_stream<R: Read>(&self, name: impl Into<String>, source: R) -> Result<BlockDescriptor> {
        self.append_stream_with(name, source, self.options.codec)
    }

    /// [`append_stream`](Self::append_stream) with a per-block codec.
    ///
    /// A name already appended through this instance is rejected before any
    /// byte is written.  If compression or the write fails part way, the
    /// file is truncated back to where the block started and the index is
    /// left untouched.
    pub fn append_stream_with<R: Read>(
        &self,
        name:       impl Into<String>,
        mut source: R,
        codec:      CodecId,
    ) -> Result<BlockDescriptor> {
        let name = name.into();
        let mut state = self.lock();
        let AppendState { file, index } = &mut *state;
        let file = file.as_mut().ok_or(ContainerError::Closed)?;

        if index.contains(&name) {
            return Err(ContainerError::DuplicateName(name));
        }

        let start_offset = file
            .seek(SeekFrom::End(0))
            .io_context("seek to end", &self.path, None)?;

        let (raw_length, compressed_length) =
            match write_block(file, codec, self.options.level, &mut source) {
                Ok(lengths) => lengths,
                Err(err) => {
                    if let Err(e) = file.set_len(start_offset) {
                        warn!(
                            path = ?self.path,
                            block = %name,
                            start_offset,
                            error = %e,
                            "could not truncate partially written block"
                        );
                    }
                    return Err(match err {
                        CodecError::Io(e) => {
                            ContainerError::io("append block", &self.path, Some(start_offset), e)
                        }
                        other => ContainerError::Codec { name, source: other },
                    });
                }
            };

        let descriptor = BlockDescriptor { start_offset, compressed_length, codec };
        debug!(
            block = %name,
            start_offset,
            compressed_length,
            raw_length,
            codec = %codec,
            "block appended"
        );
        index.blocks.insert(name, descriptor);
        Ok(descriptor)
    }

    /// Append the file at `path` under its base name.
    pub fn append_file<P: AsRef<Path>>(&self, path: P) -> Result<BlockDescriptor> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ContainerError::InvalidName(path.to_owned()))?;
        self.append_file_as(name, path)
    }

    /// Append the file at `path` under `name`.
    pub fn append_file_as<P: AsRef<Path>>(&self, name: impl Into<String>, path: P) -> Result<BlockDescriptor> {
        let path = path.as_ref();
        let source = File::open(path).io_context("open source", path, None)?;
        self.append_stream(name, BufReader::new(source))
    }

    // ── Finalization ─────────────────────────────────────────────────────────

    /// Write the index and trailer, then release the file.
    ///
    /// Only the first call does anything; later calls, and appends after it,
    /// fail with [`ContainerError::Closed`].  If writing fails the handle is
    /// still released and the file is left without a valid trailer.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock();
        let mut file = state.file.take().ok_or(ContainerError::Closed)?;

        let index_offset = file
            .seek(SeekFrom::End(0))
            .io_context("seek to end", &self.path, None)?;
        let index_bytes = state.index.to_bytes().map_err(|e| {
            ContainerError::io(
                "serialize index",
                &self.path,
                Some(index_offset),
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        })?;

        file.write_all(&index_bytes)
            .io_context("write index", &self.path, Some(index_offset))?;
        let trailer_offset = index_offset + index_bytes.len() as u64;
        Trailer::new(index_offset)
            .write(&mut file)
            .io_context("write trailer", &self.path, Some(trailer_offset))?;
        file.flush().io_context("flush", &self.path, None)?;
        if self.options.sync_on_close {
            file.sync_all().io_context("sync", &self.path, None)?;
        }

        info!(
            path = ?self.path,
            blocks = state.index.len(),
            index_offset,
            index_len = index_bytes.len(),
            "container finalized"
        );
        Ok(())
    }

    /// Consuming form of [`close`](Self::close).
    pub fn finalize(self) -> Result<()> {
        self.close()
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &AppendOptions {
        &self.options
    }

    pub fn is_closed(&self) -> bool {
        self.lock().file.is_none()
    }

    /// Names appended so far, in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.lock().index.blocks.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().index.contains(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<BlockDescriptor> {
        self.lock().index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().index.is_empty()
    }

    // A panic mid-append never reaches the index insert, so the state behind
    // a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, AppendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Appender {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state.file.is_some() {
            warn!(
                path = ?self.path,
                blocks = state.index.len(),
                "appender dropped without close; container has no trailer"
            );
        }
    }
}

/// Stream `source` through `codec` onto the current position of `file`.
/// Returns `(raw_length, compressed_length)`.
fn write_block<R: Read + ?Sized>(
    file:   &mut File,
    codec:  CodecId,
    level:  i32,
    source: &mut R,
) -> std::result::Result<(u64, u64), CodecError> {
    let mut counter = CountingWriter::new(&mut *file);
    let raw_length = codec.encode(level, source, &mut counter)?;
    let (_, compressed_length) = counter.finish()?;
    Ok((raw_length, compressed_length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn file_len(path: &Path) -> u64 {
        std::fs::metadata(path).unwrap().len()
    }

    struct FailingSource {
        remaining: usize,
    }

    impl Read for FailingSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "source went away"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(7);
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn create_does_not_create_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.bin");
        let err = Appender::create(&missing).unwrap_err();
        assert!(matches!(err, ContainerError::Io { op: "open for append", .. }));
        assert!(!missing.exists());
    }

    #[test]
    fn duplicate_name_leaves_file_unchanged() {
        let tmp = NamedTempFile::new().unwrap();
        let appender = Appender::create(tmp.path()).unwrap();
        appender.append_stream("dup", &b"first"[..]).unwrap();
        let before = file_len(tmp.path());

        let err = appender.append_stream("dup", &b"second"[..]).unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateName(ref n) if n == "dup"));
        assert_eq!(file_len(tmp.path()), before);
        appender.close().unwrap();
    }

    #[test]
    fn blocks_are_laid_out_back_to_back() {
        let tmp = NamedTempFile::new().unwrap();
        let appender = Appender::create(tmp.path()).unwrap();
        let a = appender.append_stream("a", &[1u8; 300][..]).unwrap();
        let b = appender.append_stream("b", &b"bravo"[..]).unwrap();
        assert_eq!(a.start_offset, 0);
        assert_eq!(b.start_offset, a.compressed_length);
        assert_eq!(file_len(tmp.path()), a.compressed_length + b.compressed_length);
        appender.close().unwrap();
    }

    #[test]
    fn failed_source_rolls_back() {
        let tmp = NamedTempFile::new().unwrap();
        let appender = Appender::create(tmp.path()).unwrap();
        appender.append_stream("ok", &b"fine"[..]).unwrap();
        let before = file_len(tmp.path());

        let err = appender
            .append_stream_with("bad", FailingSource { remaining: 200_000 }, CodecId::None)
            .unwrap_err();
        assert!(matches!(err, ContainerError::Io { op: "append block", .. }));
        assert_eq!(file_len(tmp.path()), before);
        assert!(!appender.contains("bad"));

        // The name stays available after a failed attempt.
        appender.append_stream("bad", &b"retry"[..]).unwrap();
        appender.close().unwrap();
    }

    #[test]
    fn close_is_once_only() {
        let tmp = NamedTempFile::new().unwrap();
        let appender = Appender::create(tmp.path()).unwrap();
        appender.append_stream("x", &b"x"[..]).unwrap();
        appender.close().unwrap();
        let finished_len = file_len(tmp.path());

        assert!(appender.is_closed());
        assert!(matches!(appender.close(), Err(ContainerError::Closed)));
        assert!(matches!(
            appender.append_stream("y", &b"y"[..]),
            Err(ContainerError::Closed)
        ));
        assert_eq!(file_len(tmp.path()), finished_len);
    }

    #[test]
    fn append_file_uses_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("payload.txt");
        std::fs::write(&src, b"payload").unwrap();
        let target = dir.path().join("target.bin");
        std::fs::write(&target, b"").unwrap();

        let appender = Appender::create(&target).unwrap();
        appender.append_file(&src).unwrap();
        assert_eq!(appender.names(), vec!["payload.txt".to_string()]);
        assert!(matches!(
            appender.append_file(&src),
            Err(ContainerError::DuplicateName(_))
        ));
        assert!(matches!(
            appender.append_file(dir.path().join("missing.txt")),
            Err(ContainerError::Io { op: "open source", .. })
        ));
        appender.finalize().unwrap();
    }

    #[test]
    fn concurrent_appends_are_serialized() {
        let tmp = NamedTempFile::new().unwrap();
        let appender = Arc::new(Appender::create(tmp.path()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let appender = Arc::clone(&appender);
                std::thread::spawn(move || {
                    let data = vec![i as u8; 10_000 + i * 37];
                    appender.append_stream(format!("t{i}"), &data[..]).unwrap()
                })
            })
            .collect();
        let mut descriptors: Vec<BlockDescriptor> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        descriptors.sort_by_key(|d| d.start_offset);
        let mut expected_start = 0;
        for d in &descriptors {
            assert_eq!(d.start_offset, expected_start);
            expected_start += d.compressed_length;
        }
        assert_eq!(appender.len(), 8);
        appender.close().unwrap();
    }
}
