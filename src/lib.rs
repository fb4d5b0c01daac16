//! Append named, compressed blocks to the tail of any file and stream them
//! back out by name.
//!
//! ```no_run
//! use tailpack::{Appender, Extractor};
//!
//! // Write: the target must already exist (it may be an executable).
//! let appender = Appender::create("app.bin")?;
//! appender.append_stream("config.json", &br#"{"debug":false}"#[..])?;
//! appender.append_file("assets/logo.png")?;
//! appender.close()?;
//!
//! // Read
//! let extractor = Extractor::open("app.bin")?;
//! let config = extractor.read_all("config.json")?;
//! let mut logo = extractor.reader("logo.png")?;
//! std::io::copy(&mut logo, &mut std::io::sink())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Layout
//! ```text
//! [existing file bytes][block 1]...[block N][JSON index][u64 LE index offset]
//! ```

pub mod appender;
pub mod codec;
pub mod counting;
pub mod error;
pub mod extractor;
pub mod index;
pub mod trailer;

pub use appender::{AppendOptions, Appender};
pub use codec::{CodecError, CodecId};
pub use error::{ContainerError, Result};
pub use extractor::{BlockReader, Extractor};
pub use index::{BlockDescriptor, ContainerIndex, FORMAT_VERSION};
pub use trailer::{Trailer, TRAILER_SIZE};
