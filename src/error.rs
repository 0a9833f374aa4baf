//! Error types for libgou.
//!
//! Everything that goes wrong talking to the kernel is a [`HardwareFault`].
//! Faults travel through the crate's internals as ordinary `Result`s so the
//! `?` operator can be used freely, but they never leave a public entry
//! point: the boundary hands them to [`fatal`], which logs and aborts. A
//! failed display buffer or accelerator command means the driver and this
//! library disagree about the hardware, and there is nothing a caller can do
//! about that at runtime.

use std::fmt;
use std::io;
use std::path::PathBuf;

use log::LevelFilter;
use thiserror::Error;

/// Four-character DRM format code, printed as its characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fourcc(pub u32);

impl fmt::Display for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for shift in [0, 8, 16, 24] {
            let byte = ((self.0 >> shift) & 0xff) as u8;
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{:02x}", byte)?;
            }
        }
        Ok(())
    }
}

/// A pixel format the allocator or the accelerator has no entry for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unsupported pixel format {0}")]
pub struct UnsupportedFormat(pub Fourcc);

/// Unrecoverable failure of a kernel interface.
#[derive(Debug, Error)]
pub enum HardwareFault {
    #[error("open {} failed: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{request} failed: {source}")]
    Ioctl {
        request: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("mmap of {len} bytes failed: {source}")]
    Map {
        len: usize,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Format(#[from] UnsupportedFormat),

    #[error("framebuffer reports unusable geometry {xres}x{yres} (virtual {xres_virtual}x{yres_virtual})")]
    Geometry {
        xres: u32,
        yres: u32,
        xres_virtual: u32,
        yres_virtual: u32,
    },

    #[error("dma-buf descriptor for heap handle {0} was not published")]
    Unshared(u32),

    #[error("{queue} slot queue is out of step with its counter")]
    SlotDesync { queue: &'static str },

    #[error("failed to spawn presentation thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("simulated device: {0}")]
    Sim(String),
}

impl HardwareFault {
    pub(crate) fn ioctl(request: &'static str, source: nix::Error) -> Self {
        HardwareFault::Ioctl { request, source }
    }

    pub(crate) fn open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        HardwareFault::Open {
            path: path.into(),
            source,
        }
    }
}

/// Malformed configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown flip mode {0:?} (expected \"set-var\" or \"pan-vsync\")")]
    FlipMode(String),

    #[error("{var}: {value:?} is not a hex colour")]
    Color { var: &'static str, value: String },
}

/// Report a hardware fault and terminate the process.
pub fn fatal(fault: HardwareFault) -> ! {
    if log::max_level() >= LevelFilter::Error {
        log::error!("hardware interface fault: {}", fault);
        log::logger().flush();
    } else {
        eprintln!("libgou: hardware interface fault: {}", fault);
    }
    std::process::abort()
}

/// Conversion of an internal `Result` at a public entry point.
pub(crate) trait OrFatal<T> {
    fn or_fatal(self) -> T;
}

impl<T> OrFatal<T> for Result<T, HardwareFault> {
    #[inline]
    fn or_fatal(self) -> T {
        match self {
            Ok(value) => value,
            Err(fault) => fatal(fault),
        }
    }
}
