//! Display configuration.
//!
//! Defaults describe the ODROID-GO Ultra. Every field can be overridden from
//! the environment, which is how the device paths are redirected on boards
//! that number their nodes differently:
//!
//! | variable          | field              | format                 |
//! |-------------------|--------------------|------------------------|
//! | `GOU_FB_DEVICE`   | `framebuffer`      | path                   |
//! | `GOU_GE2D_DEVICE` | `accelerator`      | path                   |
//! | `GOU_ION_DEVICE`  | `heap`             | path                   |
//! | `GOU_FLIP_MODE`   | `flip_mode`        | `set-var`, `pan-vsync` |
//! | `GOU_BACKGROUND`  | `background_color` | hex ABGR, `0x` allowed |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

/// Default letterbox colour: opaque black, ABGR.
pub const DEFAULT_BACKGROUND: u32 = 0xff00_0000;

/// How the presentation thread commits a new `yoffset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlipMode {
    /// `FBIOPUT_VSCREENINFO`; the driver latches the offset at vblank.
    #[default]
    SetVar,
    /// `FBIO_WAITFORVSYNC` followed by `FBIOPAN_DISPLAY`.
    PanVsync,
}

impl FromStr for FlipMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "set-var" => Ok(FlipMode::SetVar),
            "pan-vsync" => Ok(FlipMode::PanVsync),
            other => Err(ConfigError::FlipMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayConfig {
    pub framebuffer: PathBuf,
    pub accelerator: PathBuf,
    pub heap: PathBuf,
    pub background_color: u32,
    pub flip_mode: FlipMode,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            framebuffer: PathBuf::from("/dev/fb0"),
            accelerator: PathBuf::from("/dev/ge2d"),
            heap: PathBuf::from("/dev/ion"),
            background_color: DEFAULT_BACKGROUND,
            flip_mode: FlipMode::default(),
        }
    }
}

impl DisplayConfig {
    /// Defaults overridden by `GOU_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("GOU_FB_DEVICE") {
            config.framebuffer = path.into();
        }
        if let Some(path) = lookup("GOU_GE2D_DEVICE") {
            config.accelerator = path.into();
        }
        if let Some(path) = lookup("GOU_ION_DEVICE") {
            config.heap = path.into();
        }
        if let Some(mode) = lookup("GOU_FLIP_MODE") {
            config.flip_mode = mode.parse()?;
        }
        if let Some(color) = lookup("GOU_BACKGROUND") {
            config.background_color = parse_color("GOU_BACKGROUND", &color)?;
        }

        Ok(config)
    }
}

fn parse_color(var: &'static str, value: &str) -> Result<u32, ConfigError> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    u32::from_str_radix(digits, 16).map_err(|_| ConfigError::Color {
        var,
        value: value.to_string(),
    })
}
