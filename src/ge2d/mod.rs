//! Amlogic GE2D 2D accelerator.
//!
//! GE2D works in two steps: a configuration ioctl describes the source and
//! destination planes (memory type, format, size, reversal flags, axis
//! swap), then a command ioctl (fill, stretch-blit) names the rectangles.
//! [`BlitConfig`] is the crate's description of the first step and
//! [`Accelerator`] is the seam between the compositor and the device, so the
//! compositing math can run against `sim::SimAccelerator` (feature `sim`).
//!
//! The destination is always the OSD0 framebuffer canvas in 32-bit ARGB.

mod abi;

use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::Arc;

use crate::device::SharedDevice;
use crate::error::{Fourcc, HardwareFault, UnsupportedFormat};
use crate::format::PixelFormat;
use crate::geometry::Mirror;

/// A GE2D canvas format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ge2dFormat(pub u32);

const GE2D_LITTLE_ENDIAN: u32 = 1 << 24;
const GE2D_FMT_S16_RGB: u32 = GE2D_LITTLE_ENDIAN | 0x00100;
const GE2D_FMT_S24_RGB: u32 = GE2D_LITTLE_ENDIAN | 0x00200;
const GE2D_FMT_S32_RGBA: u32 = GE2D_LITTLE_ENDIAN | 0x00300;

const fn color_map(n: u32) -> u32 {
    n << 20
}

impl Ge2dFormat {
    pub const S16_RGB_565: Self = Self(GE2D_FMT_S16_RGB | color_map(5));
    pub const S16_ARGB_1555: Self = Self(GE2D_FMT_S16_RGB | color_map(7));
    pub const S16_RGBA_4444: Self = Self(GE2D_FMT_S16_RGB | color_map(4));
    pub const S24_RGB: Self = Self(GE2D_FMT_S24_RGB | color_map(0));
    pub const S24_BGR: Self = Self(GE2D_FMT_S24_RGB | color_map(5));
    pub const S32_RGBA: Self = Self(GE2D_FMT_S32_RGBA | color_map(0));
    pub const S32_ARGB: Self = Self(GE2D_FMT_S32_RGBA | color_map(1));
    pub const S32_ABGR: Self = Self(GE2D_FMT_S32_RGBA | color_map(2));
    pub const S32_BGRA: Self = Self(GE2D_FMT_S32_RGBA | color_map(3));
}

impl TryFrom<PixelFormat> for Ge2dFormat {
    type Error = UnsupportedFormat;

    fn try_from(format: PixelFormat) -> Result<Self, Self::Error> {
        use PixelFormat::*;
        Ok(match format {
            Rgba8888 | Rgbx8888 => Ge2dFormat::S32_RGBA,
            Bgra8888 | Bgrx8888 => Ge2dFormat::S32_BGRA,
            Argb8888 | Xrgb8888 => Ge2dFormat::S32_ARGB,
            Abgr8888 | Xbgr8888 => Ge2dFormat::S32_ABGR,

            Rgb888 => Ge2dFormat::S24_RGB,
            Bgr888 => Ge2dFormat::S24_BGR,

            Rgb565 => Ge2dFormat::S16_RGB_565,
            Rgba5551 => Ge2dFormat::S16_ARGB_1555,
            Rgba4444 => Ge2dFormat::S16_RGBA_4444,

            other => return Err(UnsupportedFormat(Fourcc(other.fourcc()))),
        })
    }
}

/// Rectangle in accelerator coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HwRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl HwRect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }
}

/// Source plane: a dma-buf shared by a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePlane {
    pub format: Ge2dFormat,
    pub width: u32,
    pub height: u32,
    /// Row pitch in pixels.
    pub plane_width: u32,
    pub fd: RawFd,
    pub mirror: Mirror,
}

/// Destination plane: the OSD0 framebuffer canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetPlane {
    pub format: Ge2dFormat,
    pub width: u32,
    pub height: u32,
    pub reverse_x: bool,
    pub reverse_y: bool,
}

impl TargetPlane {
    /// The whole virtual framebuffer, ARGB, no reversal.
    pub fn framebuffer(width: u32, height: u32) -> Self {
        Self {
            format: Ge2dFormat::S32_ARGB,
            width,
            height,
            reverse_x: false,
            reverse_y: false,
        }
    }
}

/// Plane configuration for the next accelerator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitConfig {
    /// `None` for fills.
    pub source: Option<SourcePlane>,
    pub target: TargetPlane,
    /// Exchange destination x and y (`dst_xy_swap`).
    pub swap_axes: bool,
}

/// A fixed-function 2D engine.
pub trait Accelerator: Send + Sync {
    fn configure(&self, config: &BlitConfig) -> Result<(), HardwareFault>;

    /// Fill `rect` of the configured destination with `rgba`.
    fn fill_rect(&self, rect: HwRect, rgba: u32) -> Result<(), HardwareFault>;

    /// Scale `src` of the configured source onto `dst` of the destination.
    fn stretch_blit(&self, src: HwRect, dst: HwRect) -> Result<(), HardwareFault>;
}

static GE2D: SharedDevice<Ge2d> = SharedDevice::new("ge2d");

/// The `/dev/ge2d` node.
#[derive(Debug)]
pub struct Ge2d {
    file: File,
}

impl Ge2d {
    pub fn open(path: &Path) -> Result<Self, HardwareFault> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| HardwareFault::open(path, e))?;
        Ok(Self { file })
    }

    /// Process-wide handle, opened on first use.
    pub fn shared(path: &Path) -> Result<Arc<Self>, HardwareFault> {
        GE2D.get_or_open(|| Self::open(path))
    }
}

impl Accelerator for Ge2d {
    fn configure(&self, config: &BlitConfig) -> Result<(), HardwareFault> {
        let raw = abi::ConfigGe2dParaEx::from(config);
        unsafe { abi::ge2d_config_ex_mem(self.file.as_raw_fd(), &raw) }
            .map_err(|e| HardwareFault::ioctl("GE2D_CONFIG_EX_MEM", e))?;
        Ok(())
    }

    fn fill_rect(&self, rect: HwRect, rgba: u32) -> Result<(), HardwareFault> {
        let para = abi::Ge2dPara {
            color: rgba,
            src1_rect: rect.into(),
            ..Default::default()
        };
        unsafe { abi::ge2d_fill_rectangle(self.file.as_raw_fd(), &para) }
            .map_err(|e| HardwareFault::ioctl("GE2D_FILLRECTANGLE", e))?;
        Ok(())
    }

    fn stretch_blit(&self, src: HwRect, dst: HwRect) -> Result<(), HardwareFault> {
        let para = abi::Ge2dPara {
            src1_rect: src.into(),
            dst_rect: dst.into(),
            ..Default::default()
        };
        unsafe { abi::ge2d_stretch_blit(self.file.as_raw_fd(), &para) }
            .map_err(|e| HardwareFault::ioctl("GE2D_STRETCHBLIT", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_codes_match_driver_header() {
        assert_eq!(Ge2dFormat::S32_ARGB.0, 0x0110_0300);
        assert_eq!(Ge2dFormat::S32_RGBA.0, 0x0100_0300);
        assert_eq!(Ge2dFormat::S24_BGR.0, 0x0150_0200);
        assert_eq!(Ge2dFormat::S16_RGB_565.0, 0x0150_0100);
    }

    #[test]
    fn test_format_translation() {
        let cases = [
            (PixelFormat::Rgba8888, Ge2dFormat::S32_RGBA),
            (PixelFormat::Rgbx8888, Ge2dFormat::S32_RGBA),
            (PixelFormat::Bgrx8888, Ge2dFormat::S32_BGRA),
            (PixelFormat::Bgra8888, Ge2dFormat::S32_BGRA),
            (PixelFormat::Argb8888, Ge2dFormat::S32_ARGB),
            (PixelFormat::Xrgb8888, Ge2dFormat::S32_ARGB),
            (PixelFormat::Abgr8888, Ge2dFormat::S32_ABGR),
            (PixelFormat::Xbgr8888, Ge2dFormat::S32_ABGR),
            (PixelFormat::Rgb888, Ge2dFormat::S24_RGB),
            (PixelFormat::Bgr888, Ge2dFormat::S24_BGR),
            (PixelFormat::Rgb565, Ge2dFormat::S16_RGB_565),
            (PixelFormat::Rgba5551, Ge2dFormat::S16_ARGB_1555),
            (PixelFormat::Rgba4444, Ge2dFormat::S16_RGBA_4444),
        ];
        for (format, expected) in cases {
            assert_eq!(Ge2dFormat::try_from(format), Ok(expected), "{:?}", format);
        }
    }

    #[test]
    fn test_formats_without_engine_support_are_rejected() {
        for format in [
            PixelFormat::Bgr565,
            PixelFormat::Argb1555,
            PixelFormat::Xrgb2101010,
            PixelFormat::Abgr4444,
        ] {
            assert_eq!(
                Ge2dFormat::try_from(format),
                Err(UnsupportedFormat(Fourcc(format.fourcc())))
            );
        }
    }
}
