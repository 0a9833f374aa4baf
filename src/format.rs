//! Packed pixel formats.
//!
//! Formats are identified by their DRM fourcc so the same value can be handed
//! to an EGL `EGL_LINUX_DRM_FOURCC_EXT` import without translation.

use crate::error::{Fourcc, UnsupportedFormat};

const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | ((code[1] as u32) << 8) | ((code[2] as u32) << 16) | ((code[3] as u32) << 24)
}

/// Packed RGB/RGBA layouts at 16, 24 and 32 bits per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PixelFormat {
    // 16 bit
    Xrgb4444 = fourcc(b"XR12"),
    Xbgr4444 = fourcc(b"XB12"),
    Rgbx4444 = fourcc(b"RX12"),
    Bgrx4444 = fourcc(b"BX12"),
    Argb4444 = fourcc(b"AR12"),
    Abgr4444 = fourcc(b"AB12"),
    Rgba4444 = fourcc(b"RA12"),
    Bgra4444 = fourcc(b"BA12"),
    Xrgb1555 = fourcc(b"XR15"),
    Xbgr1555 = fourcc(b"XB15"),
    Rgbx5551 = fourcc(b"RX15"),
    Bgrx5551 = fourcc(b"BX15"),
    Argb1555 = fourcc(b"AR15"),
    Abgr1555 = fourcc(b"AB15"),
    Rgba5551 = fourcc(b"RA15"),
    Bgra5551 = fourcc(b"BA15"),
    Rgb565 = fourcc(b"RG16"),
    Bgr565 = fourcc(b"BG16"),

    // 24 bit
    Rgb888 = fourcc(b"RG24"),
    Bgr888 = fourcc(b"BG24"),

    // 32 bit
    Xrgb8888 = fourcc(b"XR24"),
    Xbgr8888 = fourcc(b"XB24"),
    Rgbx8888 = fourcc(b"RX24"),
    Bgrx8888 = fourcc(b"BX24"),
    Argb8888 = fourcc(b"AR24"),
    Abgr8888 = fourcc(b"AB24"),
    Rgba8888 = fourcc(b"RA24"),
    Bgra8888 = fourcc(b"BA24"),
    Xrgb2101010 = fourcc(b"XR30"),
    Xbgr2101010 = fourcc(b"XB30"),
    Rgbx1010102 = fourcc(b"RX30"),
    Bgrx1010102 = fourcc(b"BX30"),
    Argb2101010 = fourcc(b"AR30"),
    Abgr2101010 = fourcc(b"AB30"),
    Rgba1010102 = fourcc(b"RA30"),
    Bgra1010102 = fourcc(b"BA30"),
}

impl PixelFormat {
    /// Every supported format, in declaration order.
    pub const ALL: [PixelFormat; 36] = [
        PixelFormat::Xrgb4444,
        PixelFormat::Xbgr4444,
        PixelFormat::Rgbx4444,
        PixelFormat::Bgrx4444,
        PixelFormat::Argb4444,
        PixelFormat::Abgr4444,
        PixelFormat::Rgba4444,
        PixelFormat::Bgra4444,
        PixelFormat::Xrgb1555,
        PixelFormat::Xbgr1555,
        PixelFormat::Rgbx5551,
        PixelFormat::Bgrx5551,
        PixelFormat::Argb1555,
        PixelFormat::Abgr1555,
        PixelFormat::Rgba5551,
        PixelFormat::Bgra5551,
        PixelFormat::Rgb565,
        PixelFormat::Bgr565,
        PixelFormat::Rgb888,
        PixelFormat::Bgr888,
        PixelFormat::Xrgb8888,
        PixelFormat::Xbgr8888,
        PixelFormat::Rgbx8888,
        PixelFormat::Bgrx8888,
        PixelFormat::Argb8888,
        PixelFormat::Abgr8888,
        PixelFormat::Rgba8888,
        PixelFormat::Bgra8888,
        PixelFormat::Xrgb2101010,
        PixelFormat::Xbgr2101010,
        PixelFormat::Rgbx1010102,
        PixelFormat::Bgrx1010102,
        PixelFormat::Argb2101010,
        PixelFormat::Abgr2101010,
        PixelFormat::Rgba1010102,
        PixelFormat::Bgra1010102,
    ];

    /// Look up a format by its DRM fourcc.
    pub fn from_fourcc(code: u32) -> Result<Self, UnsupportedFormat> {
        Self::ALL
            .iter()
            .copied()
            .find(|format| format.fourcc() == code)
            .ok_or(UnsupportedFormat(Fourcc(code)))
    }

    /// The DRM fourcc of this format.
    #[inline]
    pub const fn fourcc(self) -> u32 {
        self as u32
    }

    pub const fn bits_per_pixel(self) -> u32 {
        use PixelFormat::*;
        match self {
            Xrgb4444 | Xbgr4444 | Rgbx4444 | Bgrx4444 | Argb4444 | Abgr4444 | Rgba4444
            | Bgra4444 | Xrgb1555 | Xbgr1555 | Rgbx5551 | Bgrx5551 | Argb1555 | Abgr1555
            | Rgba5551 | Bgra5551 | Rgb565 | Bgr565 => 16,

            Rgb888 | Bgr888 => 24,

            Xrgb8888 | Xbgr8888 | Rgbx8888 | Bgrx8888 | Argb8888 | Abgr8888 | Rgba8888
            | Bgra8888 | Xrgb2101010 | Xbgr2101010 | Rgbx1010102 | Bgrx1010102
            | Argb2101010 | Abgr2101010 | Rgba1010102 | Bgra1010102 => 32,
        }
    }

    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        (self.bits_per_pixel() / 8) as usize
    }

    /// Colour target format for a rendering context asking for the given
    /// channel depths: 5/6/5 gets RGB565, anything else ABGR8888.
    pub fn from_channel_bits(red: u32, green: u32, blue: u32) -> Self {
        if (red, green, blue) == (5, 6, 5) {
            PixelFormat::Rgb565
        } else {
            PixelFormat::Abgr8888
        }
    }
}

impl TryFrom<u32> for PixelFormat {
    type Error = UnsupportedFormat;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::from_fourcc(code)
    }
}

/// Bytes per pixel for a raw fourcc.
pub fn bytes_per_pixel(code: u32) -> Result<usize, UnsupportedFormat> {
    PixelFormat::from_fourcc(code).map(PixelFormat::bytes_per_pixel)
}
