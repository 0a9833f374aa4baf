//! Linux framebuffer device (`/dev/fb0`).
//!
//! The panel's virtual framebuffer is `yres_virtual / yres` screens tall.
//! Each screen is a scan-out slot; flipping means programming `yoffset` to
//! the slot's first line.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::Path;

use crate::config::FlipMode;
use crate::error::HardwareFault;

/// `struct fb_bitfield`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FbBitfield {
    pub offset: u32,
    pub length: u32,
    pub msb_right: u32,
}

/// `struct fb_var_screeninfo`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VarScreenInfo {
    pub xres: u32,
    pub yres: u32,
    pub xres_virtual: u32,
    pub yres_virtual: u32,
    pub xoffset: u32,
    pub yoffset: u32,
    pub bits_per_pixel: u32,
    pub grayscale: u32,
    pub red: FbBitfield,
    pub green: FbBitfield,
    pub blue: FbBitfield,
    pub transp: FbBitfield,
    pub nonstd: u32,
    pub activate: u32,
    pub height: u32,
    pub width: u32,
    pub accel_flags: u32,
    pub pixclock: u32,
    pub left_margin: u32,
    pub right_margin: u32,
    pub upper_margin: u32,
    pub lower_margin: u32,
    pub hsync_len: u32,
    pub vsync_len: u32,
    pub sync: u32,
    pub vmode: u32,
    pub rotate: u32,
    pub colorspace: u32,
    pub reserved: [u32; 4],
}

impl VarScreenInfo {
    /// Screen info for a panel of `xres`x`yres` with `buffers` screens of
    /// virtual height.
    pub fn with_buffers(xres: u32, yres: u32, buffers: u32) -> Self {
        Self {
            xres,
            yres,
            xres_virtual: xres,
            yres_virtual: yres * buffers,
            bits_per_pixel: 32,
            ..Default::default()
        }
    }

    /// Number of whole screens in the virtual framebuffer.
    pub fn buffer_count(&self) -> u32 {
        if self.yres == 0 {
            0
        } else {
            self.yres_virtual / self.yres
        }
    }

    /// The presenter keeps one screen visible while another is drawn, so at
    /// least two screens are required.
    pub(crate) fn check(&self) -> Result<(), HardwareFault> {
        if self.xres == 0 || self.buffer_count() < 2 || self.xres_virtual < self.xres {
            return Err(HardwareFault::Geometry {
                xres: self.xres,
                yres: self.yres,
                xres_virtual: self.xres_virtual,
                yres_virtual: self.yres_virtual,
            });
        }
        Ok(())
    }
}

/// The device that scans a framebuffer out to the panel.
pub trait ScanoutDevice: Send + Sync {
    /// Current variable screen info.
    fn var_screen_info(&self) -> Result<VarScreenInfo, HardwareFault>;

    /// Make the screen at `info.yoffset` visible.
    fn flip(&self, info: &VarScreenInfo) -> Result<(), HardwareFault>;
}

nix::ioctl_read_bad!(fbioget_vscreeninfo, 0x4600, VarScreenInfo);
nix::ioctl_write_ptr_bad!(fbioput_vscreeninfo, 0x4601, VarScreenInfo);
nix::ioctl_write_ptr_bad!(fbiopan_display, 0x4606, VarScreenInfo);
nix::ioctl_write_ptr!(fbio_waitforvsync, b'F', 0x20, u32);

/// An fbdev node.
#[derive(Debug)]
pub struct FbDev {
    file: File,
    flip_mode: FlipMode,
}

impl FbDev {
    pub fn open(path: &Path, flip_mode: FlipMode) -> Result<Self, HardwareFault> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| HardwareFault::open(path, e))?;

        Ok(Self { file, flip_mode })
    }
}

impl ScanoutDevice for FbDev {
    fn var_screen_info(&self) -> Result<VarScreenInfo, HardwareFault> {
        let mut info = VarScreenInfo::default();
        unsafe { fbioget_vscreeninfo(self.file.as_raw_fd(), &mut info) }
            .map_err(|e| HardwareFault::ioctl("FBIOGET_VSCREENINFO", e))?;
        Ok(info)
    }

    fn flip(&self, info: &VarScreenInfo) -> Result<(), HardwareFault> {
        let fd = self.file.as_raw_fd();
        match self.flip_mode {
            FlipMode::SetVar => {
                unsafe { fbioput_vscreeninfo(fd, info) }
                    .map_err(|e| HardwareFault::ioctl("FBIOPUT_VSCREENINFO", e))?;
            }
            FlipMode::PanVsync => {
                let crtc: u32 = 0;
                unsafe { fbio_waitforvsync(fd, &crtc) }
                    .map_err(|e| HardwareFault::ioctl("FBIO_WAITFORVSYNC", e))?;
                unsafe { fbiopan_display(fd, info) }
                    .map_err(|e| HardwareFault::ioctl("FBIOPAN_DISPLAY", e))?;
            }
        }
        Ok(())
    }
}
