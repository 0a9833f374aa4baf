//! Hardware compositing onto the framebuffer.
//!
//! The accelerator has no rotate-by-degrees parameter. A quarter turn is an
//! axis swap plus one destination reversal; a half turn is both destination
//! reversals. Source mirroring uses the separate source reversal flags, so it
//! composes with any rotation.
//!
//! Both operations address one scan-out slot of the virtual framebuffer by
//! adding its vertical offset to the destination rectangle.

use std::os::fd::AsRawFd;
use std::sync::Arc;

use crate::error::HardwareFault;
use crate::ge2d::{Accelerator, BlitConfig, Ge2dFormat, HwRect, SourcePlane, TargetPlane};
use crate::geometry::{Mirror, Rect, Rotation, Size};
use crate::surface::Surface;

/// ABGR (`0xAABBGGRR`) to the accelerator's RGBA (`0xRRGGBBAA`).
#[inline]
pub const fn abgr_to_rgba(color: u32) -> u32 {
    let a = (color >> 24) & 0xff;
    let b = (color >> 16) & 0xff;
    let g = (color >> 8) & 0xff;
    let r = color & 0xff;
    (r << 24) | (g << 16) | (b << 8) | a
}

/// Destination plane settings for `rotation` on a framebuffer of `full`.
pub fn rotated_target(full: Size, rotation: Rotation) -> (TargetPlane, bool) {
    let mut target = TargetPlane::framebuffer(full.width, full.height);
    match rotation {
        Rotation::Deg0 => {}
        Rotation::Deg90 => target.reverse_x = true,
        Rotation::Deg180 => {
            target.reverse_x = true;
            target.reverse_y = true;
        }
        Rotation::Deg270 => target.reverse_y = true,
    }
    (target, rotation.swaps_axes())
}

/// Issues fills and blits against an [`Accelerator`].
///
/// Calls are not serialised; one composited stream per process.
#[derive(Clone)]
pub struct Compositor {
    accel: Arc<dyn Accelerator>,
}

impl Compositor {
    pub fn new(accel: Arc<dyn Accelerator>) -> Self {
        Self { accel }
    }

    /// Fill the top-left `region` of the slot at `y_offset` with `color`
    /// (ABGR).
    pub fn clear(
        &self,
        color: u32,
        region: Size,
        full: Size,
        y_offset: u32,
    ) -> Result<(), HardwareFault> {
        let config = BlitConfig {
            source: None,
            target: TargetPlane::framebuffer(full.width, full.height),
            swap_axes: false,
        };
        self.accel.configure(&config)?;

        let rect = HwRect::new(0, y_offset as i32, region.width as i32, region.height as i32);
        self.accel.fill_rect(rect, abgr_to_rgba(color))
    }

    /// Scale `src_rect` of `src` onto `dst_rect` of the slot at `y_offset`.
    ///
    /// `dst_rect` is in destination coordinates before rotation; for quarter
    /// turns its width and height are exchanged before submission.
    #[allow(clippy::too_many_arguments)]
    pub fn blit(
        &self,
        src: &Surface,
        src_rect: Rect,
        mirror: Mirror,
        dst_rect: Rect,
        full: Size,
        y_offset: u32,
        rotation: Rotation,
    ) -> Result<(), HardwareFault> {
        let format = Ge2dFormat::try_from(src.format())?;
        let fd = src.try_share_fd()?;

        let source = SourcePlane {
            format,
            width: src.width(),
            height: src.height(),
            plane_width: src.stride_pixels(),
            fd: fd.as_raw_fd(),
            mirror,
        };
        let (target, swap_axes) = rotated_target(full, rotation);

        let config = BlitConfig {
            source: Some(source),
            target,
            swap_axes,
        };
        self.accel.configure(&config)?;

        let (w, h) = if swap_axes {
            (dst_rect.height, dst_rect.width)
        } else {
            (dst_rect.width, dst_rect.height)
        };

        let src = HwRect::new(
            src_rect.x,
            src_rect.y,
            src_rect.width as i32,
            src_rect.height as i32,
        );
        let dst = HwRect::new(dst_rect.x, dst_rect.y + y_offset as i32, w as i32, h as i32);
        self.accel.stretch_blit(src, dst)
    }
}
