//! The display: scan-out slots, presentation thread and `present`.
//!
//! The panel is mounted rotated by 270 degrees. Everything a caller sees
//! (width, height, destination rectangles) is in the rotated orientation;
//! the framebuffer itself keeps the raw one. A present draws into a free
//! slot of the virtual framebuffer and queues it; the presentation thread
//! flips the panel to it later, in submission order.

mod presenter;
mod slots;

pub use slots::SlotSnapshot;

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use self::slots::SlotPool;
use crate::compositor::Compositor;
use crate::config::DisplayConfig;
use crate::error::{HardwareFault, OrFatal};
use crate::fbdev::{FbDev, ScanoutDevice};
use crate::ge2d::{Accelerator, Ge2d};
use crate::geometry::{Mirror, Rect, Rotation, Size};
use crate::heap::{DmaHeap, IonHeap};
use crate::surface::Surface;

/// Fixed mounting rotation of the panel.
pub const PANEL_ROTATION: Rotation = Rotation::Deg270;

/// Lifecycle of a display's presentation thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DisplayState {
    Idle = 0,
    Running = 1,
    Terminating = 2,
    Stopped = 3,
}

impl DisplayState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => DisplayState::Idle,
            1 => DisplayState::Running,
            2 => DisplayState::Terminating,
            _ => DisplayState::Stopped,
        }
    }
}

/// The kernel interfaces a display drives.
#[derive(Clone)]
pub struct Devices {
    pub scanout: Arc<dyn ScanoutDevice>,
    pub accelerator: Arc<dyn Accelerator>,
    pub heap: Arc<dyn DmaHeap>,
}

impl Devices {
    /// Open the framebuffer, and the process-wide GE2D and ION handles.
    pub fn open(config: &DisplayConfig) -> Result<Self, HardwareFault> {
        let scanout = FbDev::open(&config.framebuffer, config.flip_mode)?;
        let accelerator = Ge2d::shared(&config.accelerator)?;
        let heap = IonHeap::shared(&config.heap)?;

        Ok(Self {
            scanout: Arc::new(scanout),
            accelerator,
            heap,
        })
    }
}

pub struct Display {
    slots: Arc<SlotPool>,
    presenter: Option<JoinHandle<()>>,
    state: AtomicU8,
    background_color: AtomicU32,
    /// Raw panel size, before rotation.
    panel: Size,
    compositor: Compositor,
    scanout: Arc<dyn ScanoutDevice>,
    heap: Arc<dyn DmaHeap>,
}

impl Display {
    /// Open the display with the default device paths.
    pub fn open() -> Self {
        Self::with_config(&DisplayConfig::default())
    }

    pub fn with_config(config: &DisplayConfig) -> Self {
        Self::try_with_config(config).or_fatal()
    }

    pub(crate) fn try_with_config(config: &DisplayConfig) -> Result<Self, HardwareFault> {
        let devices = Devices::open(config)?;
        Self::try_with_devices(devices, config.background_color)
    }

    /// Build a display on explicit devices.
    pub fn with_devices(devices: Devices, background_color: u32) -> Self {
        Self::try_with_devices(devices, background_color).or_fatal()
    }

    pub(crate) fn try_with_devices(
        devices: Devices,
        background_color: u32,
    ) -> Result<Self, HardwareFault> {
        let info = devices.scanout.var_screen_info()?;
        info.check()?;
        let count = info.buffer_count();

        log::info!(
            "display: {}x{} virtual {}x{}, {} buffers",
            info.xres,
            info.yres,
            info.xres_virtual,
            info.yres_virtual,
            count
        );

        let mut display = Self {
            slots: Arc::new(SlotPool::new(count, info.yres)),
            presenter: None,
            state: AtomicU8::new(DisplayState::Idle as u8),
            background_color: AtomicU32::new(background_color),
            panel: Size::new(info.xres, info.yres),
            compositor: Compositor::new(devices.accelerator),
            scanout: devices.scanout,
            heap: devices.heap,
        };

        let handle = presenter::spawn(display.slots.clone(), display.scanout.clone())?;
        display.presenter = Some(handle);
        display.set_state(DisplayState::Running);
        Ok(display)
    }

    /// Caller-visible width: the panel's raw height.
    pub fn width(&self) -> u32 {
        self.panel.height
    }

    /// Caller-visible height: the panel's raw width.
    pub fn height(&self) -> u32 {
        self.panel.width
    }

    /// Caller-visible size.
    pub fn size(&self) -> Size {
        self.panel.transposed()
    }

    /// Letterbox colour, ABGR.
    pub fn background_color(&self) -> u32 {
        self.background_color.load(Ordering::Relaxed)
    }

    /// Takes effect from the next present.
    pub fn set_background_color(&self, color: u32) {
        self.background_color.store(color, Ordering::Relaxed);
    }

    pub fn slot_count(&self) -> usize {
        self.slots.total()
    }

    pub fn slot_snapshot(&self) -> SlotSnapshot {
        self.slots.snapshot()
    }

    pub fn state(&self) -> DisplayState {
        DisplayState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: DisplayState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// The heap surfaces for this display are allocated from.
    pub fn heap(&self) -> &Arc<dyn DmaHeap> {
        &self.heap
    }

    /// Composite `src` of `surface` onto `dst` of the next frame and queue
    /// it for display.
    ///
    /// Blocks while every slot is in flight. Returns once the frame is
    /// queued, not when it is visible. Any part of the screen outside `dst`
    /// shows the background colour.
    pub fn present(&self, surface: &Surface, src: Rect, mirror: Mirror, dst: Rect) {
        self.try_present(surface, src, mirror, dst).or_fatal()
    }

    pub(crate) fn try_present(
        &self,
        surface: &Surface,
        src: Rect,
        mirror: Mirror,
        dst: Rect,
    ) -> Result<(), HardwareFault> {
        let slot = self.slots.acquire_free()?;

        let info = self.scanout.var_screen_info()?;
        let full = Size::new(info.xres_virtual, info.yres_virtual);
        let raw = Size::new(info.xres, info.yres);
        let visible = raw.transposed();

        if !dst.covers(visible) {
            self.compositor
                .clear(self.background_color(), raw, full, slot.y_offset())?;
        }

        let mounted = Rect::new(
            dst.y,
            visible.width as i32 - (dst.x + dst.width as i32),
            dst.width,
            dst.height,
        );
        self.compositor.blit(
            surface,
            src,
            mirror,
            mounted,
            full,
            slot.y_offset(),
            PANEL_ROTATION,
        )?;

        self.slots.submit(slot);
        Ok(())
    }

    /// Stop the presentation thread and release the devices.
    pub fn destroy(self) {
        drop(self);
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.presenter.take() else {
            return;
        };

        self.set_state(DisplayState::Terminating);
        self.slots.close();
        if handle.join().is_err() {
            log::error!("display: presentation thread panicked");
        }
        self.set_state(DisplayState::Stopped);
        log::info!("display: stopped");
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Display")
            .field("panel", &self.panel)
            .field("slots", &self.slots.total())
            .field("state", &self.state())
            .field("background_color", &format_args!("{:#010x}", self.background_color()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_BACKGROUND;
    use crate::format::PixelFormat;
    use crate::ge2d::HwRect;
    use crate::sim::{AccelOp, SimAccelerator, SimHeap, SimScanout};
    use std::time::Duration;

    struct Rig {
        scanout: Arc<SimScanout>,
        accel: Arc<SimAccelerator>,
        heap: Arc<SimHeap>,
        display: Display,
    }

    fn rig(buffers: u32) -> Rig {
        let scanout = Arc::new(SimScanout::new(480, 854, buffers));
        let accel = Arc::new(SimAccelerator::new());
        let heap = Arc::new(SimHeap::new());
        let devices = Devices::simulated(scanout.clone(), accel.clone(), heap.clone());
        let display = Display::try_with_devices(devices, DEFAULT_BACKGROUND).unwrap();
        Rig {
            scanout,
            accel,
            heap,
            display,
        }
    }

    #[test]
    fn test_geometry_is_rotated() {
        let rig = rig(3);
        assert_eq!(rig.display.width(), 854);
        assert_eq!(rig.display.height(), 480);
        assert_eq!(rig.display.slot_count(), 3);
        assert_eq!(rig.display.state(), DisplayState::Running);
    }

    #[test]
    fn test_background_color_round_trip() {
        let rig = rig(2);
        assert_eq!(rig.display.background_color(), 0xff00_0000);
        rig.display.set_background_color(0xff12_3456);
        assert_eq!(rig.display.background_color(), 0xff12_3456);
    }

    #[test]
    fn test_full_screen_present_skips_clear() {
        let rig = rig(3);
        let surface = Surface::try_with_heap(rig.heap.clone(), 854, 480, PixelFormat::Xrgb8888)
            .unwrap();
        let full = Rect::from_size(rig.display.size());

        rig.display
            .try_present(&surface, full, Mirror::NONE, full)
            .unwrap();

        let ops = rig.accel.ops();
        assert!(!ops.iter().any(|op| matches!(op, AccelOp::Fill { .. })));
        assert_eq!(
            ops.last(),
            Some(&AccelOp::StretchBlit {
                src: HwRect::new(0, 0, 854, 480),
                dst: HwRect::new(0, 0, 480, 854),
            })
        );
    }

    #[test]
    fn test_letterboxed_present_clears_raw_slot() {
        let rig = rig(3);
        rig.display.set_background_color(0xff00_00ff);
        let surface = Surface::try_with_heap(rig.heap.clone(), 320, 240, PixelFormat::Rgb565)
            .unwrap();

        rig.display
            .try_present(
                &surface,
                Rect::new(0, 0, 320, 240),
                Mirror::NONE,
                Rect::new(107, 0, 640, 480),
            )
            .unwrap();

        let ops = rig.accel.ops();
        assert_eq!(
            ops[1],
            AccelOp::Fill {
                rect: HwRect::new(0, 0, 480, 854),
                rgba: 0xff00_00ff,
            }
        );
        // (dst.y, 854 - (107 + 640)) with width and height exchanged
        assert_eq!(
            ops[3],
            AccelOp::StretchBlit {
                src: HwRect::new(0, 0, 320, 240),
                dst: HwRect::new(0, 107, 480, 640),
            }
        );
    }

    #[test]
    fn test_destroy_stops_presenter() {
        let rig = rig(2);
        let surface = Surface::try_with_heap(rig.heap.clone(), 16, 16, PixelFormat::Abgr8888)
            .unwrap();
        let full = Rect::from_size(rig.display.size());
        rig.display
            .try_present(&surface, Rect::new(0, 0, 16, 16), Mirror::NONE, full)
            .unwrap();
        assert!(rig.scanout.wait_for_flips(1, Duration::from_secs(5)));

        rig.display.destroy();
        assert_eq!(rig.scanout.flips(), vec![0]);
    }

    #[test]
    fn test_rejects_single_buffer_framebuffer() {
        let devices = Devices::simulated(
            Arc::new(SimScanout::new(480, 854, 1)),
            Arc::new(SimAccelerator::new()),
            Arc::new(SimHeap::new()),
        );
        assert!(matches!(
            Display::try_with_devices(devices, DEFAULT_BACKGROUND),
            Err(HardwareFault::Geometry {
                yres: 854,
                yres_virtual: 854,
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_zero_height_framebuffer() {
        let devices = Devices::simulated(
            Arc::new(SimScanout::with_info(Default::default())),
            Arc::new(SimAccelerator::new()),
            Arc::new(SimHeap::new()),
        );
        assert!(matches!(
            Display::try_with_devices(devices, DEFAULT_BACKGROUND),
            Err(HardwareFault::Geometry { .. })
        ));
    }
}
