//! Shared simulated-hardware fixtures for the integration tests.
//!
//! Every rig is an ODROID-GO Ultra panel: 480x854 raw, mounted so callers
//! see 854x480.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gou::config::DEFAULT_BACKGROUND;
use gou::sim::{SimAccelerator, SimHeap, SimScanout};
use gou::{Devices, Display, PixelFormat, Rect, SlotSnapshot, Surface};

pub const PANEL_XRES: u32 = 480;
pub const PANEL_YRES: u32 = 854;

/// Generous bound for anything waiting on the presentation thread.
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Long enough that a thread which could make progress would have.
pub const SETTLE: Duration = Duration::from_millis(100);

pub struct SimRig {
    pub scanout: Arc<SimScanout>,
    pub accel: Arc<SimAccelerator>,
    pub heap: Arc<SimHeap>,
    pub display: Display,
}

impl SimRig {
    pub fn new(buffers: u32) -> Self {
        Self::with_background(buffers, DEFAULT_BACKGROUND)
    }

    pub fn with_background(buffers: u32, background: u32) -> Self {
        let scanout = Arc::new(SimScanout::new(PANEL_XRES, PANEL_YRES, buffers));
        let accel = Arc::new(SimAccelerator::new());
        let heap = Arc::new(SimHeap::new());
        let devices = Devices::simulated(scanout.clone(), accel.clone(), heap.clone());
        let display = Display::with_devices(devices, background);

        Self {
            scanout,
            accel,
            heap,
            display,
        }
    }

    pub fn surface(&self, width: u32, height: u32, format: PixelFormat) -> Surface {
        Surface::new(&self.display, width, height, format)
    }

    pub fn full_screen(&self) -> Rect {
        Rect::from_size(self.display.size())
    }

    /// Every slot offset, ascending.
    pub fn all_slots(&self) -> Vec<u32> {
        (0..self.display.slot_count() as u32)
            .map(|i| i * PANEL_YRES)
            .collect()
    }
}

pub fn sorted(mut offsets: Vec<u32>) -> Vec<u32> {
    offsets.sort_unstable();
    offsets
}

/// Poll until `offset` is the on-screen slot. The presenter retires a slot
/// just after its flip, so a flip count alone can race the snapshot.
pub fn wait_for_on_screen(rig: &SimRig, offset: u32) -> SlotSnapshot {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let snap = rig.display.slot_snapshot();
        if snap.on_screen == Some(offset) {
            return snap;
        }
        assert!(
            Instant::now() < deadline,
            "slot {} never reached the screen: {:?}",
            offset,
            snap
        );
        thread::yield_now();
    }
}
