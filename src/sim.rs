//! In-process stand-ins for the display hardware.
//!
//! These implement the same device traits as the kernel drivers, so a
//! [`Display`](crate::Display) built on [`Devices::simulated`] runs its real
//! slot pool and presentation thread. Used by the test suite and by
//! `gou-testpattern --simulate`.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::display::Devices;
use crate::error::HardwareFault;
use crate::fbdev::{ScanoutDevice, VarScreenInfo};
use crate::ge2d::{Accelerator, BlitConfig, HwRect};
use crate::heap::{DmaHeap, HeapHandle};

/// DMA heap backed by memfd files, so shared descriptors can be mapped.
#[derive(Debug, Default)]
pub struct SimHeap {
    state: Mutex<HeapState>,
}

#[derive(Debug, Default)]
struct HeapState {
    next_handle: u32,
    allocations: HashMap<u32, SimAllocation>,
}

#[derive(Debug)]
struct SimAllocation {
    file: File,
    len: usize,
    shares: usize,
}

impl SimHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of a live allocation.
    pub fn allocation_len(&self, handle: HeapHandle) -> Option<usize> {
        self.state.lock().allocations.get(&handle.0).map(|a| a.len)
    }

    /// How many descriptors were exported for `handle`.
    pub fn share_count(&self, handle: HeapHandle) -> usize {
        self.state
            .lock()
            .allocations
            .get(&handle.0)
            .map_or(0, |a| a.shares)
    }

    pub fn live_allocations(&self) -> usize {
        self.state.lock().allocations.len()
    }
}

fn memfd(len: usize) -> io::Result<File> {
    let name = b"gou-sim-surface\0";
    let fd = unsafe { libc::memfd_create(name.as_ptr().cast(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // Safety: memfd_create returned a fresh descriptor.
    let file = unsafe { File::from_raw_fd(fd) };
    file.set_len(len as u64)?;
    Ok(file)
}

impl DmaHeap for SimHeap {
    fn allocate(&self, len: usize) -> Result<HeapHandle, HardwareFault> {
        let file = memfd(len).map_err(|e| HardwareFault::Sim(format!("memfd: {}", e)))?;

        let mut state = self.state.lock();
        state.next_handle += 1;
        let handle = state.next_handle;
        state.allocations.insert(
            handle,
            SimAllocation {
                file,
                len,
                shares: 0,
            },
        );
        Ok(HeapHandle(handle))
    }

    fn share(&self, handle: HeapHandle) -> Result<OwnedFd, HardwareFault> {
        let mut state = self.state.lock();
        let allocation = state
            .allocations
            .get_mut(&handle.0)
            .ok_or_else(|| HardwareFault::Sim(format!("share of unknown handle {}", handle.0)))?;

        let dup = allocation
            .file
            .try_clone()
            .map_err(|e| HardwareFault::Sim(format!("dup: {}", e)))?;
        allocation.shares += 1;
        Ok(OwnedFd::from(dup))
    }

    fn free(&self, handle: HeapHandle) -> Result<(), HardwareFault> {
        self.state
            .lock()
            .allocations
            .remove(&handle.0)
            .map(drop)
            .ok_or_else(|| HardwareFault::Sim(format!("double free of handle {}", handle.0)))
    }
}

/// One recorded accelerator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelOp {
    Configure(BlitConfig),
    Fill { rect: HwRect, rgba: u32 },
    StretchBlit { src: HwRect, dst: HwRect },
}

/// Accelerator that records commands instead of drawing.
#[derive(Debug, Default)]
pub struct SimAccelerator {
    ops: Mutex<Vec<AccelOp>>,
}

impl SimAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything submitted so far, oldest first.
    pub fn ops(&self) -> Vec<AccelOp> {
        self.ops.lock().clone()
    }

    /// Take the recorded commands, leaving the log empty.
    pub fn take_ops(&self) -> Vec<AccelOp> {
        std::mem::take(&mut *self.ops.lock())
    }
}

impl Accelerator for SimAccelerator {
    fn configure(&self, config: &BlitConfig) -> Result<(), HardwareFault> {
        self.ops.lock().push(AccelOp::Configure(*config));
        Ok(())
    }

    fn fill_rect(&self, rect: HwRect, rgba: u32) -> Result<(), HardwareFault> {
        self.ops.lock().push(AccelOp::Fill { rect, rgba });
        Ok(())
    }

    fn stretch_blit(&self, src: HwRect, dst: HwRect) -> Result<(), HardwareFault> {
        self.ops.lock().push(AccelOp::StretchBlit { src, dst });
        Ok(())
    }
}

/// Framebuffer that records flips.
///
/// Flips run freely by default. After [`hold`](Self::hold), each flip waits
/// for a permit from [`allow`](Self::allow), which lets tests stop the
/// presentation thread at a known point. A held scanout must be released
/// before the display using it is dropped.
#[derive(Debug)]
pub struct SimScanout {
    state: Mutex<ScanoutState>,
    changed: Condvar,
}

#[derive(Debug)]
struct ScanoutState {
    info: VarScreenInfo,
    flips: Vec<u32>,
    /// `None` runs freely, `Some(n)` allows `n` more flips.
    permits: Option<usize>,
}

impl SimScanout {
    /// A panel of `xres`x`yres` with `buffers` screens of virtual height.
    pub fn new(xres: u32, yres: u32, buffers: u32) -> Self {
        Self::with_info(VarScreenInfo::with_buffers(xres, yres, buffers))
    }

    pub fn with_info(info: VarScreenInfo) -> Self {
        Self {
            state: Mutex::new(ScanoutState {
                info,
                flips: Vec::new(),
                permits: None,
            }),
            changed: Condvar::new(),
        }
    }

    /// `yoffset` of every completed flip, oldest first.
    pub fn flips(&self) -> Vec<u32> {
        self.state.lock().flips.clone()
    }

    /// The `yoffset` most recently flipped to.
    pub fn on_screen(&self) -> Option<u32> {
        self.state.lock().flips.last().copied()
    }

    /// Block every later flip until permitted.
    pub fn hold(&self) {
        self.state.lock().permits = Some(0);
    }

    /// Permit `n` more flips while held.
    pub fn allow(&self, n: usize) {
        let mut state = self.state.lock();
        if let Some(permits) = state.permits.as_mut() {
            *permits += n;
        }
        self.changed.notify_all();
    }

    /// Drop the hold.
    pub fn run_free(&self) {
        self.state.lock().permits = None;
        self.changed.notify_all();
    }

    /// Wait until at least `count` flips have completed. Returns `false` on
    /// timeout.
    pub fn wait_for_flips(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.flips.len() < count {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.flips.len() >= count;
            }
        }
        true
    }
}

impl ScanoutDevice for SimScanout {
    fn var_screen_info(&self) -> Result<VarScreenInfo, HardwareFault> {
        Ok(self.state.lock().info)
    }

    fn flip(&self, info: &VarScreenInfo) -> Result<(), HardwareFault> {
        let mut state = self.state.lock();
        while state.permits == Some(0) {
            self.changed.wait(&mut state);
        }
        if let Some(permits) = state.permits.as_mut() {
            *permits -= 1;
        }

        state.info.yoffset = info.yoffset;
        state.flips.push(info.yoffset);
        self.changed.notify_all();
        Ok(())
    }
}

impl Devices {
    /// Devices for a display running entirely in-process.
    pub fn simulated(
        scanout: Arc<SimScanout>,
        accelerator: Arc<SimAccelerator>,
        heap: Arc<SimHeap>,
    ) -> Self {
        Self {
            scanout,
            accelerator,
            heap,
        }
    }
}
