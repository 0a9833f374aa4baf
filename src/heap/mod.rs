//! DMA-capable memory heaps.
//!
//! A heap hands out physically contiguous allocations that the display
//! controller, the GE2D accelerator and the GPU can all address. The only
//! production heap is the ION allocator ([`IonHeap`]); `sim::SimHeap` (feature
//! `sim`) stands in for it off-device.

mod ion;

pub use ion::IonHeap;

use std::os::fd::OwnedFd;

use crate::error::HardwareFault;

/// Heap-local identifier of one allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapHandle(pub u32);

/// Allocator backing [`crate::Surface`] memory.
pub trait DmaHeap: Send + Sync {
    /// Allocate `len` bytes.
    fn allocate(&self, len: usize) -> Result<HeapHandle, HardwareFault>;

    /// Export an allocation as a dma-buf descriptor. Each call produces a new
    /// descriptor; callers cache it.
    fn share(&self, handle: HeapHandle) -> Result<OwnedFd, HardwareFault>;

    /// Release an allocation. Descriptors and mappings of it must already be
    /// gone.
    fn free(&self, handle: HeapHandle) -> Result<(), HardwareFault>;
}
