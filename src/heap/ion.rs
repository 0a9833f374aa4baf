//! ION allocator (`/dev/ion`, legacy 4.9 ABI).

use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;
use std::sync::Arc;

use super::{DmaHeap, HeapHandle};
use crate::device::SharedDevice;
use crate::error::HardwareFault;

/// `enum ion_heap_type`
const ION_HEAP_TYPE_DMA: u32 = 4;

#[repr(C)]
#[derive(Debug, Default)]
struct IonAllocationData {
    len: libc::size_t,
    align: libc::size_t,
    heap_id_mask: libc::c_uint,
    flags: libc::c_uint,
    handle: u32,
}

#[repr(C)]
#[derive(Debug, Default)]
struct IonFdData {
    handle: u32,
    fd: libc::c_int,
}

#[repr(C)]
#[derive(Debug, Default)]
struct IonHandleData {
    handle: u32,
}

nix::ioctl_readwrite!(ion_ioc_alloc, b'I', 0, IonAllocationData);
nix::ioctl_readwrite!(ion_ioc_free, b'I', 1, IonHandleData);
nix::ioctl_readwrite!(ion_ioc_share, b'I', 4, IonFdData);

static ION: SharedDevice<IonHeap> = SharedDevice::new("ion");

/// The kernel ION allocator, restricted to the DMA heap.
#[derive(Debug)]
pub struct IonHeap {
    file: File,
    heap_mask: u32,
}

impl IonHeap {
    /// Open the allocator device.
    pub fn open(path: &Path) -> Result<Self, HardwareFault> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| HardwareFault::open(path, e))?;

        Ok(Self {
            file,
            heap_mask: 1 << ION_HEAP_TYPE_DMA,
        })
    }

    /// Process-wide handle, opened on first use.
    pub fn shared(path: &Path) -> Result<Arc<Self>, HardwareFault> {
        ION.get_or_open(|| Self::open(path))
    }
}

impl DmaHeap for IonHeap {
    fn allocate(&self, len: usize) -> Result<HeapHandle, HardwareFault> {
        let mut data = IonAllocationData {
            len,
            heap_id_mask: self.heap_mask,
            ..Default::default()
        };

        unsafe { ion_ioc_alloc(self.file.as_raw_fd(), &mut data) }
            .map_err(|e| HardwareFault::ioctl("ION_IOC_ALLOC", e))?;

        Ok(HeapHandle(data.handle))
    }

    fn share(&self, handle: HeapHandle) -> Result<OwnedFd, HardwareFault> {
        let mut data = IonFdData {
            handle: handle.0,
            fd: -1,
        };

        unsafe { ion_ioc_share(self.file.as_raw_fd(), &mut data) }
            .map_err(|e| HardwareFault::ioctl("ION_IOC_SHARE", e))?;

        // Safety: ION_IOC_SHARE returned a fresh dma-buf descriptor that
        // nothing else owns.
        Ok(unsafe { OwnedFd::from_raw_fd(data.fd) })
    }

    fn free(&self, handle: HeapHandle) -> Result<(), HardwareFault> {
        let mut data = IonHandleData { handle: handle.0 };

        unsafe { ion_ioc_free(self.file.as_raw_fd(), &mut data) }
            .map_err(|e| HardwareFault::ioctl("ION_IOC_FREE", e))?;

        Ok(())
    }
}
