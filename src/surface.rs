//! Surfaces: images in DMA memory.
//!
//! A [`Surface`] is one allocation from a [`DmaHeap`] together with the
//! geometry needed to address it. It can be handed to the GE2D accelerator
//! and to a GPU context through its dma-buf descriptor, and mapped for direct
//! CPU pixel writes. Descriptor and mapping are created on first use and
//! cached for the lifetime of the surface.
//!
//! Teardown order is unmap, close the descriptor, free the allocation. The
//! struct's field order encodes it.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::ptr::NonNull;
use std::sync::Arc;

use conquer_once::spin::OnceCell;
use parking_lot::Mutex;

use crate::display::Display;
use crate::error::{HardwareFault, OrFatal};
use crate::format::PixelFormat;
use crate::heap::{DmaHeap, HeapHandle};

/// Row pitch alignment required by GE2D and the GPU, in bytes.
pub const STRIDE_ALIGN: usize = 64;

/// Row pitch in bytes for `width` pixels of `format`.
#[inline]
pub const fn stride_for(width: u32, format: PixelFormat) -> usize {
    let row = width as usize * format.bytes_per_pixel();
    (row + STRIDE_ALIGN - 1) & !(STRIDE_ALIGN - 1)
}

/// One image in DMA-capable memory.
pub struct Surface {
    width: u32,
    height: u32,
    format: PixelFormat,
    stride: usize,
    size: usize,
    // Dropped first.
    mapping: Option<Mapping>,
    share_fd: OnceCell<OwnedFd>,
    export: Mutex<()>,
    // Dropped last.
    allocation: Allocation,
}

/// What an external rendering context needs to import a surface as a
/// zero-copy colour target (`EGL_LINUX_DMA_BUF_EXT`).
///
/// Borrows the surface, so an import cannot outlive the memory behind it.
#[derive(Debug, Clone, Copy)]
pub struct DmaBufPlane<'a> {
    pub fd: BorrowedFd<'a>,
    pub offset: u32,
    pub pitch: u32,
    pub width: u32,
    pub height: u32,
    pub fourcc: u32,
}

impl Surface {
    /// Allocate a surface from the display's heap.
    pub fn new(display: &Display, width: u32, height: u32, format: PixelFormat) -> Self {
        Self::with_heap(Arc::clone(display.heap()), width, height, format)
    }

    /// Allocate a surface from an explicit heap.
    pub fn with_heap(
        heap: Arc<dyn DmaHeap>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Self {
        Self::try_with_heap(heap, width, height, format).or_fatal()
    }

    pub(crate) fn try_with_heap(
        heap: Arc<dyn DmaHeap>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, HardwareFault> {
        let stride = stride_for(width, format);
        let size = stride * height as usize;

        let handle = heap.allocate(size)?;
        log::debug!(
            "surface: {}x{} {:?} stride={} size={} handle={}",
            width,
            height,
            format,
            stride,
            size,
            handle.0
        );

        Ok(Self {
            width,
            height,
            format,
            stride,
            size,
            mapping: None,
            share_fd: OnceCell::uninit(),
            export: Mutex::new(()),
            allocation: Allocation { heap, handle },
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Row pitch in bytes.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Allocation size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Row pitch in pixels, as GE2D wants it for plane widths.
    pub fn stride_pixels(&self) -> u32 {
        (self.stride / self.format.bytes_per_pixel()) as u32
    }

    /// The dma-buf descriptor for this allocation.
    ///
    /// Exported on the first call; later calls return the same descriptor.
    pub fn share_fd(&self) -> BorrowedFd<'_> {
        self.try_share_fd().or_fatal()
    }

    pub(crate) fn try_share_fd(&self) -> Result<BorrowedFd<'_>, HardwareFault> {
        if let Ok(fd) = self.share_fd.try_get() {
            return Ok(fd.as_fd());
        }

        // Concurrent first callers queue here; only the first one exports.
        let _export = self.export.lock();
        if self.share_fd.try_get().is_err() {
            let fd = self.allocation.heap.share(self.allocation.handle)?;
            log::trace!(
                "surface: handle {} shared as fd {}",
                self.allocation.handle.0,
                fd.as_raw_fd()
            );
            let _ = self.share_fd.try_init_once(move || fd);
        }

        self.share_fd
            .get()
            .map(|fd| fd.as_fd())
            .ok_or(HardwareFault::Unshared(self.allocation.handle.0))
    }

    /// Import attributes for a GPU context.
    pub fn dmabuf_plane(&self) -> DmaBufPlane<'_> {
        DmaBufPlane {
            fd: self.share_fd(),
            offset: 0,
            pitch: self.stride as u32,
            width: self.width,
            height: self.height,
            fourcc: self.format.fourcc(),
        }
    }

    /// Map the surface for CPU access.
    ///
    /// The mapping is created on the first call and reused until
    /// [`unmap`](Self::unmap).
    pub fn map(&mut self) -> &mut [u8] {
        self.try_map().or_fatal()
    }

    pub(crate) fn try_map(&mut self) -> Result<&mut [u8], HardwareFault> {
        let mapping = match self.mapping.take() {
            Some(mapping) => mapping,
            None => Mapping::new(self.try_share_fd()?, self.size)?,
        };
        Ok(self.mapping.insert(mapping).as_mut_slice())
    }

    /// Drop the CPU mapping, if any.
    pub fn unmap(&mut self) {
        self.mapping = None;
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    /// Release the surface: mapping, descriptor, then allocation.
    pub fn destroy(self) {
        log::debug!("surface: destroying handle {}", self.allocation.handle.0);
        drop(self);
    }

    #[cfg(test)]
    pub(crate) fn heap_handle(&self) -> HeapHandle {
        self.allocation.handle
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("stride", &self.stride)
            .field("size", &self.size)
            .field("handle", &self.allocation.handle)
            .field("mapped", &self.mapping.is_some())
            .finish()
    }
}

struct Allocation {
    heap: Arc<dyn DmaHeap>,
    handle: HeapHandle,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if let Err(fault) = self.heap.free(self.handle) {
            crate::error::fatal(fault);
        }
    }
}

/// A shared read/write mapping of a dma-buf.
struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

// Safety: the mapping is plain shared memory; `Surface` only hands out
// slices through `&mut self`.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    fn new(fd: BorrowedFd<'_>, len: usize) -> Result<Self, HardwareFault> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(HardwareFault::Map {
                len,
                source: io::Error::last_os_error(),
            });
        }

        NonNull::new(ptr.cast::<u8>())
            .map(|ptr| Self { ptr, len })
            .ok_or(HardwareFault::Map {
                len,
                source: io::Error::from(io::ErrorKind::InvalidData),
            })
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safety: `ptr` is a live mapping of exactly `len` bytes.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimHeap;

    #[test]
    fn test_stride_rounds_up_to_alignment() {
        assert_eq!(stride_for(1, PixelFormat::Rgb565), 64);
        assert_eq!(stride_for(32, PixelFormat::Rgb565), 64);
        assert_eq!(stride_for(33, PixelFormat::Rgb565), 128);
        assert_eq!(stride_for(640, PixelFormat::Xrgb8888), 2560);
        assert_eq!(stride_for(854, PixelFormat::Rgb888), 2624);
        assert_eq!(stride_for(0, PixelFormat::Argb8888), 0);
    }

    #[test]
    fn test_stride_and_size_formula_for_every_format() {
        let heap = Arc::new(SimHeap::new());
        for format in PixelFormat::ALL {
            for (width, height) in [(1, 1), (7, 3), (320, 240), (854, 480)] {
                let bpp = format.bits_per_pixel() as usize;
                let expected = ((width * bpp / 8) + 63) / 64 * 64;
                let surface =
                    Surface::try_with_heap(heap.clone(), width as u32, height, format).unwrap();
                assert_eq!(surface.stride(), expected, "{:?} width {}", format, width);
                assert_eq!(surface.size(), expected * height as usize);
                assert!(surface.stride() >= width * format.bytes_per_pixel());
                assert_eq!(heap.allocation_len(surface.heap_handle()), Some(surface.size()));
            }
        }
    }

    #[test]
    fn test_share_fd_is_exported_once() {
        let heap = Arc::new(SimHeap::new());
        let surface = Surface::try_with_heap(heap.clone(), 16, 16, PixelFormat::Rgb565).unwrap();

        let first = surface.share_fd().as_raw_fd();
        let second = surface.share_fd().as_raw_fd();
        assert_eq!(first, second);
        assert_eq!(heap.share_count(surface.heap_handle()), 1);
    }

    #[test]
    fn test_concurrent_share_fd_exports_once() {
        use std::sync::Barrier;
        use std::thread;

        let heap = Arc::new(SimHeap::new());
        let surface = Surface::try_with_heap(heap.clone(), 64, 64, PixelFormat::Argb8888).unwrap();
        let barrier = Barrier::new(8);

        let fds: Vec<_> = thread::scope(|s| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        surface.share_fd().as_raw_fd()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert!(fds.iter().all(|fd| *fd == fds[0]));
        assert_eq!(heap.share_count(surface.heap_handle()), 1);
    }

    #[test]
    fn test_map_is_cached_and_writable() {
        let heap = Arc::new(SimHeap::new());
        let mut surface = Surface::try_with_heap(heap, 8, 2, PixelFormat::Xrgb8888).unwrap();

        let ptr = {
            let pixels = surface.map();
            assert_eq!(pixels.len(), 128);
            pixels[0] = 0xaa;
            pixels.as_ptr()
        };
        let again = surface.map();
        assert_eq!(again.as_ptr(), ptr);
        assert_eq!(again[0], 0xaa);
    }

    #[test]
    fn test_unmap_is_idempotent_and_remap_sees_same_memory() {
        let heap = Arc::new(SimHeap::new());
        let mut surface = Surface::try_with_heap(heap, 4, 4, PixelFormat::Rgb565).unwrap();

        surface.map()[5] = 0x5a;
        surface.unmap();
        surface.unmap();
        assert!(!surface.is_mapped());

        assert_eq!(surface.map()[5], 0x5a);
    }

    #[test]
    fn test_destroy_frees_allocation() {
        let heap = Arc::new(SimHeap::new());
        let mut surface = Surface::try_with_heap(heap.clone(), 4, 4, PixelFormat::Rgb565).unwrap();
        let handle = surface.heap_handle();
        surface.map();

        assert_eq!(heap.live_allocations(), 1);
        surface.destroy();
        assert_eq!(heap.live_allocations(), 0);
        assert_eq!(heap.allocation_len(handle), None);
    }

    #[test]
    fn test_dmabuf_plane_describes_surface() {
        let heap = Arc::new(SimHeap::new());
        let surface = Surface::try_with_heap(heap, 100, 50, PixelFormat::Abgr8888).unwrap();
        let plane = surface.dmabuf_plane();

        assert_eq!(plane.pitch, 448);
        assert_eq!(plane.width, 100);
        assert_eq!(plane.height, 50);
        assert_eq!(plane.offset, 0);
        assert_eq!(plane.fourcc, PixelFormat::Abgr8888.fourcc());
        assert_eq!(plane.fd.as_raw_fd(), surface.share_fd().as_raw_fd());
    }
}
