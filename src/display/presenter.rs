//! The presentation thread.
//!
//! Takes queued slots in submission order, commits each one to the panel,
//! and only then frees the slot it replaced. A slot is never drawn into while
//! the panel may still be scanning it out.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::slots::SlotPool;
use crate::error::{fatal, HardwareFault};
use crate::fbdev::ScanoutDevice;

pub(super) const THREAD_NAME: &str = "gou-present";

pub(super) fn spawn(
    slots: Arc<SlotPool>,
    scanout: Arc<dyn ScanoutDevice>,
) -> Result<JoinHandle<()>, HardwareFault> {
    thread::Builder::new()
        .name(THREAD_NAME.into())
        .spawn(move || {
            if let Err(fault) = run(&slots, scanout.as_ref()) {
                fatal(fault);
            }
        })
        .map_err(HardwareFault::Spawn)
}

fn run(slots: &SlotPool, scanout: &dyn ScanoutDevice) -> Result<(), HardwareFault> {
    let mut info = scanout.var_screen_info()?;
    log::debug!(
        "{}: started, {} buffers",
        THREAD_NAME,
        info.buffer_count()
    );

    let mut frames: u64 = 0;
    while let Some(slot) = slots.next_queued()? {
        info.yoffset = slot.y_offset();
        scanout.flip(&info)?;

        let freed = slots.retire(slot);
        frames += 1;
        log::trace!(
            "{}: frame {} yoffset={} freed={:?}",
            THREAD_NAME,
            frames,
            slot.y_offset(),
            freed.map(|s| s.y_offset())
        );
    }

    log::debug!("{}: stopping after {} frames", THREAD_NAME, frames);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimScanout;
    use std::time::Duration;

    #[test]
    fn test_presents_in_order_and_stops_on_close() {
        let slots = Arc::new(SlotPool::new(3, 854));
        let scanout = Arc::new(SimScanout::new(480, 854, 3));
        let handle = spawn(slots.clone(), scanout.clone()).unwrap();
        assert_eq!(handle.thread().name(), Some(THREAD_NAME));

        let a = slots.acquire_free().unwrap();
        let b = slots.acquire_free().unwrap();
        slots.submit(b);
        slots.submit(a);
        assert!(scanout.wait_for_flips(2, Duration::from_secs(5)));

        slots.close();
        handle.join().unwrap();

        assert_eq!(scanout.flips(), vec![854, 0]);
        let snap = slots.snapshot();
        assert_eq!(snap.on_screen, Some(0));
        assert_eq!(snap.free, vec![1708, 854]);
    }
}
