//! Process-wide device handles.
//!
//! `/dev/ion` and `/dev/ge2d` are opened on first use and shared by every
//! display in the process. The registry only keeps a weak reference, so the
//! descriptor closes when the last display (and the last surface) holding it
//! is dropped, and the next user opens it again.

use std::sync::{Arc, Weak};

use parking_lot::{const_mutex, Mutex};

use crate::error::HardwareFault;

pub(crate) struct SharedDevice<T> {
    name: &'static str,
    slot: Mutex<Weak<T>>,
}

impl<T> SharedDevice<T> {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: const_mutex(Weak::new()),
        }
    }

    /// Return the live handle, or open a new one with `open`.
    ///
    /// The lock is held across `open`, which may block in the kernel, so
    /// concurrent first users sleep rather than spin and only one opens.
    pub(crate) fn get_or_open<F>(&self, open: F) -> Result<Arc<T>, HardwareFault>
    where
        F: FnOnce() -> Result<T, HardwareFault>,
    {
        let mut slot = self.slot.lock();
        if let Some(device) = slot.upgrade() {
            return Ok(device);
        }

        let device = Arc::new(open()?);
        *slot = Arc::downgrade(&device);
        log::debug!("{}: opened process-wide handle", self.name);
        Ok(device)
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        self.slot.lock().strong_count() > 0
    }
}
