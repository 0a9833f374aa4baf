//! Scan-out slot pool.
//!
//! A bounded queue between producers and the presentation thread. Two
//! counting semaphores carry the blocking (`free_count` for producers,
//! `used_count` for the presenter) and one mutex guards the slot queues.
//! Every semaphore unit corresponds to exactly one queued slot; finding a
//! queue empty after taking a unit means the two have diverged.
//!
//! The pool also remembers which slots are being drawn, which one is being
//! flipped and which one is on screen, so [`SlotSnapshot`] always accounts
//! for every slot.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::error::HardwareFault;

/// A scan-out slot, named by the first line of its screen in the virtual
/// framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot(u32);

impl Slot {
    pub fn y_offset(self) -> u32 {
        self.0
    }
}

/// Counting semaphore.
pub(crate) struct Semaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            available: Condvar::new(),
        }
    }

    pub(crate) fn acquire(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.available.wait(&mut count);
        }
        *count -= 1;
    }

    #[cfg(test)]
    pub(crate) fn try_acquire(&self) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    pub(crate) fn release(&self) {
        *self.count.lock() += 1;
        self.available.notify_one();
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        *self.count.lock()
    }
}

#[derive(Debug, Default)]
struct Queues {
    free: VecDeque<Slot>,
    drawing: Vec<Slot>,
    queued: VecDeque<Slot>,
    flipping: Option<Slot>,
    on_screen: Option<Slot>,
    closed: bool,
}

/// Where every slot is at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotSnapshot {
    /// Ready for a producer, oldest first.
    pub free: Vec<u32>,
    /// Held by producers.
    pub drawing: Vec<u32>,
    /// Waiting for the presentation thread, in presentation order.
    pub queued: Vec<u32>,
    /// Being committed to the panel.
    pub flipping: Option<u32>,
    /// Most recently made visible.
    pub on_screen: Option<u32>,
}

impl SlotSnapshot {
    /// Slots a producer holds or the presentation thread has not retired.
    pub fn in_flight(&self) -> usize {
        self.drawing.len() + self.queued.len() + self.flipping.iter().count()
    }

    /// Every slot, in no particular order.
    pub fn all(&self) -> Vec<u32> {
        let mut all = Vec::with_capacity(self.free.len() + self.in_flight() + 1);
        all.extend(&self.free);
        all.extend(&self.drawing);
        all.extend(&self.queued);
        all.extend(self.flipping);
        all.extend(self.on_screen);
        all
    }
}

pub(crate) struct SlotPool {
    free_count: Semaphore,
    used_count: Semaphore,
    queues: Mutex<Queues>,
    total: usize,
}

impl SlotPool {
    /// `count` slots, each `yres` lines tall, all free.
    pub(crate) fn new(count: u32, yres: u32) -> Self {
        let free = (0..count).map(|i| Slot(i * yres)).collect();
        Self {
            free_count: Semaphore::new(count as usize),
            used_count: Semaphore::new(0),
            queues: Mutex::new(Queues {
                free,
                ..Default::default()
            }),
            total: count as usize,
        }
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    /// Take a free slot for drawing, blocking while none is free.
    pub(crate) fn acquire_free(&self) -> Result<Slot, HardwareFault> {
        self.free_count.acquire();

        let mut queues = self.queues.lock();
        let slot = queues
            .free
            .pop_front()
            .ok_or(HardwareFault::SlotDesync { queue: "free" })?;
        queues.drawing.push(slot);
        Ok(slot)
    }

    /// Queue a drawn slot for presentation.
    pub(crate) fn submit(&self, slot: Slot) {
        {
            let mut queues = self.queues.lock();
            queues.drawing.retain(|s| *s != slot);
            queues.queued.push_back(slot);
        }
        self.used_count.release();
    }

    /// The oldest queued slot, blocking while none is queued. `None` once
    /// the pool is closed.
    pub(crate) fn next_queued(&self) -> Result<Option<Slot>, HardwareFault> {
        self.used_count.acquire();

        let mut queues = self.queues.lock();
        if queues.closed {
            return Ok(None);
        }
        let slot = queues
            .queued
            .pop_front()
            .ok_or(HardwareFault::SlotDesync { queue: "queued" })?;
        queues.flipping = Some(slot);
        Ok(Some(slot))
    }

    /// Record `slot` as on screen and free the slot it replaced.
    ///
    /// The replaced slot is only reusable now that the panel scans out of
    /// `slot` instead. Returns it.
    pub(crate) fn retire(&self, slot: Slot) -> Option<Slot> {
        let previous = {
            let mut queues = self.queues.lock();
            queues.flipping = None;
            let previous = queues.on_screen.replace(slot);
            if let Some(previous) = previous {
                queues.free.push_back(previous);
            }
            previous
        };
        if previous.is_some() {
            self.free_count.release();
        }
        previous
    }

    /// Wake the presentation thread and make it stop.
    pub(crate) fn close(&self) {
        self.queues.lock().closed = true;
        self.used_count.release();
    }

    pub(crate) fn snapshot(&self) -> SlotSnapshot {
        let queues = self.queues.lock();
        SlotSnapshot {
            free: queues.free.iter().map(|s| s.0).collect(),
            drawing: queues.drawing.iter().map(|s| s.0).collect(),
            queued: queues.queued.iter().map(|s| s.0).collect(),
            flipping: queues.flipping.map(|s| s.0),
            on_screen: queues.on_screen.map(|s| s.0),
        }
    }

    #[cfg(test)]
    fn counts(&self) -> (usize, usize) {
        (self.free_count.available(), self.used_count.available())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn sorted(mut v: Vec<u32>) -> Vec<u32> {
        v.sort_unstable();
        v
    }

    #[test]
    fn test_new_pool_is_all_free() {
        let pool = SlotPool::new(3, 854);
        let snap = pool.snapshot();
        assert_eq!(snap.free, vec![0, 854, 1708]);
        assert_eq!(snap.in_flight(), 0);
        assert_eq!(snap.on_screen, None);
        assert_eq!(pool.counts(), (3, 0));
    }

    #[test]
    fn test_slot_lifecycle_keeps_partition() {
        let pool = SlotPool::new(3, 100);
        let every = vec![0, 100, 200];

        let a = pool.acquire_free().unwrap();
        let b = pool.acquire_free().unwrap();
        assert_eq!((a.y_offset(), b.y_offset()), (0, 100));
        assert_eq!(sorted(pool.snapshot().all()), every);

        pool.submit(a);
        let snap = pool.snapshot();
        assert_eq!(snap.queued, vec![0]);
        assert_eq!(snap.drawing, vec![100]);
        assert_eq!(pool.counts(), (1, 1));

        let next = pool.next_queued().unwrap().unwrap();
        assert_eq!(next, a);
        assert_eq!(pool.snapshot().flipping, Some(0));
        assert_eq!(sorted(pool.snapshot().all()), every);

        // First frame: nothing to reclaim yet.
        assert_eq!(pool.retire(next), None);
        assert_eq!(pool.snapshot().on_screen, Some(0));
        assert_eq!(pool.counts(), (1, 0));

        pool.submit(b);
        let next = pool.next_queued().unwrap().unwrap();
        assert_eq!(pool.retire(next), Some(a));

        let snap = pool.snapshot();
        assert_eq!(snap.on_screen, Some(100));
        assert_eq!(snap.free, vec![200, 0]);
        assert_eq!(sorted(snap.all()), every);
        assert_eq!(pool.counts(), (2, 0));
    }

    #[test]
    fn test_queued_slots_come_out_in_submission_order() {
        let pool = SlotPool::new(4, 10);
        let slots: Vec<Slot> = (0..4).map(|_| pool.acquire_free().unwrap()).collect();
        for slot in slots.iter().rev() {
            pool.submit(*slot);
        }
        for expected in slots.iter().rev() {
            assert_eq!(pool.next_queued().unwrap(), Some(*expected));
        }
    }

    #[test]
    fn test_close_wakes_waiting_presenter() {
        let pool = Arc::new(SlotPool::new(2, 10));
        let presenter = {
            let pool = pool.clone();
            thread::spawn(move || pool.next_queued())
        };

        thread::sleep(Duration::from_millis(20));
        pool.close();
        assert_eq!(presenter.join().unwrap().unwrap(), None);
    }

    #[test]
    fn test_acquire_blocks_until_retire() {
        let pool = Arc::new(SlotPool::new(2, 10));
        let a = pool.acquire_free().unwrap();
        let b = pool.acquire_free().unwrap();
        pool.submit(a);
        pool.submit(b);

        let producer = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire_free().unwrap())
        };

        let first = pool.next_queued().unwrap().unwrap();
        pool.retire(first);
        thread::sleep(Duration::from_millis(20));
        assert!(!producer.is_finished());

        let second = pool.next_queued().unwrap().unwrap();
        pool.retire(second);
        assert_eq!(producer.join().unwrap(), a);
    }

    #[test]
    fn test_counter_without_slot_is_desync() {
        let pool = SlotPool::new(1, 10);
        pool.used_count.release();
        assert!(matches!(
            pool.next_queued(),
            Err(HardwareFault::SlotDesync { queue: "queued" })
        ));
    }

    #[test]
    fn test_semaphore_counts() {
        let sem = Semaphore::new(1);
        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
        sem.release();
        sem.release();
        assert_eq!(sem.available(), 2);
        sem.acquire();
        assert_eq!(sem.available(), 1);
    }
}
