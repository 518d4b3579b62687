use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::{IntervalHandle, Scheduler};

struct Entry {
    id: u64,
    period: u64,
    next_due: u64,
    tick: Option<Box<dyn FnMut()>>,
}

#[derive(Default)]
struct ManualInner {
    now: u64,
    next_id: u64,
    entries: Vec<Entry>,
}

/// Virtual-time scheduler. Nothing fires until [`ManualScheduler::advance`]
/// moves the clock, which makes interval behavior reproducible in tests and
/// simulations.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    inner: Rc<RefCell<ManualInner>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ManualScheduler")
            .field("now", &inner.now)
            .field("intervals", &inner.entries.len())
            .finish()
    }
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual milliseconds elapsed.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.inner.borrow().now
    }

    #[must_use]
    pub fn active_intervals(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Move virtual time forward, firing every tick that falls due in order
    /// (ties go to the interval registered first).
    pub fn advance(&self, ms: u64) {
        let target = self.inner.borrow().now.saturating_add(ms);
        loop {
            let due = {
                let mut inner = self.inner.borrow_mut();
                let next = inner
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.next_due <= target && e.tick.is_some())
                    .min_by_key(|(_, e)| (e.next_due, e.id))
                    .map(|(idx, _)| idx);
                next.map(|idx| {
                    let entry = &mut inner.entries[idx];
                    let id = entry.id;
                    let when = entry.next_due;
                    entry.next_due = entry.next_due.saturating_add(entry.period);
                    let tick = entry.tick.take();
                    inner.now = when;
                    (id, tick)
                })
            };
            let Some((id, Some(mut tick))) = due else {
                break;
            };
            // The borrow is released so the tick may cancel or schedule.
            tick();
            let mut inner = self.inner.borrow_mut();
            if let Some(entry) = inner.entries.iter_mut().find(|e| e.id == id) {
                entry.tick = Some(tick);
            }
        }
        self.inner.borrow_mut().now = target;
    }
}

impl Scheduler for ManualScheduler {
    type Handle = ManualInterval;

    fn every(&self, period_ms: u32, tick: Box<dyn FnMut()>) -> Self::Handle {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        let period = u64::from(period_ms.max(1));
        let next_due = inner.now + period;
        inner.entries.push(Entry {
            id,
            period,
            next_due,
            tick: Some(tick),
        });
        ManualInterval {
            id,
            scheduler: Rc::downgrade(&self.inner),
        }
    }
}

/// Handle to one [`ManualScheduler`] interval.
#[derive(Debug)]
pub struct ManualInterval {
    id: u64,
    scheduler: Weak<RefCell<ManualInner>>,
}

impl IntervalHandle for ManualInterval {
    fn cancel(&mut self) {
        if let Some(inner) = self.scheduler.upgrade() {
            inner.borrow_mut().entries.retain(|e| e.id != self.id);
        }
    }
}
