//! Synchronizer: client-local polling that lets independent clients converge
//! on the shared completion pool and the puzzle solved flag.
//!
//! Two feeds tick on their own periods. A tick is one synchronous read plus a
//! local view update; nothing is ever in flight across ticks. The owning view
//! holds a [`SyncSubscription`] and no tick runs once it is cancelled or
//! dropped.

use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::aggregation::{AggregationStore, PoolSnapshot};
use crate::config::CourseConfig;
use crate::persist::{KeyValueStore, WarningSink};
use crate::puzzle::{PuzzleBoard, PuzzleSolvedFlag};

mod manual;

pub use manual::{ManualInterval, ManualScheduler};

/// A cancelable repeating timer created by a [`Scheduler`].
pub trait IntervalHandle {
    /// Stop the timer. Calling it twice is a no-op.
    fn cancel(&mut self);
}

/// Platform timer source (`setInterval`, a virtual clock, ...).
pub trait Scheduler {
    type Handle: IntervalHandle;

    /// Run `tick` every `period_ms` until the returned handle is cancelled.
    fn every(&self, period_ms: u32, tick: Box<dyn FnMut()>) -> Self::Handle;
}

/// What a client currently knows about class-wide state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncView {
    pub pool: PoolSnapshot,
    pub solved: Option<PuzzleSolvedFlag>,
    pub pool_ticks: u64,
    pub solved_ticks: u64,
}

impl SyncView {
    #[must_use]
    pub fn is_solved(&self) -> bool {
        self.solved.as_ref().is_some_and(|flag| flag.solved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub pool_poll_ms: u32,
    pub solved_poll_ms: u32,
}

impl From<&CourseConfig> for SyncConfig {
    fn from(cfg: &CourseConfig) -> Self {
        Self {
            pool_poll_ms: cfg.pool_poll_ms,
            solved_poll_ms: cfg.solved_poll_ms,
        }
    }
}

/// Reads shared state into a [`SyncView`].
#[derive(Debug, Clone)]
pub struct Synchronizer<S> {
    pool: AggregationStore<S>,
    board: PuzzleBoard<S>,
    config: SyncConfig,
}

type Listener = Rc<RefCell<Box<dyn FnMut(&SyncView)>>>;

impl<S: KeyValueStore + Clone + 'static> Synchronizer<S> {
    pub fn new(store: S, config: SyncConfig) -> Self {
        Self {
            pool: AggregationStore::new(store.clone()),
            board: PuzzleBoard::new(store, WarningSink::default()),
            config,
        }
    }

    /// One pool read. Returns `true` if the view changed.
    pub fn poll_pool(&self, view: &mut SyncView) -> bool {
        let pool = self.pool.current_pool();
        view.pool_ticks += 1;
        if view.pool == pool {
            return false;
        }
        log::debug!("pool now holds {} symbols", pool.symbols.len());
        view.pool = pool;
        true
    }

    /// One solved-flag read. Returns `true` if the view changed.
    pub fn poll_solved(&self, view: &mut SyncView) -> bool {
        let solved = self.board.flag();
        view.solved_ticks += 1;
        if view.solved == solved {
            return false;
        }
        log::debug!("puzzle solved flag changed: {solved:?}");
        view.solved = solved;
        true
    }

    /// Prime a view with one read of each feed and start both tickers.
    pub fn start<Sch: Scheduler>(self, scheduler: &Sch) -> SyncSubscription<Sch::Handle> {
        self.start_with_listener(scheduler, |_| {})
    }

    /// Like [`Synchronizer::start`], calling `on_change` after any tick that
    /// changed the view.
    pub fn start_with_listener<Sch, F>(self, scheduler: &Sch, on_change: F) -> SyncSubscription<Sch::Handle>
    where
        Sch: Scheduler,
        F: FnMut(&SyncView) + 'static,
    {
        let initial = SyncView {
            pool: self.pool.current_pool(),
            solved: self.board.flag(),
            ..SyncView::default()
        };

        let view = Rc::new(RefCell::new(initial));
        let active = Rc::new(Cell::new(true));
        let on_change: Box<dyn FnMut(&SyncView)> = Box::new(on_change);
        let listener: Listener = Rc::new(RefCell::new(on_change));
        let config = self.config;
        let sync = Rc::new(self);

        let pool_tick = Self::tick(&sync, &view, &active, &listener, Self::poll_pool);
        let solved_tick = Self::tick(&sync, &view, &active, &listener, Self::poll_solved);
        let handles = vec![
            scheduler.every(config.pool_poll_ms, pool_tick),
            scheduler.every(config.solved_poll_ms, solved_tick),
        ];
        SyncSubscription {
            view,
            active,
            handles,
        }
    }

    fn tick(
        sync: &Rc<Self>,
        view: &Rc<RefCell<SyncView>>,
        active: &Rc<Cell<bool>>,
        listener: &Listener,
        poll: fn(&Self, &mut SyncView) -> bool,
    ) -> Box<dyn FnMut()> {
        let sync = Rc::clone(sync);
        let view = Rc::clone(view);
        let active = Rc::clone(active);
        let listener = Rc::clone(listener);
        Box::new(move || {
            if !active.get() {
                return;
            }
            // A tick that fires while another is still applying its update is
            // dropped rather than stacked.
            let Ok(mut current) = view.try_borrow_mut() else {
                log::debug!("sync tick skipped: previous update still applying");
                return;
            };
            let changed = poll(&sync, &mut current);
            let snapshot = changed.then(|| current.clone());
            drop(current);
            if let Some(snapshot) = snapshot
                && let Ok(mut notify) = listener.try_borrow_mut()
            {
                notify(&snapshot);
            }
        })
    }
}

/// Live polling owned by one view. Cancelling (or dropping) it stops both
/// feeds for good.
pub struct SyncSubscription<H: IntervalHandle> {
    view: Rc<RefCell<SyncView>>,
    active: Rc<Cell<bool>>,
    handles: Vec<H>,
}

impl<H: IntervalHandle> SyncSubscription<H> {
    /// Latest view.
    #[must_use]
    pub fn view(&self) -> SyncView {
        self.view.borrow().clone()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn cancel(&mut self) {
        if !self.active.replace(false) {
            return;
        }
        for handle in &mut self.handles {
            handle.cancel();
        }
        self.handles.clear();
        log::debug!("sync subscription cancelled");
    }
}

impl<H: IntervalHandle> Drop for SyncSubscription<H> {
    fn drop(&mut self) {
        self.cancel();
    }
}
