//! The global scheduler
//!
//! One scheduler instance coordinates change propagation across an arbitrary
//! graph of observables: it keeps the FIFO queue of pending per-object flushes,
//! coalesces tick requests, deduplicates cross-object handler invocation within
//! a tick, and owns the armed debounce timers.
//!
//! The scheduler is an explicit dependency: observables hold the instance they
//! were constructed with. A thread-local default is provided so that
//! callers who don't care can simply use [`Observable::new`]. Cloning a
//! `Scheduler` clones a handle to the same instance.
//!
//! # Ticks
//!
//! A tick begins when the first trigger of a synchronous burst calls
//! `request_tick` and ends when [`Scheduler::run_tick`] fully drains the queue.
//! The host platform supplies the deferral: install a wake hook with
//! [`Scheduler::set_wake_hook`] (invoked once per coalesced tick request) and
//! call `run_tick` after the current burst of work completes. Flushes enqueued
//! *during* the drain (handler bodies mutating other observables) are
//! appended to the same queue and processed in the same tick; this is what
//! lets a two-hop cascade settle in one tick while a direct cycle merely
//! re-enqueues instead of recursing.
//!
//! [`Observable::new`]: crate::Observable::new

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::time::Instant;

use tracing::{trace, warn};

use crate::change::ObservableId;
use crate::debounce::DebounceTimer;
use crate::observable::Observable;

/// Per-tick dedup key: effective-callback identity plus handler context.
pub(crate) type MarkKey = (usize, ObservableId);

#[derive(Default)]
struct SchedulerState {
	queue: VecDeque<Observable>,
	tick_requested: bool,
	draining: bool,
	marks: HashSet<MarkKey>,
	timers: Vec<Rc<RefCell<DebounceTimer>>>,
}

#[derive(Default)]
struct Shared {
	state: RefCell<SchedulerState>,
	wake: RefCell<Option<Box<dyn Fn()>>>,
}

/// Handle to a scheduler instance. Clones share the same queue and tick state.
#[derive(Clone, Default)]
pub struct Scheduler {
	shared: Rc<Shared>,
}

thread_local! {
	static THREAD_DEFAULT: Scheduler = Scheduler::new();
}

impl Scheduler {
	/// A fresh, idle scheduler.
	pub fn new() -> Self {
		Self::default()
	}

	/// The shared per-thread default instance.
	pub fn thread_default() -> Self {
		THREAD_DEFAULT.with(Self::clone)
	}

	/// Whether two handles refer to the same scheduler instance.
	pub fn same_instance(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.shared, &other.shared)
	}

	/// Install the host's deferred-callback hook.
	///
	/// The hook is invoked exactly once per coalesced tick request; the host
	/// should arrange for [`Scheduler::run_tick`] to run after the current
	/// synchronous burst of work completes.
	pub fn set_wake_hook(&self, hook: impl Fn() + 'static) {
		*self.shared.wake.borrow_mut() = Some(Box::new(hook));
	}

	/// Queue a flush for `observable`. Idempotence per observable per tick is
	/// guaranteed by the observable's own scheduled flag, not re-checked here.
	pub(crate) fn enqueue_flush(&self, observable: Observable) {
		self.shared.state.borrow_mut().queue.push_back(observable);
	}

	/// Ask for a tick. Coalesced: while one is already pending (or the queue is
	/// currently draining) this is a no-op.
	pub(crate) fn request_tick(&self) {
		let should_wake = {
			let mut state = self.shared.state.borrow_mut();
			if state.tick_requested {
				false
			} else {
				state.tick_requested = true;
				!state.draining
			}
		};
		if should_wake {
			trace!("tick requested");
			if let Some(hook) = self.shared.wake.borrow().as_ref() {
				hook();
			}
		}
	}

	/// Whether a tick is pending (requested and not yet drained).
	pub fn tick_requested(&self) -> bool {
		self.shared.state.borrow().tick_requested
	}

	/// Number of flushes currently queued (diagnostic).
	pub fn pending_flushes(&self) -> usize {
		self.shared.state.borrow().queue.len()
	}

	/// Drain the flush queue: one tick.
	///
	/// Entries are processed strictly first-scheduled-first-flushed. Handler
	/// bodies may enqueue further flushes; those run within this same drain.
	/// When the queue is empty the per-tick dedup marks are cleared and the
	/// tick ends.
	pub fn run_tick(&self) {
		{
			let mut state = self.shared.state.borrow_mut();
			if state.draining {
				warn!("run_tick called re-entrantly; ignored");
				return;
			}
			state.draining = true;
		}
		trace!("tick start");

		loop {
			let next = self.shared.state.borrow_mut().queue.pop_front();
			match next {
				Some(observable) => observable.flush(),
				None => break,
			}
		}

		let mut state = self.shared.state.borrow_mut();
		state.marks.clear();
		state.tick_requested = false;
		state.draining = false;
		trace!("tick end");
	}

	/// Record that a handler ran this tick.
	pub(crate) fn mark(&self, key: MarkKey) {
		self.shared.state.borrow_mut().marks.insert(key);
	}

	/// Whether a handler already ran this tick.
	pub(crate) fn is_marked(&self, key: MarkKey) -> bool {
		self.shared.state.borrow().marks.contains(&key)
	}

	/// Track an armed debounce timer. Re-arming an already-tracked timer is a
	/// no-op here; the timer itself holds the refreshed deadline.
	pub(crate) fn arm_timer(&self, timer: &Rc<RefCell<DebounceTimer>>) {
		let mut state = self.shared.state.borrow_mut();
		if !state.timers.iter().any(|tracked| Rc::ptr_eq(tracked, timer)) {
			state.timers.push(Rc::clone(timer));
		}
	}

	/// Fire every armed debounce timer whose deadline has passed at `now`.
	/// Returns how many fired. Timer callbacks run outside any internal borrow
	/// and may trigger observables (starting a fresh tick request) or re-arm.
	pub fn poll_timers(&self, now: Instant) -> usize {
		let due: Vec<Rc<RefCell<DebounceTimer>>> = {
			let mut state = self.shared.state.borrow_mut();
			let mut due = Vec::new();
			state.timers.retain(|timer| {
				if timer.borrow().is_due(now) {
					due.push(Rc::clone(timer));
					false
				} else {
					true
				}
			});
			due
		};

		let mut fired = 0;
		for timer in due {
			let shot = timer.borrow_mut().take_fire();
			if let Some((callback, args)) = shot {
				callback(&args);
				fired += 1;
			}
		}
		fired
	}

	/// Earliest armed debounce deadline, telling the host how long it may
	/// sleep before the next [`Scheduler::poll_timers`] call.
	pub fn next_timer_deadline(&self) -> Option<Instant> {
		self.shared
			.state
			.borrow()
			.timers
			.iter()
			.filter_map(|timer| timer.borrow().deadline())
			.min()
	}
}

impl std::fmt::Debug for Scheduler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.shared.state.borrow();
		f.debug_struct("Scheduler")
			.field("pending_flushes", &state.queue.len())
			.field("tick_requested", &state.tick_requested)
			.field("armed_timers", &state.timers.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::change::Notification;
	use crate::handler::handler;
	use std::cell::Cell;
	use std::time::Duration;

	#[test]
	fn wake_hook_fires_once_per_coalesced_request() {
		let scheduler = Scheduler::new();
		let wakes = Rc::new(Cell::new(0));
		let wakes_in_hook = Rc::clone(&wakes);
		scheduler.set_wake_hook(move || wakes_in_hook.set(wakes_in_hook.get() + 1));

		scheduler.request_tick();
		scheduler.request_tick();
		scheduler.request_tick();
		assert_eq!(wakes.get(), 1);
		assert!(scheduler.tick_requested());

		scheduler.run_tick();
		assert!(!scheduler.tick_requested());

		scheduler.request_tick();
		assert_eq!(wakes.get(), 2);
	}

	#[test]
	fn marks_are_cleared_when_the_tick_ends() {
		let scheduler = Scheduler::new();
		let key: MarkKey = (0xDEAD, crate::change::ObservableId::next());

		scheduler.mark(key);
		assert!(scheduler.is_marked(key));

		scheduler.run_tick();
		assert!(!scheduler.is_marked(key));
	}

	#[test]
	fn timers_fire_once_due_and_leave_the_queue() {
		let scheduler = Scheduler::new();
		let fired = Rc::new(Cell::new(0));
		let fired_in_handler = Rc::clone(&fired);
		let callback = handler(move |_: &[Notification]| {
			fired_in_handler.set(fired_in_handler.get() + 1);
		});

		let timer = Rc::new(RefCell::new(DebounceTimer::new(Duration::from_millis(20), callback)));
		let start = Instant::now();
		timer.borrow_mut().arm(Vec::new(), start);
		scheduler.arm_timer(&timer);
		scheduler.arm_timer(&timer);

		assert_eq!(scheduler.poll_timers(start + Duration::from_millis(10)), 0);
		assert_eq!(scheduler.next_timer_deadline(), Some(start + Duration::from_millis(20)));

		assert_eq!(scheduler.poll_timers(start + Duration::from_millis(25)), 1);
		assert_eq!(fired.get(), 1);
		assert_eq!(scheduler.next_timer_deadline(), None);

		// Fired timers are untracked until re-armed.
		assert_eq!(scheduler.poll_timers(start + Duration::from_secs(1)), 0);
	}

	#[test]
	fn clones_share_one_instance() {
		let scheduler = Scheduler::new();
		let alias = scheduler.clone();
		assert!(scheduler.same_instance(&alias));
		assert!(!scheduler.same_instance(&Scheduler::new()));
	}
}
