//! Trailing-edge debounce
//!
//! A [`DebounceTimer`] collapses a burst of invocation attempts into one
//! delayed execution carrying the arguments of the *last* attempt. Every
//! attempt re-arms the deadline; the wrapped callback runs once the delay
//! elapses with no further attempts. Deliberately kept as a pure state machine
//! over explicit `Instant`s so the scheduler's timer queue (and tests) can
//! drive it without any clock of its own.

use std::time::{Duration, Instant};

use crate::change::Notification;
use crate::handler::HandlerFn;

/// State of one debounced handler.
#[derive(Clone)]
pub struct DebounceTimer {
	delay: Duration,
	callback: HandlerFn,
	deadline: Option<Instant>,
	pending: Option<Vec<Notification>>,
}

impl DebounceTimer {
	/// A disarmed timer wrapping `callback` with the given trailing delay.
	pub fn new(delay: Duration, callback: HandlerFn) -> Self {
		Self {
			delay,
			callback,
			deadline: None,
			pending: None,
		}
	}

	/// Register an invocation attempt at `now`. Restarts the delay and replaces
	/// any previously pending arguments (last attempt wins).
	pub fn arm(&mut self, args: Vec<Notification>, now: Instant) {
		self.deadline = Some(now + self.delay);
		self.pending = Some(args);
	}

	/// Whether an armed deadline has elapsed at `now`.
	pub fn is_due(&self, now: Instant) -> bool {
		self.deadline.is_some_and(|deadline| now >= deadline)
	}

	/// The armed deadline, if any.
	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	/// Whether an attempt is waiting to fire.
	pub fn is_armed(&self) -> bool {
		self.deadline.is_some()
	}

	/// Disarm and hand back the callback with the last attempt's arguments.
	/// Returns `None` if nothing is pending.
	pub fn take_fire(&mut self) -> Option<(HandlerFn, Vec<Notification>)> {
		self.deadline.take()?;
		let args = self.pending.take()?;
		Some((self.callback.clone(), args))
	}
}

impl std::fmt::Debug for DebounceTimer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DebounceTimer")
			.field("delay", &self.delay)
			.field("deadline", &self.deadline)
			.field("armed", &self.is_armed())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::change::ObservableId;
	use crate::handler::handler;
	use std::cell::RefCell;
	use std::rc::Rc;

	fn capture() -> (HandlerFn, Rc<RefCell<Vec<usize>>>) {
		let seen = Rc::new(RefCell::new(Vec::new()));
		let seen_by_handler = Rc::clone(&seen);
		let callback = handler(move |notes: &[Notification]| {
			seen_by_handler.borrow_mut().push(notes.len());
		});
		(callback, seen)
	}

	#[test]
	fn disarmed_timer_never_fires() {
		let (callback, _) = capture();
		let mut timer = DebounceTimer::new(Duration::from_millis(50), callback);
		assert!(!timer.is_due(Instant::now()));
		assert!(timer.take_fire().is_none());
	}

	#[test]
	fn fires_after_delay_of_silence() {
		let (callback, _) = capture();
		let mut timer = DebounceTimer::new(Duration::from_millis(50), callback);
		let start = Instant::now();

		timer.arm(vec![Notification::empty(ObservableId::next())], start);
		assert!(!timer.is_due(start + Duration::from_millis(49)));
		assert!(timer.is_due(start + Duration::from_millis(50)));
	}

	#[test]
	fn each_attempt_restarts_the_delay() {
		let (callback, _) = capture();
		let mut timer = DebounceTimer::new(Duration::from_millis(50), callback);
		let start = Instant::now();

		timer.arm(Vec::new(), start);
		timer.arm(Vec::new(), start + Duration::from_millis(40));
		assert!(!timer.is_due(start + Duration::from_millis(60)));
		assert!(timer.is_due(start + Duration::from_millis(90)));
	}

	#[test]
	fn last_attempts_arguments_win() {
		let (callback, seen) = capture();
		let mut timer = DebounceTimer::new(Duration::from_millis(10), callback);
		let start = Instant::now();
		let target = ObservableId::next();

		timer.arm(vec![Notification::empty(target)], start);
		timer.arm(
			vec![Notification::empty(target), Notification::empty(target)],
			start + Duration::from_millis(5),
		);

		let (fire, args) = timer.take_fire().unwrap();
		fire(&args);
		assert_eq!(*seen.borrow(), vec![2]);
		assert!(!timer.is_armed());
	}

	#[test]
	fn take_fire_disarms() {
		let (callback, _) = capture();
		let mut timer = DebounceTimer::new(Duration::from_millis(10), callback);
		timer.arm(Vec::new(), Instant::now());
		assert!(timer.take_fire().is_some());
		assert!(timer.take_fire().is_none());
	}
}
