//! Observable objects
//!
//! [`Observable`] is the façade tying the core together: the per-object handler
//! list, the per-tick pending-change cache, the muted flag and state stamp, and
//! the hookup to the shared [`Scheduler`]. Shape types embed one and call
//! [`Observable::trigger`] from their property setters after confirming the new
//! value actually differs; coalescing, ordering and deduplication all happen
//! here and in the scheduler.
//!
//! Registration is chainable and lenient: a bad pattern or duplicate handler
//! logs a warning and the call returns `&self` unchanged (interactive sessions
//! should not crash on a typo'd event name). The `try_*` variants report the
//! same conditions as values.
//!
//! # Examples
//!
//! ```
//! use contura_events::{EventTable, HandlerOptions, Observable, Scheduler, handler};
//!
//! static POINT_EVENTS: EventTable = EventTable::new("point", &[
//! 	("x", "attr:x"),
//! 	("y", "attr:y"),
//! ]);
//!
//! let scheduler = Scheduler::new();
//! let point = Observable::with_scheduler(&POINT_EVENTS, &scheduler);
//! point.ready();
//!
//! point.on("x|y", handler(|notes| {
//! 	if let Some(event) = notes[0].event_name() {
//! 		println!("point moved: {event}");
//! 	}
//! }), HandlerOptions::new());
//!
//! point.trigger(point.change("x").unwrap());
//! point.trigger(point.change("y").unwrap());
//! scheduler.run_tick(); // one flush, one composed "x|y" notification
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::cache::PendingChanges;
use crate::change::{ChangeRecord, Notification, ObservableId, Stamp};
use crate::debounce::DebounceTimer;
use crate::error::EventError;
use crate::handler::{
	BINDING_PRIORITY, HandlerFn, HandlerList, HandlerOptions, HandlerRecord, LISTENER_PRIORITY,
};
use crate::pattern::Pattern;
use crate::registry::EventTable;
use crate::scheduler::Scheduler;

struct ObservableState {
	muted: bool,
	/// `None` until [`Observable::ready`]; `trigger` is a no-op before that so
	/// a partially constructed object cannot notify listeners.
	stamp: Option<Stamp>,
	handlers: HandlerList,
	/// Every target this object has attached cross-object handlers *to*.
	bound: Vec<Observable>,
	pending: PendingChanges,
	/// Whether a flush for this object is already queued this tick.
	scheduled: bool,
}

struct Inner {
	id: ObservableId,
	table: &'static EventTable,
	scheduler: Scheduler,
	state: RefCell<ObservableState>,
}

/// An observable object: mutable properties that, when changed, notify
/// listeners on this object or handlers bound jointly across several objects.
///
/// Cloning clones a handle; all clones share one identity and one state.
#[derive(Clone)]
pub struct Observable {
	inner: Rc<Inner>,
}

impl Observable {
	/// Create an observable on the thread's default scheduler.
	pub fn new(table: &'static EventTable) -> Self {
		Self::with_scheduler(table, &Scheduler::thread_default())
	}

	/// Create an observable on an explicit scheduler instance.
	pub fn with_scheduler(table: &'static EventTable, scheduler: &Scheduler) -> Self {
		Self {
			inner: Rc::new(Inner {
				id: ObservableId::next(),
				table,
				scheduler: scheduler.clone(),
				state: RefCell::new(ObservableState {
					muted: false,
					stamp: None,
					handlers: HandlerList::default(),
					bound: Vec::new(),
					pending: PendingChanges::new(),
					scheduled: false,
				}),
			}),
		}
	}

	/// Process-unique identity.
	pub fn id(&self) -> ObservableId {
		self.inner.id
	}

	/// The event table this observable speaks.
	pub fn table(&self) -> &'static EventTable {
		self.inner.table
	}

	/// The scheduler this observable flushes through.
	pub fn scheduler(&self) -> Scheduler {
		self.inner.scheduler.clone()
	}

	/// Mark construction complete. Until this is called once, `trigger` is a
	/// silent no-op. A second call is ignored with a warning.
	pub fn ready(&self) -> &Self {
		let mut state = self.inner.state.borrow_mut();
		if state.stamp.is_some() {
			warn!(observable = %self.inner.id, "ready() called more than once; ignored");
			return self;
		}
		state.stamp = Some(Stamp::next());
		self
	}

	/// Whether construction has completed.
	pub fn is_ready(&self) -> bool {
		self.inner.state.borrow().stamp.is_some()
	}

	/// The state stamp: the stamp of the most recent change, including changes
	/// made while muted. `None` until [`Observable::ready`].
	pub fn stamp(&self) -> Option<Stamp> {
		self.inner.state.borrow().stamp
	}

	/// Suppress delivery: while muted, `trigger` still advances the state
	/// stamp but records nothing and schedules nothing.
	pub fn mute(&self) -> &Self {
		self.inner.state.borrow_mut().muted = true;
		self
	}

	/// Resume delivery. Changes made while muted are not delivered
	/// retroactively.
	pub fn unmute(&self) -> &Self {
		self.inner.state.borrow_mut().muted = false;
		self
	}

	/// Whether delivery is currently suppressed.
	pub fn is_muted(&self) -> bool {
		self.inner.state.borrow().muted
	}

	/// Build a change record for one of this observable's events, stamped now.
	pub fn change(&self, event: &str) -> Result<ChangeRecord, EventError> {
		let id = self.inner.table.id_of(event).ok_or_else(|| EventError::UnknownEvent {
			name: event.to_string(),
			type_name: self.inner.table.type_name(),
		})?;
		Ok(ChangeRecord::new(self.inner.id, id))
	}

	/// Report a confirmed property change.
	///
	/// No-op before [`Observable::ready`]. Otherwise the state stamp advances;
	/// unless muted, the record lands in the pending cache and, the first time
	/// per tick, a flush for this object is queued with the scheduler.
	pub fn trigger(&self, record: ChangeRecord) -> &Self {
		if record.target != self.inner.id {
			warn!(
				error = %EventError::ForeignRecord {
					record_target: record.target.raw(),
					trigger_target: self.inner.id.raw(),
				},
				"change record dropped"
			);
			return self;
		}
		if !self.inner.table.contains(record.event) {
			warn!(observable = %self.inner.id, "change record event does not exist in this table; dropped");
			return self;
		}

		let schedule = {
			let mut state = self.inner.state.borrow_mut();
			if state.stamp.is_none() {
				// Expected during construction; not even worth a warning.
				return self;
			}
			state.stamp = Some(record.stamp);
			if state.muted {
				return self;
			}
			state.pending.record(record, self.inner.table);
			let first_this_tick = !state.scheduled;
			state.scheduled = true;
			first_this_tick
		};

		if schedule {
			self.inner.scheduler.enqueue_flush(self.clone());
			self.inner.scheduler.request_tick();
		}
		self
	}

	/// Register a same-object listener. Default priority
	/// [`LISTENER_PRIORITY`]; with `immediate` (the default) the callback is
	/// invoked once, synchronously, with an empty notification before this
	/// returns. Chainable whether or not registration succeeded.
	pub fn on(&self, pattern: &str, callback: HandlerFn, options: HandlerOptions) -> &Self {
		if let Err(error) = self.try_on(pattern, callback, options) {
			warn!(observable = %self.inner.id, pattern, %error, "listener not registered");
		}
		self
	}

	/// Strict variant of [`Observable::on`].
	pub fn try_on(
		&self,
		pattern: &str,
		callback: HandlerFn,
		options: HandlerOptions,
	) -> Result<(), EventError> {
		let parsed = Pattern::parse(pattern, self.inner.table)?;
		let effective = make_effective(&callback, options.debounce(), &self.inner.scheduler);
		let record = HandlerRecord {
			pattern: parsed,
			raw: Rc::clone(&callback),
			context: self.inner.id,
			related: None,
			priority: options.priority_or(LISTENER_PRIORITY),
			effective,
		};
		self.inner.state.borrow_mut().handlers.add(record, self.inner.table)?;
		if options.immediate() {
			callback(&[Notification::empty(self.inner.id)]);
		}
		Ok(())
	}

	/// Register one callback jointly across several targets.
	///
	/// Each `(target, pattern)` pair is parsed against that target's table and
	/// an identical handler record (same callback, same related-target list in
	/// argument order, default priority [`BINDING_PRIORITY`]) is attached to
	/// the target. Pairs that fail to parse (or would duplicate) are skipped
	/// with a warning; the rest still register. With `immediate` the callback
	/// runs once, synchronously, with one empty notification per target.
	pub fn bind(
		&self,
		pairs: &[(Observable, &str)],
		callback: HandlerFn,
		options: HandlerOptions,
	) -> &Self {
		let related: Rc<[ObservableId]> = pairs.iter().map(|(target, _)| target.id()).collect();
		let effective = make_effective(&callback, options.debounce(), &self.inner.scheduler);
		let priority = options.priority_or(BINDING_PRIORITY);

		for (target, raw_pattern) in pairs {
			match Pattern::parse(raw_pattern, target.inner.table) {
				Ok(pattern) => {
					let record = HandlerRecord {
						pattern,
						raw: Rc::clone(&callback),
						context: self.inner.id,
						related: Some(Rc::clone(&related)),
						priority,
						effective: Rc::clone(&effective),
					};
					let added = target.inner.state.borrow_mut().handlers.add(record, target.inner.table);
					match added {
						Ok(()) => self.remember_bound(target),
						Err(error) => warn!(
							binder = %self.inner.id,
							target = %target.id(),
							%error,
							"binding pair skipped"
						),
					}
				}
				Err(error) => warn!(
					binder = %self.inner.id,
					target = %target.id(),
					pattern = raw_pattern,
					%error,
					"binding pair skipped"
				),
			}
		}

		if options.immediate() {
			let slots: Vec<Notification> =
				related.iter().map(|id| Notification::empty(*id)).collect();
			callback(&slots);
		}
		self
	}

	/// Strict, all-or-nothing variant of [`Observable::bind`]: every pair must
	/// parse and none may duplicate, otherwise nothing registers (and no
	/// immediate call happens).
	pub fn try_bind(
		&self,
		pairs: &[(Observable, &str)],
		callback: HandlerFn,
		options: HandlerOptions,
	) -> Result<(), EventError> {
		let mut parsed: Vec<Pattern> = Vec::with_capacity(pairs.len());
		for (index, (target, raw_pattern)) in pairs.iter().enumerate() {
			let pattern = Pattern::parse(raw_pattern, target.inner.table)?;
			let already_registered = target
				.inner
				.state
				.borrow()
				.handlers
				.has(&pattern, &callback, self.inner.id);
			let duplicated_in_batch = pairs[..index]
				.iter()
				.zip(&parsed)
				.any(|((earlier, _), earlier_pattern)| {
					earlier.id() == target.id() && *earlier_pattern == pattern
				});
			if already_registered || duplicated_in_batch {
				return Err(EventError::DuplicateHandler {
					pattern: pattern.canonical(target.inner.table),
					type_name: target.inner.table.type_name(),
				});
			}
			parsed.push(pattern);
		}

		let related: Rc<[ObservableId]> = pairs.iter().map(|(target, _)| target.id()).collect();
		let effective = make_effective(&callback, options.debounce(), &self.inner.scheduler);
		let priority = options.priority_or(BINDING_PRIORITY);
		for ((target, _), pattern) in pairs.iter().zip(parsed) {
			let record = HandlerRecord {
				pattern,
				raw: Rc::clone(&callback),
				context: self.inner.id,
				related: Some(Rc::clone(&related)),
				priority,
				effective: Rc::clone(&effective),
			};
			target
				.inner
				.state
				.borrow_mut()
				.handlers
				.add(record, target.inner.table)
				.expect("duplicate screened above");
			self.remember_bound(target);
		}

		if options.immediate() {
			let slots: Vec<Notification> =
				related.iter().map(|id| Notification::empty(*id)).collect();
			callback(&slots);
		}
		Ok(())
	}

	/// Remove same-object listeners for `pattern`: all of them, or only those
	/// with the given callback.
	pub fn off(&self, pattern: &str, callback: Option<&HandlerFn>) -> &Self {
		match Pattern::parse(pattern, self.inner.table) {
			Ok(parsed) => {
				let me = self.inner.id;
				self.inner.state.borrow_mut().handlers.remove_where(|entry| {
					entry.context == me
						&& entry.pattern == parsed
						&& callback.is_none_or(|raw| Rc::ptr_eq(&entry.raw, raw))
				});
			}
			Err(error) => {
				warn!(observable = %self.inner.id, pattern, %error, "off() pattern ignored");
			}
		}
		self
	}

	/// Remove cross-object handlers this object attached for specific
	/// `(target, pattern)` pairs.
	pub fn unbind(&self, pairs: &[(Observable, &str)], callback: Option<&HandlerFn>) -> &Self {
		for (target, raw_pattern) in pairs {
			match Pattern::parse(raw_pattern, target.inner.table) {
				Ok(parsed) => {
					let me = self.inner.id;
					target.inner.state.borrow_mut().handlers.remove_where(|entry| {
						entry.context == me
							&& entry.pattern == parsed
							&& callback.is_none_or(|raw| Rc::ptr_eq(&entry.raw, raw))
					});
					self.forget_if_unbound(target);
				}
				Err(error) => {
					warn!(binder = %self.inner.id, pattern = raw_pattern, %error, "unbind() pair ignored");
				}
			}
		}
		self
	}

	/// Remove every cross-object handler this object attached to the given
	/// targets, regardless of pattern.
	pub fn unbind_targets(&self, targets: &[Observable], callback: Option<&HandlerFn>) -> &Self {
		let me = self.inner.id;
		for target in targets {
			target.inner.state.borrow_mut().handlers.remove_where(|entry| {
				entry.context == me && callback.is_none_or(|raw| Rc::ptr_eq(&entry.raw, raw))
			});
			self.forget_if_unbound(target);
		}
		self
	}

	/// Tear down every binding this object ever created, using its
	/// bound-target bookkeeping.
	pub fn unbind_all(&self) -> &Self {
		let me = self.inner.id;
		let bound: Vec<Observable> = self.inner.state.borrow_mut().bound.drain(..).collect();
		for target in bound {
			target
				.inner
				.state
				.borrow_mut()
				.handlers
				.remove_where(|entry| entry.context == me);
		}
		self
	}

	/// Remove every same-object listener (handlers whose context is this
	/// object itself).
	pub fn clear_listeners(&self) -> &Self {
		let me = self.inner.id;
		self.inner.state.borrow_mut().handlers.remove_where(|entry| entry.context == me);
		self
	}

	/// Remove every handler other objects bound onto this one.
	pub fn clear_bindings(&self) -> &Self {
		let me = self.inner.id;
		self.inner.state.borrow_mut().handlers.remove_where(|entry| entry.context != me);
		self
	}

	/// Remove every handler attached to this object, listeners and bindings
	/// alike.
	pub fn clear(&self) -> &Self {
		self.inner.state.borrow_mut().handlers.remove_where(|_| true);
		self
	}

	/// Whether this exact `(pattern, callback)` listener is registered here.
	pub fn has_handler(&self, pattern: &str, callback: &HandlerFn) -> bool {
		match Pattern::parse(pattern, self.inner.table) {
			Ok(parsed) => self.inner.state.borrow().handlers.has(&parsed, callback, self.inner.id),
			Err(_) => false,
		}
	}

	/// Total number of handlers attached to this object.
	pub fn handler_count(&self) -> usize {
		self.inner.state.borrow().handlers.len()
	}

	fn remember_bound(&self, target: &Observable) {
		let mut state = self.inner.state.borrow_mut();
		if !state.bound.iter().any(|bound| bound.id() == target.id()) {
			state.bound.push(target.clone());
		}
	}

	fn forget_if_unbound(&self, target: &Observable) {
		let me = self.inner.id;
		let still_bound = target.inner.state.borrow().handlers.any(|entry| entry.context == me);
		if !still_bound {
			self.inner.state.borrow_mut().bound.retain(|bound| bound.id() != target.id());
		}
	}

	/// The scheduled flush body: evaluate this object's handlers against the
	/// tick's pending cache, in priority order, invoking each match the
	/// scheduler has not already run this tick.
	///
	/// The handler set is snapshotted up front, so handlers added or removed
	/// by a running callback do not affect this flush. Cache queries are
	/// re-read per handler: a callback that triggers this same object mid-flush
	/// records into the cache (the scheduled flag is still set) and later
	/// handlers in this same flush see the addition. At the end the cache is
	/// cleared unconditionally and the scheduled flag reset.
	pub(crate) fn flush(&self) {
		let snapshot = {
			let state = self.inner.state.borrow();
			assert!(
				!state.pending.is_empty(),
				"scheduler invariant violated: flush queued for {} `{}` with an empty pending cache",
				self.inner.table.type_name(),
				self.inner.id,
			);
			state.handlers.snapshot()
		};
		trace!(observable = %self.inner.id, handlers = snapshot.len(), "flush");

		for record in snapshot {
			let matched = {
				let state = self.inner.state.borrow();
				state.pending.query(&record.pattern, self.inner.table)
			};
			let Some(notification) = matched else { continue };

			let key = record.mark_key();
			if self.inner.scheduler.is_marked(key) {
				continue;
			}

			match &record.related {
				None => (record.effective)(&[notification]),
				Some(related) => {
					let slots: Vec<Notification> = related
						.iter()
						.map(|id| {
							if *id == self.inner.id {
								notification.clone()
							} else {
								Notification::empty(*id)
							}
						})
						.collect();
					(record.effective)(&slots);
				}
			}
			self.inner.scheduler.mark(key);
		}

		let mut state = self.inner.state.borrow_mut();
		state.pending.clear();
		state.scheduled = false;
	}
}

/// Wrap a callback in its trailing-edge debounce, or pass it through when the
/// delay is zero. The wrapper re-arms one shared timer per attempt and hands it
/// to the scheduler's timer queue.
fn make_effective(raw: &HandlerFn, delay: Duration, scheduler: &Scheduler) -> HandlerFn {
	if delay.is_zero() {
		return Rc::clone(raw);
	}
	let timer = Rc::new(RefCell::new(DebounceTimer::new(delay, Rc::clone(raw))));
	let scheduler = scheduler.clone();
	Rc::new(move |args: &[Notification]| {
		timer.borrow_mut().arm(args.to_vec(), Instant::now());
		scheduler.arm_timer(&timer);
	})
}

impl PartialEq for Observable {
	fn eq(&self, other: &Self) -> bool {
		self.inner.id == other.inner.id
	}
}

impl Eq for Observable {}

impl std::hash::Hash for Observable {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.inner.id.hash(state);
	}
}

impl std::fmt::Debug for Observable {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Observable")
			.field("id", &self.inner.id)
			.field("type", &self.inner.table.type_name())
			.field("handlers", &self.handler_count())
			.finish()
	}
}
