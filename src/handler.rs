//! Handler records and the per-object registry
//!
//! Each observable keeps an ordered list of [`HandlerRecord`]s, sorted by
//! priority descending (insertion order on ties). Cross-object handlers created
//! by `bind` share one record (in particular one `effective` callback) across
//! every target they are attached to, which is what lets the scheduler run them
//! at most once per tick.

use std::rc::Rc;
use std::time::Duration;

use crate::change::{Notification, ObservableId};
use crate::error::EventError;
use crate::pattern::Pattern;
use crate::registry::EventTable;

/// Callback signature shared by listeners and bindings.
///
/// Same-object listeners receive exactly one notification; cross-object
/// bindings receive one per related target, in binding order.
pub type HandlerFn = Rc<dyn Fn(&[Notification])>;

/// Wrap a closure as a [`HandlerFn`].
///
/// Handler identity is reference identity: keep a clone of the returned value
/// if you intend to remove the handler later.
pub fn handler(callback: impl Fn(&[Notification]) + 'static) -> HandlerFn {
	Rc::new(callback)
}

/// Default priority of plain `on` listeners.
pub const LISTENER_PRIORITY: i32 = 1;

/// Default priority of cross-object `bind` handlers. Derived values recompute
/// before plain listeners observe them.
pub const BINDING_PRIORITY: i32 = 1000;

/// Registration options for `on` / `bind`.
///
/// # Examples
///
/// ```
/// use contura_events::HandlerOptions;
/// use std::time::Duration;
///
/// let options = HandlerOptions::new()
/// 	.with_priority(5)
/// 	.with_debounce(Duration::from_millis(50))
/// 	.with_immediate(false);
/// assert!(!options.immediate());
/// ```
#[derive(Debug, Clone, Default)]
pub struct HandlerOptions {
	priority: Option<i32>,
	debounce: Duration,
	immediate: Option<bool>,
}

impl HandlerOptions {
	/// Defaults: per-call default priority, no debounce, immediate dispatch on.
	pub fn new() -> Self {
		Self::default()
	}

	/// Override the priority (higher runs first within a flush).
	pub fn with_priority(mut self, priority: i32) -> Self {
		self.priority = Some(priority);
		self
	}

	/// Trailing-edge debounce delay; zero means none.
	pub fn with_debounce(mut self, delay: Duration) -> Self {
		self.debounce = delay;
		self
	}

	/// Whether to invoke the callback once, synchronously, at registration.
	pub fn with_immediate(mut self, immediate: bool) -> Self {
		self.immediate = Some(immediate);
		self
	}

	pub(crate) fn priority_or(&self, default: i32) -> i32 {
		self.priority.unwrap_or(default)
	}

	pub(crate) fn debounce(&self) -> Duration {
		self.debounce
	}

	/// Resolved immediate-dispatch flag (defaults to `true`).
	pub fn immediate(&self) -> bool {
		self.immediate.unwrap_or(true)
	}
}

/// One registered handler on one observable.
#[derive(Clone)]
pub(crate) struct HandlerRecord {
	pub(crate) pattern: Pattern,
	pub(crate) raw: HandlerFn,
	/// Identity of the registrar: the object itself for `on`, the binder for
	/// `bind`. Removal variants select on this.
	pub(crate) context: ObservableId,
	/// All targets of the binding, in argument order; `None` for `on`.
	pub(crate) related: Option<Rc<[ObservableId]>>,
	pub(crate) priority: i32,
	/// What the flush actually invokes: the raw callback, or its debounce
	/// wrapper. Shared across every target of a binding.
	pub(crate) effective: HandlerFn,
}

impl HandlerRecord {
	/// Per-tick dedup key: effective-callback identity plus context.
	pub(crate) fn mark_key(&self) -> (usize, ObservableId) {
		(Rc::as_ptr(&self.effective) as *const () as usize, self.context)
	}
}

/// The ordered handler list of one observable.
#[derive(Clone, Default)]
pub(crate) struct HandlerList {
	entries: Vec<HandlerRecord>,
}

impl HandlerList {
	/// Register a record, rejecting exact duplicates of
	/// `(pattern, raw callback, context)`.
	pub(crate) fn add(&mut self, record: HandlerRecord, table: &EventTable) -> Result<(), EventError> {
		if self.has(&record.pattern, &record.raw, record.context) {
			return Err(EventError::DuplicateHandler {
				pattern: record.pattern.canonical(table),
				type_name: table.type_name(),
			});
		}
		self.entries.push(record);
		// Stable sort keeps insertion order among equal priorities.
		self.entries.sort_by(|a, b| b.priority.cmp(&a.priority));
		Ok(())
	}

	pub(crate) fn has(&self, pattern: &Pattern, raw: &HandlerFn, context: ObservableId) -> bool {
		self.entries.iter().any(|entry| {
			entry.context == context && entry.pattern == *pattern && Rc::ptr_eq(&entry.raw, raw)
		})
	}

	pub(crate) fn any(&self, predicate: impl Fn(&HandlerRecord) -> bool) -> bool {
		self.entries.iter().any(predicate)
	}

	/// Shallow copy taken at the start of a flush, so registrations and
	/// removals during the flush do not affect the set being processed.
	pub(crate) fn snapshot(&self) -> Vec<HandlerRecord> {
		self.entries.clone()
	}

	/// Remove every record matching `predicate`; returns how many went.
	pub(crate) fn remove_where(&mut self, predicate: impl Fn(&HandlerRecord) -> bool) -> usize {
		let before = self.entries.len();
		self.entries.retain(|entry| !predicate(entry));
		before - self.entries.len()
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}
}
