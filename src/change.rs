//! Change records and notifications
//!
//! Two small value types travel through the pipeline. A [`ChangeRecord`] is the
//! raw fact "this property changed", created by a property setter after it has
//! confirmed the value really differs; it is consumed only by the per-tick
//! pending cache. A [`Notification`] is what handlers receive: either *empty*
//! (immediate-on-registration calls and unmatched slots of a multi-target
//! callback), *simple* (one fired event, with the tick's record trace), or
//! *composed* (an OR/AND match, with the constituent notifications in `parts`).

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::registry::EventId;

static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);
static NEXT_OBSERVABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Monotonically increasing logical timestamp.
///
/// Every change record carries one, and an observable's state stamp is the
/// stamp of its most recent change (including changes made while muted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp(u64);

impl Stamp {
	/// Take the next stamp from the process-wide clock.
	pub fn next() -> Self {
		Self(NEXT_STAMP.fetch_add(1, Ordering::Relaxed))
	}
}

impl fmt::Display for Stamp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Process-unique identity of an observable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObservableId(u64);

impl ObservableId {
	pub(crate) fn next() -> Self {
		Self(NEXT_OBSERVABLE_ID.fetch_add(1, Ordering::Relaxed))
	}

	pub(crate) fn raw(self) -> u64 {
		self.0
	}
}

impl fmt::Display for ObservableId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Position qualifier for collection-originated changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotKey {
	/// Positional index in a sequence container.
	Index(usize),
	/// Key in a map container.
	Key(String),
}

/// Label of the event (or pattern) a notification stands for.
///
/// Simple notifications borrow the table's static name; composed notifications
/// own their canonical pattern string.
#[derive(Debug, Clone)]
pub struct EventLabel(LabelInner);

#[derive(Debug, Clone)]
enum LabelInner {
	Static(&'static str),
	Owned(Rc<str>),
}

impl EventLabel {
	/// Label backed by a `'static` table name.
	pub const fn fixed(name: &'static str) -> Self {
		Self(LabelInner::Static(name))
	}

	/// Label owning its string (canonical pattern forms).
	pub fn owned(name: impl Into<Rc<str>>) -> Self {
		Self(LabelInner::Owned(name.into()))
	}

	/// The label text.
	pub fn as_str(&self) -> &str {
		match &self.0 {
			LabelInner::Static(name) => name,
			LabelInner::Owned(name) => name,
		}
	}
}

impl PartialEq for EventLabel {
	fn eq(&self, other: &Self) -> bool {
		self.as_str() == other.as_str()
	}
}

impl Eq for EventLabel {}

impl fmt::Display for EventLabel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

impl AsRef<str> for EventLabel {
	fn as_ref(&self) -> &str {
		self.as_str()
	}
}

/// The raw fact "this property of this observable changed".
///
/// Immutable once built. Equality of old and new values is the setter's
/// responsibility; by the time a record exists the change is real.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
	/// The observable whose property changed.
	pub target: ObservableId,
	/// Which event fired, as an index into the target's table.
	pub event: EventId,
	/// Previous value, if the setter chose to attach it.
	pub old: Option<serde_json::Value>,
	/// Index/key qualifier for collection-originated changes.
	pub slot: Option<SlotKey>,
	/// Another observable involved in the change (e.g. the item added).
	pub related: Option<ObservableId>,
	/// When the change happened.
	pub stamp: Stamp,
}

impl ChangeRecord {
	/// Build a record stamped now. Prefer [`Observable::change`] which resolves
	/// the event name through the target's table.
	///
	/// [`Observable::change`]: crate::Observable::change
	pub fn new(target: ObservableId, event: EventId) -> Self {
		Self {
			target,
			event,
			old: None,
			slot: None,
			related: None,
			stamp: Stamp::next(),
		}
	}

	/// Attach the previous value.
	pub fn with_old(mut self, old: serde_json::Value) -> Self {
		self.old = Some(old);
		self
	}

	/// Attach an index/key qualifier.
	pub fn with_slot(mut self, slot: SlotKey) -> Self {
		self.slot = Some(slot);
		self
	}

	/// Attach a related observable.
	pub fn with_related(mut self, related: ObservableId) -> Self {
		self.related = Some(related);
		self
	}
}

/// What a handler receives when it runs.
#[derive(Debug, Clone)]
pub struct Notification {
	/// The observable this notification is about.
	pub target: ObservableId,
	/// Event name (simple) or canonical pattern (composed); `None` when empty.
	pub event: Option<EventLabel>,
	/// Stamp of the latest contributing change (or of creation, when empty).
	pub stamp: Stamp,
	/// Slot qualifier of the latest contributing change.
	pub slot: Option<SlotKey>,
	/// Related observable of the latest contributing change.
	pub related: Option<ObservableId>,
	/// Trace of every record that fired this event within the tick.
	pub records: Vec<ChangeRecord>,
	/// Constituent notifications of a composed (OR/AND) match, in table order.
	pub parts: Vec<Notification>,
}

impl Notification {
	/// The empty flavor: "nothing specific happened here (yet)".
	pub fn empty(target: ObservableId) -> Self {
		Self {
			target,
			event: None,
			stamp: Stamp::next(),
			slot: None,
			related: None,
			records: Vec::new(),
			parts: Vec::new(),
		}
	}

	/// The simple flavor, seeded from the first record of the tick.
	pub(crate) fn simple(record: ChangeRecord, name: &'static str) -> Self {
		Self {
			target: record.target,
			event: Some(EventLabel::fixed(name)),
			stamp: record.stamp,
			slot: record.slot.clone(),
			related: record.related,
			records: vec![record],
			parts: Vec::new(),
		}
	}

	/// The composed flavor, aggregating the constituents that satisfied an
	/// OR/AND pattern. `parts` must be non-empty and in table order.
	pub(crate) fn composed(label: EventLabel, parts: Vec<Notification>) -> Self {
		debug_assert!(!parts.is_empty(), "composed notification needs constituents");
		let stamp = parts.iter().map(|part| part.stamp).max().unwrap_or_else(Stamp::next);
		Self {
			target: parts[0].target,
			event: Some(label),
			stamp,
			slot: None,
			related: None,
			records: Vec::new(),
			parts,
		}
	}

	/// Fold a later record of the same tick into a simple notification.
	pub(crate) fn absorb(&mut self, record: ChangeRecord) {
		self.stamp = record.stamp;
		self.slot = record.slot.clone();
		self.related = record.related;
		self.records.push(record);
	}

	/// Whether this is the empty flavor.
	pub fn is_empty(&self) -> bool {
		self.event.is_none()
	}

	/// Whether this is a composed (OR/AND) notification.
	pub fn is_composed(&self) -> bool {
		!self.parts.is_empty()
	}

	/// Event or pattern label text, if any.
	pub fn event_name(&self) -> Option<&str> {
		self.event.as_ref().map(EventLabel::as_str)
	}
}
