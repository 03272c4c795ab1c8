//! Per-type event tables
//!
//! Every observable type declares one static [`EventTable`]: an ordered list of
//! `(semantic name, wire name)` pairs. Declaration order is the canonical order
//! used to expand the `any`/`all` keywords and to normalize multi-name patterns,
//! so `"y|x"` and `"x|y"` canonicalize identically.
//!
//! # Examples
//!
//! ```
//! use contura_events::EventTable;
//!
//! static POINT_EVENTS: EventTable = EventTable::new("point", &[
//! 	("x", "attr:x"),
//! 	("y", "attr:y"),
//! ]);
//!
//! let x = POINT_EVENTS.id_of("x").unwrap();
//! assert_eq!(POINT_EVENTS.name(x), "x");
//! assert_eq!(POINT_EVENTS.wire(x), "attr:x");
//! ```

/// Index of an event name inside its [`EventTable`].
///
/// Ordering follows table declaration order, which makes sorting a list of ids
/// the same operation as canonicalizing a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub(crate) u16);

impl EventId {
	pub(crate) fn index(self) -> usize {
		self.0 as usize
	}
}

/// Static, declaration-ordered mapping from semantic event names to wire names
/// for one observable type.
///
/// This is the only type-specific configuration the propagation core requires;
/// it is meant to be declared once per type as a `static`.
#[derive(Debug)]
pub struct EventTable {
	type_name: &'static str,
	entries: &'static [(&'static str, &'static str)],
}

impl EventTable {
	/// Declare a table. `entries` are `(semantic name, wire name)` pairs in
	/// canonical order.
	pub const fn new(
		type_name: &'static str,
		entries: &'static [(&'static str, &'static str)],
	) -> Self {
		Self { type_name, entries }
	}

	/// Name of the observable type this table belongs to (diagnostics only).
	pub fn type_name(&self) -> &'static str {
		self.type_name
	}

	/// Number of declared events.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Whether the table declares no events at all.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Look up a semantic name, returning its id if declared.
	pub fn id_of(&self, name: &str) -> Option<EventId> {
		self.entries
			.iter()
			.position(|(semantic, _)| *semantic == name)
			.map(|index| EventId(index as u16))
	}

	/// Semantic name for an id.
	///
	/// # Panics
	///
	/// Panics if `id` did not come from this table.
	pub fn name(&self, id: EventId) -> &'static str {
		self.entries[id.index()].0
	}

	/// Wire name for an id.
	///
	/// # Panics
	///
	/// Panics if `id` did not come from this table.
	pub fn wire(&self, id: EventId) -> &'static str {
		self.entries[id.index()].1
	}

	/// Whether `id` indexes into this table.
	pub fn contains(&self, id: EventId) -> bool {
		id.index() < self.entries.len()
	}

	/// All ids, in declaration order.
	pub fn ids(&self) -> impl Iterator<Item = EventId> + '_ {
		(0..self.entries.len()).map(|index| EventId(index as u16))
	}
}

/// Shared table for mutable-collection wrappers.
///
/// Collection wrappers translate container mutation into index/key-qualified
/// change records; they all speak this one table so that views can subscribe to
/// any collection uniformly.
pub static COLLECTION_EVENTS: EventTable = EventTable::new("collection", &[
	("item_added", "collection:add"),
	("item_removed", "collection:remove"),
	("item_changed", "collection:change"),
	("items_reset", "collection:reset"),
]);
