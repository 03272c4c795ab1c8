//! Per-tick pending-change cache
//!
//! Each observable accumulates the changes of the current tick here: one entry
//! per fired event name, holding the notification handed to single-name
//! matches plus the full record trace. Composite queries assemble composed
//! notifications on the fly. The cache lives exactly one tick; the flush
//! procedure clears it unconditionally, consumed or not.

use std::collections::HashMap;

use crate::change::{ChangeRecord, EventLabel, Notification};
use crate::pattern::Pattern;
use crate::registry::{EventId, EventTable};

/// Accumulated changes of one observable for the current tick.
#[derive(Debug, Default)]
pub struct PendingChanges {
	entries: HashMap<EventId, Notification>,
}

impl PendingChanges {
	/// An empty cache.
	pub fn new() -> Self {
		Self::default()
	}

	/// Record a change. The first record of an event this tick creates the
	/// entry; later ones extend its trace, last record winning the slot and
	/// related fields.
	pub fn record(&mut self, record: ChangeRecord, table: &EventTable) {
		match self.entries.get_mut(&record.event) {
			Some(notification) => notification.absorb(record),
			None => {
				let name = table.name(record.event);
				self.entries.insert(record.event, Notification::simple(record, name));
			}
		}
	}

	/// Resolve a pattern against this tick's entries.
	///
	/// Single names return their entry. OR patterns match if at least one
	/// constituent fired and return a composed notification whose `parts` hold
	/// every constituent that fired, in table order. AND patterns require every
	/// constituent and return all of them.
	pub fn query(&self, pattern: &Pattern, table: &EventTable) -> Option<Notification> {
		match pattern {
			Pattern::Single(id) => self.entries.get(id).cloned(),
			Pattern::AnyOf(ids) => {
				let parts: Vec<Notification> = ids
					.iter()
					.filter_map(|id| self.entries.get(id).cloned())
					.collect();
				if parts.is_empty() {
					return None;
				}
				Some(self.compose(pattern, table, parts))
			}
			Pattern::AllOf(ids) => {
				let mut parts = Vec::with_capacity(ids.len());
				for id in ids {
					parts.push(self.entries.get(id).cloned()?);
				}
				if parts.is_empty() {
					return None;
				}
				Some(self.compose(pattern, table, parts))
			}
		}
	}

	fn compose(&self, pattern: &Pattern, table: &EventTable, parts: Vec<Notification>) -> Notification {
		Notification::composed(EventLabel::owned(pattern.canonical(table)), parts)
	}

	/// Drop every entry. Called exactly once per flush, after all handlers of
	/// the observable have been evaluated.
	pub fn clear(&mut self) {
		self.entries.clear();
	}

	/// Whether any event fired this tick.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Number of distinct events fired this tick.
	pub fn len(&self) -> usize {
		self.entries.len()
	}
}
