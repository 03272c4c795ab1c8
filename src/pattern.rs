//! Event-name pattern language
//!
//! A pattern is a single event name, an OR combination (`"x|y"`), an AND
//! combination (`"x&y"`), or one of the keywords [`ANY`] / [`ALL`] which expand
//! to the OR / AND join of every name in the target's table.
//!
//! Parsing canonicalizes: multi-name patterns are re-sorted into table
//! declaration order and deduplicated, so `"y|x"`, `"x|y"` and `"x|y|x"` all
//! produce the same [`Pattern`] value. A degenerate composite over a single
//! name collapses to that name.

use crate::error::EventError;
use crate::registry::{EventId, EventTable};

/// Keyword expanding to the OR join of every declared event.
pub const ANY: &str = "any";

/// Keyword expanding to the AND join of every declared event.
pub const ALL: &str = "all";

/// A parsed, canonical pattern.
///
/// Composite variants keep their ids sorted in table declaration order; two
/// patterns over the same names always compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
	/// One event name.
	Single(EventId),
	/// Fires if at least one constituent fired this tick.
	AnyOf(Vec<EventId>),
	/// Fires only if every constituent fired this tick.
	AllOf(Vec<EventId>),
}

impl Pattern {
	/// Parse `raw` against `table`.
	///
	/// Any name missing from the table invalidates the whole pattern; mixing
	/// `|` and `&` is rejected.
	pub fn parse(raw: &str, table: &EventTable) -> Result<Self, EventError> {
		let trimmed = raw.trim();
		if trimmed.is_empty() {
			return Err(EventError::MalformedPattern { pattern: raw.to_string() });
		}
		if trimmed == ANY {
			return Ok(Self::from_ids(table.ids().collect(), false));
		}
		if trimmed == ALL {
			return Ok(Self::from_ids(table.ids().collect(), true));
		}

		let has_or = trimmed.contains('|');
		let has_and = trimmed.contains('&');
		if has_or && has_and {
			return Err(EventError::MixedOperators { pattern: raw.to_string() });
		}
		if !has_or && !has_and {
			return Ok(Self::Single(lookup(trimmed, table)?));
		}

		let separator = if has_or { '|' } else { '&' };
		let mut ids = Vec::new();
		for part in trimmed.split(separator) {
			let part = part.trim();
			if part.is_empty() {
				return Err(EventError::MalformedPattern { pattern: raw.to_string() });
			}
			ids.push(lookup(part, table)?);
		}
		ids.sort_unstable();
		ids.dedup();
		Ok(Self::from_ids(ids, has_and))
	}

	fn from_ids(ids: Vec<EventId>, conjunctive: bool) -> Self {
		match ids.len() {
			1 => Self::Single(ids[0]),
			_ if conjunctive => Self::AllOf(ids),
			_ => Self::AnyOf(ids),
		}
	}

	/// Canonical string form, e.g. `"x|y"` with names in declaration order.
	pub fn canonical(&self, table: &EventTable) -> String {
		let join = |ids: &[EventId], separator: &str| {
			ids.iter()
				.map(|id| table.name(*id))
				.collect::<Vec<_>>()
				.join(separator)
		};
		match self {
			Self::Single(id) => table.name(*id).to_string(),
			Self::AnyOf(ids) => join(ids, "|"),
			Self::AllOf(ids) => join(ids, "&"),
		}
	}
}

fn lookup(name: &str, table: &EventTable) -> Result<EventId, EventError> {
	table.id_of(name).ok_or_else(|| EventError::UnknownEvent {
		name: name.to_string(),
		type_name: table.type_name(),
	})
}
