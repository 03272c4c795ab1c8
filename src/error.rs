//! Error types for the change-propagation core
//!
//! Most of these are recoverable configuration mistakes: the chaining façade
//! (`on`, `bind`, `off`, …) downgrades them to warnings so that a typo'd event
//! name degrades to "that one subscription does nothing" instead of crashing an
//! interactive session. The strict `try_*` variants surface them as values.

use thiserror::Error;

/// Errors produced while parsing patterns or registering handlers.
#[derive(Debug, Error)]
pub enum EventError {
	/// The pattern names an event that does not exist in the target's table.
	#[error("unknown event `{name}` for observable type `{type_name}`")]
	UnknownEvent {
		/// The offending event name.
		name: String,
		/// Type name of the table the lookup ran against.
		type_name: &'static str,
	},

	/// The pattern mixes `|` and `&`, which have no defined precedence here.
	#[error("pattern `{pattern}` mixes `|` and `&`")]
	MixedOperators {
		/// The raw pattern as given.
		pattern: String,
	},

	/// Empty pattern, empty segment (`x||y`), or other syntax noise.
	#[error("malformed pattern `{pattern}`")]
	MalformedPattern {
		/// The raw pattern as given.
		pattern: String,
	},

	/// A handler with the same pattern, callback, and context is already
	/// registered on this target.
	#[error("duplicate handler for `{pattern}` on observable type `{type_name}`")]
	DuplicateHandler {
		/// Canonical form of the pattern.
		pattern: String,
		/// Type name of the target observable.
		type_name: &'static str,
	},

	/// The change record was built against a different observable (or a
	/// different event table) than the one it was triggered on.
	#[error("change record for observable {record_target} triggered on observable {trigger_target}")]
	ForeignRecord {
		/// Target id stored in the record.
		record_target: u64,
		/// Id of the observable `trigger` was called on.
		trigger_target: u64,
	},
}
