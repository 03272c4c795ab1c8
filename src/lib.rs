//! # Contura Events
//!
//! Reactive change-propagation core for the Contura geometry toolkit.
//!
//! Observable objects carry mutable properties; when a property setter
//! confirms a real change it triggers a change record, and this crate decides
//! *whether and when* every interested callback runs: listeners on the same
//! object, or callbacks bound jointly across several objects so that one
//! handler recomputes a derived value whenever any of its inputs change
//! ("this circle's radius equals the distance between these two points").
//!
//! ## Architecture
//!
//! ```text
//! property setter ── ChangeRecord ──▶ Observable::trigger
//!        │                                │ (state stamp, mute gate)
//!        │                                ▼
//!        │                        PendingChanges (per tick)
//!        │                                │
//!        │              Scheduler: flush queue + tick coalescing
//!        │                                │  run_tick()
//!        │                                ▼
//!        └──── re-read live values ◀── handlers (priority order,
//!                                       deduped per tick, debounced)
//! ```
//!
//! One tick: the first trigger of a synchronous burst requests a deferred
//! drain (coalesced: many triggers, one flush per object); the host calls
//! [`Scheduler::run_tick`] after the burst, and cascades settle within the
//! same drain while direct cycles merely re-enqueue instead of recursing.
//!
//! ## Example
//!
//! ```
//! use contura_events::{EventTable, HandlerOptions, Observable, Scheduler, handler};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! static POINT_EVENTS: EventTable = EventTable::new("point", &[
//! 	("x", "attr:x"),
//! 	("y", "attr:y"),
//! ]);
//!
//! let scheduler = Scheduler::new();
//! let a = Observable::with_scheduler(&POINT_EVENTS, &scheduler);
//! let b = Observable::with_scheduler(&POINT_EVENTS, &scheduler);
//! a.ready();
//! b.ready();
//!
//! // One callback over both points: recompute whenever either moves.
//! let recomputes = Rc::new(Cell::new(0));
//! let observer = Observable::with_scheduler(&POINT_EVENTS, &scheduler);
//! observer.ready();
//! let seen = Rc::clone(&recomputes);
//! observer.bind(
//! 	&[(a.clone(), "x|y"), (b.clone(), "x|y")],
//! 	handler(move |_| seen.set(seen.get() + 1)),
//! 	HandlerOptions::new().with_immediate(false),
//! );
//!
//! a.trigger(a.change("x").unwrap());
//! b.trigger(b.change("y").unwrap());
//! scheduler.run_tick();
//!
//! // Both inputs changed in one burst: exactly one recompute.
//! assert_eq!(recomputes.get(), 1);
//! ```

pub mod cache;
pub mod change;
pub mod debounce;
pub mod error;
pub mod handler;
pub mod observable;
pub mod pattern;
pub mod registry;
pub mod scheduler;

pub use cache::PendingChanges;
pub use change::{ChangeRecord, EventLabel, Notification, ObservableId, SlotKey, Stamp};
pub use debounce::DebounceTimer;
pub use error::EventError;
pub use handler::{BINDING_PRIORITY, HandlerFn, HandlerOptions, LISTENER_PRIORITY, handler};
pub use observable::Observable;
pub use pattern::{ALL, ANY, Pattern};
pub use registry::{COLLECTION_EVENTS, EventId, EventTable};
pub use scheduler::Scheduler;
