//! Integration tests for change propagation
//!
//! Exercises the full pipeline, from property setters through the pending
//! cache and the scheduler's drain loop to handler invocation, via a small geometry
//! fixture: points whose coordinates feed a segment whose length is a derived
//! value, the motivating scenario of the toolkit this core underlies.

use contura_events::{
	COLLECTION_EVENTS, EventTable, HandlerOptions, Notification, Observable, Scheduler, SlotKey,
	handler,
};
use serde_json::json;
use serial_test::serial;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

static POINT_EVENTS: EventTable = EventTable::new("point", &[
	("x", "attr:x"),
	("y", "attr:y"),
]);

static SEGMENT_EVENTS: EventTable = EventTable::new("segment", &[
	("length", "attr:length"),
]);

/// A movable point: two coordinates plus the observable core a shape type
/// would embed. Setters check equality before triggering, as the contract
/// requires.
#[derive(Clone)]
struct Point {
	observable: Observable,
	x: Rc<Cell<f64>>,
	y: Rc<Cell<f64>>,
}

impl Point {
	fn new(scheduler: &Scheduler) -> Self {
		let observable = Observable::with_scheduler(&POINT_EVENTS, scheduler);
		observable.ready();
		Self {
			observable,
			x: Rc::new(Cell::new(0.0)),
			y: Rc::new(Cell::new(0.0)),
		}
	}

	fn set_x(&self, value: f64) {
		if self.x.get() != value {
			let old = self.x.replace(value);
			self.observable
				.trigger(self.observable.change("x").unwrap().with_old(json!(old)));
		}
	}

	fn set_y(&self, value: f64) {
		if self.y.get() != value {
			let old = self.y.replace(value);
			self.observable
				.trigger(self.observable.change("y").unwrap().with_old(json!(old)));
		}
	}
}

/// A segment between two points whose `length` is recomputed by a binding
/// whenever either endpoint moves.
struct Segment {
	observable: Observable,
	length: Rc<Cell<f64>>,
}

impl Segment {
	fn between(scheduler: &Scheduler, start: &Point, end: &Point) -> Self {
		let observable = Observable::with_scheduler(&SEGMENT_EVENTS, scheduler);
		observable.ready();
		let length = Rc::new(Cell::new(0.0));

		let (sx, sy) = (Rc::clone(&start.x), Rc::clone(&start.y));
		let (ex, ey) = (Rc::clone(&end.x), Rc::clone(&end.y));
		let len = Rc::clone(&length);
		let segment_observable = observable.clone();
		observable.bind(
			&[
				(start.observable.clone(), "x|y"),
				(end.observable.clone(), "x|y"),
			],
			handler(move |_| {
				// Derived handlers re-read live values; the notification only
				// says that and when something changed.
				let dx = ex.get() - sx.get();
				let dy = ey.get() - sy.get();
				let value = (dx * dx + dy * dy).sqrt();
				let previous = len.get();
				if previous != value {
					len.set(value);
					segment_observable.trigger(
						segment_observable
							.change("length")
							.unwrap()
							.with_old(json!(previous)),
					);
				}
			}),
			HandlerOptions::new(),
		);

		Self { observable, length }
	}
}

#[test]
fn immediate_dispatch_runs_once_synchronously_with_empty_notification() {
	let scheduler = Scheduler::new();
	let point = Point::new(&scheduler);

	let seen: Rc<RefCell<Vec<bool>>> = Rc::new(RefCell::new(Vec::new()));
	let seen_in_handler = Rc::clone(&seen);
	point.observable.on(
		"x",
		handler(move |notes| {
			seen_in_handler.borrow_mut().push(notes[0].is_empty());
		}),
		HandlerOptions::new(),
	);

	assert_eq!(*seen.borrow(), vec![true], "exactly one empty call at registration");
}

#[test]
fn burst_of_triggers_coalesces_into_one_flush_with_full_trace() {
	let scheduler = Scheduler::new();
	let point = Point::new(&scheduler);

	let traces: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));
	let traces_in_handler = Rc::clone(&traces);
	point.observable.on(
		"x",
		handler(move |notes| {
			traces_in_handler.borrow_mut().push(notes[0].records.len());
		}),
		HandlerOptions::new().with_immediate(false),
	);

	point.set_x(1.0);
	point.set_x(2.0);
	scheduler.run_tick();

	assert_eq!(*traces.borrow(), vec![2], "one invocation, trace of both records");
	assert_eq!(point.x.get(), 2.0);
}

#[test]
fn callback_bound_to_two_changed_targets_runs_once_per_tick() {
	let scheduler = Scheduler::new();
	let a = Point::new(&scheduler);
	let b = Point::new(&scheduler);
	let binder = Observable::with_scheduler(&SEGMENT_EVENTS, &scheduler);
	binder.ready();

	let runs = Rc::new(Cell::new(0));
	let runs_in_handler = Rc::clone(&runs);
	binder.bind(
		&[(a.observable.clone(), "x|y"), (b.observable.clone(), "x|y")],
		handler(move |_| runs_in_handler.set(runs_in_handler.get() + 1)),
		HandlerOptions::new().with_immediate(false),
	);

	a.set_x(3.0);
	b.set_y(4.0);
	scheduler.run_tick();
	assert_eq!(runs.get(), 1, "deduplicated across targets within the tick");

	a.set_x(5.0);
	scheduler.run_tick();
	assert_eq!(runs.get(), 2, "next tick runs it again");
}

#[test]
fn or_pattern_fires_on_either_event_and_only_then() {
	let scheduler = Scheduler::new();
	let point = Point::new(&scheduler);

	let events: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
	let events_in_handler = Rc::clone(&events);
	point.observable.on(
		"x|y",
		handler(move |notes| {
			events_in_handler
				.borrow_mut()
				.push(notes[0].event_name().unwrap_or("").to_string());
		}),
		HandlerOptions::new().with_immediate(false),
	);

	point.set_y(1.0);
	scheduler.run_tick();
	assert_eq!(*events.borrow(), vec!["x|y"]);

	// A tick in which neither fires produces nothing: trigger an unrelated
	// observable so there is a tick at all.
	let other = Point::new(&scheduler);
	other.set_x(1.0);
	scheduler.run_tick();
	assert_eq!(events.borrow().len(), 1);
}

#[test]
fn and_pattern_requires_both_events_in_the_same_tick() {
	let scheduler = Scheduler::new();
	let point = Point::new(&scheduler);

	let runs = Rc::new(Cell::new(0));
	let runs_in_handler = Rc::clone(&runs);
	point.observable.on(
		"x&y",
		handler(move |notes| {
			assert_eq!(notes[0].parts.len(), 2);
			runs_in_handler.set(runs_in_handler.get() + 1);
		}),
		HandlerOptions::new().with_immediate(false),
	);

	// Split across two ticks: never satisfied, the cache is cleared per tick.
	point.set_x(1.0);
	scheduler.run_tick();
	point.set_y(1.0);
	scheduler.run_tick();
	assert_eq!(runs.get(), 0);

	// Same tick: satisfied.
	point.set_x(2.0);
	point.set_y(2.0);
	scheduler.run_tick();
	assert_eq!(runs.get(), 1);
}

#[test]
fn debounce_collapses_a_burst_into_one_trailing_invocation() {
	let scheduler = Scheduler::new();
	let point = Point::new(&scheduler);

	let calls: Rc<RefCell<Vec<serde_json::Value>>> = Rc::new(RefCell::new(Vec::new()));
	let calls_in_handler = Rc::clone(&calls);
	point.observable.on(
		"x",
		handler(move |notes| {
			let old = notes[0].records[0].old.clone().unwrap();
			calls_in_handler.borrow_mut().push(old);
		}),
		HandlerOptions::new()
			.with_debounce(Duration::from_millis(50))
			.with_immediate(false),
	);

	let burst_start = Instant::now();
	for step in 1..=10 {
		point.set_x(step as f64);
		scheduler.run_tick();
	}
	let burst_end = Instant::now();

	assert!(calls.borrow().is_empty(), "nothing fires while the burst is live");
	// The trailing deadline tracks the last attempt of the burst.
	let deadline = scheduler.next_timer_deadline().expect("timer armed");
	assert!(deadline >= burst_start + Duration::from_millis(50));
	assert!(deadline <= burst_end + Duration::from_millis(50));

	assert_eq!(scheduler.poll_timers(deadline - Duration::from_millis(1)), 0);
	assert_eq!(scheduler.poll_timers(deadline), 1);

	// Last attempt's arguments won: the tenth change, old value 9.
	assert_eq!(*calls.borrow(), vec![json!(9.0)]);

	// No residue: nothing else ever fires.
	assert_eq!(scheduler.poll_timers(deadline + Duration::from_secs(60)), 0);
}

#[test]
fn unbind_all_tears_down_every_binding() {
	let scheduler = Scheduler::new();
	let a = Point::new(&scheduler);
	let b = Point::new(&scheduler);
	let binder = Observable::with_scheduler(&SEGMENT_EVENTS, &scheduler);
	binder.ready();

	let runs = Rc::new(Cell::new(0));
	let runs_in_handler = Rc::clone(&runs);
	binder.bind(
		&[(a.observable.clone(), "any"), (b.observable.clone(), "any")],
		handler(move |_| runs_in_handler.set(runs_in_handler.get() + 1)),
		HandlerOptions::new().with_immediate(false),
	);

	binder.unbind_all();

	a.set_x(1.0);
	b.set_y(2.0);
	scheduler.run_tick();
	assert_eq!(runs.get(), 0);
	assert_eq!(a.observable.handler_count(), 0);
	assert_eq!(b.observable.handler_count(), 0);
}

#[test]
fn muted_changes_stamp_but_deliver_nothing_even_after_unmute() {
	let scheduler = Scheduler::new();
	let point = Point::new(&scheduler);

	let runs = Rc::new(Cell::new(0));
	let runs_in_handler = Rc::clone(&runs);
	point.observable.on(
		"any",
		handler(move |_| runs_in_handler.set(runs_in_handler.get() + 1)),
		HandlerOptions::new().with_immediate(false),
	);

	let stamp_before = point.observable.stamp().unwrap();
	point.observable.mute();
	point.set_x(1.0);

	assert!(point.observable.stamp().unwrap() > stamp_before);
	scheduler.run_tick();
	assert_eq!(runs.get(), 0);

	point.observable.unmute();
	scheduler.run_tick();
	assert_eq!(runs.get(), 0, "muted changes are not delivered retroactively");
}

#[test]
fn bindings_complete_before_listeners_within_one_flush() {
	let scheduler = Scheduler::new();
	let point = Point::new(&scheduler);
	let binder = Observable::with_scheduler(&SEGMENT_EVENTS, &scheduler);
	binder.ready();

	let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

	let order_for_listener = Rc::clone(&order);
	point.observable.on(
		"x",
		handler(move |_| order_for_listener.borrow_mut().push("listener")),
		HandlerOptions::new().with_immediate(false),
	);

	let order_for_binding = Rc::clone(&order);
	binder.bind(
		&[(point.observable.clone(), "x")],
		handler(move |_| order_for_binding.borrow_mut().push("binding")),
		HandlerOptions::new().with_immediate(false),
	);

	point.set_x(1.0);
	scheduler.run_tick();

	assert_eq!(*order.borrow(), vec!["binding", "listener"]);
}

#[test]
fn derived_length_recomputes_through_a_two_hop_cascade_in_one_tick() {
	let scheduler = Scheduler::new();
	let start = Point::new(&scheduler);
	let end = Point::new(&scheduler);
	let segment = Segment::between(&scheduler, &start, &end);

	// Second hop: a listener on the derived value.
	let lengths_seen: Rc<RefCell<Vec<f64>>> = Rc::new(RefCell::new(Vec::new()));
	let lengths_in_handler = Rc::clone(&lengths_seen);
	let length_for_listener = Rc::clone(&segment.length);
	segment.observable.on(
		"length",
		handler(move |_| lengths_in_handler.borrow_mut().push(length_for_listener.get())),
		HandlerOptions::new().with_immediate(false),
	);

	end.set_x(3.0);
	end.set_y(4.0);
	scheduler.run_tick();

	assert_eq!(segment.length.get(), 5.0);
	assert_eq!(
		*lengths_seen.borrow(),
		vec![5.0],
		"point → segment recompute → length listener, all in one tick"
	);
}

#[test]
fn mutual_updates_re_enqueue_instead_of_recursing_and_terminate() {
	let scheduler = Scheduler::new();
	let a = Point::new(&scheduler);
	let b = Point::new(&scheduler);
	let left = Observable::with_scheduler(&SEGMENT_EVENTS, &scheduler);
	let right = Observable::with_scheduler(&SEGMENT_EVENTS, &scheduler);
	left.ready();
	right.ready();

	let a_to_b = Rc::new(Cell::new(0));
	let b_to_a = Rc::new(Cell::new(0));

	let count = Rc::clone(&a_to_b);
	let follower = b.clone();
	left.bind(
		&[(a.observable.clone(), "x")],
		handler(move |_| {
			count.set(count.get() + 1);
			follower.set_x(follower.x.get() + 1.0);
		}),
		HandlerOptions::new().with_immediate(false),
	);

	let count = Rc::clone(&b_to_a);
	let follower = a.clone();
	right.bind(
		&[(b.observable.clone(), "x")],
		handler(move |_| {
			count.set(count.get() + 1);
			follower.set_x(follower.x.get() + 1.0);
		}),
		HandlerOptions::new().with_immediate(false),
	);

	a.set_x(1.0);
	scheduler.run_tick();

	// Each direction ran exactly once this tick; the second mutation of `a`
	// re-enqueued its flush, where the already-marked handler was skipped.
	assert_eq!(a_to_b.get(), 1);
	assert_eq!(b_to_a.get(), 1);
	assert!(!scheduler.tick_requested());
	assert_eq!(scheduler.pending_flushes(), 0);
}

#[test]
fn first_flushed_target_gets_the_real_notification_other_slots_stay_empty() {
	let scheduler = Scheduler::new();
	let a = Point::new(&scheduler);
	let b = Point::new(&scheduler);
	let binder = Observable::with_scheduler(&SEGMENT_EVENTS, &scheduler);
	binder.ready();

	let slots: Rc<RefCell<Vec<(bool, bool)>>> = Rc::new(RefCell::new(Vec::new()));
	let slots_in_handler = Rc::clone(&slots);
	binder.bind(
		&[(a.observable.clone(), "x"), (b.observable.clone(), "x")],
		handler(move |notes| {
			slots_in_handler
				.borrow_mut()
				.push((notes[0].is_empty(), notes[1].is_empty()));
		}),
		HandlerOptions::new().with_immediate(false),
	);

	// Both fire in the same burst; `a` was scheduled first, so its flush
	// delivers the one real notification even though `b` changed too.
	a.set_x(1.0);
	b.set_x(2.0);
	scheduler.run_tick();

	assert_eq!(*slots.borrow(), vec![(false, true)]);
}

#[test]
fn collection_records_carry_slot_qualifiers() {
	let scheduler = Scheduler::new();
	let list = Observable::with_scheduler(&COLLECTION_EVENTS, &scheduler);
	list.ready();

	let seen: Rc<RefCell<Vec<Option<SlotKey>>>> = Rc::new(RefCell::new(Vec::new()));
	let seen_in_handler = Rc::clone(&seen);
	list.on(
		"item_added",
		handler(move |notes| {
			seen_in_handler.borrow_mut().push(notes[0].slot.clone());
		}),
		HandlerOptions::new().with_immediate(false),
	);

	list.trigger(
		list.change("item_added")
			.unwrap()
			.with_slot(SlotKey::Index(3)),
	);
	scheduler.run_tick();

	assert_eq!(*seen.borrow(), vec![Some(SlotKey::Index(3))]);
}

#[test]
fn wake_hook_fires_once_for_a_whole_burst() {
	let scheduler = Scheduler::new();
	let wakes = Rc::new(Cell::new(0));
	let wakes_in_hook = Rc::clone(&wakes);
	scheduler.set_wake_hook(move || wakes_in_hook.set(wakes_in_hook.get() + 1));

	let a = Point::new(&scheduler);
	let b = Point::new(&scheduler);
	a.set_x(1.0);
	a.set_y(2.0);
	b.set_x(3.0);
	assert_eq!(wakes.get(), 1, "coalesced: one wake for the burst");

	scheduler.run_tick();
	a.set_x(9.0);
	assert_eq!(wakes.get(), 2, "next burst wakes again");
	scheduler.run_tick();
}

#[test]
#[serial]
fn observables_default_to_the_thread_scheduler() {
	let point = Observable::new(&POINT_EVENTS);
	point.ready();

	let runs = Rc::new(Cell::new(0));
	let runs_in_handler = Rc::clone(&runs);
	point.on(
		"x",
		handler(move |_| runs_in_handler.set(runs_in_handler.get() + 1)),
		HandlerOptions::new().with_immediate(false),
	);

	point.trigger(point.change("x").unwrap());
	Scheduler::thread_default().run_tick();
	assert_eq!(runs.get(), 1);
	assert!(point.scheduler().same_instance(&Scheduler::thread_default()));
}

#[test]
fn or_notification_lists_every_fired_constituent() {
	let scheduler = Scheduler::new();
	let point = Point::new(&scheduler);

	let parts: Rc<RefCell<Vec<Vec<String>>>> = Rc::new(RefCell::new(Vec::new()));
	let parts_in_handler = Rc::clone(&parts);
	point.observable.on(
		"x|y",
		handler(move |notes| {
			let names = notes[0]
				.parts
				.iter()
				.filter_map(Notification::event_name)
				.map(str::to_string)
				.collect();
			parts_in_handler.borrow_mut().push(names);
		}),
		HandlerOptions::new().with_immediate(false),
	);

	point.set_y(1.0);
	point.set_x(2.0);
	scheduler.run_tick();

	// Both fired: both constituents present, in table declaration order.
	assert_eq!(*parts.borrow(), vec![vec!["x".to_string(), "y".to_string()]]);
}
