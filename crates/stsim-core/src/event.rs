//! Typed, synchronous simulation events.
//!
//! The driver emits events at fixed points of a run. Each emit is delivered
//! immediately to the listeners registered for its kind, so a listener
//! observes the simulation exactly at the emitting point.
//!
//! # Ordering
//!
//! Listeners run sorted by `(priority, registration order)`. A listener may
//! carry a filter predicate; events it rejects are skipped for that
//! listener only.
//!
//! # Suppression
//!
//! A suppressed kind is never delivered. An unsuppressed kind with no
//! listeners is an explicit no-op, and [`EventBus::wants`] lets the driver
//! skip building such events altogether.

use crate::id::*;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    BeginModelRun {
        min_iteration: i32,
        max_iteration: i32,
    },
    CellsInitialized {
        iteration: i32,
        cells: usize,
    },
    /// Emitted for every cell with a deterministic transition, before any
    /// group is processed.
    CellBeforeTransitions {
        cell: CellId,
        iteration: i32,
        timestep: i32,
    },
    ChangingCellProbabilistic {
        cell: CellId,
        transition_type: TransitionTypeId,
        from: StateClassId,
        to: StateClassId,
        iteration: i32,
        timestep: i32,
    },
    ChangingCellDeterministic {
        cell: CellId,
        from: StateClassId,
        to: StateClassId,
        iteration: i32,
        timestep: i32,
    },
    ApplyingSpatialTransitions {
        iteration: i32,
        timestep: i32,
    },
    ApplyingTransitionMultipliers {
        group: TransitionGroupId,
        iteration: i32,
        timestep: i32,
    },
    ModelRunComplete,
}

/// Discriminant tag for event types, used for subscription and suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeginModelRun,
    CellsInitialized,
    CellBeforeTransitions,
    ChangingCellProbabilistic,
    ChangingCellDeterministic,
    ApplyingSpatialTransitions,
    ApplyingTransitionMultipliers,
    ModelRunComplete,
}

const EVENT_KIND_COUNT: usize = 8;

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::BeginModelRun { .. } => EventKind::BeginModelRun,
            Event::CellsInitialized { .. } => EventKind::CellsInitialized,
            Event::CellBeforeTransitions { .. } => EventKind::CellBeforeTransitions,
            Event::ChangingCellProbabilistic { .. } => EventKind::ChangingCellProbabilistic,
            Event::ChangingCellDeterministic { .. } => EventKind::ChangingCellDeterministic,
            Event::ApplyingSpatialTransitions { .. } => EventKind::ApplyingSpatialTransitions,
            Event::ApplyingTransitionMultipliers { .. } => EventKind::ApplyingTransitionMultipliers,
            Event::ModelRunComplete => EventKind::ModelRunComplete,
        }
    }
}

impl EventKind {
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// A read-only event listener.
pub type Listener = Box<dyn FnMut(&Event)>;

/// Optional predicate that filters events for a listener.
pub type EventFilter = Box<dyn Fn(&Event) -> bool>;

/// Priority level for listeners. Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubscriberPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

struct ListenerEntry {
    listener: Listener,
    priority: SubscriberPriority,
    filter: Option<EventFilter>,
    insertion_order: u64,
}

impl std::fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("priority", &self.priority)
            .field("filtered", &self.filter.is_some())
            .field("insertion_order", &self.insertion_order)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Listener lists and suppression flags, one slot per event kind.
#[derive(Debug, Default)]
pub struct EventBus {
    listeners: [Vec<ListenerEntry>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    /// Events delivered per kind.
    delivered: [u64; EVENT_KIND_COUNT],
    next_insertion_order: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener with Normal priority and no filter.
    pub fn subscribe(&mut self, kind: EventKind, listener: Listener) {
        self.subscribe_filtered(kind, SubscriberPriority::Normal, None, listener);
    }

    /// Register a listener with explicit priority and optional filter.
    pub fn subscribe_filtered(
        &mut self,
        kind: EventKind,
        priority: SubscriberPriority,
        filter: Option<EventFilter>,
        listener: Listener,
    ) {
        let order = self.next_insertion_order;
        self.next_insertion_order += 1;
        let list = &mut self.listeners[kind.index()];
        list.push(ListenerEntry {
            listener,
            priority,
            filter,
            insertion_order: order,
        });
        list.sort_by_key(|e| (e.priority, e.insertion_order));
    }

    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Whether emitting `kind` would reach anyone.
    pub fn wants(&self, kind: EventKind) -> bool {
        !self.suppressed[kind.index()] && !self.listeners[kind.index()].is_empty()
    }

    /// Deliver an event to its listeners now.
    pub fn emit(&mut self, event: Event) {
        let idx = event.kind().index();
        if !self.wants(event.kind()) {
            return;
        }
        for entry in &mut self.listeners[idx] {
            if let Some(ref filter) = entry.filter
                && !filter(&event)
            {
                continue;
            }
            (entry.listener)(&event);
        }
        self.delivered[idx] += 1;
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners[kind.index()].len()
    }

    pub fn delivered_count(&self, kind: EventKind) -> u64 {
        self.delivered[kind.index()]
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn changing(cell: i32) -> Event {
        Event::ChangingCellProbabilistic {
            cell: CellId(cell),
            transition_type: TransitionTypeId(1),
            from: StateClassId(1),
            to: StateClassId(2),
            iteration: 1,
            timestep: 1,
        }
    }

    #[test]
    fn emit_without_listeners_is_noop() {
        let mut bus = EventBus::new();
        assert!(!bus.wants(EventKind::ModelRunComplete));
        bus.emit(Event::ModelRunComplete);
        assert_eq!(bus.delivered_count(EventKind::ModelRunComplete), 0);
    }

    #[test]
    fn listeners_run_in_priority_then_registration_order() {
        let mut bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for (name, priority) in [
            ("normal-a", SubscriberPriority::Normal),
            ("post", SubscriberPriority::Post),
            ("pre", SubscriberPriority::Pre),
            ("normal-b", SubscriberPriority::Normal),
        ] {
            let log = log.clone();
            bus.subscribe_filtered(
                EventKind::ModelRunComplete,
                priority,
                None,
                Box::new(move |_| log.borrow_mut().push(name)),
            );
        }
        bus.emit(Event::ModelRunComplete);
        assert_eq!(*log.borrow(), vec!["pre", "normal-a", "normal-b", "post"]);
    }

    #[test]
    fn filter_skips_rejected_events() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        bus.subscribe_filtered(
            EventKind::ChangingCellProbabilistic,
            SubscriberPriority::Normal,
            Some(Box::new(|e| matches!(e, Event::ChangingCellProbabilistic { cell, .. } if cell.0 % 2 == 0))),
            Box::new(move |e| s.borrow_mut().push(e.clone())),
        );
        bus.emit(changing(1));
        bus.emit(changing(2));
        assert_eq!(*seen.borrow(), vec![changing(2)]);
    }

    #[test]
    fn suppressed_kind_not_delivered() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        bus.subscribe(EventKind::ChangingCellProbabilistic, Box::new(move |_| *c.borrow_mut() += 1));
        bus.suppress(EventKind::ChangingCellProbabilistic);
        bus.emit(changing(1));
        assert_eq!(*count.borrow(), 0);
        assert!(bus.is_suppressed(EventKind::ChangingCellProbabilistic));
    }

    #[test]
    fn kinds_are_independent() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        bus.subscribe(EventKind::CellsInitialized, Box::new(move |_| *c.borrow_mut() += 1));
        bus.emit(Event::ModelRunComplete);
        bus.emit(Event::CellsInitialized { iteration: 1, cells: 4 });
        assert_eq!(*count.borrow(), 1);
        assert_eq!(bus.delivered_count(EventKind::CellsInitialized), 1);
    }

    #[test]
    fn event_kind_discriminant() {
        assert_eq!(Event::ModelRunComplete.kind(), EventKind::ModelRunComplete);
        assert_eq!(changing(3).kind(), EventKind::ChangingCellProbabilistic);
        assert_eq!(
            Event::ApplyingTransitionMultipliers {
                group: TransitionGroupId(1),
                iteration: 1,
                timestep: 1
            }
            .kind(),
            EventKind::ApplyingTransitionMultipliers
        );
    }
}
