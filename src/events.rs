use crate::types::events::Event;
use log::error;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

static NEXT_HANDLER_ID: AtomicU32 = AtomicU32::new(1);

thread_local! {
    // Ids of the handlers currently executing on this thread.
    static IN_FLIGHT: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
}

pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &Event);
}

impl<F> EventHandler for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle_event(&self, event: &Event) {
        self(event)
    }
}

struct Registration {
    id: u32,
    handler: Arc<dyn EventHandler>,
    removed: AtomicBool,
    // Held shared for each invocation; `remove` takes it exclusively to wait them out.
    gate: RwLock<()>,
}

/// Fan-out of [`Event`]s to dynamically registered handlers.
///
/// Handlers run synchronously on the dispatching thread in registration
/// order. Each dispatch works on a snapshot of the list, so handlers may
/// add or remove handlers (themselves included) while being invoked.
/// A panicking handler is logged and skipped; the remaining handlers still
/// see the event.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<Vec<Arc<Registration>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` and returns the id to remove it with.
    pub fn add(&self, handler: Arc<dyn EventHandler>) -> u32 {
        let id = NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(Registration {
                id,
                handler,
                removed: AtomicBool::new(false),
                gate: RwLock::new(()),
            }));
        id
    }

    /// Unregisters the handler with the given id.
    ///
    /// Once this returns the handler is not running and will not run again,
    /// except when called from inside that handler's own invocation, which
    /// is allowed to finish. Returns false for unknown ids.
    pub fn remove(&self, id: u32) -> bool {
        let registration = {
            let mut handlers = self
                .handlers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(pos) = handlers.iter().position(|r| r.id == id) else {
                return false;
            };
            handlers.remove(pos)
        };
        retire(&registration);
        true
    }

    /// Unregisters every handler. Returns how many were removed.
    pub fn remove_all(&self) -> usize {
        let removed = std::mem::take(
            &mut *self
                .handlers
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for registration in &removed {
            retire(registration);
        }
        removed.len()
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dispatch(&self, event: &Event) {
        let snapshot = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for registration in snapshot {
            let _gate = registration
                .gate
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if registration.removed.load(Ordering::SeqCst) {
                continue;
            }

            IN_FLIGHT.with(|ids| ids.borrow_mut().push(registration.id));
            let _in_flight = scopeguard::guard(registration.id, |id| {
                IN_FLIGHT.with(|ids| {
                    let mut ids = ids.borrow_mut();
                    if let Some(pos) = ids.iter().rposition(|i| *i == id) {
                        ids.remove(pos);
                    }
                });
            });

            let handler = &registration.handler;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.handle_event(event))) {
                error!(
                    target: "Client/Events",
                    "Event handler {} panicked while handling {} event: {}\n{}",
                    registration.id,
                    event.kind(),
                    panic_message(payload.as_ref()),
                    Backtrace::force_capture()
                );
            }
        }
    }
}

fn retire(registration: &Registration) {
    registration.removed.store(true, Ordering::SeqCst);
    let removing_self = IN_FLIGHT.with(|ids| ids.borrow().contains(&registration.id));
    if !removing_self {
        drop(
            registration
                .gate
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
