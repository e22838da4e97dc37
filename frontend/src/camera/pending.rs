//! Ownership of a hardware grant whose request may be abandoned.
//!
//! A browser media request cannot be cancelled. When the awaiting future is
//! dropped (timeout, shutdown) the grant still arrives later and has to be
//! released by whoever sees it first.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct Slot<T> {
    abandoned: Cell<bool>,
    arrived: RefCell<Option<T>>,
    release: Box<dyn Fn(&T)>,
}

/// Held by the awaiting side. Dropping it unclaimed abandons the grant.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
pub(crate) struct PendingGrant<T> {
    slot: Rc<Slot<T>>,
    claimed: bool,
}

/// Held by a detached watcher of the underlying request.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
pub(crate) struct GrantWatcher<T> {
    slot: Rc<Slot<T>>,
}

#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
impl<T> PendingGrant<T> {
    pub(crate) fn new(release: impl Fn(&T) + 'static) -> (Self, GrantWatcher<T>) {
        let slot = Rc::new(Slot {
            abandoned: Cell::new(false),
            arrived: RefCell::new(None),
            release: Box::new(release),
        });
        (
            Self {
                slot: slot.clone(),
                claimed: false,
            },
            GrantWatcher { slot },
        )
    }

    /// The awaiting side took the grant; the watcher's copy is dropped.
    pub(crate) fn claim(mut self) {
        self.claimed = true;
        self.slot.arrived.take();
    }
}

impl<T> Drop for PendingGrant<T> {
    fn drop(&mut self) {
        if self.claimed {
            return;
        }
        self.slot.abandoned.set(true);
        if let Some(grant) = self.slot.arrived.take() {
            (self.slot.release)(&grant);
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
impl<T> GrantWatcher<T> {
    /// Reports the grant. Released at once if the request was abandoned.
    pub(crate) fn resolved(self, grant: T) {
        if self.slot.abandoned.get() {
            log::debug!("releasing camera grant that arrived after its request was dropped");
            (self.slot.release)(&grant);
        } else {
            self.slot.arrived.replace(Some(grant));
        }
    }
}
