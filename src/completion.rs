use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Http2Error;

/// A deferred write outcome.
///
/// Every write admitted by the engine returns one of these; whoever finishes
/// the write (the transport, usually) resolves it. The engine inspects
/// resolved handles at the end of each entry point and on `drive()`, so a
/// handle completed outside an engine call takes effect on the next call.
/// The holder of a clone may also fail the handle to cancel the write; the
/// failure is routed through error classification.
#[derive(Debug, Clone)]
pub struct Completion {
    inner: Rc<RefCell<State>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Pending,
    Succeeded,
    Failed(Http2Error),
}

impl Completion {
    pub fn pending() -> Completion {
        Completion {
            inner: Rc::new(RefCell::new(State::Pending)),
        }
    }

    pub fn succeeded() -> Completion {
        Completion {
            inner: Rc::new(RefCell::new(State::Succeeded)),
        }
    }

    pub fn failed(err: Http2Error) -> Completion {
        Completion {
            inner: Rc::new(RefCell::new(State::Failed(err))),
        }
    }

    /// Resolves the handle successfully. Ignored once resolved.
    pub fn succeed(&self) {
        let mut state = self.inner.borrow_mut();
        if *state == State::Pending {
            *state = State::Succeeded;
        }
    }

    /// Resolves the handle with a failure. Ignored once resolved.
    pub fn fail(&self, err: Http2Error) {
        let mut state = self.inner.borrow_mut();
        if *state == State::Pending {
            *state = State::Failed(err);
        }
    }

    pub fn is_pending(&self) -> bool {
        *self.inner.borrow() == State::Pending
    }

    pub fn is_succeeded(&self) -> bool {
        *self.inner.borrow() == State::Succeeded
    }

    pub fn is_failed(&self) -> bool {
        match *self.inner.borrow() {
            State::Failed(_) => true,
            _ => false,
        }
    }

    /// The failure, if the handle resolved with one.
    pub fn error(&self) -> Option<Http2Error> {
        match *self.inner.borrow() {
            State::Failed(ref err) => Some(err.clone()),
            _ => None,
        }
    }
}
