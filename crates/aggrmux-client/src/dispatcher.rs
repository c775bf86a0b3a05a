use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::select;
use tracing::{debug, error};

use crate::response::{Continuation, Response};
use crate::shared::Shared;

/// A resolved call waiting to have its continuation run.
pub(crate) struct Completion {
    pub(crate) continuation: Continuation,
    pub(crate) response: Response,
}

impl Completion {
    /// Run the continuation. A panic is logged and contained.
    pub(crate) fn invoke(self) {
        let Self {
            continuation,
            response,
        } = self;
        if catch_unwind(AssertUnwindSafe(move || continuation(response))).is_err() {
            error!("continuation panicked; dispatch continues");
        }
    }
}

/// Runs continuations one at a time so no I/O loop ever executes user code.
pub(crate) fn run(shared: Arc<Shared>) {
    debug!("dispatcher started");
    loop {
        if shared.is_shut_down() {
            break;
        }
        select! {
            recv(shared.dispatch_rx) -> completion => match completion {
                Ok(completion) => completion.invoke(),
                Err(_) => break,
            },
            recv(shared.shutdown_rx) -> _ => break,
        }
    }

    // Calls resolved before shutdown still get their callback.
    for completion in shared.dispatch_rx.try_iter() {
        completion.invoke();
    }
    debug!("dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;

    use super::*;
    use crate::response::Unavailable;

    #[test]
    fn invoke_passes_response() {
        let (tx, rx) = crossbeam_channel::unbounded();
        Completion {
            continuation: Box::new(move |response| {
                let _ = tx.send(response);
            }),
            response: Response::Payload(Bytes::from_static(b"pong")),
        }
        .invoke();
        assert_eq!(
            rx.try_recv().unwrap(),
            Response::Payload(Bytes::from_static(b"pong"))
        );
    }

    #[test]
    fn panicking_continuation_is_contained() {
        let after = Arc::new(AtomicUsize::new(0));

        Completion {
            continuation: Box::new(|_| panic!("boom")),
            response: Response::Unavailable(Unavailable::TimedOut),
        }
        .invoke();

        let counter = Arc::clone(&after);
        Completion {
            continuation: Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            response: Response::Unavailable(Unavailable::TimedOut),
        }
        .invoke();
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }
}
