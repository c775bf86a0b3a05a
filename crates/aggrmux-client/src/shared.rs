use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::dispatcher::Completion;
use crate::error::{ClientError, Result};
use crate::load::LoadController;
use crate::response::{Continuation, Response, Unavailable};
use crate::slots::{PendingCall, SlotPool};

/// State shared by the caller-facing client and its four loops.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) timeout_ticks: u32,
    pub(crate) pool: SlotPool,
    pub(crate) load: LoadController,
    pub(crate) connection: Connection,
    pub(crate) send_tx: Sender<PendingCall>,
    pub(crate) send_rx: Receiver<PendingCall>,
    pub(crate) dispatch_tx: Sender<Completion>,
    pub(crate) dispatch_rx: Receiver<Completion>,
    /// Disconnects when the client starts shutting down.
    pub(crate) shutdown_rx: Receiver<()>,
    shutdown: AtomicBool,
    tick: AtomicU32,
}

impl Shared {
    pub(crate) fn new(config: ClientConfig, connection: Connection, shutdown_rx: Receiver<()>) -> Self {
        let (send_tx, send_rx) = unbounded();
        let (dispatch_tx, dispatch_rx) = unbounded();
        Self {
            timeout_ticks: config.timeout_ticks(),
            pool: SlotPool::new(config.slots),
            load: LoadController::new(config.slots),
            config,
            connection,
            send_tx,
            send_rx,
            dispatch_tx,
            dispatch_rx,
            shutdown_rx,
            shutdown: AtomicBool::new(false),
            tick: AtomicU32::new(0),
        }
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Set the shutdown flag. Returns true for the first caller only.
    pub(crate) fn begin_shutdown(&self) -> bool {
        !self.shutdown.swap(true, Ordering::SeqCst)
    }

    /// Fail fast if new calls can no longer be served.
    pub(crate) fn check_open(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(ClientError::ShutDown);
        }
        if self.connection.is_broken() {
            return Err(ClientError::Disconnected(
                "aggregation connection lost".to_string(),
            ));
        }
        Ok(())
    }

    /// Current sweep tick.
    pub(crate) fn now(&self) -> u32 {
        self.tick.load(Ordering::Acquire)
    }

    pub(crate) fn advance_tick(&self) -> u32 {
        self.tick.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Hand a resolved call to the dispatcher.
    pub(crate) fn deliver(&self, continuation: Continuation, response: Response) {
        let completion = Completion {
            continuation,
            response,
        };
        // The receiving end lives in `self`, so this only fails if it was
        // dropped mid-teardown; run the continuation inline then.
        if let Err(err) = self.dispatch_tx.send(completion) {
            err.into_inner().invoke();
        }
    }

    /// Resolve a call that never made it onto the wire.
    pub(crate) fn fail_pending(&self, call: PendingCall, reason: Unavailable) {
        self.deliver(call.continuation, Response::Unavailable(reason));
        self.pool.release(call.slot);
    }

    /// Tear the connection down after a transport error.
    ///
    /// The socket is shut down once; every awaiting call is failed each time
    /// this runs, so calls staged concurrently with the first failure are
    /// still caught by a later one.
    pub(crate) fn fail_connection(&self, cause: &dyn Display) {
        if self.connection.mark_broken() {
            warn!(error = %cause, "aggregation connection failed");
            self.connection.close();
        } else {
            debug!(error = %cause, "aggregation connection already failed");
        }

        let failed = self.fail_in_flight(Unavailable::ConnectionLost);
        if failed > 0 {
            warn!(calls = failed, "failed in-flight calls after connection loss");
        }
    }

    /// Resolve every in-flight call with `reason`. Returns how many were failed.
    pub(crate) fn fail_in_flight(&self, reason: Unavailable) -> usize {
        let claimed = self.pool.claim_all();
        let count = claimed.len();
        for (slot, continuation) in claimed {
            self.deliver(continuation, Response::Unavailable(reason));
            self.pool.release(slot);
        }
        count
    }

    /// Fail every queued call and run its continuation on this thread.
    ///
    /// Used once the dispatcher may already be gone.
    pub(crate) fn fail_queued_inline(&self, reason: Unavailable) -> usize {
        let mut failed = 0usize;
        for call in self.send_rx.try_iter() {
            self.pool.release(call.slot);
            Completion {
                continuation: call.continuation,
                response: Response::Unavailable(reason),
            }
            .invoke();
            failed += 1;
        }
        failed
    }

    /// Resolve whatever is still outstanding once every loop has stopped.
    pub(crate) fn drain_after_shutdown(&self) -> usize {
        let mut failed = self.fail_in_flight(Unavailable::ShutDown);
        failed += self.fail_queued_inline(Unavailable::ShutDown);
        for completion in self.dispatch_rx.try_iter() {
            completion.invoke();
        }
        failed
    }
}
