use std::sync::Arc;

use crossbeam_channel::{select, tick, Receiver, Sender};
use tracing::{debug, info};

use crate::response::{Response, Unavailable};
use crate::shared::Shared;
use crate::slots::PendingCall;

/// Advances the tick counter every sweep interval and fails calls that have
/// waited longer than the receive timeout, in flight or still queued.
pub(crate) fn run(shared: Arc<Shared>) {
    debug!(interval = ?shared.config.sweep_interval, "sweeper started");
    let ticker = tick(shared.config.sweep_interval);
    loop {
        select! {
            recv(ticker) -> _ => {
                if shared.is_shut_down() {
                    break;
                }
                sweep(&shared);
            },
            recv(shared.shutdown_rx) -> _ => break,
        }
    }
    debug!("sweeper stopped");
}

/// One sweep pass. Returns the number of calls timed out.
fn sweep(shared: &Shared) -> usize {
    let now = shared.advance_tick();
    let limit = shared.timeout_ticks;
    let mut expired = 0usize;

    for index in 0..shared.pool.capacity() {
        if let Some(continuation) = shared.pool.expire(index, now, limit) {
            shared.deliver(continuation, Response::Unavailable(Unavailable::TimedOut));
            shared.pool.release(index as u16);
            expired += 1;
        }
    }

    for call in expire_queued(&shared.send_rx, &shared.send_tx, now, limit) {
        shared.fail_pending(call, Unavailable::TimedOut);
        expired += 1;
    }

    if expired > 0 {
        info!(calls = expired, tick = now, "timed out calls");
    }
    expired
}

/// Rotate through the send queue once, taking out calls older than `limit`
/// ticks and putting the rest back in order.
fn expire_queued(
    queue: &Receiver<PendingCall>,
    requeue: &Sender<PendingCall>,
    now: u32,
    limit: u32,
) -> Vec<PendingCall> {
    let mut stale = Vec::new();
    for _ in 0..queue.len() {
        let Ok(call) = queue.try_recv() else {
            break;
        };
        if now.wrapping_sub(call.created) > limit {
            stale.push(call);
        } else if let Err(err) = requeue.send(call) {
            stale.push(err.into_inner());
        }
    }
    stale
}

#[cfg(test)]
mod tests {
    use std::io::{ErrorKind, Read};
    use std::time::Duration;

    use super::*;
    use crate::shared::testing::{loopback, queued_call};

    #[test]
    fn expire_queued_keeps_fresh_calls_in_order() {
        let (shared, _peer) = loopback();
        let (old, _) = queued_call(&shared, 0);
        let (fresh_a, _) = queued_call(&shared, 8);
        let (fresh_b, _) = queued_call(&shared, 9);
        let fresh_slots = [fresh_a.slot, fresh_b.slot];
        for call in [fresh_a, old, fresh_b] {
            shared.send_tx.send(call).unwrap();
        }

        let stale = expire_queued(&shared.send_rx, &shared.send_tx, 10, 3);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].created, 0);

        let kept: Vec<u16> = shared.send_rx.try_iter().map(|call| call.slot).collect();
        assert_eq!(kept, fresh_slots);
    }

    #[test]
    fn sweep_times_out_queued_calls_without_writing() {
        let (shared, mut peer) = loopback();
        let (old, old_rx) = queued_call(&shared, 0);
        let (fresh, fresh_rx) = queued_call(&shared, 0);
        shared.send_tx.send(old).unwrap();

        // Timeout is 3 ticks: nothing expires until the fourth sweep.
        for _ in 0..3 {
            assert_eq!(sweep(&shared), 0);
        }
        shared.send_tx.send(PendingCall { created: 3, ..fresh }).unwrap();
        assert_eq!(sweep(&shared), 1);

        for completion in shared.dispatch_rx.try_iter() {
            completion.invoke();
        }
        assert_eq!(
            old_rx.try_recv().unwrap(),
            Response::Unavailable(Unavailable::TimedOut)
        );
        assert!(fresh_rx.try_recv().is_err());
        assert_eq!(shared.send_rx.len(), 1);
        assert_eq!(shared.pool.in_use(), 1);

        peer.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
        let mut buf = [0u8; 1];
        let err = peer.read(&mut buf).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut));
        assert_eq!(shared.connection.sent(), 0);
    }

    #[test]
    fn sweep_times_out_in_flight_calls_once() {
        let (shared, _peer) = loopback();
        let (call, rx) = queued_call(&shared, 0);
        let salt = shared.pool.next_salt();
        shared
            .pool
            .occupy(call.slot, salt, call.created, call.continuation);

        for _ in 0..3 {
            assert_eq!(sweep(&shared), 0);
        }
        assert_eq!(sweep(&shared), 1);
        assert_eq!(sweep(&shared), 0);

        for completion in shared.dispatch_rx.try_iter() {
            completion.invoke();
        }
        assert_eq!(
            rx.try_recv().unwrap(),
            Response::Unavailable(Unavailable::TimedOut)
        );
        assert_eq!(shared.pool.in_use(), 0);
        assert!(shared.pool.complete(call.slot, salt).is_none());
    }
}
