use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::dispatcher;
use crate::error::{ClientError, Result};
use crate::http::{encode_query_value, HttpRequest};
use crate::receiver::ReceiveLoop;
use crate::response::{Response, Unavailable};
use crate::sender::SendLoop;
use crate::shared::Shared;
use crate::slots::PendingCall;
use crate::sweeper;

const ALLOCATE_WAIT: Duration = Duration::from_millis(50);

/// Point-in-time counters for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStats {
    /// DATA frames written to the connection.
    pub requests_sent: u64,
    /// DATA frames read from the connection, matched or not.
    pub responses_received: u64,
    /// `requests_sent - responses_received`.
    pub outstanding: i64,
    /// Slots held by calls (queued or awaiting a response).
    pub in_flight: usize,
    /// Current load ceiling.
    pub ceiling: usize,
    /// Slots parked to enforce a lowered ceiling.
    pub withheld: usize,
    /// Total slots.
    pub capacity: usize,
}

/// Multiplexes many independent request/response calls over one TCP
/// connection to an aggregation endpoint.
///
/// Four threads run behind the handle: a sender batching queued requests, a
/// receiver routing responses by slot and salt, a sweeper timing calls out,
/// and a dispatcher running continuations. Every accepted call's
/// continuation runs exactly once, on the dispatcher thread.
///
/// ```no_run
/// use aggrmux_client::{AggregationClient, ClientConfig};
///
/// let client = AggregationClient::connect(ClientConfig::new("127.0.0.1", 8080, 9191))?;
/// client.submit_http("GET", "/hello", "", &[], |response| {
///     println!("{:?}", response.status_code());
/// })?;
/// # Ok::<(), aggrmux_client::ClientError>(())
/// ```
pub struct AggregationClient {
    shared: Arc<Shared>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl AggregationClient {
    /// Validate `config`, connect, handshake and start the loops.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let (connection, (reader, writer)) = Connection::open(&config)?;

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let shared = Arc::new(Shared::new(config, connection, shutdown_rx));

        let client = Self {
            shared: Arc::clone(&shared),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            threads: Mutex::new(Vec::with_capacity(4)),
        };

        let send_loop = SendLoop::new(Arc::clone(&shared), writer);
        let receive_loop = ReceiveLoop::new(Arc::clone(&shared), reader);
        let sweep_state = Arc::clone(&shared);
        let dispatch_state = Arc::clone(&shared);

        let spawned = [
            spawn("aggrmux-send", move || send_loop.run()),
            spawn("aggrmux-recv", move || receive_loop.run()),
            spawn("aggrmux-sweep", move || sweeper::run(sweep_state)),
            spawn("aggrmux-dispatch", move || dispatcher::run(dispatch_state)),
        ];
        for handle in spawned {
            match handle {
                Ok(handle) => client.threads.lock().push(handle),
                Err(err) => {
                    client.shutdown();
                    return Err(err);
                }
            }
        }

        info!(
            slots = shared.config.slots,
            timeout = ?shared.config.receive_timeout,
            tick = ?shared.config.sweep_interval,
            "aggregation client started"
        );
        Ok(client)
    }

    /// Queue one request. `continuation` runs exactly once with the response
    /// or a synthesized 503.
    ///
    /// Blocks while the load ceiling is reached. Fails without ever calling
    /// `continuation` if the request cannot fit the send buffer, the
    /// connection is gone, or the client is shut down.
    pub fn submit<F>(&self, request: impl Into<Bytes>, continuation: F) -> Result<()>
    where
        F: FnOnce(Response) + Send + 'static,
    {
        let request = request.into();
        let max = self.shared.config.max_request_size();
        if request.len() > max {
            return Err(ClientError::RequestTooLarge {
                size: request.len(),
                max,
            });
        }

        let slot = self.allocate()?;
        let call = PendingCall {
            slot,
            created: self.shared.now(),
            request,
            continuation: Box::new(continuation),
        };
        if let Err(err) = self.shared.send_tx.send(call) {
            self.shared.pool.release(err.into_inner().slot);
            return Err(ClientError::ShutDown);
        }
        // A shutdown that finished since `allocate` has already drained the
        // queue and will never see this call.
        if self.shared.is_shut_down() {
            self.shared.fail_queued_inline(Unavailable::ShutDown);
        }
        Ok(())
    }

    /// Like [`submit`](Self::submit), threading `context` through to the
    /// continuation.
    pub fn submit_with<C, F>(&self, request: impl Into<Bytes>, context: C, continuation: F) -> Result<()>
    where
        C: Send + 'static,
        F: FnOnce(C, Response) + Send + 'static,
    {
        self.submit(request, move |response| continuation(context, response))
    }

    /// Serialize an HTTP/1.1 request addressed to `host:data_port` and submit it.
    pub fn submit_http<F>(
        &self,
        method: &str,
        uri: &str,
        body: impl Into<Bytes>,
        headers: &[(&str, &str)],
        continuation: F,
    ) -> Result<()>
    where
        F: FnOnce(Response) + Send + 'static,
    {
        let mut request = HttpRequest::new(method, uri)
            .host(format!(
                "{}:{}",
                self.shared.config.host, self.shared.config.data_port
            ))
            .body(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.submit(request.to_bytes()?, continuation)
    }

    /// Report test results to the server's statistics endpoint. The response
    /// is ignored.
    pub fn report_statistics(&self, test_name: &str, ok: u64, failed: u64) -> Result<()> {
        let uri = format!(
            "/TestStats/AddStats?TestName={}&NumOk={ok}&NumFailed={failed}",
            encode_query_value(test_name)
        );
        self.submit_http("GET", &uri, Bytes::new(), &[], |_| {})
    }

    /// Raise the load ceiling by `percent` (10..=90, step 10). Returns the new ceiling.
    pub fn increase_load(&self, percent: u32) -> Result<usize> {
        self.shared.load.increase(percent)
    }

    /// Lower the load ceiling by `percent` (10..=90, step 10). Returns the new ceiling.
    pub fn decrease_load(&self, percent: u32) -> Result<usize> {
        self.shared.load.decrease(percent)
    }

    /// Ceiling back to the full slot capacity.
    pub fn set_max_load(&self) -> usize {
        self.shared.load.set_max()
    }

    /// Ceiling down to the minimum of 128 slots.
    pub fn set_min_load(&self) -> usize {
        self.shared.load.set_min()
    }

    pub fn current_load(&self) -> usize {
        self.shared.load.ceiling()
    }

    pub fn stats(&self) -> ClientStats {
        let shared = &self.shared;
        let requests_sent = shared.connection.sent();
        let responses_received = shared.connection.received();
        ClientStats {
            requests_sent,
            responses_received,
            outstanding: requests_sent as i64 - responses_received as i64,
            in_flight: shared.pool.in_use(),
            ceiling: shared.load.ceiling(),
            withheld: shared.load.withheld(),
            capacity: shared.pool.capacity(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// True once the connection failed; new calls are refused.
    pub fn is_disconnected(&self) -> bool {
        self.shared.connection.is_broken()
    }

    /// Stop all loops and close the connection.
    ///
    /// Loops stop at their next check; already resolved calls still have their
    /// continuations run, and calls left unresolved get a
    /// [`ShutDown`](crate::Unavailable::ShutDown) response. Idempotent.
    pub fn shutdown(&self) {
        if !self.shared.begin_shutdown() {
            return;
        }
        debug!("aggregation client shutting down");
        drop(self.shutdown_tx.lock().take());
        // Unblocks a sender stuck writing to a peer that stopped reading.
        self.shared.connection.close_write();

        let current = thread::current().id();
        let handles = std::mem::take(&mut *self.threads.lock());
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            let name = handle.thread().name().unwrap_or("aggrmux").to_string();
            if handle.join().is_err() {
                error!(thread = %name, "loop thread panicked");
            }
        }

        let failed = self.shared.drain_after_shutdown();
        self.shared.connection.close();
        info!(unresolved = failed, "aggregation client stopped");
    }

    fn allocate(&self) -> Result<u16> {
        let shared = &self.shared;
        shared.check_open()?;
        shared.load.rebalance(&shared.pool, || shared.check_open())?;
        loop {
            if let Some(slot) = shared.pool.allocate(ALLOCATE_WAIT) {
                if let Err(err) = shared.check_open() {
                    shared.pool.release(slot);
                    return Err(err);
                }
                return Ok(slot);
            }
            shared.check_open()?;
        }
    }
}

impl Drop for AggregationClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AggregationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationClient")
            .field("endpoint", &self.shared.config.endpoint())
            .field("stats", &self.stats())
            .finish()
    }
}

fn spawn(name: &str, f: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|err| ClientError::Transport(err.into()))
}
