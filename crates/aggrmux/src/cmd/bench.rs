use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use aggrmux_client::{AggregationClient, HttpRequest, Response, Unavailable};
use bytes::{BufMut, Bytes, BytesMut};
use crossbeam_channel::unbounded;

use crate::cmd::BenchArgs;
use crate::exit::{client_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_bench, BenchReport, OutputFormat};

#[derive(Default)]
struct Tally {
    ok: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

impl Tally {
    fn record(&self, response: &Response, expected: Option<&Bytes>) {
        match response {
            Response::Payload(bytes) if expected.is_none_or(|want| want == bytes) => {
                self.ok.fetch_add(1, Ordering::Relaxed);
            }
            Response::Payload(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            Response::Unavailable(Unavailable::TimedOut) => {
                self.timed_out.fetch_add(1, Ordering::Relaxed);
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            Response::Unavailable(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

pub fn run(args: BenchArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.endpoint.client_config()?.with_slots(args.slots);
    let host = format!("{}:{}", config.host, config.data_port);
    let wait = config.receive_timeout + config.sweep_interval * 2;

    let client =
        AggregationClient::connect(config).map_err(|err| client_error("connect failed", err))?;
    if let Some(percent) = args.decrease_load {
        let ceiling = client
            .decrease_load(percent)
            .map_err(|err| client_error("load adjustment failed", err))?;
        tracing::info!(ceiling, "load ceiling lowered");
    }

    let tally = Arc::new(Tally::default());
    let (done_tx, done_rx) = unbounded::<()>();
    let started = Instant::now();

    for i in 0..args.requests {
        let request = HttpRequest::new(args.method.as_str(), args.uri.as_str())
            .host(host.as_str())
            .body(body(i, args.size))
            .to_bytes()
            .map_err(|err| client_error("invalid request", err))?;
        let expected = args.verify.then(|| request.clone());

        let tally = Arc::clone(&tally);
        let done = done_tx.clone();
        client
            .submit(request, move |response| {
                tally.record(&response, expected.as_ref());
                let _ = done.send(());
            })
            .map_err(|err| client_error("submit failed", err))?;
    }
    drop(done_tx);

    for received in 0..args.requests {
        if done_rx.recv_timeout(wait).is_err() {
            return Err(CliError::new(
                TIMEOUT,
                format!("only {received} of {} calls resolved", args.requests),
            ));
        }
    }
    let elapsed = started.elapsed();

    let ok = tally.ok.load(Ordering::Relaxed);
    let failed = tally.failed.load(Ordering::Relaxed);
    if let Some(test_name) = &args.report {
        client
            .report_statistics(test_name, ok, failed)
            .map_err(|err| client_error("statistics report failed", err))?;
    }

    let secs = elapsed.as_secs_f64();
    let report = BenchReport {
        requests: args.requests,
        ok,
        failed,
        timed_out: tally.timed_out.load(Ordering::Relaxed),
        elapsed_ms: elapsed.as_millis(),
        requests_per_second: if secs > 0.0 {
            args.requests as f64 / secs
        } else {
            0.0
        },
        slots: args.slots,
        ceiling: 0,
        requests_sent: 0,
        responses_received: 0,
    }
    .with_stats(&client.stats());
    client.shutdown();

    print_bench(&report, format);
    Ok(if failed == 0 { SUCCESS } else { FAILURE })
}

/// Body for request `index`: the index, a colon, then filler up to `size` bytes.
fn body(index: u64, size: usize) -> Bytes {
    let prefix = format!("{index}:");
    let mut buf = BytesMut::with_capacity(size.max(prefix.len()));
    buf.put_slice(prefix.as_bytes());
    while buf.len() < size {
        buf.put_u8(b'x');
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_is_unique_and_sized() {
        assert_eq!(body(7, 6).as_ref(), b"7:xxxx");
        assert_eq!(body(12345, 2).as_ref(), b"12345:");
        assert_ne!(body(1, 16), body(2, 16));
    }

    #[test]
    fn tally_counts_outcomes() {
        let tally = Tally::default();
        let want = Bytes::from_static(b"a");
        tally.record(&Response::Payload(want.clone()), Some(&want));
        tally.record(&Response::Payload(Bytes::from_static(b"b")), Some(&want));
        tally.record(&Response::Payload(Bytes::from_static(b"c")), None);
        tally.record(&Response::Unavailable(Unavailable::TimedOut), None);
        tally.record(&Response::Unavailable(Unavailable::ConnectionLost), None);

        assert_eq!(tally.ok.load(Ordering::Relaxed), 2);
        assert_eq!(tally.failed.load(Ordering::Relaxed), 3);
        assert_eq!(tally.timed_out.load(Ordering::Relaxed), 1);
    }
}
