use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use aggrmux_client::{ClientStats, Response};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    status: &'a str,
    status_code: Option<u16>,
    reason: Option<&'a str>,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

impl<'a> ResponseOutput<'a> {
    fn from_response(response: &'a Response) -> Self {
        match response {
            Response::Payload(bytes) => Self {
                status: "ok",
                status_code: None,
                reason: None,
                payload_size: bytes.len(),
                payload: payload_preview(bytes.as_ref()),
                timestamp: now_unix_seconds(),
            },
            Response::Unavailable(why) => Self {
                status: "unavailable",
                status_code: response.status_code(),
                reason: Some(why.reason()),
                payload_size: 0,
                payload: String::new(),
                timestamp: now_unix_seconds(),
            },
        }
    }
}

pub fn print_response(response: &Response, format: OutputFormat) {
    let out = ResponseOutput::from_response(response);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["STATUS", "CODE", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    out.status.to_string(),
                    out.status_code
                        .map(|code| code.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    out.payload_size.to_string(),
                    out.reason.map(str::to_string).unwrap_or(out.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match out.reason {
            Some(reason) => println!(
                "status={} code={} reason={reason}",
                out.status,
                out.status_code.unwrap_or_default()
            ),
            None => println!(
                "status={} size={} payload={}",
                out.status, out.payload_size, out.payload
            ),
        },
        OutputFormat::Raw => match response {
            Response::Payload(bytes) => print_raw(bytes.as_ref()),
            Response::Unavailable(why) => print_raw(why.to_string().as_bytes()),
        },
    }
}

/// Outcome of a `bench` run.
#[derive(Debug, Serialize)]
pub struct BenchReport {
    pub requests: u64,
    pub ok: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub elapsed_ms: u128,
    pub requests_per_second: f64,
    pub slots: usize,
    pub ceiling: usize,
    pub requests_sent: u64,
    pub responses_received: u64,
}

impl BenchReport {
    pub fn with_stats(mut self, stats: &ClientStats) -> Self {
        self.ceiling = stats.ceiling;
        self.requests_sent = stats.requests_sent;
        self.responses_received = stats.responses_received;
        self
    }
}

pub fn print_bench(report: &BenchReport, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["REQUESTS", "OK", "FAILED", "TIMED OUT", "ELAPSED", "REQ/S"])
                .add_row(vec![
                    report.requests.to_string(),
                    report.ok.to_string(),
                    report.failed.to_string(),
                    report.timed_out.to_string(),
                    format!("{} ms", report.elapsed_ms),
                    format!("{:.0}", report.requests_per_second),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "requests={} ok={} failed={} timed_out={} elapsed={}ms rps={:.0} slots={} ceiling={}",
                report.requests,
                report.ok,
                report.failed,
                report.timed_out,
                report.elapsed_ms,
                report.requests_per_second,
                report.slots,
                report.ceiling
            );
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use aggrmux_client::Unavailable;
    use bytes::Bytes;

    use super::*;

    #[test]
    fn payload_response_serializes_as_ok() {
        let response = Response::Payload(Bytes::from_static(b"hello"));
        let value = serde_json::to_value(ResponseOutput::from_response(&response)).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["payload"], "hello");
        assert_eq!(value["payload_size"], 5);
        assert!(value["status_code"].is_null());
    }

    #[test]
    fn unavailable_response_serializes_as_503() {
        let response = Response::Unavailable(Unavailable::TimedOut);
        let value = serde_json::to_value(ResponseOutput::from_response(&response)).unwrap();
        assert_eq!(value["status"], "unavailable");
        assert_eq!(value["status_code"], 503);
        assert_eq!(value["reason"], "time for the response is exceeded");
    }

    #[test]
    fn binary_payload_is_summarized() {
        assert_eq!(payload_preview(&[0xff, 0xfe]), "<binary 2 bytes>");
    }
}
