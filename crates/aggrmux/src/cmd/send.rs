use std::fs;

use aggrmux_client::{AggregationClient, Response, Unavailable};
use bytes::Bytes;
use crossbeam_channel::bounded;

use crate::cmd::{parse_header, SendArgs};
use crate::exit::{client_error, io_error, CliError, CliResult, SUCCESS, TIMEOUT, TRANSPORT_ERROR};
use crate::output::{print_response, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.endpoint.client_config()?;
    // Every call resolves within timeout + one tick; allow one more for slack.
    let wait = config.receive_timeout + config.sweep_interval * 2;

    let headers = args
        .headers
        .iter()
        .map(|raw| parse_header(raw))
        .collect::<CliResult<Vec<_>>>()?;
    let header_refs: Vec<(&str, &str)> = headers
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    let body = resolve_body(&args)?;

    let client =
        AggregationClient::connect(config).map_err(|err| client_error("connect failed", err))?;

    let (tx, rx) = bounded(1);
    client
        .submit_http(&args.method, &args.uri, body, &header_refs, move |response| {
            let _ = tx.send(response);
        })
        .map_err(|err| client_error("send failed", err))?;

    let response = rx
        .recv_timeout(wait)
        .map_err(|_| CliError::new(TIMEOUT, format!("no response within {wait:?}")))?;
    client.shutdown();

    print_response(&response, format);
    exit_code(&response)
}

fn exit_code(response: &Response) -> CliResult<i32> {
    match response {
        Response::Payload(_) => Ok(SUCCESS),
        Response::Unavailable(Unavailable::TimedOut) => {
            Err(CliError::new(TIMEOUT, "response timed out"))
        }
        Response::Unavailable(why) => Err(CliError::new(TRANSPORT_ERROR, why.to_string())),
    }
}

fn resolve_body(args: &SendArgs) -> CliResult<Bytes> {
    if let Some(data) = &args.data {
        return Ok(Bytes::from(data.clone()));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map(Bytes::from)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Bytes::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_success() {
        let response = Response::Payload(Bytes::from_static(b"ok"));
        assert_eq!(exit_code(&response).unwrap(), SUCCESS);
    }

    #[test]
    fn timeout_maps_to_124() {
        let err = exit_code(&Response::Unavailable(Unavailable::TimedOut)).unwrap_err();
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn connection_loss_maps_to_transport_error() {
        let err = exit_code(&Response::Unavailable(Unavailable::ConnectionLost)).unwrap_err();
        assert_eq!(err.code, TRANSPORT_ERROR);
    }
}
