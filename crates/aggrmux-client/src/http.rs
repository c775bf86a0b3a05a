use std::fmt::Write as _;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ClientError, Result};

/// Builder for HTTP/1.1-shaped request payloads.
///
/// Only serialization lives here; the multiplexer itself treats the result as
/// opaque bytes. `Content-Length` is always computed from the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: String,
    uri: String,
    host: Option<String>,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            host: None,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new("GET", uri)
    }

    pub fn post(uri: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new("POST", uri).body(body)
    }

    /// Value of the `Host` header. An explicit `Host` header takes precedence.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Serialize to wire bytes.
    ///
    /// Rejects empty or whitespace-bearing methods and URIs, and any CR/LF in
    /// header names or values.
    pub fn to_bytes(&self) -> Result<Bytes> {
        validate_token("method", &self.method)?;
        validate_token("uri", &self.uri)?;

        let mut head = String::with_capacity(128);
        let _ = write!(head, "{} {} HTTP/1.1\r\n", self.method, self.uri);

        let explicit_host = self
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("host"));
        if let (Some(host), false) = (&self.host, explicit_host) {
            validate_value("Host", host)?;
            let _ = write!(head, "Host: {host}\r\n");
        }

        for (name, value) in &self.headers {
            validate_header_name(name)?;
            validate_value(name, value)?;
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            let _ = write!(head, "{name}: {value}\r\n");
        }
        let _ = write!(head, "Content-Length: {}\r\n\r\n", self.body.len());

        let mut out = BytesMut::with_capacity(head.len() + self.body.len());
        out.put_slice(head.as_bytes());
        out.put_slice(&self.body);
        Ok(out.freeze())
    }
}

/// Percent-encode a query string value (RFC 3986 unreserved set kept as is).
pub fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

fn validate_token(what: &str, token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(ClientError::InvalidRequest(format!("{what} is empty")));
    }
    if token.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return Err(ClientError::InvalidRequest(format!(
            "{what} contains whitespace or control characters"
        )));
    }
    Ok(())
}

fn validate_header_name(name: &str) -> Result<()> {
    validate_token("header name", name)?;
    if name.contains(':') {
        return Err(ClientError::InvalidRequest(format!(
            "header name {name:?} contains ':'"
        )));
    }
    Ok(())
}

fn validate_value(name: &str, value: &str) -> Result<()> {
    if value.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(ClientError::InvalidRequest(format!(
            "header {name} contains CR or LF"
        )));
    }
    Ok(())
}
