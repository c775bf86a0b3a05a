use std::time::Duration;

use aggrmux_frame::{FrameConfig, DEFAULT_BUFFER_SIZE, HEADER_SIZE};
use aggrmux_transport::{SocketOptions, DEFAULT_SOCKET_BUFFER_SIZE};

use crate::error::{ClientError, Result};

/// Smallest correlation table (and lowest load ceiling) accepted.
pub const MIN_SLOTS: usize = 128;

/// Largest correlation table accepted.
pub const MAX_SLOTS: usize = 8191;

/// Default receive timeout for a call.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout sweep interval (one tick).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Default socket read timeout used by the receiver loop between shutdown checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default deadline for the CREATE_SOCKET exchange.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Aggregation client settings.
///
/// `receive_timeout` must be a whole number of `sweep_interval` ticks: a call
/// is failed by the first sweep at which it has been waiting for more than
/// `receive_timeout / sweep_interval` ticks.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Host of the aggregation endpoint.
    pub host: String,
    /// Logical data port requests are destined for on the server.
    pub data_port: u16,
    /// TCP port of the aggregation endpoint.
    pub aggregation_port: u16,
    /// How long a call may wait for its response.
    pub receive_timeout: Duration,
    /// Timeout sweep interval.
    pub sweep_interval: Duration,
    /// Number of correlation slots (also the initial load ceiling).
    pub slots: usize,
    /// Send batch ceiling in bytes; one request plus its header must fit.
    pub send_buffer_size: usize,
    /// Receive buffer ceiling in bytes; one response plus its header must fit.
    pub recv_buffer_size: usize,
    /// Socket read timeout between receiver shutdown checks.
    pub poll_interval: Duration,
    /// Kernel socket buffer size. `None` keeps the OS default.
    pub socket_buffer_size: Option<usize>,
    /// Deadline for the handshake.
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            data_port: 8080,
            aggregation_port: 9191,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            slots: MAX_SLOTS,
            send_buffer_size: DEFAULT_BUFFER_SIZE,
            recv_buffer_size: DEFAULT_BUFFER_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            socket_buffer_size: Some(DEFAULT_SOCKET_BUFFER_SIZE),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Defaults for a specific endpoint.
    pub fn new(host: impl Into<String>, data_port: u16, aggregation_port: u16) -> Self {
        Self {
            host: host.into(),
            data_port,
            aggregation_port,
            ..Self::default()
        }
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_slots(mut self, slots: usize) -> Self {
        self.slots = slots;
        self
    }

    /// Set both send and receive buffer ceilings.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.send_buffer_size = size;
        self.recv_buffer_size = size;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Reject settings the multiplexer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(ClientError::InvalidConfig("host must not be empty".into()));
        }
        if !(MIN_SLOTS..=MAX_SLOTS).contains(&self.slots) {
            return Err(ClientError::InvalidConfig(format!(
                "slots must be in {MIN_SLOTS}..={MAX_SLOTS}, got {}",
                self.slots
            )));
        }
        if self.sweep_interval.is_zero() {
            return Err(ClientError::InvalidConfig(
                "sweep interval must be non-zero".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ClientError::InvalidConfig(
                "poll interval must be non-zero".into(),
            ));
        }
        if self.receive_timeout.is_zero()
            || self.receive_timeout.as_nanos() % self.sweep_interval.as_nanos() != 0
        {
            return Err(ClientError::InvalidConfig(format!(
                "receive timeout {:?} must be a non-zero multiple of the sweep interval {:?}",
                self.receive_timeout, self.sweep_interval
            )));
        }
        if u32::try_from(self.receive_timeout.as_nanos() / self.sweep_interval.as_nanos())
            .is_err()
        {
            return Err(ClientError::InvalidConfig(
                "receive timeout spans too many sweep intervals".into(),
            ));
        }
        for (name, size) in [
            ("send", self.send_buffer_size),
            ("receive", self.recv_buffer_size),
        ] {
            if size <= HEADER_SIZE || size > u32::MAX as usize {
                return Err(ClientError::InvalidConfig(format!(
                    "{name} buffer size {size} must be in {}..={}",
                    HEADER_SIZE + 1,
                    u32::MAX
                )));
            }
        }
        Ok(())
    }

    /// Receive timeout expressed in sweep ticks.
    pub fn timeout_ticks(&self) -> u32 {
        let ticks = self.receive_timeout.as_nanos() / self.sweep_interval.as_nanos().max(1);
        u32::try_from(ticks).unwrap_or(u32::MAX)
    }

    /// Largest request payload a single call may carry.
    pub fn max_request_size(&self) -> usize {
        self.send_buffer_size.saturating_sub(HEADER_SIZE)
    }

    /// `host:aggregation_port`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.aggregation_port)
    }

    pub(crate) fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            nodelay: true,
            buffer_size: self.socket_buffer_size,
            read_timeout: Some(self.handshake_timeout),
            write_timeout: None,
        }
    }

    pub(crate) fn send_frame_config(&self) -> FrameConfig {
        FrameConfig {
            buffer_size: self.send_buffer_size,
            ..FrameConfig::default()
        }
    }

    pub(crate) fn recv_frame_config(&self) -> FrameConfig {
        FrameConfig {
            buffer_size: self.recv_buffer_size,
            ..FrameConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = ClientConfig::default();
        config.validate().unwrap();
        assert_eq!(config.slots, MAX_SLOTS);
        assert_eq!(config.timeout_ticks(), 3);
        assert_eq!(config.endpoint(), "127.0.0.1:9191");
        assert_eq!(config.max_request_size(), DEFAULT_BUFFER_SIZE - HEADER_SIZE);
    }

    #[test]
    fn slot_bounds_enforced() {
        for slots in [0, MIN_SLOTS - 1, MAX_SLOTS + 1] {
            let err = ClientConfig::default().with_slots(slots).validate().unwrap_err();
            assert!(matches!(err, ClientError::InvalidConfig(_)), "slots={slots}");
        }
        ClientConfig::default().with_slots(MIN_SLOTS).validate().unwrap();
        ClientConfig::default().with_slots(MAX_SLOTS).validate().unwrap();
    }

    #[test]
    fn timeout_must_be_whole_ticks() {
        let config = ClientConfig::default()
            .with_sweep_interval(Duration::from_millis(50))
            .with_receive_timeout(Duration::from_millis(120));
        assert!(matches!(
            config.validate(),
            Err(ClientError::InvalidConfig(_))
        ));

        let config = config.with_receive_timeout(Duration::from_millis(150));
        config.validate().unwrap();
        assert_eq!(config.timeout_ticks(), 3);
    }

    #[test]
    fn zero_durations_rejected() {
        let zero_sweep = ClientConfig::default().with_sweep_interval(Duration::ZERO);
        assert!(zero_sweep.validate().is_err());

        let zero_timeout = ClientConfig::default().with_receive_timeout(Duration::ZERO);
        assert!(zero_timeout.validate().is_err());

        let zero_poll = ClientConfig::default().with_poll_interval(Duration::ZERO);
        assert!(zero_poll.validate().is_err());
    }

    #[test]
    fn buffer_must_hold_a_header() {
        let config = ClientConfig::default().with_buffer_size(HEADER_SIZE);
        assert!(config.validate().is_err());

        let config = ClientConfig::default().with_buffer_size(HEADER_SIZE + 1);
        config.validate().unwrap();
        assert_eq!(config.max_request_size(), 1);
    }

    #[test]
    fn empty_host_rejected() {
        let config = ClientConfig::new("", 8080, 9191);
        assert!(config.validate().is_err());
    }
}
