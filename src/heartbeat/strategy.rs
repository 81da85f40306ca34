//! Probe strategies.

use std::fmt;

use bytes::Bytes;

use crate::error::VdlResult;
use crate::protocol::{Command, Response};

/// Builds the liveness probe and judges its reply.
///
/// # Implemented By
///
/// - [`PingHeartbeat`] - empty command, any non-error reply
/// - [`EchoHeartbeat`] - payload must come back unchanged
/// - [`ScpiHeartbeat`] - `*IDN?`, printable reply
/// - [`CustomHeartbeat`] - caller-supplied closures
pub trait HeartbeatStrategy: Send + Sync {
    fn make_command(&self) -> VdlResult<Command>;

    fn validate_response(&self, response: &Response) -> bool;

    fn name(&self) -> &'static str;
}

/// Empty-payload probe; any reply that is not an error counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingHeartbeat {
    function_code: u8,
}

impl PingHeartbeat {
    pub fn new(function_code: u8) -> Self {
        Self { function_code }
    }
}

impl HeartbeatStrategy for PingHeartbeat {
    fn make_command(&self) -> VdlResult<Command> {
        Ok(Command::execute(self.function_code).with_tag("heartbeat"))
    }

    fn validate_response(&self, response: &Response) -> bool {
        !response.is_error()
    }

    fn name(&self) -> &'static str {
        "ping_heartbeat"
    }
}

const DEFAULT_ECHO_DATA: &[u8] = b"Hello";

/// Sends a payload and expects the same bytes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoHeartbeat {
    function_code: u8,
    data: Bytes,
}

impl EchoHeartbeat {
    /// Echo `"Hello"` with `function_code`.
    pub fn new(function_code: u8) -> Self {
        Self::with_data(function_code, Bytes::from_static(DEFAULT_ECHO_DATA))
    }

    pub fn with_data(function_code: u8, data: impl Into<Bytes>) -> Self {
        Self {
            function_code,
            data: data.into(),
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
    }
}

impl Default for EchoHeartbeat {
    fn default() -> Self {
        Self::new(0x00)
    }
}

impl HeartbeatStrategy for EchoHeartbeat {
    fn make_command(&self) -> VdlResult<Command> {
        Ok(Command::new(self.function_code)
            .with_data(self.data.clone())
            .with_tag("heartbeat"))
    }

    fn validate_response(&self, response: &Response) -> bool {
        !response.is_error() && response.data() == &self.data
    }

    fn name(&self) -> &'static str {
        "echo_heartbeat"
    }
}

/// Function code carrying the `*IDN?` probe on framed links.
const SCPI_HEARTBEAT_FC: u8 = 0x04;

/// `*IDN?` probe for SCPI instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScpiHeartbeat;

impl ScpiHeartbeat {
    pub fn new() -> Self {
        Self
    }
}

impl HeartbeatStrategy for ScpiHeartbeat {
    fn make_command(&self) -> VdlResult<Command> {
        Ok(Command::new(SCPI_HEARTBEAT_FC)
            .with_data(Bytes::from_static(b"*IDN?"))
            .with_tag("heartbeat"))
    }

    fn validate_response(&self, response: &Response) -> bool {
        let data = response.data();
        !response.is_error() && data.len() >= 2 && data.iter().all(|b| (0x20..=0x7E).contains(b))
    }

    fn name(&self) -> &'static str {
        "scpi_heartbeat"
    }
}

type MakeFn = Box<dyn Fn() -> VdlResult<Command> + Send + Sync>;
type ValidateFn = Box<dyn Fn(&Response) -> bool + Send + Sync>;

/// Strategy assembled from closures.
///
/// ```rust
/// use vdl::{Command, CustomHeartbeat, HeartbeatStrategy, Response};
///
/// let strategy = CustomHeartbeat::new(
///     || Ok(Command::read(0x03, 0x0000, 1)),
///     |resp: &Response| resp.u16_be(0) == Some(0x0001),
/// );
/// assert!(strategy.validate_response(&Response::success(0x03, vec![0x00, 0x01])));
/// ```
pub struct CustomHeartbeat {
    make: MakeFn,
    validate: ValidateFn,
    name: &'static str,
}

impl CustomHeartbeat {
    pub fn new<M, V>(make: M, validate: V) -> Self
    where
        M: Fn() -> VdlResult<Command> + Send + Sync + 'static,
        V: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        Self {
            make: Box::new(make),
            validate: Box::new(validate),
            name: "custom_heartbeat",
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl fmt::Debug for CustomHeartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomHeartbeat")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl HeartbeatStrategy for CustomHeartbeat {
    fn make_command(&self) -> VdlResult<Command> {
        (self.make)()
    }

    fn validate_response(&self, response: &Response) -> bool {
        (self.validate)(response)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
