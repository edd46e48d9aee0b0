//! Command message values.
//!
//! A [`Command`] is the decoded form of one frame: its type, the correlation
//! id echoed by replies, the target device (0 = not device-directed) and a
//! single numeric payload value. Extra payload (names, strings, value lists)
//! stays in the codec buffer and is pulled by the dispatcher through the
//! typed readers.

use std::fmt;

/// The signed wide integer carried as a command payload. Sensors and
/// actuators use this single numeric type.
pub type Value = i64;

/// Command-type codes, transmitted as their decimal form in the leading
/// frame token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    // Device-directed value writes
    OnOff,
    Digital,
    Analog,
    Pwm,
    Custom,

    // Control messages
    Response,
    PingRequest,
    PingResponse,
    Reset,
    GetDevices,
    GetDevicesResponse,
    SyncDevicesId,
    FirmwareUpdate,
    UserCommand,

    /// A type code this implementation does not know. Carried through so
    /// the dispatcher can apply its ignore rule instead of failing the
    /// parse.
    Unknown(u16),
}

impl CommandType {
    /// Decodes a wire code. Never fails; unrecognised codes map to
    /// [`CommandType::Unknown`].
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => CommandType::OnOff,
            2 => CommandType::Digital,
            3 => CommandType::Analog,
            4 => CommandType::Pwm,
            5 => CommandType::Custom,
            20 => CommandType::Response,
            21 => CommandType::PingRequest,
            22 => CommandType::PingResponse,
            23 => CommandType::Reset,
            30 => CommandType::GetDevices,
            31 => CommandType::GetDevicesResponse,
            32 => CommandType::SyncDevicesId,
            40 => CommandType::FirmwareUpdate,
            50 => CommandType::UserCommand,
            other => CommandType::Unknown(other),
        }
    }

    /// The decimal code written to the wire.
    pub fn code(&self) -> u16 {
        match self {
            CommandType::OnOff => 1,
            CommandType::Digital => 2,
            CommandType::Analog => 3,
            CommandType::Pwm => 4,
            CommandType::Custom => 5,
            CommandType::Response => 20,
            CommandType::PingRequest => 21,
            CommandType::PingResponse => 22,
            CommandType::Reset => 23,
            CommandType::GetDevices => 30,
            CommandType::GetDevicesResponse => 31,
            CommandType::SyncDevicesId => 32,
            CommandType::FirmwareUpdate => 40,
            CommandType::UserCommand => 50,
            CommandType::Unknown(code) => *code,
        }
    }

    /// Whether frames of this type carry a device-directed value write.
    pub fn is_device_value(&self) -> bool {
        matches!(
            self,
            CommandType::OnOff
                | CommandType::Digital
                | CommandType::Analog
                | CommandType::Pwm
                | CommandType::Custom
        )
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandType::OnOff => "ON_OFF",
            CommandType::Digital => "DIGITAL",
            CommandType::Analog => "ANALOG",
            CommandType::Pwm => "PWM",
            CommandType::Custom => "CUSTOM",
            CommandType::Response => "RESPONSE",
            CommandType::PingRequest => "PING_REQUEST",
            CommandType::PingResponse => "PING_RESPONSE",
            CommandType::Reset => "RESET",
            CommandType::GetDevices => "GET_DEVICES",
            CommandType::GetDevicesResponse => "GET_DEVICES_RESPONSE",
            CommandType::SyncDevicesId => "SYNC_DEVICES_ID",
            CommandType::FirmwareUpdate => "FIRMWARE_UPDATE",
            CommandType::UserCommand => "USER_COMMAND",
            CommandType::Unknown(code) => return write!(f, "UNKNOWN({code})"),
        };
        f.write_str(name)
    }
}

/// Protocol-level reply statuses, sent to the remote peer as the value of a
/// RESPONSE or PING_RESPONSE frame. These are part of the protocol contract
/// and must remain stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    BadRequest,
    NotFound,
    InternalError,
    NotImplemented,
}

impl ResponseStatus {
    /// The decimal code written to the wire.
    pub fn code(&self) -> u16 {
        match self {
            ResponseStatus::Success => 200,
            ResponseStatus::BadRequest => 400,
            ResponseStatus::NotFound => 404,
            ResponseStatus::InternalError => 500,
            ResponseStatus::NotImplemented => 501,
        }
    }

    /// Decodes a wire status code.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            200 => Some(ResponseStatus::Success),
            400 => Some(ResponseStatus::BadRequest),
            404 => Some(ResponseStatus::NotFound),
            500 => Some(ResponseStatus::InternalError),
            501 => Some(ResponseStatus::NotImplemented),
            _ => None,
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseStatus::Success => "SUCCESS",
            ResponseStatus::BadRequest => "BAD_REQUEST",
            ResponseStatus::NotFound => "NOT_FOUND",
            ResponseStatus::InternalError => "INTERNAL_ERROR",
            ResponseStatus::NotImplemented => "NOT_IMPLEMENTED",
        };
        f.write_str(name)
    }
}

/// One decoded protocol message.
///
/// A parsed `Command` is only valid until the next `parse` call on the same
/// codec: its extra payload lives in the codec buffer and must be fully
/// consumed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Message type.
    pub kind: CommandType,
    /// Correlation id; replies echo the request's id.
    pub id: u32,
    /// Target device id; 0 when the command is not device-directed.
    pub device_id: u8,
    /// Numeric payload value.
    pub value: Value,
}

impl Command {
    /// Creates a command with no correlation id.
    pub fn new(kind: CommandType, device_id: u8, value: Value) -> Self {
        Self {
            kind,
            id: 0,
            device_id,
            value,
        }
    }

    /// Sets the correlation id.
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// A generic status reply correlated to a request.
    pub fn status(correlation_id: u32, status: ResponseStatus) -> Self {
        Self {
            kind: CommandType::Response,
            id: correlation_id,
            device_id: 0,
            value: Value::from(status.code()),
        }
    }

    /// A ping reply correlated to a request.
    pub fn pong(correlation_id: u32) -> Self {
        Self {
            kind: CommandType::PingResponse,
            id: correlation_id,
            device_id: 0,
            value: Value::from(ResponseStatus::Success.code()),
        }
    }

    /// Whether this command targets a device.
    pub fn is_device_directed(&self) -> bool {
        self.device_id > 0
    }
}
