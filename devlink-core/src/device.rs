//! The device entity.

use devlink_protocol::{CommandType, Value};
use std::fmt;

/// Hardware-reading closure attached to custom sensors. The core never
/// touches hardware itself; a source is the only way a sensor produces
/// values.
pub type ValueSource = Box<dyn FnMut() -> Value>;

/// Device kinds. The code is part of the wire descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Digital,
    Analog,
    Pwm,
    Custom,
}

impl DeviceType {
    /// The decimal code used in device descriptors.
    pub fn code(&self) -> u8 {
        match self {
            DeviceType::Digital => 1,
            DeviceType::Analog => 2,
            DeviceType::Pwm => 3,
            DeviceType::Custom => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(DeviceType::Digital),
            2 => Some(DeviceType::Analog),
            3 => Some(DeviceType::Pwm),
            4 => Some(DeviceType::Custom),
            _ => None,
        }
    }

    /// The command type used for value frames of this device kind.
    pub fn command_kind(&self) -> CommandType {
        match self {
            DeviceType::Digital => CommandType::Digital,
            DeviceType::Analog => CommandType::Analog,
            DeviceType::Pwm => CommandType::Pwm,
            DeviceType::Custom => CommandType::Custom,
        }
    }
}

/// An addressable sensor or actuator.
///
/// Devices are created at setup time, owned by the registry for their
/// entire life, and never removed; only their value (and, on resync, their
/// id) mutates afterwards.
pub struct Device {
    id: u8,
    name: String,
    /// Hardware pin or channel; opaque to the core.
    pin: u16,
    kind: DeviceType,
    sensor: bool,
    value: Value,
    /// Bonded actuator id driven by auto-control; 0 = none.
    target_id: u8,
    source: Option<ValueSource>,
    /// Last extra value list received for devices that declare one.
    extra: Vec<Value>,
}

impl Device {
    pub fn new(name: impl Into<String>, pin: u16, kind: DeviceType, sensor: bool) -> Self {
        Self {
            id: 0,
            name: name.into(),
            pin,
            kind,
            sensor,
            value: 0,
            target_id: 0,
            source: None,
            extra: Vec::new(),
        }
    }

    /// A sensor on a hardware pin.
    pub fn sensor(name: impl Into<String>, pin: u16, kind: DeviceType) -> Self {
        Self::new(name, pin, kind, true)
    }

    /// An actuator on a hardware pin.
    pub fn actuator(name: impl Into<String>, pin: u16, kind: DeviceType) -> Self {
        Self::new(name, pin, kind, false)
    }

    /// A sensor whose value comes from a closure instead of a pin.
    pub fn custom_sensor(name: impl Into<String>, source: ValueSource) -> Self {
        let mut device = Self::new(name, 0, DeviceType::Custom, true);
        device.source = Some(source);
        device
    }

    /// Bonds this sensor to an actuator for auto-control.
    pub fn with_target(mut self, target_id: u8) -> Self {
        self.target_id = target_id;
        self
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: u8) {
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pin(&self) -> u16 {
        self.pin
    }

    pub fn device_type(&self) -> DeviceType {
        self.kind
    }

    pub fn is_sensor(&self) -> bool {
        self.sensor
    }

    pub fn value(&self) -> Value {
        self.value
    }

    pub fn target_id(&self) -> u8 {
        self.target_id
    }

    /// Records a new value. Broadcasting the change is the dispatcher's
    /// decision, not the device's.
    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    /// Whether this device declares extra payload beyond the value token
    /// in device-directed frames (a value list for custom devices).
    pub fn declares_extra_payload(&self) -> bool {
        matches!(self.kind, DeviceType::Custom)
    }

    /// The last extra value list received for this device.
    pub fn extra(&self) -> &[Value] {
        &self.extra
    }

    /// Stores the extra value list pulled from a device-directed frame.
    pub fn set_extra(&mut self, values: &[Value]) {
        self.extra.clear();
        self.extra.extend_from_slice(values);
    }

    /// Samples the value source. Returns the sampled value only when it
    /// differs from the current one; `None` for devices without a source.
    pub fn sample(&mut self) -> Option<Value> {
        let source = self.source.as_mut()?;
        let sampled = source();
        (sampled != self.value).then_some(sampled)
    }

    /// Renders the wire descriptor:
    /// `id,pin,value,target_id,is_sensor,device_type`.
    pub fn descriptor(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.id,
            self.pin,
            self.value,
            self.target_id,
            u8::from(self.sensor),
            self.kind.code()
        )
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pin", &self.pin)
            .field("kind", &self.kind)
            .field("sensor", &self.sensor)
            .field("value", &self.value)
            .field("target_id", &self.target_id)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}
