//! Command dispatch.
//!
//! The dispatcher is the protocol's command-interpretation state machine,
//! invoked once per scheduler tick. Each tick it asks the codec whether a
//! full command arrived, acts on it exactly once, flushes the reply, then
//! runs the keep-alive timer and the sensor sweep.
//!
//! Only one frame is ever in flight: a received command's extra payload is
//! consumed before the tick ends, so the next parse never sees a stale
//! read cursor.

use crate::config::{KeepAliveConfig, SensorConfig};
use crate::error::RuntimeError;
use crate::update::FirmwareUpdater;
use devlink_core::{CommandTable, DeviceRegistry};
use devlink_protocol::{
    Command, CommandType, FrameCodec, FrameError, ResponseStatus, Transport, Value,
};
use devlink_storage::ConfigStore;
use std::time::{Duration, Instant};

/// Most extra values a device-directed frame may carry.
const EXTRA_VALUES_MAX: usize = 8;

/// Observer notified of every received command, before dispatch.
pub trait CommandListener {
    fn on_command(&mut self, cmd: &Command);
}

impl<F: FnMut(&Command)> CommandListener for F {
    fn on_command(&mut self, cmd: &Command) {
        self(cmd)
    }
}

/// What one tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// A complete command was received and acted on.
    pub handled: bool,
    /// A controller reset was requested; the embedding loop should restart.
    pub reset: bool,
}

struct KeepAlive {
    enabled: bool,
    interval: Duration,
    miss_threshold: u32,
    last_activity: Instant,
    missed: u32,
}

/// The dispatcher: owns the codec, the device registry, the user command
/// table and the config store, injected at construction. No process-wide
/// state exists; build one per connection.
pub struct Dispatcher<T: Transport, S: ConfigStore> {
    codec: FrameCodec<T>,
    registry: DeviceRegistry,
    commands: CommandTable,
    store: S,
    listener: Option<Box<dyn CommandListener>>,
    updater: Option<Box<dyn FirmwareUpdater>>,
    reset_hook: Option<Box<dyn FnMut()>>,
    keep_alive: KeepAlive,
    sweep_interval: Duration,
    debounce: Duration,
    auto_control: bool,
    last_sweep: Option<Instant>,
    last_notify: Option<Instant>,
    reset_requested: bool,
}

impl<T: Transport, S: ConfigStore> Dispatcher<T, S> {
    pub fn new(
        codec: FrameCodec<T>,
        registry: DeviceRegistry,
        commands: CommandTable,
        store: S,
    ) -> Self {
        let defaults = SensorConfig::default();
        let keep_alive_defaults = KeepAliveConfig::default();
        Self {
            codec,
            registry,
            commands,
            store,
            listener: None,
            updater: None,
            reset_hook: None,
            keep_alive: KeepAlive {
                enabled: keep_alive_defaults.enabled,
                interval: keep_alive_defaults.interval(),
                miss_threshold: keep_alive_defaults.miss_threshold,
                last_activity: Instant::now(),
                missed: 0,
            },
            sweep_interval: defaults.sweep_interval(),
            debounce: defaults.debounce(),
            auto_control: defaults.auto_control,
            last_sweep: None,
            last_notify: None,
            reset_requested: false,
        }
    }

    /// Sets the observer notified of every received command.
    pub fn with_listener(mut self, listener: Box<dyn CommandListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Sets the firmware-update collaborator.
    pub fn with_updater(mut self, updater: Box<dyn FirmwareUpdater>) -> Self {
        self.updater = Some(updater);
        self
    }

    /// Sets the hook invoked when a reset is requested.
    pub fn with_reset_hook(mut self, hook: Box<dyn FnMut()>) -> Self {
        self.reset_hook = Some(hook);
        self
    }

    /// Applies keep-alive configuration.
    pub fn with_keep_alive(mut self, config: &KeepAliveConfig) -> Self {
        self.keep_alive.enabled = config.enabled;
        self.keep_alive.interval = config.interval();
        self.keep_alive.miss_threshold = config.miss_threshold;
        self
    }

    /// Applies sensor sweep configuration.
    pub fn with_sensor_settings(mut self, config: &SensorConfig) -> Self {
        self.sweep_interval = config.sweep_interval();
        self.debounce = config.debounce();
        self.auto_control = config.auto_control;
        self
    }

    /// Turns agent-originated heartbeats on or off. Leave off when the
    /// controller side owns the heartbeat.
    pub fn enable_keep_alive(&mut self, enabled: bool) {
        self.keep_alive.enabled = enabled;
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    pub fn commands_mut(&mut self) -> &mut CommandTable {
        &mut self.commands
    }

    pub fn codec_mut(&mut self) -> &mut FrameCodec<T> {
        &mut self.codec
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Liveness: the transport has a peer and the keep-alive miss count is
    /// under the threshold.
    pub fn is_connected(&self) -> bool {
        if self.keep_alive.enabled && self.keep_alive.missed >= self.keep_alive.miss_threshold {
            return false;
        }
        self.codec.is_connected()
    }

    /// Restores persisted device ids into the registry. Call once after
    /// all devices are registered.
    pub fn load_saved_ids(&mut self) -> Result<(), RuntimeError> {
        let record = self.store.load()?;
        if record.device_ids.is_empty() {
            return Ok(());
        }
        match self.registry.sync_ids(&record.device_ids) {
            Ok(()) => {
                tracing::info!(count = record.device_ids.len(), "restored device ids");
            }
            Err(e) => {
                tracing::warn!(error = %e, "saved ids do not match registry, keeping defaults");
            }
        }
        Ok(())
    }

    /// One scheduler tick: parse-if-available, dispatch, flush, then the
    /// keep-alive timer and the sensor sweep.
    pub fn tick(&mut self, now: Instant) -> Result<TickOutcome, RuntimeError> {
        let mut handled = false;
        if self.codec.poll() {
            match self.codec.parse() {
                Ok(cmd) => {
                    self.on_contact(now);
                    if let Some(listener) = self.listener.as_mut() {
                        listener.on_command(&cmd);
                    }
                    self.handle(&cmd)?;
                    self.codec.flush()?;
                    handled = true;
                }
                // Framing failures are recovered locally: the codec is
                // back to idle and the peer resends.
                Err(FrameError::Timeout { waited_ms }) => {
                    tracing::debug!(waited_ms, "partial frame abandoned");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "frame discarded");
                }
            }
        }
        self.keep_alive_tick(now)?;
        self.sweep_sensors(now)?;
        Ok(TickOutcome {
            handled,
            reset: self.reset_requested,
        })
    }

    fn on_contact(&mut self, now: Instant) {
        self.keep_alive.last_activity = now;
        self.keep_alive.missed = 0;
    }

    /// Priority-ordered handling of one received command.
    fn handle(&mut self, cmd: &Command) -> Result<(), RuntimeError> {
        tracing::debug!(kind = %cmd.kind, device_id = cmd.device_id, value = cmd.value, "command received");

        if cmd.is_device_directed() {
            return self.handle_device_write(cmd);
        }

        match cmd.kind {
            CommandType::UserCommand => self.handle_user_command(cmd),
            CommandType::PingRequest => {
                self.codec.send(&Command::pong(cmd.id))?;
                Ok(())
            }
            CommandType::Reset => {
                tracing::info!("reset requested by controller");
                self.request_reset();
                Ok(())
            }
            CommandType::GetDevices => self.handle_get_devices(cmd),
            CommandType::SyncDevicesId => self.handle_sync_ids(cmd),
            CommandType::FirmwareUpdate => self.handle_firmware_update(cmd),
            // Replies need no action beyond the contact bookkeeping above.
            CommandType::PingResponse | CommandType::Response => Ok(()),
            other => {
                // No reply is defined for unknown types; the frame is
                // dropped.
                tracing::debug!(kind = %other, "no handler for command, ignoring");
                Ok(())
            }
        }
    }

    fn handle_device_write(&mut self, cmd: &Command) -> Result<(), RuntimeError> {
        let Some(device) = self.registry.get_mut(cmd.device_id) else {
            tracing::debug!(device_id = cmd.device_id, "write to unknown device");
            return self.reply(cmd.id, ResponseStatus::NotFound);
        };

        // Remote write: record without re-broadcast to avoid a notify loop.
        device.set_value(cmd.value);

        if device.declares_extra_payload() && self.codec.available() {
            let mut extra = [0 as Value; EXTRA_VALUES_MAX];
            match self.codec.read_long_values(&mut extra) {
                Ok(n) => device.set_extra(&extra[..n]),
                Err(e) => tracing::debug!(error = %e, "unreadable extra payload dropped"),
            }
        }

        self.reply(cmd.id, ResponseStatus::Success)
    }

    fn handle_user_command(&mut self, cmd: &Command) -> Result<(), RuntimeError> {
        let name = self.codec.read_string().unwrap_or_default();
        // The reply goes out before the callback runs; callback failures
        // are not observable to the peer, and an unregistered name still
        // gets SUCCESS.
        self.reply(cmd.id, ResponseStatus::Success)?;
        if !self.commands.invoke(&name) {
            tracing::debug!(name = %name, "user command not registered");
        }
        Ok(())
    }

    fn handle_get_devices(&mut self, cmd: &Command) -> Result<(), RuntimeError> {
        let total = self.registry.len();
        tracing::debug!(total, correlation_id = cmd.id, "enumerating devices");
        for index in 0..total {
            let descriptor = match self.registry.get_at(index) {
                Some(device) => device.descriptor(),
                None => break,
            };
            // One complete frame per device, so each independently fits
            // the fixed buffer.
            self.codec.do_start()?;
            self.codec.print(CommandType::GetDevicesResponse.code())?;
            self.codec.do_token()?;
            self.codec.print(cmd.id)?;
            self.codec.do_token()?;
            self.codec.print(index + 1)?;
            self.codec.do_token()?;
            self.codec.print(total)?;
            self.codec.do_token()?;
            self.codec.print(&descriptor)?;
            self.codec.do_list_end()?;
            self.codec.do_end()?;
        }
        Ok(())
    }

    fn handle_sync_ids(&mut self, cmd: &Command) -> Result<(), RuntimeError> {
        let ids = match self.read_sync_batch() {
            Ok(ids) => ids,
            Err(reason) => {
                tracing::debug!(reason, "rejecting id resync");
                return self.reply(cmd.id, ResponseStatus::BadRequest);
            }
        };

        if let Err(e) = self.registry.sync_ids(&ids) {
            tracing::debug!(error = %e, "rejecting id resync");
            return self.reply(cmd.id, ResponseStatus::BadRequest);
        }

        match self.persist_ids() {
            Ok(()) => self.reply(cmd.id, ResponseStatus::Success),
            Err(e) => {
                tracing::error!(error = %e, "failed to persist device ids");
                self.reply(cmd.id, ResponseStatus::InternalError)
            }
        }
    }

    /// Reads the expected count and that many ids. The count must match
    /// the registry before any id is read.
    fn read_sync_batch(&mut self) -> Result<Vec<u8>, &'static str> {
        let expected = self.codec.read_int().map_err(|_| "missing count")?;
        if expected < 0 || expected as usize != self.registry.len() {
            return Err("count mismatch");
        }
        let mut ids = Vec::with_capacity(expected as usize);
        for _ in 0..expected {
            let raw = self.codec.read_int().map_err(|_| "missing id")?;
            let id = u8::try_from(raw).map_err(|_| "id out of range")?;
            ids.push(id);
        }
        Ok(ids)
    }

    fn persist_ids(&mut self) -> Result<(), RuntimeError> {
        let mut record = self.store.load()?;
        record.device_ids = self.registry.ids();
        self.store.save(&record)?;
        Ok(())
    }

    fn handle_firmware_update(&mut self, cmd: &Command) -> Result<(), RuntimeError> {
        let source = self.codec.read_string().unwrap_or_default();
        let Some(updater) = self.updater.as_mut() else {
            return self.reply(cmd.id, ResponseStatus::NotImplemented);
        };
        match updater.update_from(&source) {
            Ok(()) => {
                tracing::info!(source = %source, "firmware updated, restarting");
                self.reply(cmd.id, ResponseStatus::Success)?;
                self.request_reset();
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "firmware update failed");
                self.reply(cmd.id, ResponseStatus::InternalError)
            }
        }
    }

    fn reply(&mut self, correlation_id: u32, status: ResponseStatus) -> Result<(), RuntimeError> {
        self.codec.send(&Command::status(correlation_id, status))?;
        Ok(())
    }

    fn request_reset(&mut self) {
        self.reset_requested = true;
        if let Some(hook) = self.reset_hook.as_mut() {
            hook();
        }
    }

    fn keep_alive_tick(&mut self, now: Instant) -> Result<(), RuntimeError> {
        if !self.keep_alive.enabled {
            return Ok(());
        }
        if now.duration_since(self.keep_alive.last_activity) < self.keep_alive.interval {
            return Ok(());
        }
        // One silent interval: heartbeat out, one more miss on the books.
        self.keep_alive.missed += 1;
        self.keep_alive.last_activity = now;
        tracing::debug!(missed = self.keep_alive.missed, "link silent, sending heartbeat");
        self.codec.send(&Command::new(CommandType::PingRequest, 0, 0))?;
        self.codec.flush()?;
        if self.keep_alive.missed == self.keep_alive.miss_threshold {
            tracing::warn!(
                threshold = self.keep_alive.miss_threshold,
                "controller unresponsive"
            );
        }
        Ok(())
    }

    /// Polls every sensor for a changed value. Runs outside the receive
    /// path, gated by the sweep interval; notifications share one debounce
    /// window so a noisy input cannot flood the link.
    fn sweep_sensors(&mut self, now: Instant) -> Result<(), RuntimeError> {
        if let Some(last) = self.last_sweep {
            if now.duration_since(last) < self.sweep_interval {
                return Ok(());
            }
        }
        self.last_sweep = Some(now);

        let mut changes: Vec<(u8, CommandType, Value, u8)> = Vec::new();
        for device in self.registry.iter_mut() {
            if !device.is_sensor() {
                continue;
            }
            let Some(new_value) = device.sample() else {
                continue;
            };
            if let Some(last) = self.last_notify {
                if now.duration_since(last) < self.debounce {
                    // Not committed: the change reports again next sweep.
                    continue;
                }
            }
            self.last_notify = Some(now);
            device.set_value(new_value);
            changes.push((
                device.id(),
                device.device_type().command_kind(),
                new_value,
                device.target_id(),
            ));
        }

        let notified = !changes.is_empty();
        for (device_id, kind, value, target_id) in changes {
            if self.auto_control && target_id > 0 {
                match self.registry.get_mut(target_id) {
                    Some(actuator) => actuator.set_value(value),
                    None => tracing::debug!(target_id, "bonded actuator missing"),
                }
            }
            tracing::debug!(device_id, value, "sensor changed, notifying");
            self.codec.send(&Command::new(kind, device_id, value))?;
        }
        if notified {
            self.codec.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackTransport;
    use crate::update::UpdateError;
    use devlink_core::{Device, DeviceType};
    use devlink_protocol::FRAME_BUFFER_SIZE;
    use devlink_storage::{ConfigRecord, MemoryStore};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    type TestDispatcher = Dispatcher<LoopbackTransport, MemoryStore>;

    fn harness(registry: DeviceRegistry) -> (TestDispatcher, FrameCodec<LoopbackTransport>) {
        let (agent_end, controller_end) = LoopbackTransport::pair();
        let codec = FrameCodec::new(agent_end).with_read_timeout(Duration::ZERO);
        let dispatcher = Dispatcher::new(codec, registry, CommandTable::new(), MemoryStore::new());
        let controller = FrameCodec::new(controller_end).with_read_timeout(Duration::ZERO);
        (dispatcher, controller)
    }

    /// Registry with id 1 on pin 13 and id 2 on pin 9.
    fn two_device_registry() -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        registry
            .add(Device::actuator("lamp", 13, DeviceType::Digital))
            .unwrap();
        registry
            .add(Device::actuator("fan", 9, DeviceType::Pwm))
            .unwrap();
        registry
    }

    fn success_code() -> Value {
        Value::from(ResponseStatus::Success.code())
    }

    #[test]
    fn test_ping_gets_pong() {
        let (mut agent, mut controller) = harness(DeviceRegistry::new());
        controller
            .send(&Command::new(CommandType::PingRequest, 0, 0).with_id(3))
            .unwrap();

        let outcome = agent.tick(Instant::now()).unwrap();
        assert!(outcome.handled);
        assert!(!outcome.reset);

        let reply = controller.parse().unwrap();
        assert_eq!(reply.kind, CommandType::PingResponse);
        assert_eq!(reply.id, 3);
        assert_eq!(reply.value, success_code());
    }

    #[test]
    fn test_device_write_updates_value() {
        let (mut agent, mut controller) = harness(two_device_registry());
        controller
            .send(&Command::new(CommandType::Digital, 1, 1).with_id(4))
            .unwrap();

        agent.tick(Instant::now()).unwrap();
        assert_eq!(agent.registry().get(1).unwrap().value(), 1);

        let reply = controller.parse().unwrap();
        assert_eq!(reply.kind, CommandType::Response);
        assert_eq!(reply.id, 4);
        assert_eq!(reply.value, success_code());
    }

    #[test]
    fn test_device_write_unknown_id_not_found() {
        let (mut agent, mut controller) = harness(two_device_registry());
        controller
            .send(&Command::new(CommandType::Digital, 5, 1).with_id(8))
            .unwrap();

        agent.tick(Instant::now()).unwrap();

        let reply = controller.parse().unwrap();
        assert_eq!(reply.value, Value::from(ResponseStatus::NotFound.code()));
        assert_eq!(reply.id, 8);
        // No registry mutation happened.
        assert_eq!(agent.registry().get(1).unwrap().value(), 0);
        assert_eq!(agent.registry().get(2).unwrap().value(), 0);
    }

    #[test]
    fn test_custom_device_reads_extra_payload() {
        let mut registry = DeviceRegistry::new();
        registry
            .add(Device::new("rgb", 6, DeviceType::Custom, false))
            .unwrap();
        let (mut agent, mut controller) = harness(registry);

        controller
            .transport_mut()
            .write_bytes(b"<5:2:1:255:10,20,30;>")
            .unwrap();
        agent.tick(Instant::now()).unwrap();

        let device = agent.registry().get(1).unwrap();
        assert_eq!(device.value(), 255);
        assert_eq!(device.extra(), &[10, 20, 30]);
        assert_eq!(controller.parse().unwrap().value, success_code());
    }

    #[test]
    fn test_user_command_invoked_after_reply() {
        let (mut agent, mut controller) = harness(DeviceRegistry::new());
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        agent
            .commands_mut()
            .register("blink", Box::new(move || counter.set(counter.get() + 1)))
            .unwrap();

        controller
            .transport_mut()
            .write_bytes(b"<50:6:0:0:blink>")
            .unwrap();
        agent.tick(Instant::now()).unwrap();

        assert_eq!(hits.get(), 1);
        let reply = controller.parse().unwrap();
        assert_eq!(reply.id, 6);
        assert_eq!(reply.value, success_code());
    }

    #[test]
    fn test_user_command_unknown_name_still_success() {
        // Compatibility quirk: the peer cannot tell an unregistered name
        // from a registered one. Pinned deliberately.
        let (mut agent, mut controller) = harness(DeviceRegistry::new());
        controller
            .transport_mut()
            .write_bytes(b"<50:6:0:0:doesNotExist>")
            .unwrap();
        agent.tick(Instant::now()).unwrap();

        let reply = controller.parse().unwrap();
        assert_eq!(reply.kind, CommandType::Response);
        assert_eq!(reply.value, success_code());
    }

    #[test]
    fn test_get_devices_one_frame_per_device() {
        let (mut agent, mut controller) = harness(two_device_registry());
        controller
            .send(&Command::new(CommandType::GetDevices, 0, 0).with_id(7))
            .unwrap();
        agent.tick(Instant::now()).unwrap();

        let mut descriptor = [0 as Value; 8];

        let first = controller.parse().unwrap();
        assert_eq!(first.kind, CommandType::GetDevicesResponse);
        assert_eq!(first.id, 7);
        assert_eq!(first.device_id, 1); // position 1 of 2
        assert_eq!(first.value, 2); // total
        let n = controller.read_long_values(&mut descriptor).unwrap();
        assert_eq!(&descriptor[..n], &[1, 13, 0, 0, 0, 1]);

        let second = controller.parse().unwrap();
        assert_eq!(second.id, 7);
        assert_eq!(second.device_id, 2); // position 2 of 2
        assert_eq!(second.value, 2);
        let n = controller.read_long_values(&mut descriptor).unwrap();
        assert_eq!(&descriptor[..n], &[2, 9, 0, 0, 0, 3]);

        // Exactly two frames.
        assert!(!controller.poll());
    }

    #[test]
    fn test_sync_ids_success_persists() {
        let (mut agent, mut controller) = harness(two_device_registry());
        controller
            .transport_mut()
            .write_bytes(b"<32:9:0:0:2:10:20>")
            .unwrap();
        agent.tick(Instant::now()).unwrap();

        assert_eq!(agent.registry().ids(), vec![10, 20]);
        // Lookup works by the new id, never the original.
        assert_eq!(agent.registry().get(10).unwrap().name(), "lamp");
        assert!(agent.registry().get(1).is_none());

        assert_eq!(agent.store().save_count(), 1);
        assert_eq!(agent.store().record().device_ids, vec![10, 20]);

        let reply = controller.parse().unwrap();
        assert_eq!(reply.id, 9);
        assert_eq!(reply.value, success_code());
    }

    #[test]
    fn test_sync_ids_count_mismatch_rejected() {
        let (mut agent, mut controller) = harness(two_device_registry());
        controller
            .transport_mut()
            .write_bytes(b"<32:9:0:0:1:10>")
            .unwrap();
        agent.tick(Instant::now()).unwrap();

        let reply = controller.parse().unwrap();
        assert_eq!(reply.value, Value::from(ResponseStatus::BadRequest.code()));
        assert_eq!(agent.registry().ids(), vec![1, 2]);
        assert_eq!(agent.store().save_count(), 0);
    }

    #[test]
    fn test_sync_ids_out_of_range_rejected() {
        let (mut agent, mut controller) = harness(two_device_registry());
        controller
            .transport_mut()
            .write_bytes(b"<32:9:0:0:2:10:200>")
            .unwrap();
        agent.tick(Instant::now()).unwrap();

        let reply = controller.parse().unwrap();
        assert_eq!(reply.value, Value::from(ResponseStatus::BadRequest.code()));
        // All-or-nothing: the first id kept its value too.
        assert_eq!(agent.registry().ids(), vec![1, 2]);
    }

    #[test]
    fn test_unknown_type_silently_ignored() {
        // Compatibility quirk: no UNKNOWN_COMMAND reply exists. Pinned
        // deliberately.
        let (mut agent, mut controller) = harness(DeviceRegistry::new());
        controller
            .transport_mut()
            .write_bytes(b"<99:1:0:0>")
            .unwrap();

        let outcome = agent.tick(Instant::now()).unwrap();
        assert!(outcome.handled);
        assert!(!controller.poll());
    }

    #[test]
    fn test_reset_raises_flag_and_hook() {
        let fired = Rc::new(Cell::new(false));
        let hook = fired.clone();
        let (agent, mut controller) = harness(DeviceRegistry::new());
        let mut agent = agent.with_reset_hook(Box::new(move || hook.set(true)));

        controller
            .send(&Command::new(CommandType::Reset, 0, 0))
            .unwrap();
        let outcome = agent.tick(Instant::now()).unwrap();

        assert!(outcome.reset);
        assert!(fired.get());
        // Terminal for the tick: no reply, the controller restarts us.
        assert!(!controller.poll());
    }

    #[test]
    fn test_firmware_update_without_updater() {
        let (mut agent, mut controller) = harness(DeviceRegistry::new());
        controller
            .transport_mut()
            .write_bytes(b"<40:5:0:0:fw-2.bin>")
            .unwrap();
        agent.tick(Instant::now()).unwrap();

        let reply = controller.parse().unwrap();
        assert_eq!(
            reply.value,
            Value::from(ResponseStatus::NotImplemented.code())
        );
    }

    struct ScriptedUpdater {
        ok: bool,
        last_source: Rc<RefCell<String>>,
    }

    impl FirmwareUpdater for ScriptedUpdater {
        fn update_from(&mut self, source: &str) -> Result<(), UpdateError> {
            *self.last_source.borrow_mut() = source.to_string();
            if self.ok {
                Ok(())
            } else {
                Err(UpdateError::Failed("flash write".to_string()))
            }
        }
    }

    #[test]
    fn test_firmware_update_success_restarts() {
        let source = Rc::new(RefCell::new(String::new()));
        let (agent, mut controller) = harness(DeviceRegistry::new());
        let mut agent = agent.with_updater(Box::new(ScriptedUpdater {
            ok: true,
            last_source: source.clone(),
        }));

        controller
            .transport_mut()
            .write_bytes(b"<40:5:0:0:fw-2.bin>")
            .unwrap();
        let outcome = agent.tick(Instant::now()).unwrap();

        assert_eq!(*source.borrow(), "fw-2.bin");
        assert!(outcome.reset);
        assert_eq!(controller.parse().unwrap().value, success_code());
    }

    #[test]
    fn test_firmware_update_failure_reports() {
        let (agent, mut controller) = harness(DeviceRegistry::new());
        let mut agent = agent.with_updater(Box::new(ScriptedUpdater {
            ok: false,
            last_source: Rc::new(RefCell::new(String::new())),
        }));

        controller
            .transport_mut()
            .write_bytes(b"<40:5:0:0:fw-2.bin>")
            .unwrap();
        let outcome = agent.tick(Instant::now()).unwrap();

        assert!(!outcome.reset);
        assert_eq!(
            controller.parse().unwrap().value,
            Value::from(ResponseStatus::InternalError.code())
        );
    }

    #[test]
    fn test_keep_alive_heartbeat_and_recovery() {
        let (agent, mut controller) = harness(DeviceRegistry::new());
        let mut agent = agent.with_keep_alive(&KeepAliveConfig {
            enabled: true,
            interval_ms: 1000,
            miss_threshold: 2,
        });
        let t0 = Instant::now();

        // No silence yet: no heartbeat.
        agent.tick(t0).unwrap();
        assert!(!controller.poll());

        // One silent interval: heartbeat, one miss, still connected.
        agent.tick(t0 + Duration::from_millis(1100)).unwrap();
        let ping = controller.parse().unwrap();
        assert_eq!(ping.kind, CommandType::PingRequest);
        assert!(agent.is_connected());

        // Second silent interval: over the threshold.
        agent.tick(t0 + Duration::from_millis(2200)).unwrap();
        controller.parse().unwrap();
        assert!(!agent.is_connected());

        // Any inbound traffic restores the link.
        controller
            .send(&Command::new(CommandType::PingRequest, 0, 0).with_id(1))
            .unwrap();
        agent.tick(t0 + Duration::from_millis(2300)).unwrap();
        assert!(agent.is_connected());
    }

    #[test]
    fn test_sensor_change_notifies_and_drives_target() {
        let reading = Rc::new(Cell::new(0 as Value));
        let source = reading.clone();
        let mut registry = DeviceRegistry::new();
        registry
            .add(Device::actuator("fan", 9, DeviceType::Pwm))
            .unwrap();
        registry
            .add(Device::custom_sensor("knob", Box::new(move || source.get())).with_target(1))
            .unwrap();

        let (agent, mut controller) = harness(registry);
        let mut agent = agent.with_sensor_settings(&SensorConfig {
            sweep_interval_ms: 0,
            debounce_ms: 0,
            auto_control: true,
        });

        reading.set(42);
        agent.tick(Instant::now()).unwrap();

        let note = controller.parse().unwrap();
        assert_eq!(note.kind, CommandType::Custom);
        assert_eq!(note.device_id, 2);
        assert_eq!(note.value, 42);
        // Auto-control propagated to the bonded actuator.
        assert_eq!(agent.registry().get(1).unwrap().value(), 42);
    }

    #[test]
    fn test_sensor_debounce_suppresses_then_delivers() {
        let reading = Rc::new(Cell::new(0 as Value));
        let source = reading.clone();
        let mut registry = DeviceRegistry::new();
        registry
            .add(Device::custom_sensor("knob", Box::new(move || source.get())))
            .unwrap();

        let (agent, mut controller) = harness(registry);
        let mut agent = agent.with_sensor_settings(&SensorConfig {
            sweep_interval_ms: 0,
            debounce_ms: 10_000,
            auto_control: false,
        });
        let t0 = Instant::now();

        reading.set(1);
        agent.tick(t0).unwrap();
        assert_eq!(controller.parse().unwrap().value, 1);

        // Inside the debounce window: suppressed and not committed.
        reading.set(2);
        agent.tick(t0 + Duration::from_millis(1)).unwrap();
        assert!(!controller.poll());

        // Past the window the pending change goes out.
        agent.tick(t0 + Duration::from_millis(11_000)).unwrap();
        assert_eq!(controller.parse().unwrap().value, 2);
    }

    #[test]
    fn test_sweep_interval_gates_sampling() {
        let reading = Rc::new(Cell::new(0 as Value));
        let source = reading.clone();
        let mut registry = DeviceRegistry::new();
        registry
            .add(Device::custom_sensor("knob", Box::new(move || source.get())))
            .unwrap();

        let (agent, mut controller) = harness(registry);
        let mut agent = agent.with_sensor_settings(&SensorConfig {
            sweep_interval_ms: 1000,
            debounce_ms: 0,
            auto_control: false,
        });
        let t0 = Instant::now();

        reading.set(5);
        agent.tick(t0).unwrap();
        assert_eq!(controller.parse().unwrap().value, 5);

        reading.set(6);
        agent.tick(t0 + Duration::from_millis(10)).unwrap();
        assert!(!controller.poll());

        agent.tick(t0 + Duration::from_millis(1100)).unwrap();
        assert_eq!(controller.parse().unwrap().value, 6);
    }

    #[test]
    fn test_overflow_recovers_next_tick() {
        let (mut agent, mut controller) = harness(DeviceRegistry::new());
        let mut junk = vec![b'<'];
        junk.extend(std::iter::repeat(b'1').take(FRAME_BUFFER_SIZE + 20));
        controller.transport_mut().write_bytes(&junk).unwrap();

        let outcome = agent.tick(Instant::now()).unwrap();
        assert!(!outcome.handled);

        controller
            .send(&Command::new(CommandType::PingRequest, 0, 0).with_id(1))
            .unwrap();
        let outcome = agent.tick(Instant::now()).unwrap();
        assert!(outcome.handled);
        assert_eq!(controller.parse().unwrap().kind, CommandType::PingResponse);
    }

    #[test]
    fn test_listener_observes_every_command() {
        let seen: Rc<RefCell<Vec<Command>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let (agent, mut controller) = harness(DeviceRegistry::new());
        let mut agent =
            agent.with_listener(Box::new(move |cmd: &Command| sink.borrow_mut().push(*cmd)));

        controller
            .send(&Command::new(CommandType::PingRequest, 0, 0).with_id(5))
            .unwrap();
        agent.tick(Instant::now()).unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, CommandType::PingRequest);
        assert_eq!(seen[0].id, 5);
    }

    #[test]
    fn test_load_saved_ids_restores_registry() {
        let mut store = MemoryStore::new();
        store
            .save(&ConfigRecord {
                device_ids: vec![10, 20],
                ..Default::default()
            })
            .unwrap();

        let (agent_end, _controller_end) = LoopbackTransport::pair();
        let codec = FrameCodec::new(agent_end).with_read_timeout(Duration::ZERO);
        let mut agent = Dispatcher::new(codec, two_device_registry(), CommandTable::new(), store);

        agent.load_saved_ids().unwrap();
        assert_eq!(agent.registry().ids(), vec![10, 20]);
    }

    #[test]
    fn test_load_saved_ids_with_mismatched_count_keeps_defaults() {
        let mut store = MemoryStore::new();
        store
            .save(&ConfigRecord {
                device_ids: vec![10, 20, 30],
                ..Default::default()
            })
            .unwrap();

        let (agent_end, _controller_end) = LoopbackTransport::pair();
        let codec = FrameCodec::new(agent_end).with_read_timeout(Duration::ZERO);
        let mut agent = Dispatcher::new(codec, two_device_registry(), CommandTable::new(), store);

        agent.load_saved_ids().unwrap();
        assert_eq!(agent.registry().ids(), vec![1, 2]);
    }
}
