//! The LogManager: an explicit registry of per-device coordinators.
//!
//! Each device gets its own task that owns its [`LogCoordinator`] and drains a
//! bounded command channel. Every event and query for that device goes
//! through the channel, so the device's log has exactly one writer. Devices
//! never share state and run in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use probelog_core::{DeviceId, LoggedPoint, SessionStatus};
use probelog_sync::{CoordinatorConfig, EventSink, Inbound, LogCoordinator, UploadState};

use crate::error::{ManagerError, Result};

/// Default depth of each device's command channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Configuration for each device's coordinator.
    pub coordinator: CoordinatorConfig,
    /// Commands buffered per device before `dispatch` waits.
    pub channel_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ManagerConfig {
    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(ManagerError::InvalidConfig(
                "channel_capacity must be non-zero".into(),
            ));
        }
        self.coordinator.session.validate()?;
        Ok(())
    }
}

/// Work delivered to a device task.
enum Command {
    Event(Inbound),
    History(oneshot::Sender<Vec<LoggedPoint>>),
    State(oneshot::Sender<UploadState>),
    Status(oneshot::Sender<Option<SessionStatus>>),
    Reset(oneshot::Sender<()>),
}

struct DeviceHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

/// Registry of device logs, owned by the host application.
pub struct LogManager<E: EventSink + 'static> {
    config: ManagerConfig,
    sink: Arc<E>,
    devices: RwLock<HashMap<DeviceId, DeviceHandle>>,
}

impl<E: EventSink + 'static> LogManager<E> {
    /// Create a manager that reports outbound events to `sink`.
    pub fn new(config: ManagerConfig, sink: E) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sink: Arc::new(sink),
            devices: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Devices with a log, in no particular order.
    pub async fn devices(&self) -> Vec<DeviceId> {
        self.devices.read().await.keys().copied().collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────────

    /// Route an inbound event to its device, creating the device's log on
    /// first contact.
    ///
    /// Waits when the device's queue is full. Events for one device are
    /// applied in the order they are dispatched.
    pub async fn dispatch(&self, event: Inbound) -> Result<()> {
        let device_id = event.device_id();
        let commands = self.sender_for(device_id).await?;
        commands
            .send(Command::Event(event))
            .await
            .map_err(|_| ManagerError::WorkerStopped(device_id))
    }

    async fn sender_for(&self, device_id: DeviceId) -> Result<mpsc::Sender<Command>> {
        if let Some(handle) = self.devices.read().await.get(&device_id) {
            return Ok(handle.commands.clone());
        }

        let mut devices = self.devices.write().await;
        if let Some(handle) = devices.get(&device_id) {
            return Ok(handle.commands.clone());
        }

        let coordinator = LogCoordinator::new(device_id, self.config.coordinator)?;
        let (commands, receiver) = mpsc::channel(self.config.channel_capacity);
        let task = tokio::spawn(run_device(coordinator, receiver, Arc::clone(&self.sink)));

        info!(device = %device_id, "tracking new device");
        devices.insert(
            device_id,
            DeviceHandle {
                commands: commands.clone(),
                task,
            },
        );
        Ok(commands)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Snapshot of every record logged for a device, across sessions.
    pub async fn history(&self, device_id: DeviceId) -> Result<Vec<LoggedPoint>> {
        self.query(device_id, Command::History).await
    }

    /// Current upload state of a device.
    pub async fn upload_state(&self, device_id: DeviceId) -> Result<UploadState> {
        self.query(device_id, Command::State).await
    }

    /// Status of a device's current session.
    pub async fn status(&self, device_id: DeviceId) -> Result<Option<SessionStatus>> {
        self.query(device_id, Command::Status).await
    }

    /// Drop every session logged for a device.
    pub async fn reset_device(&self, device_id: DeviceId) -> Result<()> {
        self.query(device_id, Command::Reset).await
    }

    async fn query<T>(
        &self,
        device_id: DeviceId,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let commands = self
            .devices
            .read()
            .await
            .get(&device_id)
            .map(|handle| handle.commands.clone())
            .ok_or(ManagerError::UnknownDevice(device_id))?;

        let (reply, response) = oneshot::channel();
        commands
            .send(command(reply))
            .await
            .map_err(|_| ManagerError::WorkerStopped(device_id))?;
        response
            .await
            .map_err(|_| ManagerError::WorkerStopped(device_id))
    }

    /// Stop every device task after it drains its queue.
    pub async fn shutdown(&self) {
        let handles: Vec<(DeviceId, DeviceHandle)> =
            self.devices.write().await.drain().collect();

        for (device_id, handle) in handles {
            drop(handle.commands);
            if let Err(e) = handle.task.await {
                warn!(device = %device_id, "device task ended abnormally: {}", e);
            }
        }
    }
}

/// Single consumer for one device's commands.
async fn run_device<E: EventSink>(
    mut coordinator: LogCoordinator,
    mut commands: mpsc::Receiver<Command>,
    sink: Arc<E>,
) {
    let device_id = coordinator.device_id();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Event(event) => match coordinator.handle(event) {
                Ok(outbound) => {
                    if let Err(e) = sink.emit_all(outbound).await {
                        warn!(device = %device_id, "failed to emit events: {}", e);
                    }
                }
                Err(e) => warn!(device = %device_id, "event rejected: {}", e),
            },
            Command::History(reply) => {
                let _ = reply.send(coordinator.log().history().collect());
            }
            Command::State(reply) => {
                let _ = reply.send(coordinator.state());
            }
            Command::Status(reply) => {
                let _ = reply.send(coordinator.status());
            }
            Command::Reset(reply) => {
                let outbound = coordinator.reset();
                if let Err(e) = sink.emit_all(outbound).await {
                    warn!(device = %device_id, "failed to emit events: {}", e);
                }
                let _ = reply.send(());
            }
        }
    }

    debug!(device = %device_id, "device task stopped");
}
