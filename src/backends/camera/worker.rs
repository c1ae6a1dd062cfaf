// SPDX-License-Identifier: GPL-3.0-only

//! Device worker
//!
//! Each physical device gets one dedicated thread that owns its
//! [`DeviceConnection`]. Every device operation is posted to that thread as a
//! [`Command`] and executed strictly in submission order, so the connection is
//! never touched concurrently and callers never block on hardware.
//!
//! Results travel back as [`WorkerEvent`]s on a channel shared with the
//! session, tagged with the worker's device index. Calls that return a value
//! (parameters, option listings) carry a oneshot reply channel instead.

use super::options::{self, OptionDescription};
use super::types::*;
use super::viewfinder::{PumpOutcome, ViewfinderPump};
use super::{DeviceConnection, DeviceProtocol};
use crate::config::SessionConfig;
use crate::errors::{AppError, AppResult, ErrorKind, OptionError};
use crate::pipelines::photo::{CaptureOutcome, CaptureRequest, capture_photo};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Event raised by a worker, in the order the producing commands completed
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// The worker's status moved
    StatusChanged(SessionStatus),
    /// A viewfinder frame is ready for display
    PreviewCaptured(CameraFrame),
    /// Raw bytes of a still capture
    ImageDataCaptured {
        id: u32,
        data: Vec<u8>,
        file_name: String,
    },
    /// A capture request failed
    ImageCaptureError {
        id: u32,
        kind: ErrorKind,
        message: String,
    },
    /// Session-level error; `Camera` errors mean the device was closed
    Error { kind: ErrorKind, message: String },
    /// Non-fatal failure of a parameter call
    Warning { kind: ErrorKind, message: String },
}

/// Sending half of the channel workers publish on
pub type EventSender = mpsc::UnboundedSender<(usize, WorkerEvent)>;

/// Receiving half of the channel workers publish on
pub type EventReceiver = mpsc::UnboundedReceiver<(usize, WorkerEvent)>;

enum Command {
    SetState(SessionState),
    Open,
    Close,
    StartViewfinder,
    StopViewfinder,
    SetCaptureMode(CaptureModes),
    Capture(CaptureRequest),
    GetParameter {
        name: String,
        reply: oneshot::Sender<Option<ParameterValue>>,
    },
    SetParameter {
        name: String,
        value: ParameterValue,
        reply: oneshot::Sender<bool>,
    },
    DescribeOption {
        name: String,
        reply: oneshot::Sender<Option<OptionDescription>>,
    },
    ListOptions {
        reply: oneshot::Sender<Vec<OptionDescription>>,
    },
    /// One viewfinder frame of the given pump generation; posted by the
    /// worker to itself
    PumpPreview(u64),
    /// Replies once every command posted before it has run
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::SetState(_) => "SetState",
            Command::Open => "Open",
            Command::Close => "Close",
            Command::StartViewfinder => "StartViewfinder",
            Command::StopViewfinder => "StopViewfinder",
            Command::SetCaptureMode(_) => "SetCaptureMode",
            Command::Capture(_) => "Capture",
            Command::GetParameter { .. } => "GetParameter",
            Command::SetParameter { .. } => "SetParameter",
            Command::DescribeOption { .. } => "DescribeOption",
            Command::ListOptions { .. } => "ListOptions",
            Command::PumpPreview(_) => "PumpPreview",
            Command::Barrier(_) => "Barrier",
            Command::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

/// Handle to a device worker thread
///
/// Dropping the handle closes the device after all queued commands ran and
/// joins the thread.
pub struct DeviceWorker {
    index: usize,
    commands: mpsc::UnboundedSender<Command>,
    /// Set while a viewfinder stop is pending; checked before publishing frames
    cancel: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl DeviceWorker {
    /// Spawn the worker thread for device `index`
    ///
    /// The device is not opened until a lifecycle command asks for it.
    pub fn spawn(
        index: usize,
        descriptor: DeviceDescriptor,
        protocol: Arc<dyn DeviceProtocol>,
        config: SessionConfig,
        events: EventSender,
    ) -> AppResult<Self> {
        let (commands, receiver) = mpsc::unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));

        let thread_descriptor = descriptor.clone();
        let thread_cancel = Arc::clone(&cancel);
        let weak_commands = commands.downgrade();

        let name = format!("tethercam-worker-{}", index);
        let thread_handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                // The connection is created, used and dropped on this thread only
                let context = WorkerContext {
                    index,
                    descriptor: thread_descriptor,
                    protocol,
                    pump: ViewfinderPump::new(config.preview_fail_limit),
                    config,
                    connection: None,
                    status: SessionStatus::Unloaded,
                    mode: CaptureModes::default(),
                    pump_generation: 0,
                    cancel: thread_cancel,
                    events,
                    commands: weak_commands,
                };
                context.run(receiver);
            })
            .map_err(|e| AppError::Session(format!("Failed to spawn {}: {}", name, e)))?;

        info!(worker = index, device = %descriptor, "Device worker spawned");

        Ok(Self {
            index,
            commands,
            cancel,
            thread_handle: Some(thread_handle),
        })
    }

    /// Drive the device towards `target` through the lifecycle table
    ///
    /// Leaving `Active` raises the cancel flag right away. Only the worker
    /// lowers it again, once it is running the viewfinder.
    pub fn set_state(&self, target: SessionState) {
        if target != SessionState::Active {
            self.cancel.store(true, Ordering::SeqCst);
        }
        self.send(Command::SetState(target));
    }

    pub fn open(&self) {
        self.send(Command::Open);
    }

    pub fn close(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.send(Command::Close);
    }

    pub fn start_viewfinder(&self) {
        self.send(Command::StartViewfinder);
    }

    /// Stop the viewfinder; a frame grabbed after this call is never published
    pub fn stop_viewfinder(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.send(Command::StopViewfinder);
    }

    pub fn set_capture_mode(&self, mode: CaptureModes) {
        self.send(Command::SetCaptureMode(mode));
    }

    /// Queue a still capture; the outcome arrives as an event
    pub fn capture(&self, request: CaptureRequest) {
        self.send(Command::Capture(request));
    }

    /// Read an option; `None` when it cannot be read
    pub async fn parameter(&self, name: &str) -> Option<ParameterValue> {
        let (reply, response) = oneshot::channel();
        self.send(Command::GetParameter {
            name: name.to_string(),
            reply,
        });
        response.await.ok().flatten()
    }

    /// Write an option; `false` when it cannot be written
    pub async fn set_parameter(&self, name: &str, value: ParameterValue) -> bool {
        let (reply, response) = oneshot::channel();
        self.send(Command::SetParameter {
            name: name.to_string(),
            value,
            reply,
        });
        response.await.unwrap_or(false)
    }

    /// Describe one option and log it at debug level
    pub async fn describe_option(&self, name: &str) -> Option<OptionDescription> {
        let (reply, response) = oneshot::channel();
        self.send(Command::DescribeOption {
            name: name.to_string(),
            reply,
        });
        response.await.ok().flatten()
    }

    pub async fn list_options(&self) -> Vec<OptionDescription> {
        let (reply, response) = oneshot::channel();
        self.send(Command::ListOptions { reply });
        response.await.unwrap_or_default()
    }

    /// Wait until every command posted so far has run
    ///
    /// Events those commands raised are in the event channel when this returns.
    pub async fn quiesce(&self) {
        let (reply, response) = oneshot::channel();
        self.send(Command::Barrier(reply));
        let _ = response.await;
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            warn!(worker = self.index, command = ?e.0, "Device worker is gone, dropping command");
        }
    }
}

impl Drop for DeviceWorker {
    fn drop(&mut self) {
        debug!(worker = self.index, "Requesting device worker shutdown");
        self.cancel.store(true, Ordering::SeqCst);
        self.send(Command::Shutdown);

        if let Some(handle) = self.thread_handle.take()
            && handle.join().is_err()
        {
            error!(worker = self.index, "Device worker thread panicked");
        }
    }
}

/// State owned by the worker thread
struct WorkerContext {
    index: usize,
    descriptor: DeviceDescriptor,
    protocol: Arc<dyn DeviceProtocol>,
    config: SessionConfig,
    connection: Option<Box<dyn DeviceConnection>>,
    status: SessionStatus,
    mode: CaptureModes,
    pump: ViewfinderPump,
    /// Bumped on every viewfinder start and stop; pumps of older generations
    /// are dropped
    pump_generation: u64,
    cancel: Arc<AtomicBool>,
    events: EventSender,
    /// Weak so the worker's own queue does not keep it alive
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl WorkerContext {
    fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        debug!(worker = self.index, "Device worker thread started");

        while let Some(command) = receiver.blocking_recv() {
            if matches!(command, Command::Shutdown) {
                debug!(worker = self.index, "Shutdown requested");
                break;
            }
            self.handle(command);
        }

        self.close();
        info!(worker = self.index, "Device worker thread exiting");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::SetState(target) => self.set_state(target),
            Command::Open => {
                self.open();
            }
            Command::Close => self.close(),
            Command::StartViewfinder => self.start_viewfinder(),
            Command::StopViewfinder => self.stop_viewfinder(),
            Command::SetCaptureMode(mode) => {
                debug!(worker = self.index, mode = mode.bits(), "Capture mode set");
                self.mode = mode;
            }
            Command::Capture(request) => self.capture(request),
            Command::GetParameter { name, reply } => {
                let _ = reply.send(self.parameter(&name));
            }
            Command::SetParameter { name, value, reply } => {
                let _ = reply.send(self.set_parameter(&name, &value));
            }
            Command::DescribeOption { name, reply } => {
                let description = self
                    .connection
                    .as_deref_mut()
                    .and_then(|conn| options::log_option(conn, &name));
                let _ = reply.send(description);
            }
            Command::ListOptions { reply } => {
                let listing = match self.connection.as_deref_mut() {
                    Some(conn) => options::list_options(conn),
                    None => Err(OptionError::DeviceClosed),
                };
                let listing = listing.unwrap_or_else(|e| {
                    self.warn_option(&e);
                    Vec::new()
                });
                let _ = reply.send(listing);
            }
            Command::PumpPreview(generation) => self.pump_preview(generation),
            Command::Barrier(reply) => {
                let _ = reply.send(());
            }
            Command::Shutdown => {}
        }
    }

    fn emit(&self, event: WorkerEvent) {
        if self.events.send((self.index, event)).is_err() {
            debug!(worker = self.index, "Session is gone, dropping event");
        }
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status != status {
            debug!(worker = self.index, from = ?self.status, to = ?status, "Status changed");
            self.status = status;
            self.emit(WorkerEvent::StatusChanged(status));
        }
    }

    fn set_state(&mut self, target: SessionState) {
        let from = self.status.state();
        for step in from.transition_to(target) {
            let completed = match step {
                LifecycleStep::Open => self.open(),
                LifecycleStep::StartViewfinder => {
                    self.start_viewfinder();
                    self.status == SessionStatus::Active
                }
                LifecycleStep::StopViewfinder => {
                    self.stop_viewfinder();
                    true
                }
                LifecycleStep::Close => {
                    self.close();
                    true
                }
            };
            if !completed {
                break;
            }
        }
    }

    /// Open the device unless it already is; `false` when opening failed
    fn open(&mut self) -> bool {
        if self.connection.is_some() {
            return true;
        }

        self.set_status(SessionStatus::Loading);
        match self.protocol.open(&self.descriptor) {
            Ok(connection) => {
                info!(worker = self.index, device = %self.descriptor, "Camera opened");
                self.connection = Some(connection);
                self.set_status(SessionStatus::Loaded);
                true
            }
            Err(e) => {
                error!(worker = self.index, device = %self.descriptor, error = %e, "Unable to open camera");
                self.set_status(SessionStatus::Unavailable);
                self.emit(WorkerEvent::Error {
                    kind: ErrorKind::Camera,
                    message: "Unable to open camera".to_string(),
                });
                false
            }
        }
    }

    fn close(&mut self) {
        if self.status == SessionStatus::Active {
            self.stop_viewfinder();
        }

        let Some(mut connection) = self.connection.take() else {
            return;
        };

        self.set_status(SessionStatus::Unloading);
        connection.exit();
        drop(connection);
        info!(worker = self.index, device = %self.descriptor, "Camera closed");
        self.set_status(SessionStatus::Unloaded);
    }

    fn start_viewfinder(&mut self) {
        if !self.open() || self.status == SessionStatus::Active {
            return;
        }

        self.set_status(SessionStatus::Starting);
        if let Some(conn) = self.connection.as_deref_mut() {
            options::set_mirror_position(conn, MirrorPosition::Up, &self.config);
        }
        self.pump.reset();
        self.pump_generation += 1;
        self.cancel.store(false, Ordering::SeqCst);
        self.set_status(SessionStatus::Active);
        self.schedule_pump();
    }

    fn stop_viewfinder(&mut self) {
        if self.status != SessionStatus::Active {
            return;
        }

        self.pump_generation += 1;
        self.set_status(SessionStatus::Stopping);
        if let Some(conn) = self.connection.as_deref_mut() {
            options::set_mirror_position(conn, MirrorPosition::Down, &self.config);
        }
        self.set_status(SessionStatus::Loaded);
    }

    fn schedule_pump(&self) {
        if let Some(commands) = self.commands.upgrade() {
            let _ = commands.send(Command::PumpPreview(self.pump_generation));
        }
    }

    fn pump_preview(&mut self, generation: u64) {
        if generation != self.pump_generation {
            debug!(worker = self.index, generation, "Dropping stale viewfinder pump");
            return;
        }
        if self.status != SessionStatus::Active {
            return;
        }
        let Some(conn) = self.connection.as_deref_mut() else {
            return;
        };

        match self.pump.pump(conn, &self.cancel) {
            PumpOutcome::Frame(frame) => self.emit(WorkerEvent::PreviewCaptured(frame)),
            PumpOutcome::Suppressed | PumpOutcome::Failed(_) => {}
            PumpOutcome::Fatal => {
                self.emit(WorkerEvent::Error {
                    kind: ErrorKind::Camera,
                    message: "Unable to capture frame".to_string(),
                });
                self.close();
                return;
            }
        }

        if self.status == SessionStatus::Active {
            self.schedule_pump();
        }
    }

    fn capture(&mut self, request: CaptureRequest) {
        let index = self.index;
        let events = &self.events;
        let conn: Option<&mut dyn DeviceConnection> = match self.connection.as_mut() {
            Some(conn) => Some(conn.as_mut()),
            None => None,
        };

        capture_photo(conn, self.mode, self.status, &request, &self.config, |outcome| {
            debug!(worker = index, request_id = outcome.id(), "Capture outcome ready");
            let event = match outcome {
                CaptureOutcome::Captured {
                    id,
                    data,
                    file_name,
                } => WorkerEvent::ImageDataCaptured {
                    id,
                    data,
                    file_name,
                },
                CaptureOutcome::Failed { id, kind, message } => {
                    WorkerEvent::ImageCaptureError { id, kind, message }
                }
            };
            let _ = events.send((index, event));
        });
    }

    fn parameter(&mut self, name: &str) -> Option<ParameterValue> {
        let result = match self.connection.as_deref_mut() {
            Some(conn) => options::get_parameter(conn, name),
            None => Err(OptionError::DeviceClosed),
        };

        result.map_err(|e| self.warn_option(&e)).ok()
    }

    fn set_parameter(&mut self, name: &str, value: &ParameterValue) -> bool {
        let result = match self.connection.as_deref_mut() {
            Some(conn) => options::set_parameter(conn, name, value, &self.config),
            None => Err(OptionError::DeviceClosed),
        };

        result.map_err(|e| self.warn_option(&e)).is_ok()
    }

    fn warn_option(&self, err: &OptionError) {
        warn!(worker = self.index, error = %err, "Option request failed");
        self.emit(WorkerEvent::Warning {
            kind: err.kind(),
            message: err.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::simulated::{DeviceCall, SimulatedProtocol};
    use std::time::Duration;

    fn spawn_worker(protocol: &Arc<SimulatedProtocol>) -> (DeviceWorker, EventReceiver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let descriptor = protocol.descriptors()[0].clone();
        let shared: Arc<dyn DeviceProtocol> = protocol.clone();
        let worker =
            DeviceWorker::spawn(0, descriptor, shared, SessionConfig::default(), events_tx)
                .unwrap();
        (worker, events_rx)
    }

    fn statuses(events: &mut EventReceiver) -> Vec<SessionStatus> {
        let mut seen = Vec::new();
        while let Ok((_, event)) = events.try_recv() {
            if let WorkerEvent::StatusChanged(status) = event {
                seen.push(status);
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let protocol = Arc::new(SimulatedProtocol::new(1).unwrap());
        let device = protocol.device(0).unwrap();
        let (worker, mut events) = spawn_worker(&protocol);

        worker.open();
        worker.open();
        worker.quiesce().await;

        assert_eq!(
            statuses(&mut events),
            vec![SessionStatus::Loading, SessionStatus::Loaded]
        );
        assert_eq!(device.open_connections(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_is_fatal_camera_error() {
        let protocol = Arc::new(SimulatedProtocol::new(1).unwrap());
        protocol.device(0).unwrap().set_fail_open(true);
        let (worker, mut events) = spawn_worker(&protocol);

        worker.set_state(SessionState::Active);
        worker.quiesce().await;

        let mut seen = Vec::new();
        while let Ok((_, event)) = events.try_recv() {
            seen.push(event);
        }
        assert!(matches!(
            seen.as_slice(),
            [
                WorkerEvent::StatusChanged(SessionStatus::Loading),
                WorkerEvent::StatusChanged(SessionStatus::Unavailable),
                WorkerEvent::Error { kind: ErrorKind::Camera, .. },
            ]
        ));
    }

    #[tokio::test]
    async fn test_parameter_on_closed_device_warns() {
        let protocol = Arc::new(SimulatedProtocol::new(1).unwrap());
        let (worker, mut events) = spawn_worker(&protocol);

        assert_eq!(worker.parameter("iso").await, None);
        assert!(!worker.set_parameter("iso", ParameterValue::Integer(200)).await);
        assert!(matches!(
            events.try_recv(),
            Ok((0, WorkerEvent::Warning { kind: ErrorKind::Resource, .. }))
        ));
    }

    #[tokio::test]
    async fn test_restarting_viewfinder_keeps_one_pump() {
        let protocol = Arc::new(SimulatedProtocol::new(1).unwrap());
        let device = protocol.device(0).unwrap();
        let (worker, _events) = spawn_worker(&protocol);

        worker.set_state(SessionState::Active);
        worker.quiesce().await;
        for _ in 0..5 {
            worker.set_state(SessionState::Loaded);
            worker.set_state(SessionState::Active);
        }
        worker.quiesce().await;

        device.clear_calls();
        worker.quiesce().await;
        let previews = device
            .calls()
            .iter()
            .filter(|call| **call == DeviceCall::CapturePreview)
            .count();
        assert!(previews <= 1, "{} pumps ran ahead of one barrier", previews);
    }

    #[tokio::test]
    async fn test_restart_delivers_frames_after_stop() {
        let protocol = Arc::new(SimulatedProtocol::new(1).unwrap());
        let (worker, mut events) = spawn_worker(&protocol);

        worker.set_state(SessionState::Active);
        worker.stop_viewfinder();
        worker.start_viewfinder();
        worker.quiesce().await;

        let frame = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some((_, event)) = events.recv().await {
                if let WorkerEvent::PreviewCaptured(frame) = event {
                    return Some(frame);
                }
            }
            None
        })
        .await
        .unwrap();
        assert!(frame.is_some());
    }

    #[tokio::test]
    async fn test_drop_closes_device() {
        let protocol = Arc::new(SimulatedProtocol::new(1).unwrap());
        let device = protocol.device(0).unwrap();
        let (worker, _events) = spawn_worker(&protocol);

        worker.set_state(SessionState::Active);
        worker.quiesce().await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        drop(worker);

        assert_eq!(device.open_connections(), 0);
        assert_eq!(device.calls().last(), Some(&DeviceCall::Exit));
        assert_eq!(
            device.option("viewfinder").map(|n| n.value),
            Some(OptionValue::Int(0))
        );
    }
}
