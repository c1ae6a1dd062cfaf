// SPDX-License-Identifier: GPL-3.0-only

//! Camera session
//!
//! [`CameraSession`] is the object an application drives. It maps lifecycle
//! requests onto the worker of the selected device, keeps one lazily spawned
//! worker per device index, and republishes worker events as
//! [`SessionEvent`]s.
//!
//! The session never touches a device itself. The status it reports is the
//! last status its current worker published; the state and readiness are
//! derived from it.

use crate::backends::camera::options::OptionDescription;
use crate::backends::camera::worker::{EventReceiver, EventSender};
use crate::backends::camera::{
    CameraFrame, CaptureDestinations, CaptureModes, DeviceDescriptor, DeviceProtocol,
    DeviceWorker, ParameterValue, SessionState, SessionStatus, WorkerEvent,
};
use crate::config::SessionConfig;
use crate::errors::{AppError, AppResult, ErrorKind};
use crate::media::decode_frame;
use crate::pipelines::photo::{CaptureRequest, is_ready_for_capture};
use crate::storage::{CaptureWriter, FileWriter, default_file_name};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Event published by the session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StatusChanged(SessionStatus),
    StateChanged(SessionState),
    CaptureModeChanged(CaptureModes),
    CaptureDestinationChanged(CaptureDestinations),
    ReadyForCaptureChanged(bool),
    /// Decoded still, published for every successful capture
    ImageCaptured { id: u32, preview: CameraFrame },
    /// Decoded still, published when the destination includes the buffer
    ImageAvailable { id: u32, frame: CameraFrame },
    ImageSaved { id: u32, path: PathBuf },
    ImageCaptureError {
        id: u32,
        kind: ErrorKind,
        message: String,
    },
    Error { kind: ErrorKind, message: String },
    /// Non-fatal option failure
    Warning { kind: ErrorKind, message: String },
    /// Viewfinder frame
    VideoFrameProbed(CameraFrame),
}

/// Presentation surface for viewfinder frames
pub trait VideoSurface: Send {
    fn present(&mut self, frame: &CameraFrame);
}

/// Tethered camera session over one or more devices
///
/// Dropping the session never waits for the devices. Its workers are handed
/// to a detached thread that lets them finish queued commands, close their
/// devices and exit. Use [`CameraSession::shutdown`] to wait for the devices
/// to be closed.
pub struct CameraSession {
    protocol: Arc<dyn DeviceProtocol>,
    cameras: Vec<DeviceDescriptor>,
    config: SessionConfig,
    workers: HashMap<usize, DeviceWorker>,
    current: Option<usize>,
    events_tx: EventSender,
    events_rx: EventReceiver,
    pending: VecDeque<SessionEvent>,
    status: SessionStatus,
    /// Last state requested through `set_state`; re-applied after rebinding
    target: SessionState,
    capture_mode: CaptureModes,
    capture_destination: CaptureDestinations,
    ready: bool,
    next_request_id: u32,
    surface: Option<Box<dyn VideoSurface>>,
    writer: Box<dyn CaptureWriter>,
}

impl CameraSession {
    /// Create a session over `cameras`, bound to the first one
    ///
    /// Stills are written to `config.capture_dir`.
    pub fn new(
        protocol: Arc<dyn DeviceProtocol>,
        cameras: Vec<DeviceDescriptor>,
        config: SessionConfig,
    ) -> Self {
        let writer = Box::new(FileWriter::new(config.capture_dir.clone()));
        Self::with_writer(protocol, cameras, config, writer)
    }

    pub fn with_writer(
        protocol: Arc<dyn DeviceProtocol>,
        cameras: Vec<DeviceDescriptor>,
        config: SessionConfig,
        writer: Box<dyn CaptureWriter>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let current = if cameras.is_empty() { None } else { Some(0) };
        info!(cameras = cameras.len(), "Camera session created");

        Self {
            protocol,
            cameras,
            config,
            workers: HashMap::new(),
            current,
            events_tx,
            events_rx,
            pending: VecDeque::new(),
            status: SessionStatus::Unloaded,
            target: SessionState::Unloaded,
            capture_mode: CaptureModes::default(),
            capture_destination: CaptureDestinations::default(),
            ready: false,
            next_request_id: 1,
            surface: None,
            writer,
        }
    }

    // ===== Getters =====

    pub fn cameras(&self) -> &[DeviceDescriptor] {
        &self.cameras
    }

    /// Index of the device the session is bound to
    pub fn camera_index(&self) -> Option<usize> {
        self.current
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn state(&self) -> SessionState {
        self.status.state()
    }

    pub fn capture_mode(&self) -> CaptureModes {
        self.capture_mode
    }

    pub fn capture_destination(&self) -> CaptureDestinations {
        self.capture_destination
    }

    pub fn is_ready_for_capture(&self) -> bool {
        self.ready
    }

    pub fn is_capture_mode_supported(&self, mode: CaptureModes) -> bool {
        mode == CaptureModes::STILL_IMAGE
    }

    pub fn is_capture_destination_supported(&self, destination: CaptureDestinations) -> bool {
        !destination.is_empty()
    }

    // ===== Commands =====

    /// Request a lifecycle state; progress is reported through status events
    pub fn set_state(&mut self, target: SessionState) {
        self.target = target;
        if let Some(worker) = self.current_worker() {
            worker.set_state(target);
        }
    }

    pub fn set_capture_mode(&mut self, mode: CaptureModes) {
        if mode == self.capture_mode {
            return;
        }
        if !self.is_capture_mode_supported(mode) {
            warn!(mode = mode.bits(), "Capture mode not supported");
        }

        self.capture_mode = mode;
        if let Some(worker) = self.current_worker() {
            worker.set_capture_mode(mode);
        }
        self.pending.push_back(SessionEvent::CaptureModeChanged(mode));
        self.update_readiness(false);
    }

    /// Select where stills go; unsupported destinations are ignored
    pub fn set_capture_destination(&mut self, destination: CaptureDestinations) {
        if !self.is_capture_destination_supported(destination) {
            warn!("Capture destination not supported, ignoring");
            return;
        }
        if destination != self.capture_destination {
            self.capture_destination = destination;
            self.pending
                .push_back(SessionEvent::CaptureDestinationChanged(destination));
        }
    }

    /// Queue a still capture and return its request id
    ///
    /// An empty `file_name` gets a timestamped default.
    pub fn capture(&mut self, file_name: &str) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);

        let file_name = if file_name.is_empty() {
            default_file_name(id)
        } else {
            file_name.to_string()
        };

        match self.current_worker() {
            Some(worker) => worker.capture(CaptureRequest { id, file_name }),
            None => self.pending.push_back(SessionEvent::ImageCaptureError {
                id,
                kind: ErrorKind::NotReady,
                message: "Camera is not ready".to_string(),
            }),
        }

        id
    }

    /// Read an option of the current device; `None` when it cannot be read
    pub async fn parameter(&mut self, name: &str) -> Option<ParameterValue> {
        self.current_worker()?.parameter(name).await
    }

    /// Write an option of the current device; `false` when it cannot be written
    pub async fn set_parameter(&mut self, name: &str, value: ParameterValue) -> bool {
        match self.current_worker() {
            Some(worker) => worker.set_parameter(name, value).await,
            None => false,
        }
    }

    pub async fn describe_option(&mut self, name: &str) -> Option<OptionDescription> {
        self.current_worker()?.describe_option(name).await
    }

    pub async fn options(&mut self) -> Vec<OptionDescription> {
        match self.current_worker() {
            Some(worker) => worker.list_options().await,
            None => Vec::new(),
        }
    }

    pub fn set_surface(&mut self, surface: Option<Box<dyn VideoSurface>>) {
        self.surface = surface;
    }

    /// Bind the session to another device
    ///
    /// The previous device's worker finishes every queued command and its
    /// events are published before it is unloaded. The new device is driven to
    /// the last requested state.
    pub async fn set_camera(&mut self, index: usize) -> AppResult<()> {
        if index >= self.cameras.len() {
            return Err(AppError::Session(format!("No camera at index {}", index)));
        }
        if self.current == Some(index) {
            return Ok(());
        }

        if let Some(previous) = self.current {
            if let Some(worker) = self.workers.get(&previous) {
                worker.quiesce().await;
            }
            self.collect_events();
            if let Some(worker) = self.workers.get(&previous) {
                worker.set_state(SessionState::Unloaded);
            }
        }

        info!(camera = index, device = %self.cameras[index], "Switching camera");
        self.current = Some(index);
        self.apply_status(SessionStatus::Unloaded);

        let mode = self.capture_mode;
        let target = self.target;
        let worker = self.ensure_worker(index)?;
        worker.set_capture_mode(mode);
        if target != SessionState::Unloaded {
            worker.set_state(target);
        }
        Ok(())
    }

    /// Unload every device and wait until each one is closed
    pub async fn shutdown(mut self) {
        for worker in self.workers.values() {
            worker.set_state(SessionState::Unloaded);
        }
        for worker in self.workers.values() {
            worker.quiesce().await;
        }
        self.collect_events();
        info!(workers = self.workers.len(), "Camera session shut down");
    }

    // ===== Events =====

    /// Next event without waiting
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        if self.pending.is_empty() {
            self.collect_events();
        }
        self.pending.pop_front()
    }

    /// Wait for the next event
    ///
    /// Returns `None` when no worker exists and nothing is pending.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.workers.is_empty() {
                return None;
            }
            let (index, event) = self.events_rx.recv().await?;
            self.handle_worker_event(index, event);
        }
    }

    /// Wait until the current worker ran every queued command, then collect
    /// the events it raised
    pub async fn wait_idle(&mut self) {
        if let Some(worker) = self.current.and_then(|index| self.workers.get(&index)) {
            worker.quiesce().await;
        }
        self.collect_events();
    }

    fn collect_events(&mut self) {
        while let Ok((index, event)) = self.events_rx.try_recv() {
            self.handle_worker_event(index, event);
        }
    }

    fn handle_worker_event(&mut self, index: usize, event: WorkerEvent) {
        if self.current != Some(index) {
            debug!(worker = index, "Ignoring event from inactive camera");
            return;
        }

        match event {
            WorkerEvent::StatusChanged(status) => self.apply_status(status),
            WorkerEvent::PreviewCaptured(frame) => {
                if let Some(surface) = self.surface.as_mut() {
                    surface.present(&frame);
                }
                self.pending.push_back(SessionEvent::VideoFrameProbed(frame));
            }
            WorkerEvent::ImageDataCaptured {
                id,
                data,
                file_name,
            } => self.image_captured(id, data, &file_name),
            WorkerEvent::ImageCaptureError { id, kind, message } => {
                self.pending
                    .push_back(SessionEvent::ImageCaptureError { id, kind, message });
            }
            WorkerEvent::Error { kind, message } => {
                warn!(%kind, %message, "Camera error");
                self.pending.push_back(SessionEvent::Error { kind, message });
            }
            WorkerEvent::Warning { kind, message } => {
                self.pending.push_back(SessionEvent::Warning { kind, message });
            }
        }
    }

    fn image_captured(&mut self, id: u32, data: Vec<u8>, file_name: &str) {
        match decode_frame(&data) {
            Ok(frame) => {
                self.pending.push_back(SessionEvent::ImageCaptured {
                    id,
                    preview: frame.clone(),
                });
                if self.capture_destination.contains(CaptureDestinations::BUFFER) {
                    self.pending
                        .push_back(SessionEvent::ImageAvailable { id, frame });
                }
            }
            Err(e) => {
                warn!(request_id = id, error = %e, "Captured image could not be decoded");
                self.pending.push_back(SessionEvent::ImageCaptureError {
                    id,
                    kind: ErrorKind::Resource,
                    message: format!("Failed to decode captured image: {}", e),
                });
            }
        }

        if self.capture_destination.contains(CaptureDestinations::FILE) {
            let event = match self.writer.save(id, &data, file_name) {
                Ok(path) => SessionEvent::ImageSaved { id, path },
                Err(e) => {
                    warn!(request_id = id, error = %e, "Failed to save image");
                    SessionEvent::ImageCaptureError {
                        id,
                        kind: ErrorKind::Save,
                        message: e.to_string(),
                    }
                }
            };
            self.pending.push_back(event);
        }
    }

    fn apply_status(&mut self, status: SessionStatus) {
        if status == self.status {
            return;
        }

        let previous_state = self.status.state();
        self.status = status;
        self.pending.push_back(SessionEvent::StatusChanged(status));
        if status.state() != previous_state {
            self.pending.push_back(SessionEvent::StateChanged(status.state()));
        }
        self.update_readiness(true);
    }

    /// Recompute readiness; `always` republishes it even when unchanged
    fn update_readiness(&mut self, always: bool) {
        let ready = is_ready_for_capture(self.capture_mode, self.status);
        if always || ready != self.ready {
            self.ready = ready;
            self.pending
                .push_back(SessionEvent::ReadyForCaptureChanged(ready));
        }
    }

    // ===== Workers =====

    fn current_worker(&mut self) -> Option<&DeviceWorker> {
        let index = self.current?;
        if let Err(e) = self.ensure_worker(index) {
            warn!(camera = index, error = %e, "No worker for camera");
            self.pending.push_back(SessionEvent::Error {
                kind: ErrorKind::Camera,
                message: e.to_string(),
            });
            return None;
        }
        self.workers.get(&index)
    }

    fn ensure_worker(&mut self, index: usize) -> AppResult<&DeviceWorker> {
        if !self.workers.contains_key(&index) {
            let descriptor = self
                .cameras
                .get(index)
                .cloned()
                .ok_or_else(|| AppError::Session(format!("No camera at index {}", index)))?;
            let worker = DeviceWorker::spawn(
                index,
                descriptor,
                Arc::clone(&self.protocol),
                self.config.clone(),
                self.events_tx.clone(),
            )?;
            worker.set_capture_mode(self.capture_mode);
            self.workers.insert(index, worker);
        }

        self.workers
            .get(&index)
            .ok_or_else(|| AppError::Session(format!("No worker for camera {}", index)))
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        let workers = std::mem::take(&mut self.workers);
        let count = workers.len();
        // A failed spawn drops the closure, which joins the workers here
        if let Err(e) = thread::Builder::new()
            .name("tethercam-teardown".to_string())
            .spawn(move || drop(workers))
        {
            warn!(workers = count, error = %e, "Failed to spawn teardown thread, joined inline");
        }
    }
}
