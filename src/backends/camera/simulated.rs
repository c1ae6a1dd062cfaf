// SPDX-License-Identifier: GPL-3.0-only

//! Simulated tethered camera
//!
//! An in-process device speaking the [`DeviceProtocol`] boundary. It serves
//! generated JPEG frames, keeps a mutable option tree, can be told to fail
//! any protocol call, and records every call so callers can check ordering.

use super::types::*;
use super::{DeviceConnection, DeviceProtocol, DeviceResult};
use crate::errors::DeviceError;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

const PREVIEW_SIZE: (u32, u32) = (64, 48);
const STILL_SIZE: (u32, u32) = (320, 240);
/// Frame cadence of the simulated live view
const PREVIEW_INTERVAL: Duration = Duration::from_millis(15);

/// One call made through the protocol boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Open,
    GetConfig,
    /// Commit of the tree; carries the viewfinder toggle if the tree has one
    SetConfig { viewfinder: Option<bool> },
    CaptureStill,
    Download(String),
    CapturePreview,
    WaitForEvent,
    Exit,
}

#[derive(Debug)]
struct SimulatedState {
    tree: OptionNode,
    calls: Vec<DeviceCall>,
    open_connections: usize,
    fail_open: bool,
    fail_capture: bool,
    fail_download: bool,
    fail_commit: bool,
    preview_failures: u32,
    pending_events: u32,
    capture_delay: Duration,
    preview_delay: Duration,
    shots: u32,
}

/// Scriptable simulated device
#[derive(Debug)]
pub struct SimulatedDevice {
    descriptor: DeviceDescriptor,
    state: Mutex<SimulatedState>,
}

impl SimulatedDevice {
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        Self {
            descriptor,
            state: Mutex::new(SimulatedState {
                tree: default_tree(),
                calls: Vec::new(),
                open_connections: 0,
                fail_open: false,
                fail_capture: false,
                fail_download: false,
                fail_commit: false,
                preview_failures: 0,
                pending_events: 0,
                capture_delay: Duration::ZERO,
                preview_delay: PREVIEW_INTERVAL,
                shots: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Calls made so far, oldest first
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn open_connections(&self) -> usize {
        self.state().open_connections
    }

    /// Current node of an option, as the device holds it
    pub fn option(&self, name: &str) -> Option<OptionNode> {
        self.state().tree.find(name).cloned()
    }

    /// Replace the option tree
    pub fn set_tree(&self, tree: OptionNode) {
        self.state().tree = tree;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state().fail_open = fail;
    }

    pub fn set_fail_capture(&self, fail: bool) {
        self.state().fail_capture = fail;
    }

    pub fn set_fail_download(&self, fail: bool) {
        self.state().fail_download = fail;
    }

    pub fn set_fail_commit(&self, fail: bool) {
        self.state().fail_commit = fail;
    }

    /// Make the next `count` preview grabs fail
    pub fn fail_next_previews(&self, count: u32) {
        self.state().preview_failures = count;
    }

    /// Events reported before the next timeout
    pub fn queue_events(&self, count: u32) {
        self.state().pending_events += count;
    }

    /// Time a still capture blocks the calling thread
    pub fn set_capture_delay(&self, delay: Duration) {
        self.state().capture_delay = delay;
    }

    /// Time a preview grab blocks the calling thread
    pub fn set_preview_delay(&self, delay: Duration) {
        self.state().preview_delay = delay;
    }
}

/// Protocol serving a fixed set of simulated devices
#[derive(Debug, Clone)]
pub struct SimulatedProtocol {
    devices: Vec<Arc<SimulatedDevice>>,
    preview_jpeg: Arc<[u8]>,
    still_jpeg: Arc<[u8]>,
}

impl SimulatedProtocol {
    /// Create a protocol with `count` devices on consecutive USB ports
    pub fn new(count: usize) -> DeviceResult<Self> {
        let devices = (0..count)
            .map(|i| {
                let descriptor = DeviceDescriptor::new(
                    format!("Simulated DSLR {}", i + 1),
                    format!("usb:001,{:03}", i + 4),
                );
                Arc::new(SimulatedDevice::new(descriptor))
            })
            .collect();

        Ok(Self {
            devices,
            preview_jpeg: encode_test_pattern(PREVIEW_SIZE)?,
            still_jpeg: encode_test_pattern(STILL_SIZE)?,
        })
    }

    /// Descriptors as discovery would report them
    pub fn descriptors(&self) -> Vec<DeviceDescriptor> {
        self.devices.iter().map(|d| d.descriptor.clone()).collect()
    }

    pub fn device(&self, index: usize) -> Option<Arc<SimulatedDevice>> {
        self.devices.get(index).cloned()
    }
}

impl DeviceProtocol for SimulatedProtocol {
    fn open(&self, descriptor: &DeviceDescriptor) -> DeviceResult<Box<dyn DeviceConnection>> {
        let device = self
            .devices
            .iter()
            .find(|d| d.descriptor.port == descriptor.port)
            .cloned()
            .ok_or_else(|| DeviceError::OpenFailed(format!("no device on {}", descriptor.port)))?;

        {
            let mut state = device.state();
            state.calls.push(DeviceCall::Open);
            if state.fail_open {
                return Err(DeviceError::OpenFailed("unable to set port info".to_string()));
            }
            state.open_connections += 1;
        }

        info!(device = %descriptor, "Simulated device opened");

        Ok(Box::new(SimulatedConnection {
            device,
            preview_jpeg: Arc::clone(&self.preview_jpeg),
            still_jpeg: Arc::clone(&self.still_jpeg),
            exited: false,
        }))
    }
}

struct SimulatedConnection {
    device: Arc<SimulatedDevice>,
    preview_jpeg: Arc<[u8]>,
    still_jpeg: Arc<[u8]>,
    exited: bool,
}

impl SimulatedConnection {
    fn record(&self, call: DeviceCall) -> MutexGuard<'_, SimulatedState> {
        let mut state = self.device.state();
        state.calls.push(call);
        state
    }
}

impl DeviceConnection for SimulatedConnection {
    fn config(&mut self) -> DeviceResult<OptionNode> {
        let state = self.record(DeviceCall::GetConfig);
        Ok(state.tree.clone())
    }

    fn set_config(&mut self, root: &OptionNode) -> DeviceResult<()> {
        let viewfinder = root.find("viewfinder").map(|node| node.value != OptionValue::Int(0));
        let mut state = self.record(DeviceCall::SetConfig { viewfinder });
        if state.fail_commit {
            return Err(DeviceError::Io("config rejected".to_string()));
        }
        state.tree = root.clone();
        Ok(())
    }

    fn capture_still(&mut self) -> DeviceResult<CameraFilePath> {
        let delay = {
            let state = self.record(DeviceCall::CaptureStill);
            if state.fail_capture {
                return Err(DeviceError::Code(-110));
            }
            state.capture_delay
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.device.state();
        state.shots += 1;
        state.pending_events += 1;
        Ok(CameraFilePath {
            folder: "/store_00010001/DCIM/100CANON".to_string(),
            name: format!("IMG_{:04}.JPG", state.shots),
        })
    }

    fn download(&mut self, path: &CameraFilePath) -> DeviceResult<Vec<u8>> {
        let state = self.record(DeviceCall::Download(path.name.clone()));
        if state.fail_download {
            return Err(DeviceError::Io(format!("{}/{} not found", path.folder, path.name)));
        }
        Ok(self.still_jpeg.to_vec())
    }

    fn capture_preview(&mut self, buffer: &mut Vec<u8>) -> DeviceResult<()> {
        let delay = {
            let mut state = self.record(DeviceCall::CapturePreview);
            if state.preview_failures > 0 {
                state.preview_failures -= 1;
                return Err(DeviceError::Io("preview not available".to_string()));
            }
            state.preview_delay
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        buffer.extend_from_slice(&self.preview_jpeg);
        Ok(())
    }

    fn wait_for_event(&mut self, _timeout: Duration) -> DeviceResult<DeviceEvent> {
        let mut state = self.record(DeviceCall::WaitForEvent);
        if state.pending_events > 0 {
            state.pending_events -= 1;
            return Ok(DeviceEvent::FileAdded);
        }
        Ok(DeviceEvent::Timeout)
    }

    fn exit(&mut self) {
        if !self.exited {
            self.exited = true;
            self.record(DeviceCall::Exit);
            debug!(device = %self.device.descriptor, "Simulated device exited");
        }
    }
}

impl Drop for SimulatedConnection {
    fn drop(&mut self) {
        let mut state = self.device.state();
        state.open_connections = state.open_connections.saturating_sub(1);
    }
}

/// Option tree resembling a typical DSLR
pub fn default_tree() -> OptionNode {
    OptionNode::window(
        "main",
        vec![
            OptionNode::section(
                "actions",
                vec![OptionNode::toggle("viewfinder", false).with_label("Viewfinder")],
            ),
            OptionNode::section(
                "imgsettings",
                vec![
                    OptionNode::radio("iso", "100", &["100", "200", "400", "800", "Auto"])
                        .with_label("ISO Speed"),
                    OptionNode::radio("whitebalance", "Auto", &["Auto", "Daylight", "Shadow"])
                        .with_label("WhiteBalance"),
                ],
            ),
            OptionNode::section(
                "capturesettings",
                vec![
                    OptionNode::radio("aperture", "2.8", &["1.8", "2.8", "4", "5.6", "8"])
                        .with_label("Aperture"),
                    OptionNode::radio("exposurecompensation", "0", &["-1", "-0.5", "0", "0.5", "1"])
                        .with_label("Exposure Compensation"),
                    OptionNode::menu("imageformat", "Large Fine JPEG", &["Large Fine JPEG", "RAW"])
                        .with_label("Image Format"),
                    OptionNode::range("zoom", 0.0, 0.0, 10.0, 1.0).with_label("Zoom"),
                ],
            ),
            OptionNode::section(
                "settings",
                vec![OptionNode::text("artist", "").with_label("Artist")],
            ),
        ],
    )
}

fn encode_test_pattern((width, height): (u32, u32)) -> DeviceResult<Arc<[u8]>> {
    let pattern = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });

    let mut out = Cursor::new(Vec::new());
    pattern
        .write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| DeviceError::Io(format!("encoding test pattern: {}", e)))?;
    Ok(Arc::from(out.into_inner()))
}
