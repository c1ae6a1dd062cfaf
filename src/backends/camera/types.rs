// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the device protocol boundary and the session

//! Shared types for camera sessions

use std::sync::Arc;
use std::time::Instant;

/// Immutable identity of one physical device, supplied by discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Model name (e.g. "Canon EOS 600D")
    pub model: String,
    /// Port the device is attached to (e.g. "usb:001,004")
    pub port: String,
}

impl DeviceDescriptor {
    pub fn new(model: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            port: port.into(),
        }
    }
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.model, self.port)
    }
}

/// Externally visible lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Unloaded,
    Loaded,
    Active,
}

/// Device operations a lifecycle transition is made of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStep {
    Open,
    Close,
    StartViewfinder,
    StopViewfinder,
}

impl SessionState {
    /// Device operations that move a session from `self` to `target`
    ///
    /// Same-state requests map to no steps.
    pub fn transition_to(self, target: SessionState) -> &'static [LifecycleStep] {
        use LifecycleStep::*;
        use SessionState::*;

        match (self, target) {
            (Unloaded, Loaded) => &[Open],
            (Unloaded, Active) => &[Open, StartViewfinder],
            (Loaded, Unloaded) => &[Close],
            (Loaded, Active) => &[StartViewfinder],
            (Active, Unloaded) => &[Close],
            (Active, Loaded) => &[StopViewfinder],
            _ => &[],
        }
    }
}

/// Fine-grained status, including in-flight transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionStatus {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Starting,
    Active,
    Stopping,
    Unloading,
    Unavailable,
}

impl SessionStatus {
    /// The lifecycle state this status belongs to
    ///
    /// Transitional statuses report the state the transition started from.
    pub fn state(self) -> SessionState {
        match self {
            SessionStatus::Unloaded | SessionStatus::Unavailable | SessionStatus::Loading => {
                SessionState::Unloaded
            }
            SessionStatus::Loaded | SessionStatus::Starting | SessionStatus::Unloading => {
                SessionState::Loaded
            }
            SessionStatus::Active | SessionStatus::Stopping => SessionState::Active,
        }
    }

    /// Whether a still capture can be issued in this status
    pub fn accepts_capture(self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::Loaded)
    }
}

/// Capture mode flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureModes(u8);

impl CaptureModes {
    pub const NONE: CaptureModes = CaptureModes(0);
    pub const STILL_IMAGE: CaptureModes = CaptureModes(1 << 0);
    pub const VIDEO: CaptureModes = CaptureModes(1 << 1);

    pub fn contains(self, other: CaptureModes) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl Default for CaptureModes {
    fn default() -> Self {
        CaptureModes::STILL_IMAGE
    }
}

impl std::ops::BitOr for CaptureModes {
    type Output = CaptureModes;

    fn bitor(self, rhs: Self) -> Self::Output {
        CaptureModes(self.0 | rhs.0)
    }
}

/// Where a captured still goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureDestinations(u8);

impl CaptureDestinations {
    pub const NONE: CaptureDestinations = CaptureDestinations(0);
    pub const BUFFER: CaptureDestinations = CaptureDestinations(1 << 0);
    pub const FILE: CaptureDestinations = CaptureDestinations(1 << 1);

    pub fn contains(self, other: CaptureDestinations) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for CaptureDestinations {
    fn default() -> Self {
        CaptureDestinations::BUFFER | CaptureDestinations::FILE
    }
}

impl std::ops::BitOr for CaptureDestinations {
    type Output = CaptureDestinations;

    fn bitor(self, rhs: Self) -> Self::Output {
        CaptureDestinations(self.0 | rhs.0)
    }
}

/// Value read from or written to a named device option
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    String(String),
    Double(f64),
    Integer(i64),
    Boolean(bool),
}

impl ParameterValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterValue::String(_) => "string",
            ParameterValue::Double(_) => "double",
            ParameterValue::Integer(_) => "integer",
            ParameterValue::Boolean(_) => "boolean",
        }
    }

    /// Integer view of the value, if it has one
    pub fn to_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Integer(v) => Some(*v),
            ParameterValue::Boolean(v) => Some(i64::from(*v)),
            ParameterValue::Double(v) if v.is_finite() => Some(v.trunc() as i64),
            ParameterValue::Double(_) => None,
            ParameterValue::String(s) => s.trim().parse().ok(),
        }
    }

    /// Parse user input: integer, then float, then boolean, otherwise string
    pub fn parse(input: &str) -> Self {
        if let Ok(v) = input.parse::<i64>() {
            return ParameterValue::Integer(v);
        }
        if let Ok(v) = input.parse::<f64>() {
            return ParameterValue::Double(v);
        }
        match input {
            "true" | "on" => ParameterValue::Boolean(true),
            "false" | "off" => ParameterValue::Boolean(false),
            _ => ParameterValue::String(input.to_string()),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::String(s) => write!(f, "{}", s),
            ParameterValue::Double(v) => write!(f, "{}", v),
            ParameterValue::Integer(v) => write!(f, "{}", v),
            ParameterValue::Boolean(v) => write!(f, "{}", v),
        }
    }
}

/// Kind of a node in the device's configuration tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
    Window,
    Section,
    Text,
    Range,
    Toggle,
    Radio,
    Menu,
    Button,
    Date,
}

impl std::fmt::Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OptionKind::Window => "window",
            OptionKind::Section => "section",
            OptionKind::Text => "text",
            OptionKind::Range => "range",
            OptionKind::Toggle => "toggle",
            OptionKind::Radio => "radio",
            OptionKind::Menu => "menu",
            OptionKind::Button => "button",
            OptionKind::Date => "date",
        };
        write!(f, "{}", name)
    }
}

/// Raw value held by an option node, in the device's own encoding
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// Containers and buttons carry no value
    None,
    /// Text, radio and menu nodes
    Text(String),
    /// Toggles (0 or 1) and dates (unix seconds)
    Int(i32),
    /// Range nodes
    Float(f32),
}

/// Node of the device-reported configuration tree
#[derive(Debug, Clone, PartialEq)]
pub struct OptionNode {
    pub name: String,
    pub label: String,
    pub kind: OptionKind,
    pub value: OptionValue,
    /// Ordered choices of radio and menu nodes
    pub choices: Vec<String>,
    /// (min, max, step) of range nodes
    pub range: Option<(f32, f32, f32)>,
    pub children: Vec<OptionNode>,
}

impl OptionNode {
    fn leaf(name: &str, kind: OptionKind, value: OptionValue) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            kind,
            value,
            choices: Vec::new(),
            range: None,
            children: Vec::new(),
        }
    }

    pub fn window(name: &str, children: Vec<OptionNode>) -> Self {
        Self {
            children,
            ..Self::leaf(name, OptionKind::Window, OptionValue::None)
        }
    }

    pub fn section(name: &str, children: Vec<OptionNode>) -> Self {
        Self {
            children,
            ..Self::leaf(name, OptionKind::Section, OptionValue::None)
        }
    }

    pub fn radio(name: &str, value: &str, choices: &[&str]) -> Self {
        Self {
            choices: choices.iter().map(|c| c.to_string()).collect(),
            ..Self::leaf(name, OptionKind::Radio, OptionValue::Text(value.to_string()))
        }
    }

    pub fn menu(name: &str, value: &str, choices: &[&str]) -> Self {
        Self {
            kind: OptionKind::Menu,
            ..Self::radio(name, value, choices)
        }
    }

    pub fn toggle(name: &str, on: bool) -> Self {
        Self::leaf(name, OptionKind::Toggle, OptionValue::Int(i32::from(on)))
    }

    pub fn text(name: &str, value: &str) -> Self {
        Self::leaf(name, OptionKind::Text, OptionValue::Text(value.to_string()))
    }

    pub fn range(name: &str, value: f32, min: f32, max: f32, step: f32) -> Self {
        Self {
            range: Some((min, max, step)),
            ..Self::leaf(name, OptionKind::Range, OptionValue::Float(value))
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Depth-first lookup of a descendant (or self) by name
    pub fn find(&self, name: &str) -> Option<&OptionNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut OptionNode> {
        if self.name == name {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_mut(name))
    }

    /// All value-carrying nodes in depth-first order
    pub fn leaves(&self) -> Vec<&OptionNode> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a OptionNode>) {
        if matches!(self.kind, OptionKind::Window | OptionKind::Section) {
            for child in &self.children {
                child.collect_leaves(out);
            }
        } else {
            out.push(self);
        }
    }
}

/// Physical mirror position around viewfinder and capture operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorPosition {
    Up,
    Down,
}

impl std::fmt::Display for MirrorPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MirrorPosition::Up => write!(f, "up"),
            MirrorPosition::Down => write!(f, "down"),
        }
    }
}

/// Location of a captured file on the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraFilePath {
    pub folder: String,
    pub name: String,
}

/// Kinds of asynchronous device events; payloads are ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Unknown,
    Timeout,
    FileAdded,
    FolderAdded,
    CaptureComplete,
}

/// Decoded frame ready for display (RGBA)
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// RGBA pixels
    pub data: Arc<[u8]>,
    /// Bytes per row
    pub stride: u32,
    /// Timestamp when the frame was decoded
    pub captured_at: Instant,
}

impl CameraFrame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
