// SPDX-License-Identifier: GPL-3.0-only

//! Device option tree adapter
//!
//! Maps typed [`ParameterValue`]s onto the device's self-describing
//! configuration tree and back. Decoding and choice selection are pure
//! functions over a node; the connection is only touched to fetch the tree,
//! commit it and let the hardware settle.

use super::types::{MirrorPosition, OptionKind, OptionNode, OptionValue, ParameterValue};
use super::{DeviceConnection, DeviceEvent};
use crate::config::SessionConfig;
use crate::constants::AUTO_CHOICE_SENTINEL;
use crate::errors::OptionError;
use std::time::Instant;
use tracing::{debug, warn};

/// Flattened view of one option, for listings
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDescription {
    pub name: String,
    pub label: String,
    pub kind: OptionKind,
    pub value: Option<String>,
    pub choices: Vec<String>,
}

impl From<&OptionNode> for OptionDescription {
    fn from(node: &OptionNode) -> Self {
        let value = match &node.value {
            OptionValue::None => None,
            OptionValue::Text(s) => Some(s.clone()),
            OptionValue::Int(v) => Some(v.to_string()),
            OptionValue::Float(v) => Some(v.to_string()),
        };

        Self {
            name: node.name.clone(),
            label: node.label.clone(),
            kind: node.kind,
            value,
            choices: node.choices.clone(),
        }
    }
}

// ===== Pure decode / encode =====

/// Decode a node's current value
///
/// Only radio (as string) and toggle (as boolean) options are readable.
pub fn decode_value(node: &OptionNode) -> Result<ParameterValue, OptionError> {
    match (node.kind, &node.value) {
        (OptionKind::Radio, OptionValue::Text(value)) => Ok(ParameterValue::String(value.clone())),
        (OptionKind::Toggle, OptionValue::Int(value)) => Ok(ParameterValue::Boolean(*value != 0)),
        (kind, _) => Err(OptionError::UnsupportedKind {
            name: node.name.clone(),
            kind: kind.to_string(),
        }),
    }
}

/// Parse a choice as a number, accepting a comma as decimal separator
///
/// Some translations of device menus render "1,4" instead of "1.4".
pub fn parse_choice_number(choice: &str) -> Option<f64> {
    choice.trim().replace(',', ".").parse::<f64>().ok()
}

/// Compute the raw value to store for a requested parameter value
pub fn encode_value(
    node: &OptionNode,
    value: &ParameterValue,
    tolerance: f64,
) -> Result<OptionValue, OptionError> {
    match (node.kind, value) {
        (OptionKind::Radio, ParameterValue::String(s)) => Ok(OptionValue::Text(s.clone())),
        (OptionKind::Radio, ParameterValue::Double(requested)) => {
            select_nearest_choice(node, *requested, tolerance).map(OptionValue::Text)
        }
        (OptionKind::Radio, ParameterValue::Integer(requested)) => {
            select_integer_choice(node, *requested).map(OptionValue::Text)
        }
        (OptionKind::Toggle, value) => match value.to_int() {
            Some(v) => i32::try_from(v)
                .map(OptionValue::Int)
                .map_err(|_| OptionError::SetFailed {
                    name: node.name.clone(),
                    reason: format!("{} is out of range for a toggle", v),
                }),
            None => Err(unsupported_value(node, value)),
        },
        (OptionKind::Radio, _) => Err(unsupported_value(node, value)),
        (kind, _) => Err(OptionError::UnsupportedKind {
            name: node.name.clone(),
            kind: kind.to_string(),
        }),
    }
}

fn unsupported_value(node: &OptionNode, value: &ParameterValue) -> OptionError {
    OptionError::UnsupportedValue {
        name: node.name.clone(),
        kind: node.kind.to_string(),
        value_type: value.type_name(),
    }
}

/// First choice within `tolerance` of `requested`
fn select_nearest_choice(
    node: &OptionNode,
    requested: f64,
    tolerance: f64,
) -> Result<String, OptionError> {
    for choice in &node.choices {
        let Some(choice_value) = parse_choice_number(choice) else {
            debug!(option = %node.name, choice = %choice, "Choice is not a number");
            continue;
        };

        if (choice_value - requested).abs() < tolerance {
            return Ok(choice.clone());
        }
    }

    Err(OptionError::NoMatchingChoice {
        name: node.name.clone(),
        requested: requested.to_string(),
    })
}

/// Choice whose integer value equals `requested`
///
/// The sentinel [`AUTO_CHOICE_SENTINEL`] selects the first choice that is not
/// an integer, which is how automatic modes such as "Auto" ISO are listed.
fn select_integer_choice(node: &OptionNode, requested: i64) -> Result<String, OptionError> {
    let selected = node.choices.iter().find(|choice| {
        match choice.trim().parse::<i64>() {
            Ok(choice_value) => choice_value == requested,
            Err(_) => requested == AUTO_CHOICE_SENTINEL,
        }
    });

    selected.cloned().ok_or_else(|| OptionError::NoMatchingChoice {
        name: node.name.clone(),
        requested: requested.to_string(),
    })
}

// ===== Device-facing operations =====

/// Read a named option from the device
pub fn get_parameter(
    conn: &mut dyn DeviceConnection,
    name: &str,
) -> Result<ParameterValue, OptionError> {
    let root = conn.config().map_err(OptionError::RootUnavailable)?;
    let node = root
        .find(name)
        .ok_or_else(|| OptionError::NotFound(name.to_string()))?;

    decode_value(node)
}

/// Write a named option, commit the tree and wait for the device to settle
pub fn set_parameter(
    conn: &mut dyn DeviceConnection,
    name: &str,
    value: &ParameterValue,
    config: &SessionConfig,
) -> Result<(), OptionError> {
    let mut root = conn.config().map_err(OptionError::RootUnavailable)?;
    let node = root
        .find_mut(name)
        .ok_or_else(|| OptionError::NotFound(name.to_string()))?;

    let encoded = encode_value(node, value, config.choice_tolerance)?;
    debug!(option = %name, value = ?encoded, "Setting option");
    node.value = encoded;

    conn.set_config(&root).map_err(OptionError::CommitFailed)?;

    drain_events(conn, config);
    Ok(())
}

/// Log an option's kind, value and choices at debug level
pub fn log_option(conn: &mut dyn DeviceConnection, name: &str) -> Option<OptionDescription> {
    let root = match conn.config() {
        Ok(root) => root,
        Err(e) => {
            warn!(error = %e, "Unable to get root option");
            return None;
        }
    };

    let Some(node) = root.find(name) else {
        warn!(option = %name, "Unable to get option");
        return None;
    };

    let description = OptionDescription::from(node);
    debug!(
        option = %name,
        kind = %description.kind,
        value = ?description.value,
        choices = description.choices.len(),
        "Option"
    );
    for choice in &description.choices {
        debug!("  value: {}", choice);
    }

    Some(description)
}

/// Describe every value-carrying option of the tree
pub fn list_options(
    conn: &mut dyn DeviceConnection,
) -> Result<Vec<OptionDescription>, OptionError> {
    let root = conn.config().map_err(OptionError::RootUnavailable)?;
    Ok(root.leaves().into_iter().map(OptionDescription::from).collect())
}

/// Flap the mirror through the viewfinder option
///
/// Devices without the option have no mirror to move; nothing is done then.
pub fn set_mirror_position(
    conn: &mut dyn DeviceConnection,
    position: MirrorPosition,
    config: &SessionConfig,
) {
    let name = config.viewfinder_parameter.as_str();
    if get_parameter(conn, name).is_err() {
        debug!(option = %name, "No mirror control, skipping flap");
        return;
    }

    let up = position == MirrorPosition::Up;
    if let Err(e) = set_parameter(conn, name, &ParameterValue::Boolean(up), config) {
        warn!(error = %e, "Failed to flap {} camera mirror", position);
    }
}

/// Drain pending device events until the device reports a timeout
///
/// Each poll is bounded by the configured poll timeout and the whole drain by
/// the drain deadline. Returns the number of events consumed.
pub fn drain_events(conn: &mut dyn DeviceConnection, config: &SessionConfig) -> usize {
    let deadline = Instant::now() + config.drain_deadline();
    let mut drained = 0;

    loop {
        match conn.wait_for_event(config.event_poll_timeout()) {
            Ok(DeviceEvent::Timeout) => break,
            Ok(event) => {
                drained += 1;
                debug!(?event, "Drained device event");
            }
            Err(e) => {
                debug!(error = %e, "Waiting for device event failed");
                break;
            }
        }

        if Instant::now() >= deadline {
            warn!(drained, "Device kept reporting events, giving up on drain");
            break;
        }
    }

    drained
}
