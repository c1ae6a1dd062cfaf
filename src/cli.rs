// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Taking photos
//! - Reading, writing and listing camera options
//! - Running the live view
//!
//! Commands run against the simulated protocol.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tethercam::backends::camera::options::OptionDescription;
use tethercam::{
    CameraSession, ParameterValue, SessionConfig, SessionEvent, SessionState,
    SimulatedProtocol,
};
use tokio::runtime::Runtime;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// How long a command waits for the camera before giving up
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// List all available cameras
pub fn list_cameras(devices: usize) -> CliResult {
    let protocol = SimulatedProtocol::new(devices)?;
    let cameras = protocol.descriptors();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        println!("  [{}] {}", index, camera.model);
        println!("      Port: {}", camera.port);
    }

    Ok(())
}

/// Take a photo using the specified camera
pub fn take_photo(devices: usize, camera_index: usize, output: Option<PathBuf>) -> CliResult {
    let mut config = SessionConfig::load_or_default()?;
    if let Some(dir) = output {
        config.capture_dir = dir;
    }

    let runtime = Runtime::new()?;
    runtime.block_on(async {
        let mut session = open_session(devices, camera_index, config).await?;
        println!("Using camera: {}", session.cameras()[camera_index]);

        session.set_state(SessionState::Loaded);
        wait_for_state(&mut session, SessionState::Loaded).await?;

        let id = session.capture("");
        let start = Instant::now();
        loop {
            let event = next_event(&mut session, start).await?;
            match event {
                SessionEvent::ImageCaptured { id: got, preview } if got == id => {
                    println!("Captured {}x{} image", preview.width, preview.height);
                }
                SessionEvent::ImageSaved { id: got, path } if got == id => {
                    println!("Photo saved: {}", path.display());
                    break;
                }
                SessionEvent::ImageCaptureError {
                    id: got,
                    kind,
                    message,
                } if got == id => {
                    return Err(format!("Capture failed ({}): {}", kind, message).into());
                }
                _ => {}
            }
        }

        session.shutdown().await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Print the current value of one option
pub fn get_option(devices: usize, camera_index: usize, name: &str) -> CliResult {
    let runtime = Runtime::new()?;
    runtime.block_on(async {
        let mut session = loaded_session(devices, camera_index).await?;

        match session.parameter(name).await {
            Some(value) => println!("{} = {}", name, value),
            None => return Err(format!("Unable to read option {}", name).into()),
        }

        if let Some(description) = session.describe_option(name).await
            && !description.choices.is_empty()
        {
            println!("Choices: {}", description.choices.join(", "));
        }
        session.shutdown().await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Write one option
pub fn set_option(devices: usize, camera_index: usize, name: &str, value: &str) -> CliResult {
    let value = ParameterValue::parse(value);
    let runtime = Runtime::new()?;
    runtime.block_on(async {
        let mut session = loaded_session(devices, camera_index).await?;

        if !session.set_parameter(name, value.clone()).await {
            return Err(format!("Unable to set option {} to {}", name, value).into());
        }

        match session.parameter(name).await {
            Some(current) => println!("{} = {}", name, current),
            None => println!("{} set", name),
        }
        session.shutdown().await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Print the option tree
pub fn list_options(devices: usize, camera_index: usize) -> CliResult {
    let runtime = Runtime::new()?;
    runtime.block_on(async {
        let mut session = loaded_session(devices, camera_index).await?;

        for option in session.options().await {
            print_option(&option);
        }
        session.shutdown().await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Run the live view until `frames` frames arrived
pub fn preview(devices: usize, camera_index: usize, frames: usize) -> CliResult {
    let runtime = Runtime::new()?;
    runtime.block_on(async {
        let config = SessionConfig::load_or_default()?;
        let mut session = open_session(devices, camera_index, config).await?;

        session.set_state(SessionState::Active);
        wait_for_state(&mut session, SessionState::Active).await?;

        let start = Instant::now();
        let mut received = 0;
        while received < frames {
            if let SessionEvent::VideoFrameProbed(frame) = next_event(&mut session, start).await? {
                received += 1;
                println!(
                    "Frame {:>4}: {}x{} ({} bytes)",
                    received,
                    frame.width,
                    frame.height,
                    frame.len()
                );
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            println!("Received {} frames at {:.1} fps", received, received as f64 / elapsed);
        }

        session.shutdown().await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

async fn open_session(
    devices: usize,
    camera_index: usize,
    config: SessionConfig,
) -> Result<CameraSession, Box<dyn std::error::Error>> {
    let protocol = Arc::new(SimulatedProtocol::new(devices)?);
    let cameras = protocol.descriptors();
    if cameras.is_empty() {
        return Err("No cameras found".into());
    }
    if camera_index >= cameras.len() {
        return Err(format!(
            "Camera index {} out of range (0-{})",
            camera_index,
            cameras.len() - 1
        )
        .into());
    }

    let mut session = CameraSession::new(protocol, cameras, config);
    session.set_camera(camera_index).await?;
    Ok(session)
}

async fn loaded_session(
    devices: usize,
    camera_index: usize,
) -> Result<CameraSession, Box<dyn std::error::Error>> {
    let config = SessionConfig::load_or_default()?;
    let mut session = open_session(devices, camera_index, config).await?;
    session.set_state(SessionState::Loaded);
    wait_for_state(&mut session, SessionState::Loaded).await?;
    Ok(session)
}

async fn wait_for_state(
    session: &mut CameraSession,
    target: SessionState,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    while session.state() != target {
        if let SessionEvent::Error { kind, message } = next_event(session, start).await?
            && kind.is_fatal()
        {
            return Err(message.into());
        }
    }
    Ok(())
}

async fn next_event(
    session: &mut CameraSession,
    start: Instant,
) -> Result<SessionEvent, Box<dyn std::error::Error>> {
    let remaining = COMMAND_TIMEOUT.saturating_sub(start.elapsed());
    match tokio::time::timeout(remaining, session.next_event()).await {
        Ok(Some(SessionEvent::Warning { kind, message })) => {
            eprintln!("Warning ({}): {}", kind, message);
            Ok(SessionEvent::Warning { kind, message })
        }
        Ok(Some(event)) => Ok(event),
        Ok(None) => Err("Camera session ended".into()),
        Err(_) => Err(format!("Camera did not respond within {:?}", COMMAND_TIMEOUT).into()),
    }
}

fn print_option(option: &OptionDescription) {
    let value = option.value.as_deref().unwrap_or("-");
    println!("{:<24} {:<8} {}", option.name, option.kind.to_string(), value);
    if !option.label.is_empty() && option.label != option.name {
        println!("  {}", option.label);
    }
    for choice in &option.choices {
        println!("    - {}", choice);
    }
}
