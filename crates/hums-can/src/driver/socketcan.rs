//! Linux driver: `ip link` for the interface, a capture tool for logging,
//! raw SocketCAN for transmission

use std::fs::File;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use hums_core::CanSettings;
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Socket, StandardId};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{BusDriver, CaptureProcess};
use crate::error::BusError;
use crate::request::RequestFrame;

/// SocketCAN bus driver
pub struct SocketCanDriver {
    use_sudo: bool,
    ip_program: String,
    capture_program: String,
}

impl SocketCanDriver {
    pub fn new(settings: &CanSettings) -> Self {
        Self {
            use_sudo: settings.use_sudo,
            ip_program: "ip".to_string(),
            capture_program: settings.capture_program.clone(),
        }
    }

    async fn ip_link(&self, args: &[&str]) -> Result<(), BusError> {
        let mut command = if self.use_sudo {
            let mut command = Command::new("sudo");
            command.arg(&self.ip_program);
            command
        } else {
            Command::new(&self.ip_program)
        };
        command.arg("link").args(args);

        let rendered = format!("ip link {}", args.join(" "));
        debug!(command = %rendered, "Running interface command");

        let output = command
            .output()
            .await
            .map_err(|e| BusError::Interface(format!("Failed to run `{}`: {}", rendered, e)))?;

        if !output.status.success() {
            return Err(BusError::Interface(format!(
                "`{}` failed ({}): {}",
                rendered,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BusDriver for SocketCanDriver {
    async fn bring_up(&self, interface: &str, bitrate: u32) -> Result<(), BusError> {
        // Bitrate can only be changed while the interface is down
        self.ip_link(&["set", interface, "down"]).await?;
        let bitrate = bitrate.to_string();
        self.ip_link(&["set", interface, "type", "can", "bitrate", &bitrate])
            .await?;
        self.ip_link(&["set", interface, "up"]).await?;
        info!(interface, bitrate = %bitrate, "CAN interface up");
        Ok(())
    }

    async fn bring_down(&self, interface: &str) -> Result<(), BusError> {
        self.ip_link(&["set", interface, "down"]).await?;
        info!(interface, "CAN interface down");
        Ok(())
    }

    async fn start_capture(
        &self,
        interface: &str,
        sink: File,
    ) -> Result<Box<dyn CaptureProcess>, BusError> {
        let child = Command::new(&self.capture_program)
            .arg("-L")
            .arg(interface)
            .stdin(Stdio::null())
            .stdout(Stdio::from(sink))
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BusError::Capture(format!("Failed to start {}: {}", self.capture_program, e))
            })?;

        info!(
            program = %self.capture_program,
            interface,
            pid = ?child.id(),
            "Capture started"
        );
        Ok(Box::new(ChildCapture {
            child,
            program: self.capture_program.clone(),
        }))
    }

    async fn send_frame(&self, interface: &str, frame: &RequestFrame) -> Result<(), BusError> {
        let interface = interface.to_string();
        let frame = frame.clone();

        tokio::task::spawn_blocking(move || {
            let socket = CanSocket::open(&interface).map_err(|e| {
                BusError::Transmit(format!("Failed to open CAN socket on {}: {}", interface, e))
            })?;
            let id = StandardId::new(frame.identifier).ok_or_else(|| {
                BusError::Transmit(format!("Invalid 11-bit ID 0x{:X}", frame.identifier))
            })?;
            let can_frame = CanFrame::new(id, &frame.payload).ok_or_else(|| {
                BusError::Transmit(format!("Invalid payload length {}", frame.payload.len()))
            })?;
            socket
                .write_frame(&can_frame)
                .map_err(|e| BusError::Transmit(e.to_string()))
        })
        .await
        .map_err(|e| BusError::Transmit(format!("Task join error: {}", e)))?
    }
}

/// Capture tool running as a child process
struct ChildCapture {
    child: Child,
    program: String,
}

#[async_trait]
impl CaptureProcess for ChildCapture {
    fn poll_exit(&mut self) -> Option<String> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            Ok(None) => None,
            Err(e) => Some(e.to_string()),
        }
    }

    async fn shutdown(&mut self, grace: Duration) -> Result<(), BusError> {
        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }

        if let Some(pid) = self.child.id() {
            // SAFETY: plain signal delivery to our own child process
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(program = %self.program, %status, "Capture stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(BusError::Capture(format!(
                "Failed waiting for {}: {}",
                self.program, e
            ))),
            Err(_) => {
                warn!(program = %self.program, "Capture ignored SIGTERM, killing");
                self.child.kill().await.map_err(|e| {
                    BusError::Capture(format!("Failed to kill {}: {}", self.program, e))
                })
            }
        }
    }
}
