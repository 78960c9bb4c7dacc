//! VIN reassembly
//!
//! The mode 0x09 PID 0x02 answer does not fit in one CAN frame. The ECU
//! sends an ISO-TP first frame followed by consecutive frames:
//!
//! ```text
//! 10 14 49 02 01 V1 V2 V3     first frame (PCI, length, mode echo, PID echo, count, data)
//! 21 V4 V5 V6 V7 V8 V9 V10    consecutive frame 1
//! 22 V11 .. V17               consecutive frame 2 (last)
//! ```
//!
//! Only this fixed pattern is handled: no flow control, block size or
//! sequence validation. Reassembly keeps everything after the PCI byte,
//! drops the first three bytes (length, mode echo, PID echo) and keeps the
//! printable ASCII that remains. The three-byte drop is unconditional, so
//! an ECU omitting those echoes would lose VIN characters.

use tracing::debug;

use crate::vehicle_info_pid;

const FIRST_FRAME: u8 = 0x10;
const CONSECUTIVE_FRAME: u8 = 0x21;
const LAST_CONSECUTIVE_FRAME: u8 = 0x22;

/// Length, mode echo and PID echo
const HEADER_LEN: usize = 3;

/// Reassembly buffer for one VIN transfer
#[derive(Debug, Default, Clone)]
pub struct VinAssembler {
    segments: Vec<Vec<u8>>,
    completed: bool,
}

impl VinAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// First frame of a VIN response
    pub fn is_first_frame(payload: &[u8]) -> bool {
        payload.len() > 3 && payload[0] == FIRST_FRAME && payload[3] == vehicle_info_pid::VIN
    }

    /// Consecutive frame marker (terminal or not)
    pub fn is_consecutive_frame(payload: &[u8]) -> bool {
        matches!(
            payload.first(),
            Some(&CONSECUTIVE_FRAME) | Some(&LAST_CONSECUTIVE_FRAME)
        )
    }

    /// Start a new transfer, discarding any unfinished one
    ///
    /// Payloads that are not a VIN first frame are ignored.
    pub fn open(&mut self, payload: &[u8]) {
        if !Self::is_first_frame(payload) {
            debug!("Not a VIN first frame, ignored");
            return;
        }
        if self.is_open() {
            debug!("Discarding unfinished VIN transfer");
        }
        self.segments = vec![payload[1..].to_vec()];
        self.completed = false;
    }

    /// Append a consecutive frame; returns the VIN when the last frame arrives
    ///
    /// Frames arriving without an open transfer are ignored.
    pub fn push_consecutive(&mut self, payload: &[u8]) -> Option<String> {
        let (&pci, data) = payload.split_first()?;
        if pci != CONSECUTIVE_FRAME && pci != LAST_CONSECUTIVE_FRAME {
            return None;
        }
        if !self.is_open() {
            debug!("Consecutive frame without first frame ignored");
            return None;
        }
        self.segments.push(data.to_vec());

        if pci == LAST_CONSECUTIVE_FRAME {
            Some(self.finish())
        } else {
            None
        }
    }

    fn finish(&mut self) -> String {
        let vin: String = self
            .segments
            .drain(..)
            .flatten()
            .skip(HEADER_LEN)
            .filter(|b| (32..=126).contains(b))
            .map(char::from)
            .collect();
        self.completed = true;
        vin.trim().to_string()
    }

    pub fn is_open(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Whether a VIN was completed since the last reset
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn reset(&mut self) {
        self.segments.clear();
        self.completed = false;
    }
}
