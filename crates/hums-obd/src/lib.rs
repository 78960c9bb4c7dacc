//! hums-obd - OBD-II special response extraction
//!
//! Most CAN traffic is decoded through the vehicle signal dictionary, but a
//! few diagnostic responses need protocol knowledge instead:
//!
//! - VIN (mode 0x09 PID 0x02), spread over a first frame and consecutive frames
//! - CVN (mode 0x09 PID 0x06), a single frame
//! - stored/pending DTCs (mode 0x03/0x07 responses)
//!
//! [`ResponseExtractor`] recognizes those on the diagnostic response
//! identifier and keeps the VIN reassembly state between calls. The state
//! belongs to one capture session; call [`ResponseExtractor::reset_session`]
//! whenever a new session starts.

pub mod dtc;
pub mod extractor;
pub mod vin;

pub use dtc::{DtcCategory, DtcMode, DtcReport, ObdDtc, NO_CODES};
pub use extractor::{ResponseExtractor, SpecialResponse};
pub use vin::VinAssembler;

/// Well-known 11-bit OBD-II identifiers
pub mod ids {
    /// Functional (broadcast) request identifier
    pub const FUNCTIONAL_REQUEST: u16 = 0x7DF;
    /// Physical request identifier of the engine ECU
    pub const ECU_REQUEST: u16 = 0x7E0;
    /// Response identifier of the engine ECU
    pub const ECU_RESPONSE: u32 = 0x7E8;
}

/// Response mode bytes (request mode + 0x40)
pub mod response_mode {
    pub const STORED_DTC: u8 = 0x43;
    pub const PENDING_DTC: u8 = 0x47;
    pub const VEHICLE_INFO: u8 = 0x49;
}

/// Mode 0x09 PIDs
pub mod vehicle_info_pid {
    pub const VIN: u8 = 0x02;
    pub const CVN: u8 = 0x06;
}
