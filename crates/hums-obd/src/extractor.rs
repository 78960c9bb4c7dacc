//! Stateful extraction of VIN/CVN/DTC responses

use crate::dtc::DtcReport;
use crate::vin::VinAssembler;
use crate::{ids, response_mode, vehicle_info_pid};

/// A recognized diagnostic response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialResponse {
    /// Completed VIN
    Vin(String),
    /// Calibration verification number as 8 uppercase hex characters
    Cvn(String),
    /// Stored or pending trouble codes
    Dtc(DtcReport),
}

impl SpecialResponse {
    /// Message name used in decoded records
    pub fn message_name(&self) -> &'static str {
        match self {
            SpecialResponse::Vin(_) => "VIN",
            SpecialResponse::Cvn(_) => "CVN",
            SpecialResponse::Dtc(report) => report.mode.label(),
        }
    }

    /// Decoded text used in decoded records
    pub fn text(&self) -> String {
        match self {
            SpecialResponse::Vin(vin) => vin.clone(),
            SpecialResponse::Cvn(cvn) => cvn.clone(),
            SpecialResponse::Dtc(report) => report.text(),
        }
    }
}

/// Recognizes special responses on the ECU response identifier
///
/// Holds the VIN reassembly state of the current capture session.
#[derive(Debug, Default)]
pub struct ResponseExtractor {
    vin: VinAssembler,
}

impl ResponseExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear VIN reassembly state at the start of a capture session
    pub fn reset_session(&mut self) {
        self.vin.reset();
    }

    /// Whether a VIN has been completed in the current session
    pub fn vin_completed(&self) -> bool {
        self.vin.is_completed()
    }

    /// Try to extract a special response from one frame
    ///
    /// `None` means the frame is not (or not yet) a special response and
    /// should be decoded through the signal dictionary instead.
    pub fn extract(&mut self, identifier: u32, payload: &[u8]) -> Option<SpecialResponse> {
        if identifier != ids::ECU_RESPONSE || payload.len() < 3 {
            return None;
        }

        if VinAssembler::is_first_frame(payload) {
            self.vin.open(payload);
            return None;
        }
        if VinAssembler::is_consecutive_frame(payload) {
            return self.vin.push_consecutive(payload).map(SpecialResponse::Vin);
        }

        let (mode, pid) = (payload[1], payload[2]);

        let is_cvn = mode == response_mode::VEHICLE_INFO && pid == vehicle_info_pid::CVN;
        if is_cvn && payload.len() >= 8 {
            return Some(SpecialResponse::Cvn(hex::encode_upper(&payload[4..8])));
        }

        DtcReport::parse(payload).map(SpecialResponse::Dtc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtc::{DtcMode, NO_CODES};

    const RESPONSE: u32 = 0x7E8;

    #[test]
    fn test_vin_round_trip() {
        let mut extractor = ResponseExtractor::new();
        assert!(extractor
            .extract(RESPONSE, &[0x10, 0x14, 0x49, 0x02, 0x01, 0x59, 0x59, 0x59])
            .is_none());
        assert!(extractor
            .extract(RESPONSE, &[0x21, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59])
            .is_none());
        let result = extractor
            .extract(RESPONSE, &[0x22, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59, 0x59])
            .unwrap();

        // 21 appended bytes, 3 header bytes dropped, the 0x01 count byte is not printable
        assert_eq!(result, SpecialResponse::Vin("Y".repeat(17)));
        assert_eq!(result.message_name(), "VIN");
        assert!(extractor.vin_completed());
    }

    #[test]
    fn test_cvn() {
        let mut extractor = ResponseExtractor::new();
        let result = extractor
            .extract(RESPONSE, &[0x07, 0x49, 0x06, 0x01, 0x1a, 0x2b, 0x3c, 0x4d])
            .unwrap();
        assert_eq!(result, SpecialResponse::Cvn("1A2B3C4D".to_string()));
    }

    #[test]
    fn test_short_cvn_falls_through() {
        let mut extractor = ResponseExtractor::new();
        assert!(extractor
            .extract(RESPONSE, &[0x06, 0x49, 0x06, 0x01, 0x1a, 0x2b, 0x3c])
            .is_none());
    }

    #[test]
    fn test_dtc_stored_and_pending() {
        let mut extractor = ResponseExtractor::new();
        let stored = extractor
            .extract(RESPONSE, &[0x43, 0x43, 0x02, 0x01, 0x33, 0x02, 0x00])
            .unwrap();
        assert_eq!(stored.message_name(), "DTC Almacenados");
        assert_eq!(stored.text(), "P0133, P0200");

        let pending = extractor
            .extract(RESPONSE, &[0x02, 0x47, 0x00])
            .unwrap();
        match &pending {
            SpecialResponse::Dtc(report) => assert_eq!(report.mode, DtcMode::Pending),
            other => panic!("Expected DTC, got {:?}", other),
        }
        assert_eq!(pending.text(), NO_CODES);
    }

    #[test]
    fn test_other_identifiers_ignored() {
        let mut extractor = ResponseExtractor::new();
        assert!(extractor
            .extract(0x7E9, &[0x43, 0x43, 0x02, 0x01, 0x33, 0x02, 0x00])
            .is_none());
        assert!(extractor.extract(RESPONSE, &[0x43, 0x43]).is_none());
    }

    #[test]
    fn test_reset_session_isolates_vin() {
        let mut extractor = ResponseExtractor::new();
        extractor.extract(RESPONSE, &[0x10, 0x14, 0x49, 0x02, 0x01, 0x41, 0x41, 0x41]);
        extractor.extract(RESPONSE, &[0x21, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41]);

        extractor.reset_session();

        assert!(extractor
            .extract(RESPONSE, &[0x22, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41])
            .is_none());
        assert!(!extractor.vin_completed());
    }

    #[test]
    fn test_orphan_consecutive_frame_is_not_decoded_as_dtc() {
        let mut extractor = ResponseExtractor::new();
        assert!(extractor
            .extract(RESPONSE, &[0x21, 0x43, 0x01, 0x01, 0x33, 0x00, 0x00, 0x00])
            .is_none());
    }
}
