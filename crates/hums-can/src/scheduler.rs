//! Request timing
//!
//! The scheduler is a pure state machine over time elapsed since
//! acquisition start. The worker asks it which frames are due, transmits
//! them, and sleeps until [`RequestScheduler::next_deadline`].

use std::time::Duration;

use hums_obd::ids;

use crate::request::{DiagnosticRequest, RequestFrame};

/// Lower bound on a periodic request's interval
pub const MIN_PERIOD: Duration = Duration::from_millis(10);

/// A fixed identification request, sent once per session
///
/// The first step goes out at `at`; the others follow at their offset
/// from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinRequest {
    pub name: &'static str,
    pub at: Duration,
    pub steps: Vec<(Duration, RequestFrame)>,
}

/// Set of built-in requests for a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltinPlan {
    requests: Vec<BuiltinRequest>,
}

impl BuiltinPlan {
    /// No built-in requests
    pub fn none() -> Self {
        Self::default()
    }

    /// VIN at 30 s, CVN at 35 s, stored then pending DTCs at 40 s
    pub fn obd_identification() -> Self {
        let functional = |data: &[u8]| RequestFrame::new(ids::FUNCTIONAL_REQUEST, data.to_vec());
        let ecu = |data: &[u8]| RequestFrame::new(ids::ECU_REQUEST, data.to_vec());

        let vin = functional(&[0x02, 0x09, 0x02, 0, 0, 0, 0, 0]);
        // Flow control so the ECU sends the remaining VIN frames
        let flow_control = ecu(&[0x30, 0x00, 0x05, 0, 0, 0, 0, 0]);
        let cvn = functional(&[0x02, 0x09, 0x06, 0, 0, 0, 0, 0]);
        let stored = functional(&[0x01, 0x03]);
        let pending = functional(&[0x01, 0x07]);

        Self {
            requests: vec![
                BuiltinRequest {
                    name: "VIN",
                    at: Duration::from_secs(30),
                    steps: vec![
                        (Duration::ZERO, vin),
                        (Duration::from_millis(50), flow_control),
                    ],
                },
                BuiltinRequest {
                    name: "CVN",
                    at: Duration::from_secs(35),
                    steps: vec![(Duration::ZERO, cvn)],
                },
                BuiltinRequest {
                    name: "DTC",
                    at: Duration::from_secs(40),
                    steps: vec![
                        (Duration::ZERO, stored),
                        (Duration::from_secs(1), pending),
                    ],
                },
            ],
        }
    }

    pub fn requests(&self) -> &[BuiltinRequest] {
        &self.requests
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[derive(Debug)]
struct BuiltinState {
    request: BuiltinRequest,
    requested: bool,
}

#[derive(Debug)]
struct TableEntry {
    request: DiagnosticRequest,
    /// `None` once a one-shot request has fired
    next_fire: Option<Duration>,
}

#[derive(Debug)]
struct FollowUp {
    due: Duration,
    frame: RequestFrame,
}

/// Decides which frames are due at a given elapsed time
#[derive(Debug)]
pub struct RequestScheduler {
    builtins: Vec<BuiltinState>,
    table: Vec<TableEntry>,
    follow_ups: Vec<FollowUp>,
}

impl RequestScheduler {
    pub fn new(requests: Vec<DiagnosticRequest>, plan: BuiltinPlan) -> Self {
        Self {
            builtins: plan
                .requests
                .into_iter()
                .map(|request| BuiltinState {
                    request,
                    requested: false,
                })
                .collect(),
            table: requests
                .into_iter()
                .map(|request| TableEntry {
                    next_fire: Some(request.trigger_delay),
                    request,
                })
                .collect(),
            follow_ups: Vec::new(),
        }
    }

    /// Frames due at `elapsed`, in transmission order
    ///
    /// Built-ins come first, then queued follow-ups, then table requests.
    /// A periodic request fires at most once per call; its next fire time
    /// is `elapsed + period`, so late wake-ups do not cause bursts.
    pub fn due(&mut self, elapsed: Duration) -> Vec<RequestFrame> {
        let mut frames = Vec::new();

        for state in self.builtins.iter_mut() {
            if state.requested || elapsed < state.request.at {
                continue;
            }
            state.requested = true;
            for (offset, frame) in &state.request.steps {
                if offset.is_zero() {
                    frames.push(frame.clone());
                } else {
                    self.follow_ups.push(FollowUp {
                        due: elapsed + *offset,
                        frame: frame.clone(),
                    });
                }
            }
        }

        self.follow_ups.sort_by_key(|f| f.due);
        let ready = self
            .follow_ups
            .iter()
            .take_while(|f| f.due <= elapsed)
            .count();
        frames.extend(self.follow_ups.drain(..ready).map(|f| f.frame));

        for entry in self.table.iter_mut() {
            let Some(next_fire) = entry.next_fire else {
                continue;
            };
            if elapsed < next_fire {
                continue;
            }
            frames.push(entry.request.frame.clone());
            entry.next_fire = if entry.request.one_shot {
                None
            } else {
                Some(elapsed + entry.request.period.max(MIN_PERIOD))
            };
        }

        frames
    }

    /// Earliest time at which another frame becomes due
    pub fn next_deadline(&self) -> Option<Duration> {
        let builtins = self
            .builtins
            .iter()
            .filter(|s| !s.requested)
            .map(|s| s.request.at);
        let follow_ups = self.follow_ups.iter().map(|f| f.due);
        let table = self.table.iter().filter_map(|e| e.next_fire);

        builtins.chain(follow_ups).chain(table).min()
    }

    /// Next fire time of the table request at `index`
    pub fn next_fire(&self, index: usize) -> Option<Duration> {
        self.table.get(index).and_then(|e| e.next_fire)
    }
}
