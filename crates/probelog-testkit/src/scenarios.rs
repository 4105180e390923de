//! Scripted reconciliation scenarios with known outcomes.
//!
//! Each scenario is a fixed event sequence for one device. Replaying it
//! through a [`LogCoordinator`] must end in the recorded state, having issued
//! exactly the recorded bulk requests.

use serde::Serialize;

use probelog_core::{DeviceId, RecordRange, SequenceNumber};
use probelog_sync::{CoordinatorConfig, Inbound, LogCoordinator, Outbound, SyncError, UploadState};

use crate::fixtures::DeviceFixture;

/// A scripted event sequence and its expected result.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Short identifier.
    pub name: &'static str,
    pub description: &'static str,
    pub device_id: DeviceId,
    /// Events in arrival order.
    pub events: Vec<Inbound>,
    pub expected_state: UploadState,
    /// Every bulk request the coordinator should issue, in order.
    pub expected_requests: Vec<RecordRange>,
    /// Records across all sessions once the script has run.
    pub expected_history_len: usize,
}

/// What replaying a scenario produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioOutcome {
    pub state: UploadState,
    pub requests: Vec<RecordRange>,
    pub history_len: usize,
    /// State changes reported along the way.
    pub transitions: usize,
}

impl ScenarioOutcome {
    /// Whether the outcome matches what the scenario expects.
    pub fn matches(&self, scenario: &Scenario) -> bool {
        self.state == scenario.expected_state
            && self.requests == scenario.expected_requests
            && self.history_len == scenario.expected_history_len
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn range(min: u32, max: u32) -> RecordRange {
    RecordRange::new(SequenceNumber(min), SequenceNumber(max))
        .unwrap_or_else(|| RecordRange::single(SequenceNumber(min)))
}

fn complete(min: u32, max: u32, total: usize) -> UploadState {
    UploadState::Complete {
        min_seq: Some(SequenceNumber(min)),
        max_seq: Some(SequenceNumber(max)),
        total,
    }
}

/// Get all scripted scenarios.
pub fn all_scenarios() -> Vec<Scenario> {
    let device = DeviceFixture::new();
    let mut scenarios = Vec::new();

    let mut events = vec![device.cursor(9), device.start(0, 9)];
    events.extend(device.bulk_range(0..10));
    scenarios.push(Scenario {
        name: "full_upload",
        description: "Empty log, device holds [0, 9], every record delivered in order",
        device_id: device.device_id,
        events,
        expected_state: complete(0, 9, 10),
        expected_requests: vec![range(0, 9)],
        expected_history_len: 10,
    });

    let mut events = vec![device.cursor(9), device.start(0, 9)];
    events.extend(device.bulk_range([9, 3, 0, 7, 3, 1, 8, 2, 6, 9, 4, 5]));
    scenarios.push(Scenario {
        name: "out_of_order_bulk",
        description: "Bulk records arrive shuffled with duplicates",
        device_id: device.device_id,
        events,
        expected_state: complete(0, 9, 10),
        expected_requests: vec![range(0, 9)],
        expected_history_len: 10,
    });

    let mut events = vec![device.cursor(99), device.start(0, 99)];
    events.extend(device.bulk_range(0..60));
    events.push(device.connected(false));
    events.push(device.cursor(149));
    events.push(device.start(0, 149));
    events.extend(device.bulk_range(60..150));
    scenarios.push(Scenario {
        name: "resume_after_disconnect",
        description: "Link drops after 60 records; the next transfer asks only for the rest",
        device_id: device.device_id,
        events,
        expected_state: complete(0, 149, 150),
        expected_requests: vec![range(0, 99), range(60, 149)],
        expected_history_len: 150,
    });

    let mut events = vec![device.cursor(19), device.start(0, 19)];
    events.extend(device.bulk_range(0..5));
    events.extend((20..30).map(|n| device.cursor(n)));
    scenarios.push(Scenario {
        name: "stalled_transfer",
        description: "Bulk channel goes silent; cursor ticks force completion",
        device_id: device.device_id,
        events,
        expected_state: complete(0, 29, 15),
        expected_requests: vec![range(0, 19)],
        expected_history_len: 15,
    });

    let mut events = vec![device.cursor(4), device.start(0, 4)];
    events.extend(device.bulk_range(0..5));
    events.push(device.cursor(5));
    events.push(device.cursor(8));
    events.extend(device.bulk_range([6, 7]));
    scenarios.push(Scenario {
        name: "gap_backfill",
        description: "Cursor skips two records after completion; the gap is backfilled",
        device_id: device.device_id,
        events,
        expected_state: complete(0, 8, 9),
        expected_requests: vec![range(0, 4), range(6, 7)],
        expected_history_len: 9,
    });

    let rollover = device.next_session(2);
    let mut events = vec![device.cursor(4), device.start(0, 4)];
    events.extend(device.bulk_range(0..5));
    events.push(rollover.cursor(2));
    events.push(rollover.start(0, 2));
    events.extend(rollover.bulk_range(0..3));
    scenarios.push(Scenario {
        name: "session_rollover",
        description: "Device resets into a new session; old records stay in history",
        device_id: device.device_id,
        events,
        expected_state: complete(0, 2, 3),
        expected_requests: vec![range(0, 4), range(0, 2)],
        expected_history_len: 8,
    });

    let mut events = vec![device.cursor(9), device.start(0, 9)];
    events.extend(device.bulk_range(0..3));
    events.push(device.cancel());
    scenarios.push(Scenario {
        name: "cancelled_transfer",
        description: "Caller cancels a running transfer after three records",
        device_id: device.device_id,
        events,
        expected_state: complete(0, 2, 3),
        expected_requests: vec![range(0, 9)],
        expected_history_len: 3,
    });

    scenarios
}

/// Replay a scenario with the default coordinator configuration.
pub fn run_scenario(scenario: &Scenario) -> Result<ScenarioOutcome, SyncError> {
    run_scenario_with(scenario, CoordinatorConfig::default())
}

/// Replay a scenario with a specific coordinator configuration.
pub fn run_scenario_with(
    scenario: &Scenario,
    config: CoordinatorConfig,
) -> Result<ScenarioOutcome, SyncError> {
    let mut coordinator = LogCoordinator::new(scenario.device_id, config)?;
    let mut requests = Vec::new();
    let mut transitions = 0;

    for event in &scenario.events {
        for outbound in coordinator.handle(event.clone())? {
            match outbound {
                Outbound::IssueBulkRequest { range, .. } => requests.push(range),
                Outbound::UploadStateChanged { .. } => transitions += 1,
            }
        }
    }

    Ok(ScenarioOutcome {
        state: coordinator.state(),
        requests,
        history_len: coordinator.log().history().count(),
        transitions,
    })
}

/// Replay every scenario and report which ones matched.
pub fn verify_all_scenarios() -> Vec<(String, bool)> {
    all_scenarios()
        .iter()
        .map(|scenario| {
            let matches = run_scenario(scenario)
                .map(|outcome| outcome.matches(scenario))
                .unwrap_or(false);
            (scenario.name.to_string(), matches)
        })
        .collect()
}
