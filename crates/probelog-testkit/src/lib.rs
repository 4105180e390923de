//! # Probelog Testkit
//!
//! Testing utilities for probelog.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Scenarios**: Scripted event sequences with expected outcomes, replayable
//!   against any coordinator configuration
//! - **Generators**: Proptest strategies for arrival orders and lossy streams
//! - **Fixtures**: Helpers for building sessions, logs, and events
//!
//! ## Scenarios
//!
//! ```rust
//! use probelog_testkit::scenarios::{all_scenarios, run_scenario};
//!
//! for scenario in all_scenarios() {
//!     let outcome = run_scenario(&scenario).unwrap();
//!     assert_eq!(outcome.state, scenario.expected_state);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use probelog_testkit::generators::arrival_order;
//!
//! proptest! {
//!     #[test]
//!     fn bulk_order_does_not_matter(order in arrival_order(50)) {
//!         // feed `order` into a session...
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use probelog_testkit::fixtures::DeviceFixture;
//!
//! let fixture = DeviceFixture::new();
//! let log = fixture.log_with_records(0..10);
//! assert_eq!(log.record_count(), 10);
//! ```

pub mod fixtures;
pub mod generators;
pub mod scenarios;

pub use fixtures::{multi_device_fixtures, DeviceFixture};
pub use generators::{arrival_order, cursor_stream, CursorStream};
pub use scenarios::{
    all_scenarios, run_scenario, run_scenario_with, verify_all_scenarios, Scenario, ScenarioOutcome,
};
