//! Test helper utilities and common testing patterns
//!
//! [`TestRegistry`] wraps a registry driven by a [`ManualClock`], so elapsed
//! times in tests are exact.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;

use master_dispatcher::{DispatchRole, Dispatched, Registry, RegistryOptions, ReportOutcome};
use master_domain::{ManualClock, SlaveId, TaskMessage};
use master_errors::MasterResult;

use crate::builders::{ReportBuilder, TaskMessageBuilder};
use crate::mocks::RecordingTransport;

/// Millisecond timestamp every test clock starts at
pub const TEST_EPOCH_MILLIS: i64 = 1_700_000_000_000;

pub fn test_epoch() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(TEST_EPOCH_MILLIS).unwrap()
}

/// Options with normalization disabled, so raw averages can be asserted directly
pub fn raw_options() -> RegistryOptions {
    RegistryOptions {
        normalize_indices: false,
        ..RegistryOptions::default()
    }
}

/// A registry with a manual clock and recording transports for each slave
pub struct TestRegistry {
    pub registry: Registry,
    pub clock: ManualClock,
}

impl TestRegistry {
    pub fn new(options: RegistryOptions) -> Self {
        let clock = ManualClock::new(test_epoch());
        let registry = Registry::new(options).with_clock(Arc::new(clock.clone()));
        Self { registry, clock }
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        for name in roles {
            self.registry.add_role(DispatchRole::new(*name)).unwrap();
        }
        self
    }

    pub fn connect(&mut self, name: &str) -> (SlaveId, RecordingTransport) {
        let transport = RecordingTransport::new();
        let id = self.registry.add_slave(name, Arc::new(transport.clone()));
        (id, transport)
    }

    /// Move the clock to `offset_millis` after the test epoch
    pub fn at(&self, offset_millis: i64) {
        self.clock.set(test_epoch() + chrono::Duration::milliseconds(offset_millis));
    }

    pub fn dispatch(&mut self, role: &str) -> MasterResult<Dispatched> {
        self.registry.dispatch(role, TaskMessageBuilder::new().build())
    }

    pub fn dispatch_task(&mut self, role: &str, task: TaskMessage) -> MasterResult<Dispatched> {
        self.registry.dispatch(role, task)
    }

    /// Report `uid` as finished on `slave` at `offset_millis` after the epoch
    pub fn complete(
        &mut self,
        slave: SlaveId,
        uid: u64,
        offset_millis: i64,
    ) -> MasterResult<ReportOutcome> {
        self.at(offset_millis);
        let report = ReportBuilder::new(uid)
            .with_times(TEST_EPOCH_MILLIS, TEST_EPOCH_MILLIS + offset_millis)
            .build();
        self.registry.handle_report(slave, report)
    }
}

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    ///
    /// This is useful for service tests where events are drained by a
    /// background task.
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }

        false
    }
}
