//! Schedule driver for detection cycles and scenario ticks

use crate::error::EngineError;
use chrono::Local;
use climate_core::HouseId;
use cron::Schedule;
use dashmap::DashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Work the scheduler asks the engine to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduledJob {
    /// Run the detection cycle of a house
    Detection(HouseId),
    /// Re-evaluate every scenario and finalize every room
    ScenarioTick,
}

impl ScheduledJob {
    /// Timer key, one timer per job
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Detection(house) => format!("detection:{house}"),
            Self::ScenarioTick => "scenario_tick".to_string(),
        }
    }
}

/// Events emitted by the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerEvent {
    pub job: ScheduledJob,
}

/// Parse a cron expression (seconds field included)
pub fn parse_cron(expression: &str) -> Result<Schedule, EngineError> {
    Schedule::from_str(expression)
        .map_err(|e| EngineError::InvalidCron(format!("{expression}: {e}")))
}

/// Scheduler managing interval and cron timers
pub struct Scheduler {
    /// Active timer handles (keyed by job key)
    timers: Arc<DashMap<String, JoinHandle<()>>>,
    /// Event sender for fired jobs
    event_tx: broadcast::Sender<SchedulerEvent>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a new scheduler
    #[must_use]
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            timers: Arc::new(DashMap::new()),
            event_tx,
        }
    }

    /// Subscribe to scheduler events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    /// Fire a job every `seconds`; zero removes the job instead
    pub fn schedule_interval(&self, job: ScheduledJob, seconds: u64) {
        let key = job.key();
        self.remove(&key);
        if seconds == 0 {
            return;
        }

        let event_tx = self.event_tx.clone();
        let fired = job.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(seconds));
            // Skip the first immediate tick
            interval.tick().await;

            loop {
                interval.tick().await;
                tracing::debug!("Interval fired for {:?}", fired);
                let _ = event_tx.send(SchedulerEvent { job: fired.clone() });
            }
        });

        self.timers.insert(key.clone(), handle);
        tracing::info!("Scheduled {} every {}s", key, seconds);
    }

    /// Fire a job on a cron schedule
    pub fn schedule_cron(&self, job: ScheduledJob, expression: &str) -> Result<(), EngineError> {
        let schedule = parse_cron(expression)?;
        let key = job.key();
        self.remove(&key);

        let event_tx = self.event_tx.clone();
        let fired = job.clone();
        let handle = tokio::spawn(async move {
            loop {
                let now = Local::now();
                let Some(next_time) = schedule.upcoming(Local).next() else {
                    tracing::warn!("No upcoming times for cron schedule of {:?}", fired);
                    break;
                };

                let duration = (next_time - now)
                    .to_std()
                    .unwrap_or(std::time::Duration::from_secs(60));
                tracing::debug!("Next {:?} at {} (in {:?})", fired, next_time, duration);

                tokio::time::sleep(duration).await;

                let _ = event_tx.send(SchedulerEvent { job: fired.clone() });

                // Small delay to avoid double-firing
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        });

        self.timers.insert(key.clone(), handle);
        tracing::info!("Scheduled {} with cron '{}'", key, expression);
        Ok(())
    }

    /// Stop a job's timer
    pub fn remove(&self, key: &str) {
        if let Some((_, handle)) = self.timers.remove(key) {
            handle.abort();
            tracing::debug!("Removed scheduler timer {}", key);
        }
    }

    /// Get the number of active timers
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Abort all timer tasks
        for entry in self.timers.iter() {
            entry.value().abort();
        }
    }
}
