//! Request Scheduler Implementation

use obd_protocol::{AtCommand, EngineParameter, ObdClient, ObdError, ObdRequest, Pid, SessionEvent};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for the request scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Gauge group rate: RPM and speed (default: 1 Hz)
    pub fast_rate_hz: f64,
    /// Temperature and fuel level group rate (default: every 10 s)
    pub medium_rate_hz: f64,
    /// Battery, MIL, DTC and pressure group rate (default: every 60 s)
    pub slow_rate_hz: f64,
    /// Consecutive failures before a request is backed off
    pub max_retries: u32,
    /// Coolant temperature threshold for rate boost (°C)
    pub coolant_boost_threshold: f64,
    /// Boosted rate multiplier
    pub boost_multiplier: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fast_rate_hz: 1.0,
            medium_rate_hz: 0.1,
            slow_rate_hz: 1.0 / 60.0,
            max_retries: 3,
            coolant_boost_threshold: 105.0,
            boost_multiplier: 10.0,
        }
    }
}

/// A scheduled request with priority and timing info
#[derive(Debug, Clone)]
pub struct ScheduledRequest {
    /// The request to send
    pub request: ObdRequest,
    /// Configured sampling rate in Hz
    pub base_rate_hz: f64,
    /// Current sampling rate in Hz
    pub rate_hz: f64,
    /// Next scheduled query time
    pub next_due: Instant,
    /// Priority (higher = more important)
    pub priority: u8,
    /// Consecutive failure count
    pub failures: u32,
}

impl ScheduledRequest {
    pub fn new(request: ObdRequest, rate_hz: f64, priority: u8) -> Self {
        Self {
            request,
            base_rate_hz: rate_hz,
            rate_hz,
            next_due: Instant::now(),
            priority,
            failures: 0,
        }
    }

    /// Calculate interval between queries
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz.max(f64::EPSILON))
    }

    /// Schedule next query, doubling the interval when backing off
    pub fn schedule_next(&mut self, backoff: bool) {
        let interval = if backoff { self.interval() * 2 } else { self.interval() };
        self.next_due = Instant::now() + interval;
    }
}

impl Eq for ScheduledRequest {}

impl PartialEq for ScheduledRequest {
    fn eq(&self, other: &Self) -> bool {
        self.next_due == other.next_due && self.priority == other.priority
    }
}

impl Ord for ScheduledRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior (earliest time first)
        // Then by priority (higher priority first)
        other
            .next_due
            .cmp(&self.next_due)
            .then_with(|| self.priority.cmp(&other.priority))
    }
}

impl PartialOrd for ScheduledRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Cloneable handle that stops a running scheduler
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        info!("Stopping request scheduler");
        self.0.store(false, AtomicOrdering::SeqCst);
    }
}

/// Periodic poller that drives an [`ObdClient`]
pub struct RequestScheduler {
    /// Scheduled requests in priority queue
    queue: BinaryHeap<ScheduledRequest>,
    /// Configuration
    config: SchedulerConfig,
    /// Whether scheduler is running
    running: Arc<AtomicBool>,
    /// Coolant boost currently applied
    boosted: bool,
}

impl RequestScheduler {
    /// Create an empty scheduler
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            queue: BinaryHeap::new(),
            config,
            running: Arc::new(AtomicBool::new(false)),
            boosted: false,
        }
    }

    /// Create a scheduler with the dashboard gauge groups
    pub fn with_dashboard_plan(config: SchedulerConfig) -> Self {
        let mut scheduler = Self::new(config);
        let (fast, medium, slow) = (
            scheduler.config.fast_rate_hz,
            scheduler.config.medium_rate_hz,
            scheduler.config.slow_rate_hz,
        );

        for pid in [Pid::Rpm, Pid::Speed] {
            scheduler.add(ObdRequest::CurrentData(pid), fast, 3);
        }
        for pid in [Pid::CoolantTemp, Pid::FuelTankLevel, Pid::IntakeAirTemp, Pid::OilTemp] {
            scheduler.add(ObdRequest::CurrentData(pid), medium, 2);
        }
        scheduler.add(ObdRequest::At(AtCommand::ReadVoltage), slow, 1);
        scheduler.add(ObdRequest::CurrentData(Pid::MonitorStatus), slow, 1);
        scheduler.add(ObdRequest::StoredDtcs, slow, 1);
        for pid in [Pid::FuelPressure, Pid::IntakeManifoldPressure, Pid::FuelFlowRate] {
            scheduler.add(ObdRequest::CurrentData(pid), slow, 1);
        }

        info!("Request scheduler created with {} requests", scheduler.pid_count());
        scheduler
    }

    /// Add a request to the schedule
    pub fn add(&mut self, request: ObdRequest, rate_hz: f64, priority: u8) {
        self.queue.push(ScheduledRequest::new(request, rate_hz, priority));
    }

    /// Change the rate of a scheduled request
    pub fn set_rate(&mut self, request: ObdRequest, new_rate_hz: f64) {
        let items: Vec<_> = self.queue.drain().collect();
        for mut item in items {
            if item.request == request {
                debug!("Setting {} rate to {} Hz", request, new_rate_hz);
                item.rate_hz = new_rate_hz;
            }
            self.queue.push(item);
        }
    }

    /// Boost or restore the coolant request rate for a new reading
    fn apply_coolant(&mut self, scheduled: &mut ScheduledRequest, temp: f64) {
        let over = temp > self.config.coolant_boost_threshold;
        if over && !self.boosted {
            warn!(
                "Coolant temp {:.0}°C > {:.0}°C threshold, boosting rate",
                temp, self.config.coolant_boost_threshold
            );
            scheduled.rate_hz = scheduled.base_rate_hz * self.config.boost_multiplier;
            self.boosted = true;
        } else if !over && self.boosted {
            info!("Coolant temp back to {:.0}°C, restoring rate", temp);
            scheduled.rate_hz = scheduled.base_rate_hz;
            self.boosted = false;
        }
    }

    /// Run the scheduler loop.
    ///
    /// Returns when stopped, when the event receiver is dropped, or when the
    /// transport closes.
    pub async fn run(
        &mut self,
        client: &mut ObdClient,
        events_tx: mpsc::Sender<SessionEvent>,
    ) -> Result<(), ObdError> {
        info!("Starting request scheduler");
        self.running.store(true, AtomicOrdering::SeqCst);

        while self.is_running() {
            let Some(mut scheduled) = self.queue.pop() else {
                warn!("Nothing scheduled");
                break;
            };

            // Wait until it's time
            tokio::time::sleep_until(scheduled.next_due).await;
            if !self.is_running() {
                self.queue.push(scheduled);
                break;
            }

            let backoff = match client.query(scheduled.request).await {
                Ok(exchange) => {
                    let unanswered = exchange.is_unanswered();
                    for event in exchange.events {
                        if let SessionEvent::Parameter(EngineParameter::CoolantTemp(temp)) = event {
                            self.apply_coolant(&mut scheduled, temp);
                        }
                        if events_tx.send(event).await.is_err() {
                            info!("Event receiver dropped, stopping scheduler");
                            self.queue.push(scheduled);
                            self.running.store(false, AtomicOrdering::SeqCst);
                            return Ok(());
                        }
                    }

                    if unanswered {
                        self.record_failure(&mut scheduled, "no answer from vehicle")
                    } else {
                        scheduled.failures = 0;
                        false
                    }
                }
                Err(ObdError::Closed) => {
                    warn!("Transport closed, stopping scheduler");
                    self.queue.push(scheduled);
                    self.running.store(false, AtomicOrdering::SeqCst);
                    return Err(ObdError::Closed);
                }
                Err(e) => self.record_failure(&mut scheduled, &e),
            };

            // Reschedule
            scheduled.schedule_next(backoff);
            self.queue.push(scheduled);
        }

        info!("Request scheduler stopped");
        Ok(())
    }

    /// Count a failed attempt, returning whether to back off
    fn record_failure(&self, scheduled: &mut ScheduledRequest, reason: impl fmt::Display) -> bool {
        scheduled.failures += 1;
        warn!(
            "{} query failed (attempt {}): {}",
            scheduled.request, scheduled.failures, reason
        );

        if scheduled.failures >= self.config.max_retries {
            warn!("Max retries reached for {}, backing off", scheduled.request);
            return true;
        }
        false
    }

    /// Handle for stopping the scheduler from another task
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.running))
    }

    /// Stop the scheduler
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Check if scheduler is running
    pub fn is_running(&self) -> bool {
        self.running.load(AtomicOrdering::SeqCst)
    }

    /// Get the number of scheduled requests
    pub fn pid_count(&self) -> usize {
        self.queue.len()
    }

    /// Current rate of a scheduled request
    pub fn rate_of(&self, request: ObdRequest) -> Option<f64> {
        self.queue
            .iter()
            .find(|item| item.request == request)
            .map(|item| item.rate_hz)
    }
}
