//! Scheduler
//!
//! Single async control loop driving two cadences: a short one that runs
//! every source detector as an independent blocking task and joins them
//! (barrier), and a long one that, immediately after a detector barrier,
//! runs the correlator and then the responder strictly in sequence. Due
//! times live in an explicit `SchedulerState`, not module globals.
//!
//! Shutdown is soft: on interrupt the loop stops after the in-flight
//! cycle's components have been dispatched; nothing is cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};

use crate::logic::analyzer::Analyzer;
use crate::logic::config::Config;
use crate::logic::defense::{Responder, UfwBlock};
use crate::logic::detectors::{
    self, AuthDetector, Detector, IdsIpsDetector, UfwDetector,
};
use crate::logic::telemetry::{self, SecurityEvent};

/// Poll granularity of the control loop
const TICK: Duration = Duration::from_secs(1);

// ============================================================================
// SCHEDULER STATE
// ============================================================================

/// Next-due bookkeeping for both cadences
pub struct SchedulerState {
    detector_interval: Duration,
    correlation_interval: Duration,
    detector_due: Instant,
    correlation_due: Instant,
}

impl SchedulerState {
    /// Both cadences are due immediately on startup.
    pub fn new(detector_interval: Duration, correlation_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            detector_interval,
            correlation_interval,
            detector_due: now,
            correlation_due: now,
        }
    }

    pub fn detector_round_due(&self, now: Instant) -> bool {
        now >= self.detector_due
    }

    pub fn correlation_due(&self, now: Instant) -> bool {
        now >= self.correlation_due
    }

    pub fn advance_detector(&mut self, now: Instant) {
        self.detector_due = now + self.detector_interval;
    }

    pub fn advance_correlation(&mut self, now: Instant) {
        self.correlation_due = now + self.correlation_interval;
    }
}

// ============================================================================
// CONTROL LOOP
// ============================================================================

fn build_detectors(config: &Config) -> Vec<Arc<dyn Detector>> {
    vec![
        Arc::new(AuthDetector::new(
            config.auth.log_path.clone(),
            config.auth_db_path(),
            config.auth.threshold,
        )),
        Arc::new(IdsIpsDetector::new(
            config.ids_ips.log_path.clone(),
            config.ids_db_path(),
            config.ids_ips.threshold,
            config.ids_ips.variant,
        )),
        Arc::new(UfwDetector::new(
            config.ufw.log_path.clone(),
            config.ufw_db_path(),
            config.ufw.threshold,
        )),
    ]
}

/// Run the daemon until interrupted.
pub async fn run(config: Config) {
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No interrupt handler could be installed; the loop then only
            // ends with the process.
            std::future::pending::<()>().await;
        }
    };
    run_with_shutdown(config, shutdown).await;
}

/// The control loop proper, with the shutdown trigger injected. The trigger
/// lives across iterations, so a signal landing while a cycle is in flight
/// is observed on the next tick instead of being dropped with a per-
/// iteration listener.
async fn run_with_shutdown<F>(config: Config, shutdown: F)
where
    F: std::future::Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let detectors = build_detectors(&config);
    let task_timeout = Duration::from_secs(config.detector_timeout_secs);
    let mut state = SchedulerState::new(
        Duration::from_secs(config.detector_interval_secs),
        Duration::from_secs(config.correlation_interval_secs),
    );

    log::info!(
        "Scheduler started: detector round every {}s, correlation every {}s",
        config.detector_interval_secs,
        config.correlation_interval_secs
    );

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("Interrupt received - shutting down after the in-flight cycle");
                break;
            }
            _ = sleep(TICK) => {}
        }

        let now = Instant::now();
        if !state.detector_round_due(now) {
            continue;
        }

        run_detector_round(&detectors, task_timeout).await;
        state.advance_detector(now);

        // The long cadence fires only right after a detector barrier so
        // the correlator sees one consistent detector round.
        if state.correlation_due(now) {
            run_correlation_phase(config.clone()).await;
            state.advance_correlation(now);
        }
    }
}

/// One detection cycle: all detectors in parallel, then a barrier join.
/// A panicked, failed or timed-out detector is logged with its identity
/// and costs only its own contribution this round.
async fn run_detector_round(detectors: &[Arc<dyn Detector>], task_timeout: Duration) {
    let mut handles = Vec::with_capacity(detectors.len());
    for detector in detectors {
        let detector = Arc::clone(detector);
        let kind = detector.kind();
        let handle = tokio::task::spawn_blocking(move || {
            let start = std::time::Instant::now();
            let result = detectors::run(detector.as_ref());
            (result, start.elapsed())
        });
        handles.push((kind, handle));
    }

    for (kind, handle) in handles {
        match timeout(task_timeout, handle).await {
            Err(_) => log::error!(
                "{} detector exceeded {}s, abandoning its result this round",
                kind.as_str(),
                task_timeout.as_secs()
            ),
            Ok(Err(e)) => log::error!("{} detector task panicked: {}", kind.as_str(), e),
            Ok(Ok((Err(e), _))) => log::error!("{} detector failed: {}", kind.as_str(), e),
            Ok(Ok((Ok(ip_count), elapsed))) => {
                telemetry::record(SecurityEvent::detector_run(
                    kind.as_str(),
                    ip_count,
                    elapsed.as_millis() as u64,
                ));
            }
        }
    }
}

/// One correlation cycle: correlator, then responder, strictly sequential.
/// The responder never observes a half-written correlation pass.
async fn run_correlation_phase(config: Config) {
    let handle = tokio::task::spawn_blocking(move || {
        let analyzer = Analyzer::from_config(&config);
        match analyzer.analyze() {
            Ok(report) => telemetry::record(SecurityEvent::correlation_completed(
                report.total,
                report.attacks,
                report.suspicious,
            )),
            Err(e) => log::error!("Correlation cycle failed: {}", e),
        }

        // The defense diff is idempotent against the last committed
        // summary, so it still runs when correlation failed this cycle.
        let responder = Responder::from_config(&config, Box::new(UfwBlock));
        if let Err(e) = responder.defend() {
            log::error!("Defense cycle failed: {}", e);
        }
    });

    if let Err(e) = handle.await {
        log::error!("Correlation task panicked: {}", e);
    }
}

// ============================================================================
// TESTS
// ============================================================================
