//! Dedicated controller thread.
//!
//! The worker owns the `RobotController` and is the only thread that
//! touches the bus. Callers submit closures and block for the reply. Between
//! jobs the thread publishes state snapshots at the polling rate and, while
//! disconnected, looks for the arm's USB controller.
//!
//! Each `ControllerWorker` spawns exactly one thread, which is joined when
//! the worker is shut down or dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;

use crate::adapter::RobotState;
use crate::config::PollingCfg;
use crate::controller::RobotController;
use crate::error::WorkerError;

type Job = Box<dyn FnOnce(&mut RobotController) + Send>;

/// Published by the polling loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    State(RobotState),
    /// A known arm controller showed up while disconnected.
    PortDetected(String),
}

pub struct ControllerWorker {
    jobs: Option<xch::Sender<Job>>,
    events: xch::Receiver<PollEvent>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl std::fmt::Debug for ControllerWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerWorker")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Send, replacing any unread event.
fn publish(tx: &xch::Sender<PollEvent>, drain: &xch::Receiver<PollEvent>, ev: PollEvent) {
    if let Err(xch::TrySendError::Full(ev)) = tx.try_send(ev) {
        let _ = drain.try_recv();
        let _ = tx.try_send(ev);
    }
}

impl ControllerWorker {
    pub fn spawn(mut controller: RobotController, cfg: PollingCfg) -> Self {
        let (job_tx, job_rx) = xch::unbounded::<Job>();
        let (ev_tx, ev_rx) = xch::bounded(1);
        let drain = ev_rx.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let period = Duration::from_millis(crate::util::period_ms(cfg.state_hz));

        let join_handle = std::thread::spawn(move || {
            let mut next_poll = Instant::now();
            let mut next_rediscover = Instant::now();
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("controller worker received shutdown signal");
                    break;
                }
                let wait = next_poll.saturating_duration_since(Instant::now());
                match job_rx.recv_timeout(wait) {
                    Ok(job) => job(&mut controller),
                    Err(xch::RecvTimeoutError::Timeout) => {}
                    Err(xch::RecvTimeoutError::Disconnected) => break,
                }
                let now = Instant::now();
                if now < next_poll {
                    continue;
                }
                next_poll = now + period;
                if controller.is_connected() {
                    publish(&ev_tx, &drain, PollEvent::State(controller.state()));
                } else if now >= next_rediscover {
                    next_rediscover = now + cfg.rediscover;
                    match controller.discovery().find_by_pid() {
                        Ok(Some(port)) => publish(&ev_tx, &drain, PollEvent::PortDetected(port)),
                        Ok(None) => {}
                        Err(e) => tracing::debug!(error = %e, "rediscovery failed"),
                    }
                }
            }
            controller.disconnect();
            tracing::trace!("controller worker exiting cleanly");
        });

        Self {
            jobs: Some(job_tx),
            events: ev_rx,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Run `f` on the worker thread and wait for its result.
    pub fn call<R, F>(&self, f: F) -> Result<R, WorkerError>
    where
        R: Send + 'static,
        F: FnOnce(&mut RobotController) -> R + Send + 'static,
    {
        let (tx, rx) = xch::bounded(1);
        let job: Job = Box::new(move |c| {
            let _ = tx.send(f(c));
        });
        self.jobs
            .as_ref()
            .ok_or(WorkerError::Stopped)?
            .send(job)
            .map_err(|_| WorkerError::Stopped)?;
        rx.recv().map_err(|_| WorkerError::Stopped)
    }

    /// Most recent event, if one arrived since the last call.
    pub fn latest(&self) -> Option<PollEvent> {
        self.events.try_iter().last()
    }

    /// Latest state snapshot, ignoring other events.
    pub fn latest_state(&self) -> Option<RobotState> {
        self.events.try_iter().fold(None, |acc, ev| match ev {
            PollEvent::State(s) => Some(s),
            PollEvent::PortDetected(_) => acc,
        })
    }

    /// Block up to `timeout` for the next event.
    pub fn next_event(&self, timeout: Duration) -> Option<PollEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Stop the thread and wait for it. The arm is disconnected on the way
    /// out. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.jobs.take();
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("controller worker joined"),
                Err(e) => tracing::warn!(?e, "controller worker panicked"),
            }
        }
    }
}

impl Drop for ControllerWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
