// libs/video-call-cell/src/services/timer.rs
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::debug;

/// Elapsed-time counter for a live call, driven by a recurring tick.
pub struct CallTimer {
    period: Duration,
    started_at: Option<Instant>,
    task: Option<JoinHandle<()>>,
}

impl CallTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            started_at: None,
            task: None,
        }
    }

    /// Starts ticking; `on_tick` runs once per period until `stop`. No-op if running.
    pub fn start<F>(&mut self, on_tick: F)
    where
        F: Fn() + Send + 'static,
    {
        if self.task.is_some() {
            return;
        }

        let period = self.period;
        self.started_at = Some(Instant::now());
        self.task = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                on_tick();
            }
        }));
        debug!("Call timer started ({:?} period)", period);
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Call timer stopped");
        }
        self.started_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.started_at
            .map(|started| started.elapsed().as_secs())
            .unwrap_or(0)
    }
}

impl Drop for CallTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `M:SS` under an hour, `H:MM:SS` from then on.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
