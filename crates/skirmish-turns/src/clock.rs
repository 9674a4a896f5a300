//! Turn clock: one cancellable ticking task.
//!
//! Every restart bumps the generation. Ticks carry the generation they
//! were produced under, so a tick that was already queued when the clock
//! restarted is recognised as stale and ignored.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use skirmish_core::constants::CLOCK_TICK_SECS;

/// One second elapsed on the clock of the given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub generation: u64,
}

pub struct TurnClock {
    ticks: mpsc::UnboundedSender<ClockTick>,
    task: Option<JoinHandle<()>>,
    generation: u64,
    period: Duration,
}

impl TurnClock {
    /// Clock plus the receiver its ticks arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClockTick>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                ticks: tx,
                task: None,
                generation: 0,
                period: Duration::from_secs(CLOCK_TICK_SECS),
            },
            rx,
        )
    }

    /// Cancel the running task (if any) and start a fresh one.
    ///
    /// Must be called inside a tokio runtime.
    pub fn restart(&mut self) -> u64 {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let period = self.period;
        let tx = self.ticks.clone();
        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(ClockTick { generation }).is_err() {
                    break;
                }
            }
        }));
        generation
    }

    /// Stop ticking. Ticks already queued become stale.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.generation += 1;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, tick: ClockTick) -> bool {
        self.task.is_some() && tick.generation == self.generation
    }
}

impl Drop for TurnClock {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_second() {
        let (mut clock, mut rx) = TurnClock::channel();
        let generation = clock.restart();
        let start = Instant::now();
        for _ in 0..3 {
            let tick = rx.recv().await.unwrap();
            assert_eq!(tick.generation, generation);
        }
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_makes_queued_ticks_stale() {
        let (mut clock, mut rx) = TurnClock::channel();
        clock.restart();
        let old = rx.recv().await.unwrap();
        clock.restart();
        assert!(!clock.is_current(old));
        let fresh = rx.recv().await.unwrap();
        assert!(clock.is_current(fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticks() {
        let (mut clock, mut rx) = TurnClock::channel();
        clock.restart();
        clock.cancel();
        assert!(!clock.is_running());
        let idle = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(idle.is_err());
    }
}
