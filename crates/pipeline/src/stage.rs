//! The loop every stage runs in.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What one iteration of a stage achieved, which decides how long to wait
/// before the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Something was consumed or produced; go again immediately.
    Worked,
    /// Downstream is full.
    Saturated,
    /// Upstream is empty.
    Idle,
    /// The iteration failed and was logged; the same work is retried later.
    Failed,
}

impl Tick {
    pub fn delay(self, saturation_delay: Duration) -> Option<Duration> {
        match self {
            Tick::Worked => None,
            Tick::Saturated | Tick::Idle | Tick::Failed => Some(saturation_delay),
        }
    }
}

/// One independently restartable pipeline stage.
///
/// All state a stage carries between iterations lives in the implementing
/// value; stages only communicate through their queues and the store.
#[async_trait]
pub trait Stage: Send {
    fn name(&self) -> &'static str;

    /// Run one iteration. Item-level failures are logged and contained here.
    async fn tick(&mut self) -> Tick;
}

/// Drive `stage` until `cancel` fires.
///
/// An iteration in flight when cancellation arrives is dropped; every stage
/// checkpoints through durable state, so the work is picked up on restart.
pub async fn run<S>(stage: &mut S, saturation_delay: Duration, cancel: CancellationToken)
where
    S: Stage + ?Sized,
{
    let name = stage.name();
    tracing::info!(stage = name, "Stage started");
    loop {
        let tick = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            tick = stage.tick() => tick,
        };
        tracing::trace!(stage = name, ?tick, "Iteration finished");
        match tick.delay(saturation_delay) {
            Some(delay) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {},
                }
            },
            None => tokio::task::yield_now().await,
        }
    }
    tracing::info!(stage = name, "Stage stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    struct Scripted {
        ticks: VecDeque<Tick>,
        at: Vec<Instant>,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl Stage for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn tick(&mut self) -> Tick {
            self.at.push(Instant::now());
            match self.ticks.pop_front() {
                Some(tick) => tick,
                None => {
                    self.cancel.cancel();
                    Tick::Idle
                },
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_follow_ticks() {
        let cancel = CancellationToken::new();
        let mut stage = Scripted {
            ticks: VecDeque::from([Tick::Worked, Tick::Saturated, Tick::Worked, Tick::Failed]),
            at: Vec::new(),
            cancel: cancel.clone(),
        };
        let delay = Duration::from_secs(120);
        let start = Instant::now();
        run(&mut stage, delay, cancel).await;

        let offsets: Vec<_> = stage.at.iter().map(|at| *at - start).collect();
        assert_eq!(
            offsets,
            vec![Duration::ZERO, Duration::ZERO, delay, delay, delay * 2],
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let mut stage = Scripted {
            ticks: VecDeque::from([Tick::Idle; 100]),
            at: Vec::new(),
            cancel: CancellationToken::new(),
        };
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            trigger.cancel();
        });
        let start = Instant::now();
        run(&mut stage, Duration::from_secs(3600), cancel).await;

        assert_eq!(stage.at.len(), 1);
        assert_eq!(Instant::now() - start, Duration::from_secs(30));
    }

    #[test]
    fn test_tick_delay() {
        let delay = Duration::from_millis(5);
        assert_eq!(Tick::Worked.delay(delay), None);
        assert_eq!(Tick::Idle.delay(delay), Some(delay));
    }
}
