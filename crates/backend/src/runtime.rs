//! The controller event loop.
//!
//! One task owns the [`TargetingController`] and is the only writer of target
//! and needle state. Position fixes, heading samples and the fetch timer arrive
//! on independent channels; fetches run on their own tasks and report back on a
//! completion channel so sensor handling never waits on the network.
//!
//! Headings travel on a `watch` channel: a burst of samples collapses into the
//! newest one. Position fixes are queued since each one may move the state machine.

use std::sync::Arc;
use std::time::Duration;

use nolimit_shared::controller::{FetchOutcome, FetchRequest, TargetingController};
use nolimit_shared::models::{Candidate, ControllerState, DisplayFrame, PositionFix};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::overpass::{CandidateFetcher, FetchError};

const POSITION_QUEUE: usize = 16;
const COMPLETION_QUEUE: usize = 8;

/// Producer ends of the loop's inputs plus the display sink.
#[derive(Clone)]
pub struct Handles {
    pub positions: mpsc::Sender<PositionFix>,
    pub headings: Arc<watch::Sender<Option<f64>>>,
    pub display: watch::Receiver<DisplayFrame>,
}

type Completion = (FetchRequest, Result<Vec<Candidate>, FetchError>);

/// Spawn the controller loop. It runs until every position and heading sender
/// has been dropped.
pub fn spawn(
    controller: TargetingController,
    fetcher: Arc<dyn CandidateFetcher>,
    fetch_interval: Duration,
) -> (Handles, JoinHandle<()>) {
    let (position_tx, position_rx) = mpsc::channel(POSITION_QUEUE);
    let (heading_tx, heading_rx) = watch::channel(None);
    let (display_tx, display_rx) = watch::channel(controller.frame());

    let event_loop = EventLoop {
        controller,
        fetcher,
        display: display_tx,
        warned_no_fix: false,
        warned_no_heading: false,
    };
    let handle = tokio::spawn(event_loop.run(position_rx, heading_rx, fetch_interval));

    let handles = Handles {
        positions: position_tx,
        headings: Arc::new(heading_tx),
        display: display_rx,
    };
    (handles, handle)
}

struct EventLoop {
    controller: TargetingController,
    fetcher: Arc<dyn CandidateFetcher>,
    display: watch::Sender<DisplayFrame>,
    warned_no_fix: bool,
    warned_no_heading: bool,
}

impl EventLoop {
    async fn run(
        mut self,
        mut positions: mpsc::Receiver<PositionFix>,
        mut headings: watch::Receiver<Option<f64>>,
        fetch_interval: Duration,
    ) {
        let (done_tx, mut done_rx) = mpsc::channel::<Completion>(COMPLETION_QUEUE);
        let mut ticker = tokio::time::interval(fetch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut positions_open = true;
        let mut headings_open = true;

        tracing::info!(interval_secs = fetch_interval.as_secs_f64(), "Targeting loop started");

        while positions_open || headings_open {
            tokio::select! {
                fix = positions.recv(), if positions_open => match fix {
                    Some(fix) => self.on_position(fix),
                    None => positions_open = false,
                },
                changed = headings.changed(), if headings_open => match changed {
                    Ok(()) => {
                        let latest = *headings.borrow_and_update();
                        if let Some(heading) = latest {
                            self.on_heading(heading);
                        }
                    }
                    Err(_) => headings_open = false,
                },
                Some((request, result)) = done_rx.recv() => self.on_completion(request, result),
                _ = ticker.tick() => self.on_tick(&done_tx),
            }
        }

        tracing::info!("Sensor inputs closed, targeting loop stopped");
    }

    fn on_position(&mut self, fix: PositionFix) {
        let before = self.controller.state();
        let frame = self.controller.on_position(fix);
        if frame.state != before {
            tracing::info!(from = %before, to = %frame.state, speed_kmh = ?frame.speed_kmh, "Policy changed");
        }
        self.publish(frame);
    }

    fn on_heading(&mut self, heading: f64) {
        if let Some(frame) = self.controller.on_heading(heading) {
            self.publish(frame);
        }
    }

    fn on_tick(&mut self, done_tx: &mpsc::Sender<Completion>) {
        let Some(request) = self.controller.begin_fetch() else {
            if !self.warned_no_fix {
                tracing::warn!("No position fix yet, skipping candidate fetch");
                self.warned_no_fix = true;
            }
            return;
        };

        if self.controller.state() == ControllerState::Directional
            && request.heading.is_none()
            && !self.warned_no_heading
        {
            tracing::warn!("Heading unavailable, selecting nearest target instead");
            self.warned_no_heading = true;
        }

        tracing::debug!(seq = request.seq, policy = %request.policy, origin = %request.origin, "Fetching candidates");
        let fetcher = Arc::clone(&self.fetcher);
        let done_tx = done_tx.clone();
        tokio::spawn(async move {
            let result = fetcher.fetch(request.origin, request.radius_m).await;
            // The loop may have stopped; nothing left to update then
            let _ = done_tx.send((request, result)).await;
        });
    }

    fn on_completion(&mut self, request: FetchRequest, result: Result<Vec<Candidate>, FetchError>) {
        match self.controller.complete_fetch(request, result) {
            FetchOutcome::Applied(target) => {
                tracing::info!(
                    seq = request.seq,
                    target = target.candidate.id,
                    distance_km = target.distance_km,
                    bearing = target.bearing,
                    "Target updated"
                );
                self.publish(self.controller.frame());
            }
            FetchOutcome::Stale => {
                tracing::debug!(seq = request.seq, "Discarding out-of-order fetch result");
            }
            FetchOutcome::Failed(err) => {
                tracing::warn!(seq = request.seq, error = %err, "Candidate fetch failed");
            }
            FetchOutcome::NoCandidates => {
                tracing::info!(seq = request.seq, "No candidates within search radius");
            }
            FetchOutcome::NothingAhead => {
                tracing::info!(seq = request.seq, "No candidate ahead, keeping last target");
            }
        }
    }

    fn publish(&self, frame: DisplayFrame) {
        self.display.send_replace(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nolimit_shared::controller::ControllerConfig;
    use nolimit_shared::models::GeoPoint;
    use nolimit_shared::needle::NeedleConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WAIT: Duration = Duration::from_secs(5);

    struct FixedFetcher {
        candidates: Vec<Candidate>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CandidateFetcher for FixedFetcher {
        async fn fetch(&self, _origin: GeoPoint, _radius_m: f64) -> Result<Vec<Candidate>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.candidates.clone())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl CandidateFetcher for FailingFetcher {
        async fn fetch(&self, _origin: GeoPoint, _radius_m: f64) -> Result<Vec<Candidate>, FetchError> {
            Err(FetchError::Status(504))
        }
    }

    /// Never completes, standing in for a hung network round trip.
    struct HangingFetcher;

    #[async_trait]
    impl CandidateFetcher for HangingFetcher {
        async fn fetch(&self, _origin: GeoPoint, _radius_m: f64) -> Result<Vec<Candidate>, FetchError> {
            std::future::pending().await
        }
    }

    fn controller() -> TargetingController {
        TargetingController::new(ControllerConfig {
            needle: NeedleConfig::new(1.0, 0.0),
            ..ControllerConfig::default()
        })
    }

    fn fix(kmh: f64) -> PositionFix {
        PositionFix {
            point: GeoPoint::new(0.0, 0.0),
            speed_mps: Some(kmh / 3.6),
            timestamp_ms: 0,
        }
    }

    fn east() -> Candidate {
        Candidate {
            id: 42,
            point: GeoPoint::new(0.0, 0.1),
        }
    }

    #[tokio::test]
    async fn test_fetch_result_reaches_display() {
        let fetcher = Arc::new(FixedFetcher {
            candidates: vec![east()],
            calls: AtomicUsize::new(0),
        });
        let (mut handles, _task) = spawn(controller(), fetcher.clone(), Duration::from_millis(20));

        handles.positions.send(fix(0.0)).await.unwrap();
        handles.headings.send(Some(0.0)).unwrap();

        let frame = *tokio::time::timeout(WAIT, handles.display.wait_for(|f| f.target_id.is_some()))
            .await
            .expect("no target within timeout")
            .unwrap();

        assert_eq!(frame.target_id, Some(42));
        assert!((frame.distance_km.unwrap() - 11.1195).abs() < 0.01);
        assert!(fetcher.calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_sensor_updates_continue_while_fetch_hangs() {
        let (mut handles, _task) = spawn(controller(), Arc::new(HangingFetcher), Duration::from_millis(10));

        handles.positions.send(fix(80.0)).await.unwrap();
        handles.positions.send(fix(80.0)).await.unwrap();
        tokio::time::timeout(
            WAIT,
            handles.display.wait_for(|f| f.state == ControllerState::Directional),
        )
        .await
        .expect("state never changed")
        .unwrap();

        // Let several ticks fire; every fetch hangs forever
        tokio::time::sleep(Duration::from_millis(50)).await;
        handles.positions.send(fix(0.0)).await.unwrap();
        tokio::time::timeout(WAIT, handles.display.wait_for(|f| f.speed_kmh.is_some_and(|s| s < 1.0)))
            .await
            .expect("position not processed while fetch outstanding")
            .unwrap();
        assert_eq!(handles.display.borrow().target_id, None);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_running() {
        let (mut handles, _task) = spawn(controller(), Arc::new(FailingFetcher), Duration::from_millis(10));
        handles.positions.send(fix(30.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handles.positions.send(fix(70.0)).await.unwrap();

        tokio::time::timeout(
            WAIT,
            handles.display.wait_for(|f| f.state == ControllerState::Directional),
        )
        .await
        .expect("loop stopped after failed fetch")
        .unwrap();
        assert_eq!(handles.display.borrow().distance_km, None);
    }

    #[tokio::test]
    async fn test_heading_burst_applies_newest_sample() {
        let north = Candidate {
            id: 7,
            point: GeoPoint::new(0.1, 0.0),
        };
        let fetcher = Arc::new(FixedFetcher {
            candidates: vec![north],
            calls: AtomicUsize::new(0),
        });
        let (mut handles, _task) = spawn(controller(), fetcher, Duration::from_millis(10));

        handles.positions.send(fix(0.0)).await.unwrap();
        tokio::time::timeout(WAIT, handles.display.wait_for(|f| f.target_id.is_some()))
            .await
            .expect("no target within timeout")
            .unwrap();

        for heading in [10.0, 45.0, 180.0, 90.0] {
            handles.headings.send(Some(heading)).unwrap();
        }
        // Target due north with heading east puts the needle at 270
        tokio::time::timeout(WAIT, handles.display.wait_for(|f| (f.angle - 270.0).abs() < 1e-6))
            .await
            .expect("newest heading never applied")
            .unwrap();
    }

    #[tokio::test]
    async fn test_loop_stops_when_senders_dropped() {
        let (handles, task) = spawn(controller(), Arc::new(FailingFetcher), Duration::from_millis(10));
        drop(handles);
        tokio::time::timeout(WAIT, task)
            .await
            .expect("loop did not stop")
            .unwrap();
    }
}
