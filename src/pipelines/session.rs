// SPDX-License-Identifier: GPL-3.0-only

//! Frame-driven keyboard session
//!
//! A [`Session`] owns everything one keyboard needs: the depth source, the
//! keyboard and its calibration, the note sink, the transform store and the
//! clock. [`Session::tick`] runs one full pipeline pass; calibration changes
//! are `&mut self` methods, so they can only happen between passes.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nalgebra::Point3;
use tracing::{debug, info, warn};

use super::calibration::Calibration;
use super::depth::{DepthProjector, PointCloud};
use super::keyboard::{Key, Keyboard, NoteEvent};
use super::picking::{DepthPicker, PointPicker};
use crate::backends::audio::NoteSink;
use crate::backends::sensor::{DepthFrame, DepthSource};
use crate::config::Config;
use crate::errors::{AppResult, CalibrationError, SensorError, SensorResult};
use crate::storage::TransformStore;

/// Time source for debouncing
pub trait Clock {
    /// Time since the session epoch
    fn now(&self) -> Duration;
}

/// Monotonic wall clock starting at construction
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Clock advanced by hand; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now: Duration) {
        self.now.set(now);
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

/// Step sizes of the manual calibration nudges
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NudgeSteps {
    pub roll_rad: f64,
    pub z_fraction: f64,
}

impl Default for NudgeSteps {
    fn default() -> Self {
        use crate::constants::calibration::*;
        Self {
            roll_rad: DEFAULT_ROLL_STEP_RAD,
            z_fraction: DEFAULT_Z_STEP_FRACTION,
        }
    }
}

/// Outcome of one pipeline pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// A new frame was projected (false when the previous cloud was reused)
    pub fresh: bool,
    pub sensor_points: usize,
    pub local_points: usize,
    pub events: Vec<NoteEvent>,
    pub now: Duration,
}

/// Running counters for the status bar
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionCounters {
    pub ticks: u64,
    pub fresh_frames: u64,
    pub stale_frames: u64,
    pub notes_played: u64,
}

/// Read-only snapshot handed to a [`Renderer`]
pub struct FrameView<'a> {
    pub frame: Option<&'a DepthFrame>,
    pub sensor_cloud: &'a [Point3<f32>],
    pub local_cloud: &'a [Point3<f32>],
    pub keys: &'a [Key],
    pub calibration: &'a Calibration,
    pub source_name: &'a str,
    pub sink_name: &'a str,
    pub counters: SessionCounters,
}

/// Consumer of frame views; the pipeline itself never draws
pub trait Renderer {
    fn render(&mut self, view: &FrameView<'_>) -> AppResult<()>;
}

pub struct Session {
    source: Box<dyn DepthSource>,
    sink: Box<dyn NoteSink>,
    clock: Box<dyn Clock>,
    keyboard: Keyboard,
    projector: DepthProjector,
    store: TransformStore,
    steps: NudgeSteps,
    last_frame: Option<Arc<DepthFrame>>,
    sensor_cloud: PointCloud,
    local_cloud: PointCloud,
    counters: SessionCounters,
}

impl Session {
    pub fn new(
        source: Box<dyn DepthSource>,
        sink: Box<dyn NoteSink>,
        clock: Box<dyn Clock>,
        keyboard: Keyboard,
        projector: DepthProjector,
        store: TransformStore,
        steps: NudgeSteps,
    ) -> Self {
        info!(
            source = source.name(),
            sink = sink.name(),
            keys = keyboard.keys().len(),
            stride = projector.stride(),
            "Keyboard session ready"
        );

        Self {
            source,
            sink,
            clock,
            keyboard,
            projector,
            store,
            steps,
            last_frame: None,
            sensor_cloud: Vec::new(),
            local_cloud: Vec::new(),
            counters: SessionCounters::default(),
        }
    }

    /// Build a session from the configuration, restoring the saved transform
    pub fn from_config(
        config: &Config,
        source: Box<dyn DepthSource>,
        sink: Box<dyn NoteSink>,
        clock: Box<dyn Clock>,
    ) -> AppResult<Self> {
        let store = TransformStore::new(config.calibration.transform_path());
        let keyboard = Keyboard::from_config(config, store.load_or_default())?;

        Ok(Self::new(
            source,
            sink,
            clock,
            keyboard,
            DepthProjector::new(config.sensor.stride),
            store,
            NudgeSteps {
                roll_rad: config.calibration.roll_step_rad,
                z_fraction: config.calibration.z_step_fraction,
            },
        ))
    }

    /// Run one pipeline pass
    ///
    /// A stale read reuses the previous cloud so debounced releases still
    /// happen while the sensor is quiet. Other sensor errors are returned
    /// and leave all state untouched.
    pub fn tick(&mut self) -> SensorResult<FrameStats> {
        self.counters.ticks += 1;

        let fresh = match self.source.poll_frame() {
            Ok(frame) => {
                self.sensor_cloud = self.projector.project(&frame);
                self.local_cloud = self.keyboard.clip(&self.sensor_cloud);
                self.last_frame = Some(frame);
                self.counters.fresh_frames += 1;
                true
            }
            Err(SensorError::Stale) => {
                self.counters.stale_frames += 1;
                false
            }
            Err(e) => return Err(e),
        };

        let now = self.clock.now();
        let events = self
            .keyboard
            .update(&self.local_cloud, now, self.sink.as_mut());
        self.counters.notes_played += events
            .iter()
            .filter(|e| matches!(e, NoteEvent::On { .. }))
            .count() as u64;

        Ok(FrameStats {
            fresh,
            sensor_points: self.sensor_cloud.len(),
            local_points: self.local_cloud.len(),
            events,
            now,
        })
    }

    /// Point under image coordinates `(u, v)` of the latest frame
    pub fn pick(&self, u: u32, v: u32) -> Option<Point3<f32>> {
        let frame = self.last_frame.as_deref()?;
        DepthPicker::new(frame, &self.projector).pick(u, v)
    }

    /// Recalibrate from three picked points
    ///
    /// On failure the current transform stays active.
    pub fn calibrate(&mut self, points: [Point3<f32>; 3]) -> Result<(), CalibrationError> {
        let [p0, p1, p2] = points.map(|p| p.cast::<f64>());
        let calibration = Calibration::from_points(&p0, &p1, &p2).inspect_err(|e| {
            warn!("Keeping previous keyboard transform: {}", e);
        })?;

        info!(length = calibration.scale(), "Keyboard calibrated");
        self.apply(calibration);
        Ok(())
    }

    /// Rotate the keyboard about its local Y axis by one step
    pub fn nudge_roll(&mut self, sign: f64) -> Result<(), CalibrationError> {
        let calibration = self
            .keyboard
            .calibration()
            .nudged_roll(sign, self.steps.roll_rad)?;
        debug!(sign, "Rolled keyboard");
        self.apply(calibration);
        Ok(())
    }

    /// Move the keyboard along its local Z axis by one step
    pub fn nudge_z(&mut self, sign: f64) -> Result<(), CalibrationError> {
        let calibration = self
            .keyboard
            .calibration()
            .nudged_z(sign, self.steps.z_fraction)?;
        debug!(sign, "Shifted keyboard");
        self.apply(calibration);
        Ok(())
    }

    /// Go back to the placeholder transform
    pub fn reset(&mut self) {
        info!("Keyboard transform reset");
        self.apply(Calibration::placeholder());
    }

    /// Activate and persist a calibration, then re-clip the current cloud
    fn apply(&mut self, calibration: Calibration) {
        if let Err(e) = self.store.save(&calibration) {
            warn!("Failed to save keyboard transform: {}", e);
        }
        self.keyboard.set_calibration(calibration);
        self.local_cloud = self.keyboard.clip(&self.sensor_cloud);
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn calibration(&self) -> &Calibration {
        self.keyboard.calibration()
    }

    pub fn store(&self) -> &TransformStore {
        &self.store
    }

    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Snapshot of the latest pass for rendering
    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            frame: self.last_frame.as_deref(),
            sensor_cloud: &self.sensor_cloud,
            local_cloud: &self.local_cloud,
            keys: self.keyboard.keys(),
            calibration: self.keyboard.calibration(),
            source_name: self.source.name(),
            sink_name: self.sink.name(),
            counters: self.counters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::audio::LogSink;
    use std::collections::VecDeque;

    /// Source returning queued results, then stale reads
    struct Scripted {
        queue: VecDeque<SensorResult<Arc<DepthFrame>>>,
    }

    impl DepthSource for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn poll_frame(&mut self) -> SensorResult<Arc<DepthFrame>> {
            self.queue.pop_front().unwrap_or(Err(SensorError::Stale))
        }
    }

    fn session(queue: Vec<SensorResult<Arc<DepthFrame>>>, clock: &ManualClock) -> Session {
        let path = std::env::temp_dir()
            .join(format!("kb-session-{}", uuid::Uuid::new_v4()))
            .join("transform.json");
        let config = Config::default();
        Session::new(
            Box::new(Scripted {
                queue: queue.into(),
            }),
            Box::new(LogSink),
            Box::new(clock.clone()),
            Keyboard::from_config(&config, Calibration::placeholder()).unwrap(),
            DepthProjector::new(2),
            TransformStore::new(path),
            NudgeSteps::default(),
        )
    }

    fn cleanup(session: &Session) {
        if let Some(dir) = session.store().path().parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(40));
        assert_eq!(other.now(), Duration::from_millis(40));
        other.set(Duration::from_secs(2));
        assert_eq!(clock.now(), Duration::from_secs(2));
    }

    #[test]
    fn test_stale_tick_reuses_cloud() {
        let clock = ManualClock::new();
        let mut s = session(vec![Ok(Arc::new(DepthFrame::filled(700, 1)))], &clock);

        let first = s.tick().unwrap();
        assert!(first.fresh);
        assert!(first.sensor_points > 0);

        let second = s.tick().unwrap();
        assert!(!second.fresh);
        assert_eq!(second.sensor_points, first.sensor_points);
        assert_eq!(s.counters().stale_frames, 1);
        assert_eq!(s.counters().ticks, 2);
    }

    #[test]
    fn test_disconnect_is_reported() {
        let clock = ManualClock::new();
        let mut s = session(vec![Err(SensorError::Disconnected)], &clock);
        assert_eq!(s.tick(), Err(SensorError::Disconnected));
    }

    #[test]
    fn test_degenerate_calibration_keeps_transform() {
        let clock = ManualClock::new();
        let mut s = session(Vec::new(), &clock);
        let before = s.calibration().clone();

        let result = s.calibrate([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ]);

        assert!(matches!(result, Err(CalibrationError::Degenerate(_))));
        assert_eq!(s.calibration(), &before);
        assert!(!s.store().path().exists());
    }

    #[test]
    fn test_calibrate_and_nudges_persist() {
        let clock = ManualClock::new();
        let mut s = session(Vec::new(), &clock);

        s.calibrate([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(0.0, 5.0, 0.0),
        ])
        .unwrap();
        assert_eq!(s.store().load().unwrap().rows(), s.calibration().rows());

        s.nudge_z(1.0).unwrap();
        s.nudge_roll(-1.0).unwrap();
        let saved = s.store().load().unwrap();
        assert_eq!(saved.rows(), s.calibration().rows());
        assert!(s.calibration().inverse().try_inverse().is_some());

        s.reset();
        assert_eq!(s.calibration(), &Calibration::placeholder());
        cleanup(&s);
    }

    #[test]
    fn test_pick_uses_latest_frame() {
        let clock = ManualClock::new();
        let mut s = session(vec![Ok(Arc::new(DepthFrame::filled(650, 1)))], &clock);
        assert!(s.pick(320, 240).is_none());

        s.tick().unwrap();
        assert!(s.pick(320, 240).is_some());
    }

    #[test]
    fn test_view_reflects_session() {
        let clock = ManualClock::new();
        let s = session(Vec::new(), &clock);
        let view = s.view();
        assert!(view.frame.is_none());
        assert_eq!(view.keys.len(), 22);
        assert_eq!(view.source_name, "scripted");
        assert_eq!(view.sink_name, "log");
    }
}
