//! Lifecycle of the single active camera stream plus the capture-and-analyze
//! action.
//!
//! All state lives on the UI thread. Opening a device and calling the analysis
//! service run as jobs on a [`Spawner`]; their results come back over channels
//! tagged with the generation (or request id) that started them, and anything
//! that has since been superseded is dropped in [`StreamController::poll`].

use std::{
    mem,
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::{
    analysis::AnalysisClient,
    config::{AppConfig, ResolutionPolicy},
    pipeline::snapshot,
    platform::{
        CapturePlatform, Playback, Spawner, StreamConstraints, StreamHandle, StreamOpenError,
        ThreadSpawner,
    },
    types::{AnalysisResult, ConnectionStatus, Frame, StreamSettings},
};

pub const NO_VIDEO_DATA: &str = "Error: No video data (0x0 resolution)";
pub const ANALYSIS_FAILED: &str = "Analysis failed. Check API configuration.";
const STREAM_LOST: &str = "Camera stream lost. Reconnect the device and retry.";

#[derive(Clone, Copy, Debug)]
pub struct StreamOptions {
    pub resolution: ResolutionPolicy,
    pub jpeg_quality: f32,
    pub analysis_timeout: Duration,
}

impl From<&AppConfig> for StreamOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            resolution: config.resolution,
            jpeg_quality: config.jpeg_quality,
            analysis_timeout: config.analysis.timeout,
        }
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions::from(&AppConfig::default())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamFailure {
    Open(StreamOpenError),
    Lost,
    Worker(String),
}

impl StreamFailure {
    pub fn user_message(&self) -> String {
        match self {
            StreamFailure::Open(err) => err.user_message(),
            StreamFailure::Lost => STREAM_LOST.to_string(),
            StreamFailure::Worker(detail) => format!("Unable to open camera: {detail}"),
        }
    }
}

enum StreamState {
    Disconnected,
    Acquiring,
    /// Stream is open but playback waits for a click.
    AwaitingGesture(StreamHandle),
    Live(StreamHandle),
    Failed(StreamFailure),
}

struct Acquisition {
    generation: u64,
    device_id: String,
    result: Result<StreamHandle, StreamOpenError>,
}

struct AnalysisOutcome {
    request_id: u64,
    result: Result<String, String>,
}

struct InFlight {
    request_id: u64,
    started: Instant,
}

pub struct StreamController<P: CapturePlatform, S: Spawner = ThreadSpawner> {
    platform: Arc<P>,
    analyzer: Arc<dyn AnalysisClient>,
    spawner: S,
    options: StreamOptions,
    device_id: Option<String>,
    generation: u64,
    relax_resolution: bool,
    state: StreamState,
    acquire_tx: Sender<Acquisition>,
    acquire_rx: Receiver<Acquisition>,
    latest_frame: Option<Frame>,
    frame_serial: u64,
    analysis_tx: Sender<AnalysisOutcome>,
    analysis_rx: Receiver<AnalysisOutcome>,
    in_flight: Option<InFlight>,
    next_request_id: u64,
    analysis: Option<AnalysisResult>,
}

impl<P: CapturePlatform, S: Spawner> StreamController<P, S> {
    pub fn new(
        platform: Arc<P>,
        analyzer: Arc<dyn AnalysisClient>,
        spawner: S,
        options: StreamOptions,
    ) -> Self {
        let (acquire_tx, acquire_rx) = unbounded();
        let (analysis_tx, analysis_rx) = unbounded();
        Self {
            platform,
            analyzer,
            spawner,
            options,
            device_id: None,
            generation: 0,
            relax_resolution: false,
            state: StreamState::Disconnected,
            acquire_tx,
            acquire_rx,
            latest_frame: None,
            frame_serial: 0,
            analysis_tx,
            analysis_rx,
            in_flight: None,
            next_request_id: 0,
            analysis: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.state {
            StreamState::Disconnected => ConnectionStatus::Disconnected,
            StreamState::Acquiring | StreamState::AwaitingGesture(_) => ConnectionStatus::Scanning,
            StreamState::Live(_) => ConnectionStatus::Connected,
            StreamState::Failed(_) => ConnectionStatus::Error,
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// True while an open stream waits for the user to start playback.
    pub fn needs_user_gesture(&self) -> bool {
        matches!(self.state, StreamState::AwaitingGesture(_))
    }

    pub fn failure(&self) -> Option<&StreamFailure> {
        match &self.state {
            StreamState::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.failure().map(StreamFailure::user_message)
    }

    pub fn settings(&self) -> Option<StreamSettings> {
        match &self.state {
            StreamState::Live(handle) | StreamState::AwaitingGesture(handle) => {
                Some(handle.settings())
            }
            _ => None,
        }
    }

    pub fn latest_frame(&self) -> Option<&Frame> {
        self.latest_frame.as_ref()
    }

    /// Bumped whenever `latest_frame` is replaced.
    pub fn frame_serial(&self) -> u64 {
        self.frame_serial
    }

    /// Size of the frame currently on the video surface, `(0, 0)` before any.
    pub fn video_dimensions(&self) -> (u32, u32) {
        self.latest_frame
            .as_ref()
            .map(|frame| (frame.width, frame.height))
            .unwrap_or((0, 0))
    }

    pub fn is_analyzing(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn can_capture(&self) -> bool {
        self.status() == ConnectionStatus::Connected && !self.is_analyzing()
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    /// Switches to `device_id`, releasing the current stream first. Passing the
    /// id that is already active is a no-op.
    pub fn select_device(&mut self, device_id: Option<&str>) {
        if self.device_id.as_deref() == device_id {
            return;
        }

        self.release_stream();
        self.generation += 1;
        self.relax_resolution = false;
        self.device_id = device_id.map(str::to_string);

        match &self.device_id {
            Some(id) => {
                log::info!("camera selection changed to {id}");
                self.begin_acquisition();
            }
            None => {
                log::info!("camera selection cleared");
                self.state = StreamState::Disconnected;
            }
        }
    }

    /// Re-runs acquisition for the current device without touching anything
    /// else. After a resolution failure the retry drops the explicit size.
    pub fn retry(&mut self) {
        if self.device_id.is_none() {
            return;
        }
        if matches!(
            self.state,
            StreamState::Acquiring | StreamState::Live(_) | StreamState::AwaitingGesture(_)
        ) {
            return;
        }

        if let StreamState::Failed(StreamFailure::Open(StreamOpenError::Overconstrained(_))) =
            self.state
        {
            self.relax_resolution = true;
        }

        self.release_stream();
        self.generation += 1;
        self.begin_acquisition();
    }

    /// Retries playback from an explicit user action.
    pub fn resume_playback(&mut self) {
        let state = mem::replace(&mut self.state, StreamState::Disconnected);
        self.state = match state {
            StreamState::AwaitingGesture(mut handle) => match handle.play(true) {
                Playback::Started => {
                    log::info!("playback started for {}", handle.device_id());
                    StreamState::Live(handle)
                }
                Playback::Blocked => {
                    log::warn!("playback still blocked for {}", handle.device_id());
                    StreamState::AwaitingGesture(handle)
                }
            },
            other => other,
        };
    }

    /// Applies finished background work. Returns true when anything visible
    /// changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;

        while let Ok(acquisition) = self.acquire_rx.try_recv() {
            changed |= self.apply_acquisition(acquisition);
        }

        changed |= self.pump_frames();

        while let Ok(outcome) = self.analysis_rx.try_recv() {
            changed |= self.apply_analysis(outcome);
        }

        if let Some(in_flight) = &self.in_flight {
            if in_flight.started.elapsed() >= self.options.analysis_timeout {
                log::warn!(
                    "analysis request {} timed out after {:?}",
                    in_flight.request_id,
                    self.options.analysis_timeout
                );
                self.in_flight = None;
                self.analysis = Some(analysis_result(ANALYSIS_FAILED));
                changed = true;
            }
        }

        changed
    }

    /// Snapshots the current frame and sends it for analysis. No-op unless
    /// connected and idle. Returns true if anything was started or recorded.
    pub fn capture_and_analyze(&mut self) -> bool {
        if !self.can_capture() {
            return false;
        }

        let frame = match &self.latest_frame {
            Some(frame) if frame.width > 0 && frame.height > 0 => frame.clone(),
            _ => {
                log::warn!("capture requested with no video data");
                self.analysis = Some(analysis_result(NO_VIDEO_DATA));
                return true;
            }
        };

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        let analyzer = self.analyzer.clone();
        let quality = self.options.jpeg_quality;
        let tx = self.analysis_tx.clone();

        let job = Box::new(move || {
            let result = snapshot::encode_jpeg(&frame, quality)
                .map_err(|err| format!("{err:#}"))
                .and_then(|jpeg| analyzer.analyze(&jpeg).map_err(|err| err.to_string()));
            let _ = tx.send(AnalysisOutcome { request_id, result });
        });

        match self.spawner.spawn("frame-analysis", job) {
            Ok(()) => {
                self.in_flight = Some(InFlight {
                    request_id,
                    started: Instant::now(),
                });
            }
            Err(err) => {
                log::error!("failed to start analysis: {err:#}");
                self.analysis = Some(analysis_result(ANALYSIS_FAILED));
            }
        }
        true
    }

    fn constraints(&self, device_id: &str) -> StreamConstraints {
        let resolution = if self.relax_resolution {
            self.options.resolution.relaxed()
        } else {
            self.options.resolution
        };
        StreamConstraints {
            device_id: device_id.to_string(),
            resolution,
        }
    }

    fn begin_acquisition(&mut self) {
        let Some(device_id) = self.device_id.clone() else {
            self.state = StreamState::Disconnected;
            return;
        };

        self.state = StreamState::Acquiring;
        let generation = self.generation;
        let constraints = self.constraints(&device_id);
        let platform = self.platform.clone();
        let tx = self.acquire_tx.clone();
        log::info!(
            "opening camera {device_id} ({}), attempt {generation}",
            constraints.resolution
        );

        let job = Box::new(move || {
            let result = platform.open_stream(&constraints).map(StreamHandle::new);
            // A send error means the controller is gone; dropping the
            // acquisition releases the stream.
            let _ = tx.send(Acquisition {
                generation,
                device_id,
                result,
            });
        });

        if let Err(err) = self.spawner.spawn("camera-open", job) {
            log::error!("{err:#}");
            self.state = StreamState::Failed(StreamFailure::Worker(format!("{err:#}")));
        }
    }

    fn apply_acquisition(&mut self, acquisition: Acquisition) -> bool {
        let current = acquisition.generation == self.generation
            && self.device_id.as_deref() == Some(acquisition.device_id.as_str())
            && matches!(self.state, StreamState::Acquiring);
        if !current {
            log::warn!(
                "discarding stale camera result for {} (attempt {}, current {})",
                acquisition.device_id,
                acquisition.generation,
                self.generation
            );
            if let Ok(handle) = acquisition.result {
                handle.release();
            }
            return false;
        }

        self.state = match acquisition.result {
            Ok(mut handle) => {
                let settings = handle.settings();
                log::info!(
                    "camera {} opened at {}x{}@{}",
                    acquisition.device_id,
                    settings.width,
                    settings.height,
                    settings.frame_rate
                );
                match handle.play(false) {
                    Playback::Started => StreamState::Live(handle),
                    Playback::Blocked => {
                        log::info!("playback for {} waits for a click", acquisition.device_id);
                        StreamState::AwaitingGesture(handle)
                    }
                }
            }
            Err(err) => {
                log::warn!(
                    "failed to open camera {} ({}): {err}",
                    acquisition.device_id,
                    err.platform_name()
                );
                StreamState::Failed(StreamFailure::Open(err))
            }
        };
        true
    }

    fn pump_frames(&mut self) -> bool {
        let StreamState::Live(handle) = &mut self.state else {
            return false;
        };

        if !handle.is_alive() {
            log::warn!("camera stream for {} was lost", handle.device_id());
            self.release_stream();
            self.state = StreamState::Failed(StreamFailure::Lost);
            return true;
        }

        match handle.latest_frame() {
            Some(frame) => {
                self.latest_frame = Some(frame);
                self.frame_serial += 1;
                true
            }
            None => false,
        }
    }

    fn apply_analysis(&mut self, outcome: AnalysisOutcome) -> bool {
        let expected = self.in_flight.as_ref().map(|f| f.request_id);
        if expected != Some(outcome.request_id) {
            log::warn!("ignoring late analysis result {}", outcome.request_id);
            return false;
        }

        self.in_flight = None;
        self.analysis = Some(match outcome.result {
            Ok(text) => {
                log::info!("analysis {} finished", outcome.request_id);
                analysis_result(&text)
            }
            Err(err) => {
                log::warn!("analysis {} failed: {err}", outcome.request_id);
                analysis_result(ANALYSIS_FAILED)
            }
        });
        true
    }

    fn release_stream(&mut self) {
        let state = mem::replace(&mut self.state, StreamState::Disconnected);
        match state {
            StreamState::Live(handle) | StreamState::AwaitingGesture(handle) => handle.release(),
            other => self.state = other,
        }
        self.latest_frame = None;
    }
}

impl<P: CapturePlatform, S: Spawner> Drop for StreamController<P, S> {
    fn drop(&mut self) {
        self.release_stream();
    }
}

fn analysis_result(text: &str) -> AnalysisResult {
    AnalysisResult {
        text: text.to_string(),
        timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
    }
}
