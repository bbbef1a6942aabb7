//! Seams between the HUD state machine and the capture hardware.
//!
//! The controller and enumerator only talk to these traits; the nokhwa backend
//! in `pipeline::camera` implements them for real devices and the tests use
//! in-memory fakes.

use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use thiserror::Error;

use crate::{
    config::ResolutionPolicy,
    types::{Frame, StreamSettings, VideoDevice},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConstraints {
    /// Exact device id; no fallback to other devices.
    pub device_id: String,
    pub resolution: ResolutionPolicy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Playback {
    Started,
    /// Playback needs an explicit user action first.
    Blocked,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EnumerateError {
    #[error("camera access was denied")]
    PermissionDenied,
    #[error("no video input devices found")]
    NoDevices,
    #[error("device enumeration failed: {0}")]
    Backend(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StreamOpenError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("camera busy: {0}")]
    DeviceBusy(String),
    #[error("constraints not satisfiable: {0}")]
    Overconstrained(String),
    #[error("{name}: {detail}")]
    Other { name: String, detail: String },
}

impl StreamOpenError {
    /// Builds the error from a platform failure name such as `NotAllowedError`.
    pub fn from_platform(name: &str, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match name {
            "NotAllowedError" | "SecurityError" | "PermissionDeniedError" => {
                StreamOpenError::PermissionDenied
            }
            "NotReadableError" | "TrackStartError" | "AbortError" => {
                StreamOpenError::DeviceBusy(detail)
            }
            "OverconstrainedError" | "ConstraintNotSatisfiedError" => {
                StreamOpenError::Overconstrained(detail)
            }
            other => StreamOpenError::Other {
                name: other.to_string(),
                detail,
            },
        }
    }

    pub fn platform_name(&self) -> &str {
        match self {
            StreamOpenError::PermissionDenied => "NotAllowedError",
            StreamOpenError::DeviceBusy(_) => "NotReadableError",
            StreamOpenError::Overconstrained(_) => "OverconstrainedError",
            StreamOpenError::Other { name, .. } => name,
        }
    }

    /// Text shown in the HUD error panel.
    pub fn user_message(&self) -> String {
        match self {
            StreamOpenError::PermissionDenied => {
                "Camera permission denied. Allow camera access and retry.".to_string()
            }
            StreamOpenError::DeviceBusy(_) => {
                "Camera is in use by another application (device busy).".to_string()
            }
            StreamOpenError::Overconstrained(_) => {
                "Resolution not supported by this camera. Retry with relaxed constraints."
                    .to_string()
            }
            StreamOpenError::Other { name, detail } => {
                format!("Unable to open camera ({name}): {detail}")
            }
        }
    }
}

/// A live capture session on one device.
pub trait ActiveStream: Send {
    fn device_id(&self) -> &str;

    fn settings(&self) -> StreamSettings;

    /// Starts delivering frames. `user_gesture` is true when the call comes
    /// straight from a click.
    fn play(&mut self, user_gesture: bool) -> Playback;

    /// Most recent frame since the last call, if any.
    fn latest_frame(&mut self) -> Option<Frame>;

    fn is_alive(&self) -> bool;

    /// Stops every underlying track and releases the device.
    fn stop(&mut self);
}

/// Owns an [`ActiveStream`] and stops it exactly once, either through
/// [`StreamHandle::release`] or on drop.
pub struct StreamHandle {
    inner: Box<dyn ActiveStream>,
    stopped: bool,
}

impl StreamHandle {
    pub fn new(inner: Box<dyn ActiveStream>) -> Self {
        Self {
            inner,
            stopped: false,
        }
    }

    pub fn device_id(&self) -> &str {
        self.inner.device_id()
    }

    pub fn settings(&self) -> StreamSettings {
        self.inner.settings()
    }

    pub fn play(&mut self, user_gesture: bool) -> Playback {
        self.inner.play(user_gesture)
    }

    pub fn latest_frame(&mut self) -> Option<Frame> {
        self.inner.latest_frame()
    }

    pub fn is_alive(&self) -> bool {
        !self.stopped && self.inner.is_alive()
    }

    pub fn release(mut self) {
        self.stop_once();
    }

    fn stop_once(&mut self) {
        if !self.stopped {
            self.stopped = true;
            log::info!("releasing camera stream for {}", self.inner.device_id());
            self.inner.stop();
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop_once();
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("device_id", &self.inner.device_id())
            .field("stopped", &self.stopped)
            .finish()
    }
}

/// Emitted whenever the set of attached video devices may have changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceChange;

/// Active device-change subscription.
pub trait DeviceWatch: Send {
    fn cancel(&mut self);
}

pub trait CapturePlatform: Send + Sync + 'static {
    /// Lists video inputs, prompting for access where the platform requires it.
    fn enumerate(&self) -> Result<Vec<VideoDevice>, EnumerateError>;

    fn open_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn ActiveStream>, StreamOpenError>;

    fn watch_devices(&self, notify: Sender<DeviceChange>) -> Box<dyn DeviceWatch>;
}

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs blocking work off the UI thread.
pub trait Spawner {
    fn spawn(&self, name: &str, job: Job) -> Result<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSpawner;

impl Spawner for ThreadSpawner {
    fn spawn(&self, name: &str, job: Job) -> Result<()> {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(job)
            .with_context(|| format!("failed to spawn {name} worker"))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory platform used by the state machine tests.

    use std::{
        cell::RefCell,
        collections::VecDeque,
        rc::Rc,
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
        time::Instant,
    };

    use super::*;

    /// Queues jobs until the test decides to run them.
    #[derive(Clone, Default)]
    pub struct ManualSpawner {
        jobs: Rc<RefCell<VecDeque<Job>>>,
    }

    impl ManualSpawner {
        pub fn pending(&self) -> usize {
            self.jobs.borrow().len()
        }

        pub fn run_next(&self) -> bool {
            let job = self.jobs.borrow_mut().pop_front();
            match job {
                Some(job) => {
                    job();
                    true
                }
                None => false,
            }
        }

        pub fn run_last(&self) -> bool {
            let job = self.jobs.borrow_mut().pop_back();
            match job {
                Some(job) => {
                    job();
                    true
                }
                None => false,
            }
        }

        pub fn run_all(&self) {
            while self.run_next() {}
        }
    }

    impl Spawner for ManualSpawner {
        fn spawn(&self, _name: &str, job: Job) -> Result<()> {
            self.jobs.borrow_mut().push_back(job);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct StreamTracker {
        pub stops: AtomicUsize,
        pub plays: AtomicUsize,
        pub dead: AtomicBool,
    }

    impl StreamTracker {
        pub fn stop_count(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    pub struct FakeStream {
        device_id: String,
        frame_size: (u32, u32),
        block_until_gesture: bool,
        playing: bool,
        tracker: Arc<StreamTracker>,
    }

    impl ActiveStream for FakeStream {
        fn device_id(&self) -> &str {
            &self.device_id
        }

        fn settings(&self) -> StreamSettings {
            StreamSettings {
                width: self.frame_size.0,
                height: self.frame_size.1,
                frame_rate: 30,
            }
        }

        fn play(&mut self, user_gesture: bool) -> Playback {
            self.tracker.plays.fetch_add(1, Ordering::SeqCst);
            if self.block_until_gesture && !user_gesture {
                return Playback::Blocked;
            }
            self.playing = true;
            Playback::Started
        }

        fn latest_frame(&mut self) -> Option<Frame> {
            if !self.playing {
                return None;
            }
            let (width, height) = self.frame_size;
            Some(Frame {
                rgba: vec![128; (width * height * 4) as usize],
                width,
                height,
                timestamp: Instant::now(),
            })
        }

        fn is_alive(&self) -> bool {
            !self.tracker.dead.load(Ordering::SeqCst)
        }

        fn stop(&mut self) {
            self.tracker.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeState {
        devices: Vec<VideoDevice>,
        enumerate_error: Option<EnumerateError>,
        open_failures: VecDeque<StreamOpenError>,
        requests: Vec<StreamConstraints>,
        opened: Vec<(String, Arc<StreamTracker>)>,
        frame_size: (u32, u32),
        block_until_gesture: bool,
        watchers: Vec<Sender<DeviceChange>>,
        enumerations: usize,
    }

    #[derive(Clone, Default)]
    pub struct FakePlatform {
        state: Arc<Mutex<FakeState>>,
        pub subscribes: Arc<AtomicUsize>,
        pub cancels: Arc<AtomicUsize>,
    }

    impl FakePlatform {
        pub fn with_devices(devices: Vec<VideoDevice>) -> Self {
            let platform = FakePlatform::default();
            {
                let mut state = platform.state.lock().unwrap();
                state.devices = devices;
                state.frame_size = (640, 480);
            }
            platform
        }

        pub fn set_devices(&self, devices: Vec<VideoDevice>) {
            let mut state = self.state.lock().unwrap();
            state.devices = devices;
            state.enumerate_error = None;
        }

        pub fn deny_enumeration(&self, err: EnumerateError) {
            self.state.lock().unwrap().enumerate_error = Some(err);
        }

        pub fn fail_next_open(&self, err: StreamOpenError) {
            self.state.lock().unwrap().open_failures.push_back(err);
        }

        pub fn set_frame_size(&self, width: u32, height: u32) {
            self.state.lock().unwrap().frame_size = (width, height);
        }

        pub fn block_autoplay(&self) {
            self.state.lock().unwrap().block_until_gesture = true;
        }

        pub fn requests(&self) -> Vec<StreamConstraints> {
            self.state.lock().unwrap().requests.clone()
        }

        pub fn enumerations(&self) -> usize {
            self.state.lock().unwrap().enumerations
        }

        /// Trackers of every stream opened so far, in open order.
        pub fn opened(&self) -> Vec<(String, Arc<StreamTracker>)> {
            self.state.lock().unwrap().opened.clone()
        }

        pub fn notify_device_change(&self) {
            for tx in &self.state.lock().unwrap().watchers {
                let _ = tx.send(DeviceChange);
            }
        }
    }

    impl CapturePlatform for FakePlatform {
        fn enumerate(&self) -> Result<Vec<VideoDevice>, EnumerateError> {
            let mut state = self.state.lock().unwrap();
            state.enumerations += 1;
            match &state.enumerate_error {
                Some(err) => Err(err.clone()),
                None => Ok(state.devices.clone()),
            }
        }

        fn open_stream(
            &self,
            constraints: &StreamConstraints,
        ) -> Result<Box<dyn ActiveStream>, StreamOpenError> {
            let mut state = self.state.lock().unwrap();
            state.requests.push(constraints.clone());
            if let Some(err) = state.open_failures.pop_front() {
                return Err(err);
            }
            let tracker = Arc::new(StreamTracker::default());
            state
                .opened
                .push((constraints.device_id.clone(), tracker.clone()));
            Ok(Box::new(FakeStream {
                device_id: constraints.device_id.clone(),
                frame_size: state.frame_size,
                block_until_gesture: state.block_until_gesture,
                playing: false,
                tracker,
            }))
        }

        fn watch_devices(&self, notify: Sender<DeviceChange>) -> Box<dyn DeviceWatch> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            self.state.lock().unwrap().watchers.push(notify);
            Box::new(FakeWatch {
                cancels: self.cancels.clone(),
            })
        }
    }

    struct FakeWatch {
        cancels: Arc<AtomicUsize>,
    }

    impl DeviceWatch for FakeWatch {
        fn cancel(&mut self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }
}
