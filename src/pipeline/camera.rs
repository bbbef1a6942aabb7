use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use nokhwa::{
    Camera, NokhwaError,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution,
    },
};

use super::rgba_converter;
use crate::{
    config::{AppConfig, ResolutionPolicy},
    platform::{
        ActiveStream, CapturePlatform, DeviceChange, DeviceWatch, EnumerateError, Playback,
        StreamConstraints, StreamOpenError,
    },
    types::{Frame, StreamSettings, VideoDevice},
};

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

// UVC glasses usually stream MJPEG at their larger sizes.
const IDEAL_PIXEL_FORMAT: FrameFormat = FrameFormat::MJPEG;
const REQUESTED_FRAME_RATE: u32 = 30;

// Consecutive read failures before the stream counts as lost.
const MAX_READ_FAILURES: u32 = 30;
const WATCH_TICK: Duration = Duration::from_millis(100);
// Poll rate of an opened stream that is not playing yet.
const IDLE_TICK: Duration = Duration::from_millis(20);
const STOP_TIMEOUT: Duration = Duration::from_millis(500);

fn native_formats() -> [RequestedFormat<'static>; 4] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        // Fall back to any format Nokhwa can decode, but prefer higher FPS to
        // avoid very low default rates (e.g. 15 FPS) that some drivers reject.
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

fn requested_formats(policy: ResolutionPolicy) -> Vec<RequestedFormat<'static>> {
    match policy {
        ResolutionPolicy::Native => native_formats().into(),
        ResolutionPolicy::Fixed { width, height } => PREFERRED_PIXEL_FORMATS
            .iter()
            .map(|format| {
                RequestedFormat::with_formats(
                    RequestedFormatType::Exact(CameraFormat::new(
                        Resolution::new(width, height),
                        *format,
                        REQUESTED_FRAME_RATE,
                    )),
                    PREFERRED_PIXEL_FORMATS,
                )
            })
            .collect(),
        ResolutionPolicy::Ideal { width, height } => {
            let mut formats = vec![RequestedFormat::with_formats(
                RequestedFormatType::Closest(CameraFormat::new(
                    Resolution::new(width, height),
                    IDEAL_PIXEL_FORMAT,
                    REQUESTED_FRAME_RATE,
                )),
                PREFERRED_PIXEL_FORMATS,
            )];
            formats.extend(native_formats());
            formats
        }
    }
}

fn camera_index(device_id: &str) -> CameraIndex {
    device_id
        .parse::<u32>()
        .map(CameraIndex::Index)
        .unwrap_or_else(|_| CameraIndex::String(device_id.to_string()))
}

/// Sorts a backend error into the categories the HUD knows how to explain.
/// Nokhwa only gives us strings, so this goes by the OS error text.
fn classify_open_error(err: &NokhwaError, policy: ResolutionPolicy) -> StreamOpenError {
    let detail = err.to_string();
    let lower = detail.to_lowercase();

    if ["permission", "denied", "not authorized", "notauthorized"]
        .iter()
        .any(|hint| lower.contains(hint))
    {
        StreamOpenError::PermissionDenied
    } else if ["busy", "in use", "ebusy", "resource"]
        .iter()
        .any(|hint| lower.contains(hint))
    {
        StreamOpenError::DeviceBusy(detail)
    } else if policy != ResolutionPolicy::Native
        && ["format", "resolution", "property"]
            .iter()
            .any(|hint| lower.contains(hint))
    {
        StreamOpenError::Overconstrained(detail)
    } else {
        StreamOpenError::from_platform("NokhwaError", detail)
    }
}

fn build_camera(index: &CameraIndex, policy: ResolutionPolicy) -> Result<Camera, StreamOpenError> {
    let mut last_err = None;

    for requested in requested_formats(policy) {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err),
            },
            Err(err) => last_err = Some(err),
        }
    }

    Err(match last_err {
        Some(err) => classify_open_error(&err, policy),
        None => StreamOpenError::from_platform(
            "NokhwaError",
            "failed to open camera with any supported format",
        ),
    })
}

/// Captures from real devices through Nokhwa.
#[derive(Clone, Debug)]
pub struct NokhwaPlatform {
    autoplay: bool,
    poll_interval: Duration,
}

impl NokhwaPlatform {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            autoplay: config.autoplay,
            poll_interval: config.device_poll_interval,
        }
    }
}

fn list_devices() -> Result<Vec<VideoDevice>, NokhwaError> {
    Ok(query(ApiBackend::Auto)?
        .into_iter()
        .map(|info| VideoDevice {
            device_id: info.index().as_string(),
            label: info.human_name(),
        })
        .collect())
}

impl CapturePlatform for NokhwaPlatform {
    fn enumerate(&self) -> Result<Vec<VideoDevice>, EnumerateError> {
        match list_devices() {
            Ok(devices) if devices.is_empty() => Err(EnumerateError::NoDevices),
            Ok(devices) => Ok(devices),
            Err(err) => {
                let detail = err.to_string();
                let lower = detail.to_lowercase();
                if lower.contains("permission") || lower.contains("denied") {
                    Err(EnumerateError::PermissionDenied)
                } else {
                    Err(EnumerateError::Backend(detail))
                }
            }
        }
    }

    fn open_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn ActiveStream>, StreamOpenError> {
        let index = camera_index(&constraints.device_id);
        let policy = constraints.resolution;
        let stream = CameraStream::start(constraints.device_id.clone(), self.autoplay, move || {
            build_camera(&index, policy)
        })?;
        Ok(Box::new(stream))
    }

    fn watch_devices(&self, notify: Sender<DeviceChange>) -> Box<dyn DeviceWatch> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let interval = self.poll_interval;

        let handle = thread::Builder::new()
            .name("device-watch".into())
            .spawn(move || watch_loop(interval, &stop_flag, &notify));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::error!("failed to start device watcher: {err}");
                None
            }
        };

        Box::new(PollingWatch { stop, handle })
    }
}

fn device_ids() -> Option<Vec<String>> {
    list_devices()
        .map(|devices| devices.into_iter().map(|d| d.device_id).collect())
        .ok()
}

fn watch_loop(interval: Duration, stop: &AtomicBool, notify: &Sender<DeviceChange>) {
    let mut known = device_ids();
    let mut last_poll = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        thread::sleep(WATCH_TICK);
        if last_poll.elapsed() < interval {
            continue;
        }
        last_poll = Instant::now();

        let current = device_ids();
        if current != known {
            log::debug!("device list changed: {known:?} -> {current:?}");
            known = current;
            if notify.send(DeviceChange).is_err() {
                break;
            }
        }
    }
}

struct PollingWatch {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl DeviceWatch for PollingWatch {
    fn cancel(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PollingWatch {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// What the capture thread reads from. Opened on that thread, so it does not
/// need to be `Send`.
trait FrameSource {
    fn settings(&self) -> StreamSettings;

    fn next_frame(&mut self) -> Result<Frame>;

    fn close(&mut self);
}

impl FrameSource for Camera {
    fn settings(&self) -> StreamSettings {
        let format = self.camera_format();
        let resolution = format.resolution();
        StreamSettings {
            width: resolution.width_x,
            height: resolution.height_y,
            frame_rate: format.frame_rate(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let buffer = self
            .frame()
            .map_err(|err| anyhow!("camera frame read failed: {err}"))?;
        rgba_converter::convert_camera_frame(&buffer)
    }

    fn close(&mut self) {
        if let Err(err) = self.stop_stream() {
            log::warn!("failed to stop camera stream: {err:?}");
        }
    }
}

pub struct CameraStream {
    device_id: String,
    settings: StreamSettings,
    autoplay: bool,
    frames: Receiver<Frame>,
    playing: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    done: Receiver<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    /// Spawns the capture thread and waits until it has opened the device.
    /// Open failures come back as the thread reported them; the device stays
    /// held (but unread) until playback starts.
    fn start<S, F>(device_id: String, autoplay: bool, open: F) -> Result<Self, StreamOpenError>
    where
        S: FrameSource,
        F: FnOnce() -> Result<S, StreamOpenError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = bounded(1);
        let (frame_tx, frame_rx) = bounded(1);
        let (done_tx, done_rx) = bounded::<()>(0);
        let playing = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));

        let thread_playing = playing.clone();
        let thread_stop = stop.clone();
        let thread_alive = alive.clone();
        let handle = thread::Builder::new()
            .name(format!("camera-{device_id}"))
            .spawn(move || {
                // Dropped on exit, which is what `stop` waits for.
                let _done = done_tx;
                match open() {
                    Ok(mut source) => {
                        let _ = ready_tx.send(Ok(source.settings()));
                        capture_loop(&mut source, &thread_playing, &thread_stop, &frame_tx);
                        source.close();
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
                thread_alive.store(false, Ordering::SeqCst);
            })
            .map_err(|err| StreamOpenError::from_platform("ThreadError", err.to_string()))?;

        let settings = match ready_rx.recv() {
            Ok(Ok(settings)) => settings,
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(StreamOpenError::from_platform(
                    "NokhwaError",
                    "capture thread exited before opening the camera",
                ));
            }
        };

        Ok(Self {
            device_id,
            settings,
            autoplay,
            frames: frame_rx,
            playing,
            stop,
            alive,
            done: done_rx,
            handle: Some(handle),
        })
    }
}

fn capture_loop<S: FrameSource>(
    source: &mut S,
    playing: &AtomicBool,
    stop: &AtomicBool,
    frame_tx: &Sender<Frame>,
) {
    let mut failures = 0;
    while !stop.load(Ordering::Relaxed) {
        if !playing.load(Ordering::Relaxed) {
            thread::sleep(IDLE_TICK);
            continue;
        }

        let frame_start = Instant::now();
        match source.next_frame() {
            Ok(frame) => {
                failures = 0;
                // The UI only wants the newest frame; drop when it has not caught up.
                let _ = frame_tx.try_send(frame);
            }
            Err(err) => {
                failures += 1;
                log::warn!(
                    "camera frame failed (after {:?}): {err:#}",
                    frame_start.elapsed()
                );
                if failures >= MAX_READ_FAILURES {
                    log::error!("giving up after {failures} failed reads");
                    break;
                }
            }
        }
    }
}

impl ActiveStream for CameraStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn settings(&self) -> StreamSettings {
        self.settings
    }

    fn play(&mut self, user_gesture: bool) -> Playback {
        if self.playing.load(Ordering::SeqCst) {
            return Playback::Started;
        }
        if !self.autoplay && !user_gesture {
            return Playback::Blocked;
        }
        self.playing.store(true, Ordering::SeqCst);
        Playback::Started
    }

    fn latest_frame(&mut self) -> Option<Frame> {
        let mut latest = None;
        while let Ok(frame) = self.frames.try_recv() {
            latest = Some(frame);
        }
        latest
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return;
        };
        // A wedged driver read must not freeze the UI thread.
        match self.done.recv_timeout(STOP_TIMEOUT) {
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "capture thread for {} did not stop within {:?}; detaching",
                    self.device_id,
                    STOP_TIMEOUT
                );
            }
            _ => {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    /// Scripted source: yields frames until `fail_after` reads, then errors.
    struct ScriptedSource {
        reads: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        fail_after: usize,
    }

    impl FrameSource for ScriptedSource {
        fn settings(&self) -> StreamSettings {
            StreamSettings {
                width: 4,
                height: 2,
                frame_rate: 30,
            }
        }

        fn next_frame(&mut self) -> Result<Frame> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
            if n >= self.fail_after {
                return Err(anyhow!("read {n} failed"));
            }
            Ok(Frame {
                rgba: vec![0; 4 * 2 * 4],
                width: 4,
                height: 2,
                timestamp: Instant::now(),
            })
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn scripted(
        autoplay: bool,
        fail_after: usize,
    ) -> (CameraStream, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            reads: reads.clone(),
            closes: closes.clone(),
            fail_after,
        };
        let stream = CameraStream::start("0".into(), autoplay, move || Ok(source)).unwrap();
        (stream, reads, closes)
    }

    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn open_failure_on_the_capture_thread_is_returned() {
        let result = CameraStream::start("0".into(), true, || {
            Err::<ScriptedSource, _>(StreamOpenError::DeviceBusy("in use".into()))
        });
        assert!(matches!(result, Err(StreamOpenError::DeviceBusy(_))));
    }

    #[test]
    fn opened_stream_reports_settings_and_streams_after_play() {
        let (mut stream, _, closes) = scripted(true, usize::MAX);
        assert_eq!(stream.settings().width, 4);
        assert_eq!(stream.play(false), Playback::Started);
        assert!(wait_for(|| stream.latest_frame().is_some()));

        stream.stop();
        assert!(!stream.is_alive());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn blocked_autoplay_holds_the_device_without_reading() {
        let (mut stream, reads, _) = scripted(false, usize::MAX);
        assert_eq!(stream.play(false), Playback::Blocked);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(reads.load(Ordering::SeqCst), 0);
        assert!(stream.is_alive());

        assert_eq!(stream.play(true), Playback::Started);
        assert!(wait_for(|| stream.latest_frame().is_some()));
    }

    #[test]
    fn repeated_read_failures_end_the_stream() {
        let (mut stream, _, closes) = scripted(true, 0);
        stream.play(false);
        assert!(wait_for(|| !stream.is_alive()));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn numeric_ids_map_to_indices() {
        assert_eq!(camera_index("2"), CameraIndex::Index(2));
        assert_eq!(
            camera_index("/dev/video-glasses"),
            CameraIndex::String("/dev/video-glasses".into())
        );
    }

    #[test]
    fn fixed_policy_tries_every_pixel_format() {
        let policy = ResolutionPolicy::Fixed {
            width: 640,
            height: 480,
        };
        assert_eq!(requested_formats(policy).len(), PREFERRED_PIXEL_FORMATS.len());
        assert_eq!(requested_formats(ResolutionPolicy::Native).len(), 4);
        assert_eq!(
            requested_formats(ResolutionPolicy::Ideal {
                width: 1920,
                height: 1080
            })
            .len(),
            5
        );
    }

    #[test]
    fn classifies_backend_errors() {
        let fixed = ResolutionPolicy::Fixed {
            width: 640,
            height: 480,
        };
        let busy = NokhwaError::OpenDeviceError("0".into(), "Device or resource busy".into());
        assert!(matches!(
            classify_open_error(&busy, fixed),
            StreamOpenError::DeviceBusy(_)
        ));

        let denied = NokhwaError::OpenStreamError("Permission denied".into());
        assert_eq!(
            classify_open_error(&denied, fixed),
            StreamOpenError::PermissionDenied
        );

        let format = NokhwaError::GeneralError("requested format not available".into());
        assert!(matches!(
            classify_open_error(&format, fixed),
            StreamOpenError::Overconstrained(_)
        ));
        assert!(matches!(
            classify_open_error(&format, ResolutionPolicy::Native),
            StreamOpenError::Other { .. }
        ));
    }
}
