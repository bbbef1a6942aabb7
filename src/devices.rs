use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::{
    platform::{CapturePlatform, DeviceChange, DeviceWatch, EnumerateError, Spawner},
    types::{Selection, VideoDevice},
};

/// Label fragments that usually mean an add-on camera rather than the built-in one.
const EXTERNAL_HINTS: &[&str] = &["usb", "external", "uvc"];
const FALLBACK_ID_CHARS: usize = 8;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub devices: Vec<VideoDevice>,
    pub permission_granted: bool,
}

pub struct DeviceEnumerator<P: CapturePlatform> {
    platform: Arc<P>,
    watch: Option<Box<dyn DeviceWatch>>,
    change_rx: Option<Receiver<DeviceChange>>,
    scan_tx: Sender<(u64, ScanOutcome)>,
    scan_rx: Receiver<(u64, ScanOutcome)>,
    scan_generation: u64,
}

impl<P: CapturePlatform> DeviceEnumerator<P> {
    pub fn new(platform: Arc<P>) -> Self {
        let (scan_tx, scan_rx) = unbounded();
        Self {
            platform,
            watch: None,
            change_rx: None,
            scan_tx,
            scan_rx,
            scan_generation: 0,
        }
    }

    /// Subscribes to device-change notifications. Repeated calls keep the
    /// first subscription.
    pub fn mount(&mut self) {
        if self.watch.is_some() {
            return;
        }
        let (tx, rx) = unbounded();
        self.watch = Some(self.platform.watch_devices(tx));
        self.change_rx = Some(rx);
    }

    pub fn unmount(&mut self) {
        if let Some(mut watch) = self.watch.take() {
            watch.cancel();
        }
        self.change_rx = None;
    }

    /// Drains pending notifications; true if at least one arrived.
    pub fn take_device_change(&mut self) -> bool {
        let Some(rx) = self.change_rx.as_ref() else {
            return false;
        };
        let mut changed = false;
        while rx.try_recv().is_ok() {
            changed = true;
        }
        changed
    }

    /// Blocking scan on the calling thread.
    pub fn scan(&self) -> ScanOutcome {
        scan_devices(self.platform.as_ref())
    }

    /// Runs a scan on `spawner`; pick the result up with [`Self::take_scan`].
    /// A newer request supersedes any scan still in flight.
    pub fn request_scan<S: Spawner>(&mut self, spawner: &S) {
        self.scan_generation += 1;
        let generation = self.scan_generation;
        let platform = self.platform.clone();
        let tx = self.scan_tx.clone();

        let job = Box::new(move || {
            let _ = tx.send((generation, scan_devices(platform.as_ref())));
        });
        if let Err(err) = spawner.spawn("device-scan", job) {
            log::error!("{err:#}; scanning inline");
            let _ = self.scan_tx.send((generation, self.scan()));
        }
    }

    /// Latest finished scan, if it belongs to the most recent request.
    pub fn take_scan(&mut self) -> Option<ScanOutcome> {
        let mut latest = None;
        while let Ok((generation, outcome)) = self.scan_rx.try_recv() {
            if generation == self.scan_generation {
                latest = Some(outcome);
            } else {
                log::debug!("dropping superseded device scan #{generation}");
            }
        }
        latest
    }
}

fn scan_devices<P: CapturePlatform>(platform: &P) -> ScanOutcome {
    match platform.enumerate() {
        Ok(devices) if devices.is_empty() => {
            log::warn!("no video input devices found");
            ScanOutcome::default()
        }
        Ok(devices) => {
            let devices: Vec<VideoDevice> = devices.into_iter().map(with_label).collect();
            log::info!("found {} video input device(s)", devices.len());
            ScanOutcome {
                devices,
                permission_granted: true,
            }
        }
        Err(EnumerateError::PermissionDenied) => {
            log::warn!("camera permission denied during scan");
            ScanOutcome::default()
        }
        Err(err) => {
            log::error!("failed to enumerate cameras: {err}");
            ScanOutcome::default()
        }
    }
}

impl<P: CapturePlatform> Drop for DeviceEnumerator<P> {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn with_label(device: VideoDevice) -> VideoDevice {
    if !device.label.trim().is_empty() {
        return device;
    }
    let short: String = device.device_id.chars().take(FALLBACK_ID_CHARS).collect();
    VideoDevice {
        label: format!("Camera {short}"),
        device_id: device.device_id,
    }
}

/// Best-effort default pick: the first device whose label hints at an external
/// USB/UVC source, otherwise the first listed device.
pub fn preferred_device(devices: &[VideoDevice]) -> Option<&VideoDevice> {
    devices
        .iter()
        .find(|device| {
            let label = device.label.to_lowercase();
            EXTERNAL_HINTS.iter().any(|hint| label.contains(hint))
        })
        .or_else(|| devices.first())
}

/// Fills an empty selection from `devices`. Returns the picked id, if any.
pub fn auto_select(selection: &mut Selection, devices: &[VideoDevice]) -> Option<String> {
    if !selection.is_empty() {
        return None;
    }
    let device = preferred_device(devices)?;
    log::info!("auto-selected camera {} ({})", device.label, device.device_id);
    selection.set(device.device_id.clone());
    Some(device.device_id.clone())
}
