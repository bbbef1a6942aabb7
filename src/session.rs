use std::{sync::Arc, time::Instant};

use crate::{
    analysis::AnalysisClient,
    controller::{StreamController, StreamOptions},
    devices::{self, DeviceEnumerator, ScanOutcome},
    fullscreen::{Fullscreen, FullscreenRequest},
    platform::{CapturePlatform, Spawner, ThreadSpawner},
    types::{Selection, VideoDevice},
};

/// Shared HUD state: the device list, the selection both components read, and
/// the two components themselves. The view owns one of these.
pub struct HudSession<P: CapturePlatform, S: Spawner = ThreadSpawner> {
    enumerator: DeviceEnumerator<P>,
    controller: StreamController<P, S>,
    selection: Selection,
    devices: Vec<VideoDevice>,
    permission_granted: bool,
    fullscreen: Fullscreen,
    spawner: S,
}

impl<P: CapturePlatform, S: Spawner + Clone> HudSession<P, S> {
    pub fn new(
        platform: Arc<P>,
        analyzer: Arc<dyn AnalysisClient>,
        spawner: S,
        options: StreamOptions,
    ) -> Self {
        Self {
            enumerator: DeviceEnumerator::new(platform.clone()),
            controller: StreamController::new(platform, analyzer, spawner.clone(), options),
            selection: Selection::default(),
            devices: Vec::new(),
            permission_granted: false,
            fullscreen: Fullscreen::default(),
            spawner,
        }
    }

    /// Subscribes to device changes and runs the first scan before the
    /// window shows anything.
    pub fn mount(&mut self) {
        self.enumerator.mount();
        let outcome = self.enumerator.scan();
        self.apply_scan(outcome);
    }

    /// Starts a background scan; [`Self::tick`] applies it when it finishes.
    pub fn rescan(&mut self) {
        self.enumerator.request_scan(&self.spawner);
    }

    fn apply_scan(&mut self, outcome: ScanOutcome) {
        self.devices = outcome.devices;
        self.permission_granted = outcome.permission_granted;

        if let Some(current) = self.selection.current() {
            if !self.devices.iter().any(|d| d.device_id == current) {
                log::warn!("selected camera {current} disappeared");
                self.selection.clear();
            }
        }
        devices::auto_select(&mut self.selection, &self.devices);
        self.sync_controller();
    }

    /// Explicit user choice. Unknown ids are ignored.
    pub fn choose_device(&mut self, device_id: &str) {
        if !self.devices.iter().any(|d| d.device_id == device_id) {
            log::warn!("ignoring selection of unknown camera {device_id}");
            return;
        }
        self.selection.set(device_id);
        self.sync_controller();
    }

    /// Drives notifications and background completions. Call once per frame.
    pub fn tick(&mut self) -> bool {
        let mut changed = false;
        if self.enumerator.take_device_change() {
            log::info!("video devices changed, rescanning");
            self.rescan();
            changed = true;
        }
        if let Some(outcome) = self.enumerator.take_scan() {
            self.apply_scan(outcome);
            changed = true;
        }
        changed |= self.fullscreen.expire_pending(Instant::now());
        changed | self.controller.poll()
    }

    pub fn retry(&mut self) {
        self.controller.retry();
    }

    pub fn resume_playback(&mut self) {
        self.controller.resume_playback();
    }

    pub fn capture(&mut self) -> bool {
        self.controller.capture_and_analyze()
    }

    pub fn toggle_fullscreen(&mut self) -> FullscreenRequest {
        self.fullscreen.request_toggle()
    }

    pub fn fullscreen_changed(&mut self, active: bool) -> bool {
        self.fullscreen.on_change(active)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen.is_active()
    }

    pub fn fullscreen_pending(&self) -> Option<FullscreenRequest> {
        self.fullscreen.pending()
    }

    pub fn devices(&self) -> &[VideoDevice] {
        &self.devices
    }

    pub fn selected_device(&self) -> Option<&VideoDevice> {
        let id = self.selection.current()?;
        self.devices.iter().find(|d| d.device_id == id)
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn permission_granted(&self) -> bool {
        self.permission_granted
    }

    pub fn controller(&self) -> &StreamController<P, S> {
        &self.controller
    }

    fn sync_controller(&mut self) {
        let wanted = self.selection.current();
        if self.controller.device_id() == wanted {
            return;
        }
        log::debug!(
            "switching camera {:?} -> {wanted:?}",
            self.controller.device_id()
        );
        self.controller.select_device(wanted);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::{
        analysis::AnalysisError,
        platform::{
            EnumerateError,
            testing::{FakePlatform, ManualSpawner},
        },
        types::ConnectionStatus,
    };

    struct Echo;

    impl AnalysisClient for Echo {
        fn analyze(&self, _jpeg: &[u8]) -> Result<String, AnalysisError> {
            Ok("A wooden table with a laptop.".into())
        }
    }

    fn session(
        devices: Vec<VideoDevice>,
    ) -> (
        Arc<FakePlatform>,
        ManualSpawner,
        HudSession<FakePlatform, ManualSpawner>,
    ) {
        let platform = Arc::new(FakePlatform::with_devices(devices));
        let spawner = ManualSpawner::default();
        let session = HudSession::new(
            platform.clone(),
            Arc::new(Echo),
            spawner.clone(),
            StreamOptions::default(),
        );
        (platform, spawner, session)
    }

    fn glasses_and_webcam() -> Vec<VideoDevice> {
        vec![
            VideoDevice::new("0", "FaceTime HD Camera"),
            VideoDevice::new("1", "UVC Smart Glasses"),
        ]
    }

    #[test]
    fn mount_auto_selects_external_camera_and_connects() {
        let (platform, spawner, mut session) = session(glasses_and_webcam());
        session.mount();
        assert!(session.permission_granted());
        assert_eq!(session.selection().current(), Some("1"));
        assert_eq!(
            session.controller().status(),
            ConnectionStatus::Scanning
        );

        spawner.run_all();
        session.tick();
        assert_eq!(session.controller().status(), ConnectionStatus::Connected);
        assert_eq!(platform.requests()[0].device_id, "1");
        assert_eq!(session.controller().device_id(), session.selection().current());
    }

    #[test]
    fn denied_permission_leaves_session_disconnected() {
        let (platform, _spawner, mut session) = session(glasses_and_webcam());
        platform.deny_enumeration(EnumerateError::PermissionDenied);
        session.mount();
        assert!(!session.permission_granted());
        assert!(session.devices().is_empty());
        assert!(session.selection().is_empty());
        assert_eq!(
            session.controller().status(),
            ConnectionStatus::Disconnected
        );
    }

    #[test]
    fn explicit_choice_switches_stream() {
        let (platform, spawner, mut session) = session(glasses_and_webcam());
        session.mount();
        spawner.run_all();
        session.tick();

        session.choose_device("0");
        assert_eq!(platform.opened()[0].1.stop_count(), 1);
        spawner.run_all();
        session.tick();
        assert_eq!(session.controller().device_id(), Some("0"));
        assert_eq!(session.selected_device().unwrap().label, "FaceTime HD Camera");

        session.choose_device("missing");
        assert_eq!(session.selection().current(), Some("0"));
    }

    #[test]
    fn device_change_rescans_and_recovers_from_unplug() {
        let (platform, spawner, mut session) = session(glasses_and_webcam());
        session.mount();
        spawner.run_all();
        session.tick();
        assert_eq!(platform.enumerations(), 1);

        platform.set_devices(vec![VideoDevice::new("0", "FaceTime HD Camera")]);
        platform.notify_device_change();
        assert!(session.tick());
        // The scan runs off the UI thread; nothing changes until it lands.
        assert_eq!(platform.enumerations(), 1);
        assert_eq!(session.selection().current(), Some("1"));

        spawner.run_next();
        assert!(session.tick());
        assert_eq!(platform.enumerations(), 2);
        assert_eq!(session.selection().current(), Some("0"));
        assert_eq!(platform.opened()[0].1.stop_count(), 1);

        spawner.run_all();
        session.tick();
        assert_eq!(session.controller().status(), ConnectionStatus::Connected);
    }

    #[test]
    fn manual_rescan_picks_up_a_new_camera() {
        let (platform, spawner, mut session) = session(Vec::new());
        session.mount();
        assert!(!session.permission_granted());

        platform.set_devices(vec![VideoDevice::new("7", "USB Camera")]);
        session.rescan();
        assert!(session.devices().is_empty());

        spawner.run_next();
        session.tick();
        assert!(session.permission_granted());
        assert_eq!(session.selection().current(), Some("7"));
        assert_eq!(session.controller().device_id(), Some("7"));
    }

    #[test]
    fn drop_unsubscribes_and_releases() {
        let (platform, spawner, mut session) = session(glasses_and_webcam());
        session.mount();
        session.mount();
        spawner.run_all();
        session.tick();
        drop(session);

        assert_eq!(platform.subscribes.load(Ordering::SeqCst), 1);
        assert_eq!(platform.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(platform.opened()[0].1.stop_count(), 1);
    }

    #[test]
    fn fullscreen_follows_notifications() {
        let (_platform, _spawner, mut session) = session(Vec::new());
        assert_eq!(session.toggle_fullscreen(), FullscreenRequest::Enter);
        assert!(!session.is_fullscreen());
        assert_eq!(session.fullscreen_pending(), Some(FullscreenRequest::Enter));
        session.fullscreen_changed(true);
        assert!(session.is_fullscreen());
        assert_eq!(session.fullscreen_pending(), None);
    }

    #[test]
    fn fresh_fullscreen_request_survives_a_tick() {
        let (_platform, _spawner, mut session) = session(Vec::new());
        session.toggle_fullscreen();
        session.tick();
        assert_eq!(session.fullscreen_pending(), Some(FullscreenRequest::Enter));
    }
}
