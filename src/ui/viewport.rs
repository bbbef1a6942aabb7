use super::{
    ActiveTheme, AnyElement, AppView, Button, ButtonVariants, Context, FluentBuilder,
    IntoElement, ObjectFit, ParentElement, SharedString, Styled, StyledExt, StyledImage, div,
    h_flex, img, px, v_flex,
};
use crate::{fullscreen::FullscreenRequest, types::ConnectionStatus};

impl AppView {
    pub(super) fn render_viewport(&mut self, cx: &mut Context<'_, Self>) -> AnyElement {
        let status_color = self.status_color(cx);
        let muted = cx.theme().muted_foreground;

        let surface: AnyElement = match &self.latest_image {
            Some(image) => img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .into_any_element(),
            None => div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(muted)
                .child(self.placeholder_text())
                .into_any_element(),
        };

        let mut viewport = div()
            .relative()
            .flex_1()
            .w_full()
            .overflow_hidden()
            .bg(gpui::rgb(0x000000))
            .child(surface)
            .child(self.render_status_overlay(status_color))
            .child(self.render_controls(cx))
            .child(self.render_analysis_bar(cx));

        if let Some(center) = self.render_center_panel(cx) {
            viewport = viewport.child(
                div()
                    .absolute()
                    .inset_0()
                    .flex()
                    .items_center()
                    .justify_center()
                    .child(div().w(px(420.0)).child(center)),
            );
        }

        if self.camera_picker_open {
            let picker = self.render_device_picker(cx);
            viewport = viewport.child(
                div()
                    .absolute()
                    .top(px(56.0))
                    .right(px(16.0))
                    .w(px(360.0))
                    .child(picker),
            );
        }

        viewport.into_any_element()
    }

    fn placeholder_text(&self) -> &'static str {
        match self.session.controller().status() {
            ConnectionStatus::Scanning => "Connecting to camera...",
            ConnectionStatus::Error => "No video",
            _ if !self.session.permission_granted() => "No camera available",
            _ => "No camera selected",
        }
    }

    fn render_status_overlay(&self, status_color: gpui::Hsla) -> AnyElement {
        let controller = self.session.controller();
        let resolution = match (controller.video_dimensions(), controller.settings()) {
            ((0, 0), _) => "--".to_string(),
            ((w, h), Some(settings)) if settings.frame_rate > 0 => {
                format!("{w}x{h} @ {}fps", settings.frame_rate)
            }
            ((w, h), _) => format!("{w}x{h}"),
        };

        v_flex()
            .absolute()
            .top(px(16.0))
            .left(px(16.0))
            .gap_1()
            .px_3()
            .py_2()
            .rounded_lg()
            .bg(gpui::rgba(0x05080dcc))
            .border_1()
            .border_color(gpui::rgba(0x22d3ee55))
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(div().size(px(8.0)).rounded_full().bg(status_color))
                    .child(
                        div()
                            .text_xs()
                            .font_semibold()
                            .text_color(status_color)
                            .child(controller.status().label()),
                    ),
            )
            .child(
                div()
                    .text_xs()
                    .text_color(gpui::rgb(0xcbd5e1))
                    .whitespace_nowrap()
                    .child(self.camera_label()),
            )
            .child(
                div()
                    .text_xs()
                    .text_color(gpui::rgb(super::HUD_ACCENT))
                    .child(resolution),
            )
            .into_any_element()
    }

    fn render_controls(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let session = &self.session;
        let fullscreen_label = match (session.is_fullscreen(), session.fullscreen_pending()) {
            (_, Some(FullscreenRequest::Enter)) => "Entering...",
            (_, Some(FullscreenRequest::Exit)) => "Exiting...",
            (true, None) => "Exit fullscreen",
            (false, None) => "Fullscreen",
        };
        let picker_label = if self.camera_picker_open {
            "Close"
        } else {
            "Cameras"
        };

        h_flex()
            .absolute()
            .top(px(16.0))
            .right(px(16.0))
            .gap_2()
            .child(
                Button::new(SharedString::from("camera-picker-toggle"))
                    .outline()
                    .label(picker_label)
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.camera_picker_open = !this.camera_picker_open;
                        cx.notify();
                    })),
            )
            .child(
                Button::new(SharedString::from("fullscreen-toggle"))
                    .outline()
                    .label(fullscreen_label)
                    .on_click(cx.listener(|this, _, window, cx| {
                        let request = this.session.toggle_fullscreen();
                        log::debug!("fullscreen request: {request:?}");
                        window.toggle_fullscreen();
                        cx.notify();
                    })),
            )
            .into_any_element()
    }

    /// Blocking states that need the user: gesture prompt, stream errors and
    /// the no-camera notice.
    fn render_center_panel(&self, cx: &mut Context<'_, Self>) -> Option<AnyElement> {
        let controller = self.session.controller();

        if controller.needs_user_gesture() {
            return Some(
                notice_card(
                    gpui::rgba(0x22d3ee22),
                    gpui::rgba(0x22d3eeaa),
                    "Playback is waiting for you",
                    "The camera is open but the video has not started.",
                )
                .child(
                    Button::new(SharedString::from("resume-playback"))
                        .primary()
                        .label("Start video")
                        .w_full()
                        .on_click(cx.listener(|this, _, _, cx| {
                            this.session.resume_playback();
                            cx.notify();
                        })),
                )
                .into_any_element(),
            );
        }

        if let Some(message) = controller.error_message() {
            return Some(
                notice_card(
                    gpui::rgba(0x7f1d1d33),
                    gpui::rgba(0xef4444aa),
                    "Camera error",
                    message,
                )
                .child(
                    Button::new(SharedString::from("retry-stream"))
                        .primary()
                        .label("Retry")
                        .w_full()
                        .on_click(cx.listener(|this, _, _, cx| {
                            this.session.retry();
                            cx.notify();
                        })),
                )
                .into_any_element(),
            );
        }

        if controller.status() != ConnectionStatus::Disconnected {
            return None;
        }

        // An empty scan and a denied prompt look the same from here.
        if self.session.permission_granted() {
            return None;
        }

        Some(
            notice_card(
                gpui::rgba(0x1e293b99),
                gpui::rgba(0x475569ff),
                "No camera available",
                "Connect your UVC glasses or another camera and allow camera access, then rescan.",
            )
            .child(
                Button::new(SharedString::from("rescan-devices"))
                    .outline()
                    .label("Rescan")
                    .w_full()
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.session.rescan();
                        cx.notify();
                    })),
            )
            .into_any_element(),
        )
    }

    fn render_analysis_bar(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let controller = self.session.controller();

        let action: AnyElement = if controller.is_analyzing() {
            div()
                .px_3()
                .py_1()
                .text_sm()
                .text_color(gpui::rgb(super::HUD_ACCENT))
                .child("Analyzing...")
                .into_any_element()
        } else if controller.can_capture() {
            Button::new(SharedString::from("capture-analyze"))
                .primary()
                .label("Capture & analyze")
                .on_click(cx.listener(|this, _, _, cx| {
                    this.session.capture();
                    cx.notify();
                }))
                .into_any_element()
        } else {
            div()
                .px_3()
                .py_1()
                .text_sm()
                .text_color(gpui::rgb(0x4a5568))
                .child("Capture unavailable")
                .into_any_element()
        };

        let result = controller.analysis().map(|analysis| {
            v_flex()
                .flex_1()
                .gap_1()
                .child(
                    div()
                        .text_xs()
                        .text_color(gpui::rgb(0x64748b))
                        .child(format!("Analysis at {}", analysis.timestamp)),
                )
                .child(
                    div()
                        .text_sm()
                        .text_color(gpui::rgb(0xe2e8f0))
                        .child(analysis.text.clone()),
                )
        });

        h_flex()
            .absolute()
            .bottom(px(16.0))
            .left(px(16.0))
            .right(px(16.0))
            .gap_3()
            .items_start()
            .p_3()
            .rounded_lg()
            .bg(gpui::rgba(0x05080dcc))
            .border_1()
            .border_color(gpui::rgba(0x22d3ee33))
            .child(action)
            .when_some(result, |this, result| this.child(result))
            .into_any_element()
    }
}

fn notice_card(
    background: gpui::Rgba,
    border: gpui::Rgba,
    title: impl Into<SharedString>,
    detail: impl Into<SharedString>,
) -> gpui::Div {
    v_flex()
        .gap_2()
        .p_4()
        .rounded_xl()
        .bg(background)
        .border_1()
        .border_color(border)
        .shadow_lg()
        .child(
            div()
                .text_sm()
                .font_semibold()
                .text_color(gpui::rgb(0xe2e8f0))
                .child(title.into()),
        )
        .child(
            div()
                .text_xs()
                .text_color(gpui::rgb(0xcbd5e1))
                .child(detail.into()),
        )
}
