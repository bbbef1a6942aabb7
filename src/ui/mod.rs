use std::sync::Arc;

use gpui::prelude::FluentBuilder;
use gpui::{
    AnyElement, App, AppContext, Context, Hsla, InteractiveElement, IntoElement, ObjectFit,
    ParentElement, Render, RenderImage, SharedString, Styled, StyledImage, Subscription,
    TitlebarOptions, Window, WindowControlArea, WindowDecorations, WindowOptions, div, img, px,
};
use gpui_component::{
    ActiveTheme, Root, StyledExt,
    button::{Button, ButtonVariants},
    h_flex,
    v_flex,
};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::{
    pipeline::NokhwaPlatform,
    session::HudSession,
    types::ConnectionStatus,
};

mod device_picker;
mod render_util;
mod titlebar;
mod viewport;

const HUD_ACCENT: u32 = 0x22d3ee;
const HUD_BACKGROUND: u32 = 0x05080d;

pub type Session = HudSession<NokhwaPlatform>;

pub fn launch_ui(app: &mut App, session: Session) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("UVC HUD".into()),
            appears_transparent: true,
            traffic_light_position: None,
        }),
        window_decorations: Some(WindowDecorations::Client),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|cx| {
            // Fullscreen requests are fire-and-forget; the bounds change is the
            // only confirmation we trust.
            let fullscreen_watch =
                cx.observe_window_bounds(window, |this: &mut AppView, window, cx| {
                    if this.session.fullscreen_changed(window.is_fullscreen()) {
                        cx.notify();
                    }
                });
            AppView::new(session, fullscreen_watch)
        });
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct AppView {
    session: Session,
    latest_image: Option<Arc<RenderImage>>,
    rendered_frame: u64,
    camera_picker_open: bool,
    _fullscreen_watch: Subscription,
}

impl AppView {
    fn new(mut session: Session, fullscreen_watch: Subscription) -> Self {
        session.mount();
        Self {
            session,
            latest_image: None,
            rendered_frame: 0,
            camera_picker_open: false,
            _fullscreen_watch: fullscreen_watch,
        }
    }

    fn status_color(&self, cx: &Context<'_, Self>) -> Hsla {
        let theme = cx.theme();
        match self.session.controller().status() {
            ConnectionStatus::Connected => theme.success,
            ConnectionStatus::Scanning => theme.warning,
            ConnectionStatus::Error => theme.danger,
            ConnectionStatus::Disconnected => theme.muted_foreground,
        }
    }

    fn camera_label(&self) -> String {
        self.session
            .selected_device()
            .map(|device| device.label.clone())
            .unwrap_or_else(|| {
                if self.session.devices().is_empty() {
                    "No camera detected".to_string()
                } else {
                    "No camera selected".to_string()
                }
            })
    }

    fn refresh_image(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        let controller = self.session.controller();
        if controller.status() != ConnectionStatus::Connected {
            if let Some(old_image) = self.latest_image.take() {
                cx.drop_image(old_image, Some(window));
            }
            return;
        }
        if controller.frame_serial() == self.rendered_frame {
            return;
        }
        self.rendered_frame = controller.frame_serial();

        let image = controller
            .latest_frame()
            .and_then(render_util::frame_to_image);
        if let Some(image) = image {
            if let Some(old_image) = self.latest_image.replace(image) {
                // Explicitly drop the previous GPU texture; otherwise the sprite atlas keeps
                // every frame and memory will climb rapidly while the camera is running.
                cx.drop_image(old_image, Some(window));
            }
        }
    }
}

impl Render for AppView {
    fn render(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> impl gpui::IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        self.session.tick();
        self.refresh_image(window, cx);

        let status_color = self.status_color(cx);
        let titlebar = self.render_titlebar(status_color, window, cx);
        let viewport = self.render_viewport(cx);

        v_flex()
            .size_full()
            .bg(gpui::rgb(HUD_BACKGROUND))
            .when(!self.session.is_fullscreen(), |this| this.child(titlebar))
            .child(viewport)
    }
}
