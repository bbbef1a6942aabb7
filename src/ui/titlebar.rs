use super::{
    AnyElement, AppView, Context, Hsla, InteractiveElement, IntoElement, ParentElement, Styled,
    Window, WindowControlArea, div, h_flex, px,
};

#[cfg(target_os = "windows")]
use super::SharedString;

impl AppView {
    pub(super) fn render_titlebar(
        &self,
        status_color: Hsla,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let titlebar_height = px(32.0);
        let titlebar_bg = gpui::rgb(0x0b1220);
        let status = self.session.controller().status();

        #[cfg(target_os = "windows")]
        let controls = self.render_windows_controls(window, cx);

        #[cfg(target_os = "macos")]
        let controls = self.render_macos_controls(window, cx);

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let controls = self.render_linux_controls(window, cx);

        h_flex()
            .window_control_area(WindowControlArea::Drag)
            .h(titlebar_height)
            .w_full()
            .items_center()
            .justify_between()
            .bg(titlebar_bg)
            .child(
                h_flex()
                    .gap_3()
                    .pl(px(80.0))
                    .pr_3()
                    .h_full()
                    .items_center()
                    .child(
                        div()
                            .px_2()
                            .py_0p5()
                            .rounded_md()
                            .bg(gpui::rgba(0x00000033))
                            .text_xs()
                            .text_color(status_color)
                            .child(format!("\u{25CF} {}", status.label())),
                    )
                    .child(
                        div()
                            .px_2()
                            .py_0p5()
                            .rounded_md()
                            .bg(gpui::rgba(0x00000033))
                            .text_xs()
                            .text_color(gpui::rgb(0xa0aab8))
                            .overflow_hidden()
                            .text_ellipsis()
                            .whitespace_nowrap()
                            .child(self.camera_label()),
                    ),
            )
            .child(controls)
            .into_any_element()
    }

    #[cfg(target_os = "windows")]
    fn render_windows_controls(
        &self,
        window: &mut Window,
        _cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let button_height = px(32.0);
        let font_family: SharedString = "Segoe Fluent Icons".into();
        let maximize_glyph = if window.is_maximized() {
            "\u{e923}"
        } else {
            "\u{e922}"
        };

        let control =
            |id: &'static str, area: WindowControlArea, glyph: &'static str, hover: gpui::Rgba| {
                div()
                    .id(id)
                    .flex()
                    .items_center()
                    .justify_center()
                    .occlude()
                    .w(px(46.0))
                    .h_full()
                    .text_size(px(10.0))
                    .hover(move |s| s.bg(hover))
                    .window_control_area(area)
                    .child(glyph)
            };

        h_flex()
            .id("windows-window-controls")
            .font_family(font_family)
            .justify_center()
            .content_stretch()
            .max_h(button_height)
            .min_h(button_height)
            .child(control(
                "minimize",
                WindowControlArea::Min,
                "\u{e921}",
                gpui::rgb(0x404040),
            ))
            .child(control(
                "maximize-or-restore",
                WindowControlArea::Max,
                maximize_glyph,
                gpui::rgb(0x404040),
            ))
            .child(control(
                "close",
                WindowControlArea::Close,
                "\u{e8bb}",
                gpui::rgb(0xe81120),
            ))
            .into_any_element()
    }

    #[cfg(target_os = "macos")]
    fn render_macos_controls(
        &self,
        _window: &mut Window,
        _cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        div().into_any_element()
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    fn render_linux_controls(
        &self,
        _window: &mut Window,
        _cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let icon_color = gpui::rgb(0xc9d1d9);

        let control =
            |id: &'static str, area: WindowControlArea, path: &'static str, hover: gpui::Rgba| {
                div()
                    .id(id)
                    .group(id)
                    .size(px(28.0))
                    .flex()
                    .items_center()
                    .justify_center()
                    .rounded_md()
                    .cursor_pointer()
                    .window_control_area(area)
                    .hover(move |s| s.bg(hover))
                    .child(
                        gpui::svg()
                            .size(px(16.0))
                            .path(path)
                            .text_color(icon_color)
                            .group_hover(id, |s| s.text_color(gpui::rgb(0xffffff))),
                    )
            };

        h_flex()
            .gap_1()
            .px_2()
            .child(control(
                "linux-minimize",
                WindowControlArea::Min,
                "M 4,8 H 12",
                gpui::rgb(0x1f2428),
            ))
            .child(control(
                "linux-maximize",
                WindowControlArea::Max,
                "M 4,4 H 12 V 12 H 4 Z",
                gpui::rgb(0x1f2428),
            ))
            .child(control(
                "linux-close",
                WindowControlArea::Close,
                "M 4,4 L 12,12 M 12,4 L 4,12",
                gpui::rgb(0xe81123),
            ))
            .into_any_element()
    }
}
