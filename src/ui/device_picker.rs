use super::{
    AnyElement, AppView, Button, ButtonVariants, Context, FluentBuilder, InteractiveElement,
    IntoElement, ParentElement, SharedString, Styled, StyledExt, div, h_flex, v_flex,
};

impl AppView {
    pub(super) fn render_device_picker(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let selected = self.session.selection().current().map(str::to_owned);

        let title_row = h_flex()
            .justify_between()
            .items_center()
            .w_full()
            .mb_2()
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(
                        div()
                            .text_base()
                            .text_color(gpui::rgb(super::HUD_ACCENT))
                            .child("\u{25C9}"),
                    )
                    .child(
                        div()
                            .text_sm()
                            .font_semibold()
                            .text_color(gpui::rgb(0xe2e8f0))
                            .child("Select camera"),
                    ),
            )
            .child(
                h_flex()
                    .gap_1()
                    .child(
                        Button::new(SharedString::from("device-rescan"))
                            .label("Rescan")
                            .ghost()
                            .on_click(cx.listener(|this, _, _, cx| {
                                this.session.rescan();
                                cx.notify();
                            })),
                    )
                    .child(
                        Button::new(SharedString::from("device-picker-close"))
                            .label("\u{00D7}")
                            .ghost()
                            .on_click(cx.listener(|this, _, _, cx| {
                                this.camera_picker_open = false;
                                cx.notify();
                            })),
                    ),
            );

        let mut picker = v_flex()
            .gap_2()
            .p_4()
            .rounded_xl()
            .bg(gpui::rgba(0x0b1220f5))
            .border_1()
            .border_color(gpui::rgba(0x1e3a4aff))
            .shadow_lg()
            .child(title_row);

        for device in self.session.devices() {
            let is_selected = selected.as_deref() == Some(device.device_id.as_str());
            let device_id = device.device_id.clone();

            picker = picker.child(
                h_flex()
                    .w_full()
                    .gap_3()
                    .items_center()
                    .p_3()
                    .rounded_lg()
                    .cursor_pointer()
                    .bg(if is_selected {
                        gpui::rgba(0x22d3ee22)
                    } else {
                        gpui::rgba(0x1e293b00)
                    })
                    .border_1()
                    .border_color(if is_selected {
                        gpui::rgba(0x22d3eeaa)
                    } else {
                        gpui::rgba(0x33415500)
                    })
                    .hover(|this| {
                        this.bg(gpui::rgba(0x2d374844))
                            .border_color(gpui::rgba(0x475569ff))
                    })
                    .on_mouse_down(
                        gpui::MouseButton::Left,
                        cx.listener(move |this, _, _, cx| {
                            this.session.choose_device(&device_id);
                            this.camera_picker_open = false;
                            cx.notify();
                        }),
                    )
                    .child(
                        v_flex()
                            .flex_1()
                            .overflow_hidden()
                            .child(
                                div()
                                    .text_sm()
                                    .text_color(if is_selected {
                                        gpui::rgb(0xe2e8f0)
                                    } else {
                                        gpui::rgb(0xcbd5e1)
                                    })
                                    .text_ellipsis()
                                    .whitespace_nowrap()
                                    .child(device.label.clone()),
                            )
                            .child(
                                div()
                                    .text_xs()
                                    .text_color(gpui::rgb(0x64748b))
                                    .text_ellipsis()
                                    .whitespace_nowrap()
                                    .child(device.device_id.clone()),
                            ),
                    )
                    .when(is_selected, |this| {
                        this.child(
                            div()
                                .text_sm()
                                .flex_shrink_0()
                                .text_color(gpui::rgb(super::HUD_ACCENT))
                                .child("\u{2713}"),
                        )
                    }),
            );
        }

        if self.session.devices().is_empty() {
            picker = picker.child(
                div()
                    .text_xs()
                    .text_color(gpui::rgb(0x8b95a5))
                    .child("No video input devices found."),
            );
        }

        picker.into_any_element()
    }
}
