use serde::Serialize;

use crate::events::{EventEmitter, HuddleEvent};

/// Narrowest a side panel may get, in pixels.
pub const MIN_PANEL_WIDTH: f64 = 200.0;

/// Side panels docked on the right edge of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Panel {
    Chat,
    Members,
}

impl Panel {
    /// A panel may take at most `viewport / divisor` pixels.
    fn max_divisor(self) -> f64 {
        match self {
            Panel::Chat => 2.0,
            Panel::Members => 2.5,
        }
    }

    fn other(self) -> Panel {
        match self {
            Panel::Chat => Panel::Members,
            Panel::Members => Panel::Chat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PanelState {
    pub open: bool,
    pub width: f64,
    pub resizing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayoutView {
    pub viewport_width: f64,
    pub chat: PanelState,
    pub members: PanelState,
}

/// Open/closed and width state of the chat and member-list panels.
///
/// Both panels share the right edge, so a panel's width is measured from
/// the pointer to the edge minus whatever the other open panel occupies.
pub struct PanelLayout {
    emitter: EventEmitter,
    viewport_width: f64,
    chat: PanelState,
    members: PanelState,
}

impl PanelLayout {
    pub fn new(emitter: EventEmitter, viewport_width: f64, chat_width: f64, members_width: f64) -> Self {
        let mut layout = Self {
            emitter,
            viewport_width,
            chat: PanelState { open: false, width: chat_width, resizing: false },
            members: PanelState { open: false, width: members_width, resizing: false },
        };
        layout.chat.width = layout.clamp_width(Panel::Chat, chat_width);
        layout.members.width = layout.clamp_width(Panel::Members, members_width);
        layout
    }

    fn panel(&self, panel: Panel) -> &PanelState {
        match panel {
            Panel::Chat => &self.chat,
            Panel::Members => &self.members,
        }
    }

    fn panel_mut(&mut self, panel: Panel) -> &mut PanelState {
        match panel {
            Panel::Chat => &mut self.chat,
            Panel::Members => &mut self.members,
        }
    }

    pub fn state(&self, panel: Panel) -> PanelState {
        *self.panel(panel)
    }

    pub fn is_open(&self, panel: Panel) -> bool {
        self.panel(panel).open
    }

    pub fn viewport_width(&self) -> f64 {
        self.viewport_width
    }

    pub fn view(&self) -> LayoutView {
        LayoutView {
            viewport_width: self.viewport_width,
            chat: self.chat,
            members: self.members,
        }
    }

    fn changed(&self, panel: Panel) {
        let state = self.panel(panel);
        self.emitter.emit(HuddleEvent::PanelChanged {
            panel,
            open: state.open,
            width: state.width,
        });
    }

    /// Flip a panel open/closed. Returns the new open state.
    pub fn toggle(&mut self, panel: Panel) -> bool {
        let state = self.panel_mut(panel);
        state.open = !state.open;
        if !state.open {
            state.resizing = false;
        }
        let open = state.open;
        tracing::debug!(?panel, open, "panel toggled");
        self.changed(panel);
        open
    }

    /// Start a drag on the panel's handle. Only one panel drags at a time.
    pub fn begin_resize(&mut self, panel: Panel) {
        self.panel_mut(panel.other()).resizing = false;
        self.panel_mut(panel).resizing = true;
    }

    /// Pointer released: later pointer moves are ignored.
    pub fn end_resize(&mut self, panel: Panel) {
        self.panel_mut(panel).resizing = false;
    }

    /// Apply a pointer move. Returns the new width, or `None` when no drag
    /// is active for this panel.
    pub fn resize_to(&mut self, panel: Panel, pointer_x: f64) -> Option<f64> {
        if !self.panel(panel).resizing {
            return None;
        }
        if !pointer_x.is_finite() {
            return Some(self.panel(panel).width);
        }

        let raw = self.viewport_width - pointer_x - self.occupied(panel.other());
        let width = self.clamp_width(panel, raw);
        self.panel_mut(panel).width = width;
        self.changed(panel);
        Some(width)
    }

    /// Re-clamp both panels against a new viewport width.
    pub fn set_viewport_width(&mut self, viewport_width: f64) {
        if !viewport_width.is_finite() || viewport_width <= 0.0 {
            tracing::warn!(viewport_width, "ignoring invalid viewport width");
            return;
        }
        self.viewport_width = viewport_width;
        for panel in [Panel::Chat, Panel::Members] {
            let width = self.clamp_width(panel, self.panel(panel).width);
            if width != self.panel(panel).width {
                self.panel_mut(panel).width = width;
                self.changed(panel);
            }
        }
    }

    fn occupied(&self, panel: Panel) -> f64 {
        let state = self.panel(panel);
        if state.open { state.width } else { 0.0 }
    }

    /// Clamp to `[MIN_PANEL_WIDTH, viewport / divisor]`. On viewports too
    /// narrow for that range the minimum wins.
    pub fn clamp_width(&self, panel: Panel, raw: f64) -> f64 {
        let max = (self.viewport_width / panel.max_divisor()).max(MIN_PANEL_WIDTH);
        if raw.is_nan() {
            return MIN_PANEL_WIDTH;
        }
        raw.clamp(MIN_PANEL_WIDTH, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(viewport: f64) -> PanelLayout {
        PanelLayout::new(EventEmitter::new(), viewport, 320.0, 280.0)
    }

    #[test]
    fn toggle_flips_open_state() {
        let mut layout = layout(1200.0);
        assert!(!layout.is_open(Panel::Chat));
        assert!(layout.toggle(Panel::Chat));
        assert!(!layout.toggle(Panel::Chat));
    }

    #[test]
    fn resize_clamps_to_min_and_viewport_fraction() {
        let mut layout = layout(1200.0);
        layout.toggle(Panel::Chat);
        layout.begin_resize(Panel::Chat);

        // raw 50 -> 200
        assert_eq!(layout.resize_to(Panel::Chat, 1150.0), Some(200.0));
        // raw 900 -> 1200 / 2
        assert_eq!(layout.resize_to(Panel::Chat, 300.0), Some(600.0));
        // raw 400 stays as is
        assert_eq!(layout.resize_to(Panel::Chat, 800.0), Some(400.0));
    }

    #[test]
    fn members_panel_uses_its_own_fraction() {
        let mut layout = layout(1000.0);
        layout.toggle(Panel::Members);
        layout.begin_resize(Panel::Members);
        assert_eq!(layout.resize_to(Panel::Members, 0.0), Some(400.0));
    }

    #[test]
    fn resize_subtracts_the_other_open_panel() {
        let mut layout = layout(1200.0);
        layout.toggle(Panel::Chat);
        layout.toggle(Panel::Members);
        layout.begin_resize(Panel::Chat);

        // 1200 - 700 - 280
        assert_eq!(layout.resize_to(Panel::Chat, 700.0), Some(220.0));

        layout.toggle(Panel::Members);
        layout.begin_resize(Panel::Chat);
        assert_eq!(layout.resize_to(Panel::Chat, 700.0), Some(500.0));
    }

    #[test]
    fn width_is_monotonic_in_pointer_position() {
        let mut layout = layout(1400.0);
        layout.toggle(Panel::Chat);
        layout.toggle(Panel::Members);
        layout.begin_resize(Panel::Chat);

        let mut last = 0.0;
        for x in (0..=1400).rev().step_by(50) {
            let width = layout.resize_to(Panel::Chat, x as f64).unwrap();
            assert!(width >= last, "width shrank at x={x}");
            assert!((MIN_PANEL_WIDTH..=700.0).contains(&width));
            last = width;
        }
    }

    #[test]
    fn moves_after_release_are_ignored() {
        let mut layout = layout(1200.0);
        layout.toggle(Panel::Chat);
        assert_eq!(layout.resize_to(Panel::Chat, 600.0), None);

        layout.begin_resize(Panel::Chat);
        layout.resize_to(Panel::Chat, 800.0);
        layout.end_resize(Panel::Chat);
        assert_eq!(layout.resize_to(Panel::Chat, 100.0), None);
        assert_eq!(layout.state(Panel::Chat).width, 400.0);
    }

    #[test]
    fn starting_a_drag_ends_the_other_one() {
        let mut layout = layout(1200.0);
        layout.begin_resize(Panel::Chat);
        layout.begin_resize(Panel::Members);
        assert!(!layout.state(Panel::Chat).resizing);
        assert!(layout.state(Panel::Members).resizing);
    }

    #[test]
    fn narrow_viewport_keeps_minimum_width() {
        let mut layout = layout(300.0);
        assert_eq!(layout.state(Panel::Chat).width, 200.0);

        layout.set_viewport_width(1200.0);
        layout.toggle(Panel::Chat);
        layout.begin_resize(Panel::Chat);
        layout.resize_to(Panel::Chat, 600.0);
        assert_eq!(layout.state(Panel::Chat).width, 600.0);

        layout.set_viewport_width(800.0);
        assert_eq!(layout.state(Panel::Chat).width, 400.0);
    }
}
