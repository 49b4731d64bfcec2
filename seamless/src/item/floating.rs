//! Shared behaviour of the panels floating next to the compose button.
//! The tooltip and the expiration select both embed a [FloatingPanel]
//! and delegate placement, animation, and deferred removal to it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use web_sys::HtmlElement;

use crate::interop::timers::Timeout;
use crate::util;

/// How long the fade-out animation is given before the node is removed
/// from the host page.
const HIDE_REMOVAL_DELAY: i32 = 200;

/// A node shown above or below the compose button, appended to the host
/// page body only while visible so overflow clipping of the editable
/// element's container cannot crop it.
pub struct FloatingPanel {
    node: HtmlElement,
    margin: f64,
    visible: Cell<bool>,
    above: Cell<bool>,
    hide_timer: RefCell<Option<Timeout>>,
}

impl FloatingPanel {
    pub fn new(node: HtmlElement, margin: f64) -> Rc<Self> {
        let panel = Rc::new(Self {
            node,
            margin,
            visible: Cell::new(false),
            above: Cell::new(true),
            hide_timer: RefCell::new(None),
        });
        panel.update_visibility();
        panel
    }

    pub fn node(&self) -> &HtmlElement {
        &self.node
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    /// Whether the panel is placed above the button, decided by the last
    /// [FloatingPanel::reposition] from the space left on screen.
    pub fn is_above(&self) -> bool {
        self.above.get()
    }

    pub fn cancel_pending_removal(&self) {
        self.hide_timer.borrow_mut().take();
    }

    /// Whether the node currently sits in the host page body.
    pub fn is_appended(&self) -> bool {
        util::body().is_ok_and(|body| body.contains(Some(self.node.as_ref())))
    }

    /// Appends the node to the host page body if a previous hide removed
    /// it, returning whether it had to be re-appended.
    pub fn ensure_appended(&self) -> bool {
        if self.is_appended() {
            return false;
        }
        let Ok(body) = util::body() else { return false };
        body.append_child(&self.node)
            .expect("appending an owned node to the body");
        true
    }

    /// Centers the panel horizontally on the button and places it above
    /// when there is room, below otherwise.
    pub fn reposition(self: &Rc<Self>, button: &HtmlElement) {
        if !self.is_valid() {
            self.hide();
            return;
        }
        let region = button.get_bounding_client_rect();
        let left = region.left() + (region.width() - f64::from(self.node.offset_width())) / 2.0;
        let height = f64::from(self.node.offset_height());
        let top = if region.top() - height - self.margin >= 0.0 {
            self.above.set(true);
            region.top() - height - self.margin
        } else {
            self.above.set(false);
            region.top() + region.height() + self.margin
        };
        util::set_styles(
            &self.node,
            &[("left", &format!("{left}px")), ("top", &format!("{top}px"))],
        );
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.set(visible);
    }

    /// Applies the opacity and offset matching the visibility flag. The
    /// hidden offset direction follows the placement side, so the panel
    /// always animates away from the button.
    pub fn update_visibility(&self) {
        if self.visible.get() {
            util::set_styles(&self.node, &[("opacity", "1"), ("transform", "none")]);
        } else {
            let offset = if self.above.get() { "5px" } else { "-5px" };
            util::set_styles(
                &self.node,
                &[("opacity", "0"), ("transform", &format!("translateY({offset})"))],
            );
        }
    }

    /// Snaps the node back to its hidden appearance without animating,
    /// so the next visibility change plays a full transition.
    pub fn reset_animation(&self) {
        util::set_styles(&self.node, &[("transition", "none")]);
        self.force_relayout();
        self.update_visibility();
        self.force_relayout();
        util::set_styles(
            &self.node,
            &[("transition", "transform .2s ease-in-out, opacity .2s ease-in-out")],
        );
        self.force_relayout();
    }

    /// Shows the panel next to the given button node, animated.
    pub fn show(self: &Rc<Self>, button: &HtmlElement) {
        self.cancel_pending_removal();
        self.ensure_appended();
        self.reset_animation();
        self.reposition(button);
        self.visible.set(true);
        self.update_visibility();
    }

    /// Fades the panel out and removes its node once the animation had
    /// time to finish. Showing again before that cancels the removal.
    pub fn hide(self: &Rc<Self>) {
        if !self.visible.replace(false) {
            return;
        }
        self.update_visibility();
        let panel = Rc::downgrade(self);
        let removal = Timeout::new(HIDE_REMOVAL_DELAY, move || {
            if let Some(panel) = panel.upgrade() {
                panel.node.remove();
                panel.hide_timer.borrow_mut().take();
            }
        });
        *self.hide_timer.borrow_mut() = Some(removal);
    }

    /// A hidden panel is always valid, its node is only expected in the
    /// document while visible.
    pub fn is_valid(&self) -> bool {
        if !self.visible.get() {
            return true;
        }
        util::body().is_ok_and(|body| body.contains(Some(self.node.as_ref())))
    }

    /// Cancels pending removal and takes the node out of the host page,
    /// for when the owning item leaves its resource.
    pub fn detach(&self) {
        self.cancel_pending_removal();
        self.node.remove();
    }

    // Reading a layout property flushes pending style changes, which is
    // what makes the transition toggling in reset_animation stick.
    fn force_relayout(&self) {
        let _ = self.node.offset_width();
    }
}

#[cfg(test)]
mod test {
    use wasm_bindgen::JsCast;
    use wasm_bindgen_test::wasm_bindgen_test;

    use super::*;
    use crate::util;

    fn panel() -> Rc<FloatingPanel> {
        let node = util::document()
            .unwrap()
            .create_element("div")
            .unwrap()
            .unchecked_into::<HtmlElement>();
        FloatingPanel::new(node, 5.0)
    }

    #[wasm_bindgen_test]
    fn test_hidden_panel_is_valid_without_node_in_document() {
        let panel = panel();
        assert!(!panel.is_visible());
        assert!(panel.is_valid());
    }

    #[wasm_bindgen_test]
    fn test_visible_panel_requires_node_in_document() {
        let panel = panel();
        panel.set_visible(true);
        assert!(!panel.is_valid());
        panel.ensure_appended();
        assert!(panel.is_valid());
        panel.detach();
        assert!(!panel.is_valid());
    }

    #[wasm_bindgen_test]
    fn test_hide_keeps_node_until_animation_delay() {
        let panel = panel();
        panel.set_visible(true);
        panel.ensure_appended();
        panel.hide();
        // removal is deferred, the node must still animate in place
        assert!(util::body().unwrap().contains(Some(panel.node().as_ref())));
        assert!(!panel.is_visible());
        panel.detach();
    }
}
