//! The choreography item of a resource. It owns no page node of its
//! own, it turns button and application events into tooltip and
//! expiration select visibility, and opens the compose application.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::app::App;
use super::tooltip::Tooltip;
use super::ttl_select::TtlSelect;
use crate::interop::timers::Timeout;
use crate::message::{Internal, Message, Respond, ScriptMessage};
use crate::resource::item::ResourceItem;
use crate::resource::{Resource, ResourceState, Role};

/// Application injected when the button is clicked, context menu
/// entries may pick others.
const DEFAULT_APP: &str = "Message";

const TOOLTIP_TEXT: &str = "Click to compose a private message";

/// Grace period before the expiration select hides, bridging the mouse
/// travelling between the button and the select.
const SELECT_HIDE_DELAY: i32 = 100;

pub struct Controller {
    weak_self: Weak<Controller>,
    context_id: String,
    resource: RefCell<Weak<Resource>>,
    button_hovered: Cell<bool>,
    tooltip_allowed: Cell<bool>,
    tooltip_visible: Cell<bool>,
    select_visible: Cell<bool>,
    select_timer: RefCell<Option<Timeout>>,
}

impl Controller {
    pub fn new(context_id: &str) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            context_id: String::from(context_id),
            resource: RefCell::new(Weak::new()),
            button_hovered: Cell::new(false),
            tooltip_allowed: Cell::new(true),
            tooltip_visible: Cell::new(false),
            select_visible: Cell::new(false),
            select_timer: RefCell::new(None),
        })
    }

    /// Injects the named compose application, reusing the app item if
    /// one is left from a previous round. A no-op unless closed.
    fn open_app(&self, app_name: &str) {
        let Some(resource) = self.resource.borrow().upgrade() else { return };
        if resource.state() != ResourceState::Close {
            return;
        }
        if let Some(item) = resource.instance(Role::App) {
            if let Some(app) = item.as_any().downcast_ref::<App>() {
                app.inject_frame(app_name);
                return;
            }
        }
        let app = App::new(app_name, &self.context_id);
        resource.set_instance(Role::App, app);
    }

    fn state(&self) -> Option<ResourceState> {
        self.resource.borrow().upgrade().map(|resource| resource.state())
    }

    fn show_tooltip(&self) {
        if self.tooltip_visible.get() || !self.tooltip_allowed.get() {
            return;
        }
        self.tooltip_visible.set(true);
        self.with_tooltip(|tooltip| tooltip.show(TOOLTIP_TEXT));
    }

    fn hide_tooltip(&self) {
        if !self.tooltip_visible.replace(false) {
            return;
        }
        self.with_tooltip(Tooltip::hide);
    }

    fn show_select(&self) {
        self.select_timer.borrow_mut().take();
        if self.select_visible.replace(true) {
            return;
        }
        let ttl = self.resource.borrow().upgrade().and_then(|resource| resource.ttl());
        self.with_select(|select| select.show(ttl));
    }

    fn hide_select(&self, immediate: bool) {
        if !self.select_visible.get() {
            return;
        }
        if immediate {
            self.select_visible.set(false);
            self.with_select(TtlSelect::hide);
        } else {
            let weak = self.weak_self.clone();
            let timer = Timeout::new(SELECT_HIDE_DELAY, move || {
                if let Some(controller) = weak.upgrade() {
                    controller.hide_select(true);
                }
            });
            *self.select_timer.borrow_mut() = Some(timer);
        }
    }

    fn with_tooltip(&self, action: impl FnOnce(&Tooltip)) {
        let item = self
            .resource
            .borrow()
            .upgrade()
            .and_then(|resource| resource.instance(Role::Tooltip));
        if let Some(item) = item {
            if let Some(tooltip) = item.as_any().downcast_ref::<Tooltip>() {
                action(tooltip);
            }
        }
    }

    fn with_select(&self, action: impl FnOnce(&TtlSelect)) {
        let item = self
            .resource
            .borrow()
            .upgrade()
            .and_then(|resource| resource.instance(Role::TtlSelect));
        if let Some(item) = item {
            if let Some(select) = item.as_any().downcast_ref::<TtlSelect>() {
                action(select);
            }
        }
    }
}

impl ResourceItem for Controller {
    fn attach_resource(self: Rc<Self>, resource: &Rc<Resource>) {
        *self.resource.borrow_mut() = Rc::downgrade(resource);
    }

    fn detach_resource(self: Rc<Self>) {
        *self.resource.borrow_mut() = Weak::new();
        self.select_timer.borrow_mut().take();
    }

    fn on_message(self: Rc<Self>, message: &Message, _respond: Respond) -> bool {
        match message {
            Message::Internal(Internal::ContextMenuClicked { app }) => {
                if self.state() == Some(ResourceState::Close) {
                    self.open_app(app);
                }
            }
            Message::Internal(Internal::ButtonClicked) => match self.state() {
                Some(ResourceState::Close) => self.open_app(DEFAULT_APP),
                Some(ResourceState::Open) => {
                    let resource = self.resource.borrow().upgrade();
                    if let Some(resource) = resource {
                        resource.broadcast_internal(Internal::CloseRequested);
                    }
                }
                None => {}
            },
            Message::Internal(Internal::ButtonMouseEntered) => {
                self.button_hovered.set(true);
                match self.state() {
                    Some(ResourceState::Close) => self.show_tooltip(),
                    Some(ResourceState::Open) => self.show_select(),
                    None => {}
                }
            }
            Message::Internal(Internal::ButtonMouseLeft) => {
                self.button_hovered.set(false);
                self.hide_tooltip();
                self.hide_select(false);
            }
            Message::Internal(Internal::ButtonStateChanged { show_tooltip }) => {
                self.tooltip_allowed.set(*show_tooltip);
                if !show_tooltip {
                    self.hide_tooltip();
                }
            }
            Message::Internal(Internal::TargetDeactivated) => {
                self.button_hovered.set(false);
                self.hide_tooltip();
                self.hide_select(true);
            }
            Message::Internal(Internal::TtlSelectMouseEntered) => {
                if self.state() == Some(ResourceState::Open) {
                    self.show_select();
                }
            }
            Message::Internal(Internal::TtlSelectMouseLeft) => self.hide_select(false),
            Message::Script(ScriptMessage::TtlChanged { value }) => {
                let resource = self.resource.borrow().upgrade();
                if let Some(resource) = resource {
                    resource.set_ttl(Some(value.clone()));
                }
                self.hide_select(true);
            }
            Message::Script(ScriptMessage::AppStarted) => {
                self.hide_tooltip();
                if self.button_hovered.get() {
                    self.show_select();
                }
            }
            Message::Script(ScriptMessage::AppClosed) => {
                self.hide_select(true);
                if self.button_hovered.get() {
                    self.show_tooltip();
                }
            }
            _ => {}
        }
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod test {
    use wasm_bindgen_test::wasm_bindgen_test;

    use super::*;
    use crate::item::button::Button;
    use crate::item::target::Target;
    use crate::resource::ResourcePool;
    use crate::util;

    fn assembled_resource() -> (web_sys::Element, Rc<Resource>) {
        let document = util::document().unwrap();
        let textarea = document.create_element("textarea").unwrap();
        util::body().unwrap().append_child(&textarea).unwrap();
        let pool = ResourcePool::new();
        let resource = Resource::new(&pool);
        resource.set_instance(Role::Controller, Controller::new("testcontext"));
        resource.set_instance(Role::Target, Target::new(textarea.clone()));
        resource.set_instance(Role::Button, Button::new());
        resource.set_instance(Role::Tooltip, Tooltip::new());
        (textarea, resource)
    }

    // reads the declared inline opacity, computed style would report
    // mid-transition values
    fn tooltip_opacity(resource: &Resource) -> String {
        use wasm_bindgen::JsCast;
        let node = resource
            .instance(Role::Tooltip)
            .and_then(|tooltip| tooltip.node())
            .unwrap()
            .unchecked_into::<web_sys::HtmlElement>();
        node.style().get_property_value("opacity").unwrap()
    }

    #[wasm_bindgen_test]
    fn test_hovering_closed_button_shows_tooltip() {
        let (textarea, resource) = assembled_resource();
        resource.broadcast_internal(Internal::ButtonMouseEntered);
        assert_eq!(tooltip_opacity(&resource), "1");
        resource.broadcast_internal(Internal::ButtonStateChanged { show_tooltip: false });
        assert_eq!(tooltip_opacity(&resource), "0");
        resource.destroy();
        textarea.remove();
    }

    #[wasm_bindgen_test]
    fn test_disallowed_tooltip_stays_hidden_on_hover() {
        let (textarea, resource) = assembled_resource();
        resource.broadcast_internal(Internal::ButtonStateChanged { show_tooltip: false });
        resource.broadcast_internal(Internal::ButtonMouseEntered);
        assert_eq!(tooltip_opacity(&resource), "0");
        resource.destroy();
        textarea.remove();
    }
}
