//! The compose button shown at the top right corner of an activated
//! editable element. Clicking it opens the compose application, or
//! requests closing it while one is injected.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use wasm_bindgen::prelude::*;
use web_sys::{Element, HtmlElement};

use crate::interop::timers::Timeout;
use crate::message::{Internal, Message, Respond, ScriptMessage};
use crate::resource::item::ResourceItem;
use crate::resource::{Resource, ResourceState, Role};
use crate::util;

const BUTTON_WIDTH: f64 = 20.0;
const BUTTON_HEIGHT: f64 = 20.0;
const BUTTON_MARGIN: f64 = 2.0;

/// Fade out delay after the last activity.
const INACTIVE_HIDE: i32 = 5000;

/// Fade out delay after the target loses focus.
const BLUR_HIDE: i32 = 100;

const SVG_OPEN: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 20 20"><path fill="#444" d="M8 6h3v2l4-3-4-3v2H7c-.6 0-1 .4-1 1v6H4v7h12v-7H8V6z"/></svg>"##;
const SVG_CLOSE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 20 20"><path fill="#444" d="M14 15.4l-4-4-4 4L4.6 14l4-4-4-4L6 4.6l4 4 4-4L15.4 6l-4 4 4 4"/></svg>"##;
const SVG_LOADING: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="20" viewBox="0 0 50 50"><path fill="#444" d="M43.94 25.15c0-10.32-8.36-18.68-18.68-18.68S6.58 14.84 6.58 25.15h4.07c0-8.07 6.54-14.61 14.62-14.61 8.07 0 14.62 6.54 14.62 14.62h4.05z"><animateTransform attributeType="xml" attributeName="transform" type="rotate" from="0 25 25" to="360 25 25" dur="1" repeatCount="indefinite"/></path></svg>"##;

/// What the button currently displays, derived from the resource state
/// and the loading flag reported by the injected application.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ButtonState {
    Close,
    Open,
    Loading,
}

impl ButtonState {
    pub fn derive(state: ResourceState, loading: bool) -> Self {
        if loading {
            Self::Loading
        } else {
            match state {
                ResourceState::Close => Self::Close,
                ResourceState::Open => Self::Open,
            }
        }
    }

    /// Whether the button fades out on its own after inactivity.
    pub fn autohides(self) -> bool {
        self == Self::Close
    }

    pub fn clickable(self) -> bool {
        self != Self::Loading
    }

    /// Whether hovering the button may show the hint tooltip.
    pub fn shows_tooltip(self) -> bool {
        self == Self::Close
    }

    fn icon(self) -> &'static str {
        match self {
            Self::Close => SVG_OPEN,
            Self::Open => SVG_CLOSE,
            Self::Loading => SVG_LOADING,
        }
    }
}

pub struct Button {
    node: HtmlElement,
    resource: RefCell<Weak<Resource>>,
    state: Cell<ResourceState>,
    loading: Cell<bool>,
    visible: Cell<bool>,
    display: Cell<ButtonState>,
    hide_timer: RefCell<Option<Timeout>>,
    _listeners: RefCell<Vec<Closure<dyn FnMut(web_sys::Event)>>>,
}

impl Button {
    pub fn new() -> Rc<Self> {
        let node = util::document()
            .expect("content script runs in a document")
            .create_element("div")
            .expect("known element name")
            .unchecked_into::<HtmlElement>();
        util::set_styles(
            &node,
            &[
                ("cursor", "pointer"),
                ("z-index", "2147483641"),
                ("transition", "opacity .15s ease-in-out, transform .15s ease-in-out"),
                ("width", &format!("{BUTTON_WIDTH}px")),
                ("height", &format!("{BUTTON_HEIGHT}px")),
            ],
        );
        super::mark_injected(&node, Role::Button);

        let button = Rc::new(Self {
            node,
            resource: RefCell::new(Weak::new()),
            state: Cell::new(ResourceState::Close),
            loading: Cell::new(false),
            visible: Cell::new(false),
            display: Cell::new(ButtonState::Close),
            hide_timer: RefCell::new(None),
            _listeners: RefCell::new(Vec::new()),
        });
        button.register_dom_listeners();
        button.update_display();
        button
    }

    pub fn node_element(&self) -> HtmlElement {
        self.node.clone()
    }

    pub fn display_state(&self) -> ButtonState {
        self.display.get()
    }

    fn register_dom_listeners(self: &Rc<Self>) {
        // keeps the button from stealing focus off the editable element
        self.add_listener("mousedown", |_, event| event.prevent_default());
        self.add_listener("click", |button, _| {
            if button.display.get().clickable() {
                button.broadcast(Internal::ButtonClicked);
            }
        });
        self.add_listener("mouseenter", |button, _| {
            button.show();
            button.broadcast(Internal::ButtonMouseEntered);
        });
        self.add_listener("mouseleave", |button, _| {
            button.postpone_hide(INACTIVE_HIDE);
            button.broadcast(Internal::ButtonMouseLeft);
        });
    }

    fn add_listener(self: &Rc<Self>, event_type: &str, handler: fn(&Rc<Button>, &web_sys::Event)) {
        let weak = Rc::downgrade(self);
        let closure = Closure::wrap(Box::new(move |event: web_sys::Event| {
            if let Some(button) = weak.upgrade() {
                handler(&button, &event);
            }
        }) as Box<dyn FnMut(web_sys::Event)>);
        self.node
            .add_event_listener_with_callback(event_type, closure.as_ref().unchecked_ref())
            .expect("event listener registration on an owned node");
        self._listeners.borrow_mut().push(closure);
    }

    fn broadcast(&self, message: Internal) {
        let resource = self.resource.borrow().upgrade();
        if let Some(resource) = resource {
            resource.broadcast_internal(message);
        }
    }

    /// Applies the icon, the cursor, and the visibility matching the
    /// derived display state, announcing the change to siblings.
    fn update_display(&self) {
        let display = ButtonState::derive(self.state.get(), self.loading.get());
        let previous = self.display.replace(display);
        self.node.set_inner_html(display.icon());
        let cursor = if display.clickable() { "pointer" } else { "default" };
        util::set_styles(&self.node, &[("cursor", cursor)]);
        self.update_visibility();
        if previous != display {
            self.broadcast(Internal::ButtonStateChanged {
                show_tooltip: display.shows_tooltip(),
            });
        }
    }

    fn show(&self) {
        self.hide_timer.borrow_mut().take();
        self.visible.set(true);
        self.update_visibility();
    }

    fn postpone_hide(self: &Rc<Self>, delay: i32) {
        let weak = Rc::downgrade(self);
        let timer = Timeout::new(delay, move || {
            if let Some(button) = weak.upgrade() {
                button.visible.set(false);
                button.update_visibility();
            }
        });
        *self.hide_timer.borrow_mut() = Some(timer);
    }

    /// A non-autohiding display state pins the button visible regardless
    /// of the fade-out timers.
    fn update_visibility(&self) {
        if self.visible.get() || !self.display.get().autohides() {
            util::set_styles(
                &self.node,
                &[("opacity", "0.7"), ("transform", "none"), ("pointer-events", "auto")],
            );
        } else {
            util::set_styles(
                &self.node,
                &[("opacity", "0"), ("transform", "scale(0.7)"), ("pointer-events", "none")],
            );
        }
    }

    /// Pins the button to the top right corner of the target, inset when
    /// the target is too small to fit it plus its margins.
    fn update_position(&self) {
        let target = self
            .resource
            .borrow()
            .upgrade()
            .and_then(|resource| resource.instance(Role::Target))
            .and_then(|target| target.node());
        let Some(target) = target else { return };
        let Some(target) = target.dyn_ref::<HtmlElement>().cloned() else { return };
        let Some(rect) = util::first_client_rect(&target) else { return };
        let Ok(mut corner) = util::position(&target) else { return };

        corner.top += util::css_px(&target, "margin-top");
        corner.top += util::css_px(&target, "border-top-width");
        corner.left += util::css_px(&target, "margin-left");
        corner.left += rect.width();
        corner.left -= util::css_px(&target, "border-right-width");

        let mut h_margin = BUTTON_MARGIN;
        if rect.width() < BUTTON_WIDTH + BUTTON_MARGIN * 2.0 {
            h_margin = ((rect.width() - BUTTON_WIDTH) / 2.0).floor();
        }
        let mut v_margin = BUTTON_MARGIN;
        if rect.height() < BUTTON_HEIGHT + BUTTON_MARGIN * 2.0 {
            v_margin = ((rect.height() - BUTTON_HEIGHT) / 2.0).floor();
        }

        let position = if target.node_name() == "BODY" { "fixed" } else { "absolute" };
        util::set_styles(
            &self.node,
            &[
                ("position", position),
                ("left", &format!("{}px", corner.left - h_margin - BUTTON_WIDTH)),
                ("top", &format!("{}px", corner.top + v_margin)),
            ],
        );
    }
}

impl ResourceItem for Button {
    fn attach_resource(self: Rc<Self>, resource: &Rc<Resource>) {
        let target = resource
            .instance(Role::Target)
            .and_then(|target| target.node())
            .expect("button is attached after the target item");
        target
            .parent_element()
            .expect("editable target has a parent element")
            .append_child(&self.node)
            .expect("appending an owned node");
        *self.resource.borrow_mut() = Rc::downgrade(resource);
        self.state.set(resource.state());
        self.update_display();
    }

    fn detach_resource(self: Rc<Self>) {
        *self.resource.borrow_mut() = Weak::new();
        self.hide_timer.borrow_mut().take();
        self.node.remove();
    }

    fn is_valid(&self) -> bool {
        self.node.is_connected()
    }

    fn node(&self) -> Option<Element> {
        Some(self.node.clone().into())
    }

    fn on_message(self: Rc<Self>, message: &Message, _respond: Respond) -> bool {
        match message {
            Message::Internal(Internal::TargetActivated) => {
                self.update_position();
                self.show();
                self.postpone_hide(INACTIVE_HIDE);
            }
            Message::Internal(Internal::TargetDeactivated) => self.postpone_hide(BLUR_HIDE),
            Message::Internal(Internal::TargetPositionChanged) => self.update_position(),
            Message::Internal(Internal::StateChanged { state }) => {
                self.state.set(*state);
                self.update_display();
            }
            Message::Script(ScriptMessage::Loading { state }) => {
                self.loading.set(*state);
                self.update_display();
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
    use crate::item::target::Target;
    use crate::resource::ResourcePool;

    #[test]
    fn test_display_state_derivation() {
        assert_eq!(
            ButtonState::derive(ResourceState::Close, false),
            ButtonState::Close
        );
        assert_eq!(ButtonState::derive(ResourceState::Open, false), ButtonState::Open);
        // loading wins over either resource state
        assert_eq!(
            ButtonState::derive(ResourceState::Close, true),
            ButtonState::Loading
        );
        assert_eq!(ButtonState::derive(ResourceState::Open, true), ButtonState::Loading);
    }

    #[test]
    fn test_display_state_properties() {
        assert!(ButtonState::Close.autohides());
        assert!(!ButtonState::Open.autohides());
        assert!(!ButtonState::Loading.autohides());
        assert!(ButtonState::Close.clickable());
        assert!(ButtonState::Open.clickable());
        assert!(!ButtonState::Loading.clickable());
        assert!(ButtonState::Close.shows_tooltip());
        assert!(!ButtonState::Open.shows_tooltip());
        assert!(!ButtonState::Loading.shows_tooltip());
    }

    struct ClickRecorder {
        clicks: Cell<usize>,
    }

    impl ResourceItem for ClickRecorder {
        fn attach_resource(self: Rc<Self>, _resource: &Rc<Resource>) {}

        fn detach_resource(self: Rc<Self>) {}

        fn on_message(self: Rc<Self>, message: &Message, _respond: Respond) -> bool {
            if let Message::Internal(Internal::ButtonClicked) = message {
                self.clicks.set(self.clicks.get() + 1);
            }
            false
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[wasm_bindgen_test]
    fn test_click_is_swallowed_while_loading() {
        let document = util::document().unwrap();
        let textarea = document.create_element("textarea").unwrap();
        util::body().unwrap().append_child(&textarea).unwrap();

        let pool = ResourcePool::new();
        let resource = Resource::new(&pool);
        let recorder = Rc::new(ClickRecorder { clicks: Cell::new(0) });
        resource.set_instance(Role::Target, Target::new(textarea.clone()));
        resource.set_instance(Role::Controller, Rc::clone(&recorder) as Rc<dyn ResourceItem>);
        let button = Button::new();
        resource.set_instance(Role::Button, Rc::clone(&button) as Rc<dyn ResourceItem>);

        button.node_element().click();
        assert_eq!(recorder.clicks.get(), 1);

        resource.on_message(
            &Message::Script(ScriptMessage::Loading { state: true }),
            &mut |_| (),
        );
        button.node_element().click();
        assert_eq!(recorder.clicks.get(), 1);

        resource.on_message(
            &Message::Script(ScriptMessage::Loading { state: false }),
            &mut |_| (),
        );
        button.node_element().click();
        assert_eq!(recorder.clicks.get(), 2);
        textarea.remove();
    }
}
