//! The editable element a resource is built around. Provides content
//! access for the injected application, emulated input for link
//! insertion, and a poller announcing geometry changes to the other
//! items.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use wasm_bindgen::prelude::*;
use web_sys::{
    Element, HtmlElement, HtmlTextAreaElement, InputEvent, InputEventInit, KeyboardEvent,
    KeyboardEventInit,
};

use crate::interop::timers::Interval;
use crate::message::{Internal, Message, Respond, ScriptMessage};
use crate::resource::item::ResourceItem;
use crate::resource::{Resource, ResourceState};
use crate::util;

/// Polling period of the geometry monitor. There is no resize event for
/// arbitrary elements, so geometry is sampled.
const RESIZE_POLL_MS: i32 = 300;

#[derive(Clone, Copy, PartialEq)]
struct Bounds {
    width: f64,
    height: f64,
    top: f64,
    left: f64,
}

pub struct Target {
    node: Element,
    resource: RefCell<Weak<Resource>>,
    activated: Cell<bool>,
    state: Cell<ResourceState>,
    monitor: RefCell<Option<Interval>>,
    last_bounds: Cell<Option<Bounds>>,
}

impl Target {
    pub fn new(node: Element) -> Rc<Self> {
        Rc::new(Self {
            node,
            resource: RefCell::new(Weak::new()),
            activated: Cell::new(false),
            state: Cell::new(ResourceState::Close),
            monitor: RefCell::new(None),
            last_bounds: Cell::new(None),
        })
    }

    /// Content handed to the application when composing starts, markup
    /// for rich text editors.
    pub fn content(&self) -> String {
        if let Some(textarea) = self.node.dyn_ref::<HtmlTextAreaElement>() {
            textarea.value()
        } else {
            self.node.inner_html()
        }
    }

    /// Plain text variant of [Target::content].
    pub fn text(&self) -> String {
        if let Some(textarea) = self.node.dyn_ref::<HtmlTextAreaElement>() {
            textarea.value()
        } else {
            self.node
                .dyn_ref::<HtmlElement>()
                .map(HtmlElement::inner_text)
                .unwrap_or_default()
        }
    }

    pub fn set_text(&self, text: &str) {
        if let Some(textarea) = self.node.dyn_ref::<HtmlTextAreaElement>() {
            textarea.set_value(text);
        } else if let Some(element) = self.node.dyn_ref::<HtmlElement>() {
            element.set_inner_text(text);
        }
    }

    /// Replaces the target content with the link to the posted content,
    /// emulating the input events host page scripts listen for. Synthetic
    /// input events carry no default action, so the text is also written
    /// directly.
    pub fn insert_link(&self, link: &str) {
        self.set_text(link);
        self.dispatch_text_input(link);
        // a trailing space, typed key by key, nudges the host page into
        // processing the inserted link
        self.dispatch_keyboard_event("keydown", " ", 32, &[]);
        self.dispatch_keyboard_event("keypress", " ", 32, &[]);
        self.set_text(&format!("{link} "));
        self.dispatch_text_input(" ");
        self.dispatch_keyboard_event("keyup", " ", 32, &[]);
    }

    /// Emulates pressing enter on the target with the given modifier
    /// keys held, for host pages that submit on enter.
    pub fn emit_enter_event(&self, modifiers: &[String]) {
        for event_type in ["keydown", "keypress", "keyup"] {
            self.dispatch_keyboard_event(event_type, "Enter", 13, modifiers);
        }
    }

    fn dispatch_keyboard_event(&self, event_type: &str, key: &str, key_code: u32, modifiers: &[String]) {
        let init = KeyboardEventInit::new();
        init.set_bubbles(true);
        init.set_cancelable(true);
        init.set_key(key);
        init.set_key_code(key_code);
        init.set_char_code(key_code);
        init.set_ctrl_key(modifiers.iter().any(|key| key == "ctrl"));
        init.set_shift_key(modifiers.iter().any(|key| key == "shift"));
        init.set_alt_key(modifiers.iter().any(|key| key == "alt"));
        init.set_meta_key(modifiers.iter().any(|key| key == "meta"));
        let event = KeyboardEvent::new_with_keyboard_event_init_dict(event_type, &init)
            .expect("keyboard event construction from an owned dictionary");
        let _ = self.node.dispatch_event(&event);
    }

    fn dispatch_text_input(&self, data: &str) {
        let init = InputEventInit::new();
        init.set_bubbles(true);
        init.set_cancelable(true);
        init.set_data(Some(data));
        let event = InputEvent::new_with_event_init_dict("textInput", &init)
            .expect("input event construction from an owned dictionary");
        let _ = self.node.dispatch_event(&event);
    }

    /// Samples the target geometry and announces a change to siblings.
    /// An invalid target stops its own monitor.
    fn detect_resize(&self) {
        if !self.is_valid() {
            self.stop_monitor();
            return;
        }
        let resource = self.resource.borrow().upgrade();
        let Some(resource) = resource else { return };
        let Some(rect) = util::first_client_rect(&self.node) else { return };
        let Some(element) = self.node.dyn_ref::<HtmlElement>() else { return };
        let Ok(corner) = util::position(element) else { return };
        let bounds = Bounds {
            width: rect.width(),
            height: rect.height(),
            top: corner.top,
            left: corner.left,
        };
        if self.last_bounds.replace(Some(bounds)) != Some(bounds) {
            resource.broadcast_internal(Internal::TargetPositionChanged);
        }
    }

    /// The monitor runs while the target is focused or an application is
    /// composing into it, and stops once neither holds.
    fn update_monitor(self: &Rc<Self>) {
        if self.activated.get() || self.state.get() == ResourceState::Open {
            self.start_monitor();
        } else if !self.activated.get() && self.state.get() == ResourceState::Close {
            self.stop_monitor();
        }
    }

    fn start_monitor(self: &Rc<Self>) {
        if self.monitor.borrow().is_some() {
            return;
        }
        let weak = Rc::downgrade(self);
        let poller = Interval::new(RESIZE_POLL_MS, move || {
            if let Some(target) = weak.upgrade() {
                target.detect_resize();
            }
        });
        *self.monitor.borrow_mut() = Some(poller);
    }

    fn stop_monitor(&self) {
        self.monitor.borrow_mut().take();
    }

    #[cfg(test)]
    pub(crate) fn is_monitoring(&self) -> bool {
        self.monitor.borrow().is_some()
    }

    fn respond_content(&self, content: Option<String>, respond: Respond) -> bool {
        match content {
            Some(content) => respond(JsValue::from_str(&content)),
            None => respond(JsValue::FALSE),
        }
        true
    }
}

impl ResourceItem for Target {
    fn attach_resource(self: Rc<Self>, resource: &Rc<Resource>) {
        *self.resource.borrow_mut() = Rc::downgrade(resource);
    }

    fn detach_resource(self: Rc<Self>) {
        *self.resource.borrow_mut() = Weak::new();
    }

    /// The editable element belongs to the host page, so only the
    /// monitor is released.
    fn destroy(self: Rc<Self>) {
        self.stop_monitor();
    }

    fn is_valid(&self) -> bool {
        self.node.is_connected()
    }

    fn node(&self) -> Option<Element> {
        Some(self.node.clone())
    }

    fn on_message(self: Rc<Self>, message: &Message, respond: Respond) -> bool {
        match message {
            Message::Internal(Internal::StateChanged { state }) => {
                self.state.set(*state);
                match state {
                    ResourceState::Open => self.detect_resize(),
                    // give focus back once composing ends
                    ResourceState::Close => {
                        if let Some(element) = self.node.dyn_ref::<HtmlElement>() {
                            let _ = element.focus();
                        }
                    }
                }
                self.update_monitor();
                false
            }
            Message::Internal(Internal::TargetActivated) => {
                self.activated.set(true);
                self.update_monitor();
                false
            }
            Message::Internal(Internal::TargetDeactivated) => {
                self.activated.set(false);
                self.update_monitor();
                false
            }
            Message::Script(ScriptMessage::GetTargetContent) => {
                self.respond_content(self.is_valid().then(|| self.content()), respond)
            }
            Message::Script(ScriptMessage::GetTargetText) => {
                self.respond_content(self.is_valid().then(|| self.text()), respond)
            }
            Message::Script(ScriptMessage::SetTargetText { text }) => {
                if !self.is_valid() {
                    respond(JsValue::FALSE);
                } else {
                    self.set_text(text);
                    respond(JsValue::TRUE);
                }
                true
            }
            Message::Script(ScriptMessage::EmitEnterEvent { keys }) => {
                if !self.is_valid() {
                    respond(JsValue::FALSE);
                } else {
                    self.emit_enter_event(keys);
                    respond(JsValue::TRUE);
                }
                true
            }
            Message::Script(ScriptMessage::InsertLink { link }) => {
                if !self.is_valid() {
                    respond(JsValue::FALSE);
                } else {
                    self.insert_link(link);
                    respond(JsValue::TRUE);
                }
                true
            }
            _ => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod test {
    use wasm_bindgen_test::wasm_bindgen_test;

    use super::*;
    use crate::resource::{ResourcePool, Role};

    fn target_in_body(html_tag: &str) -> (Element, Rc<Target>, Rc<Resource>) {
        let document = util::document().unwrap();
        let node = document.create_element(html_tag).unwrap();
        util::body().unwrap().append_child(&node).unwrap();
        let pool = ResourcePool::new();
        let resource = Resource::new(&pool);
        let target = Target::new(node.clone());
        resource.set_instance(Role::Target, Rc::clone(&target) as Rc<dyn ResourceItem>);
        (node, target, resource)
    }

    #[wasm_bindgen_test]
    fn test_content_request_returns_markup_and_text() {
        let (node, target, resource) = target_in_body("div");
        node.set_inner_html("<p>123</p>");
        let mut responses = Vec::new();
        resource.on_message(&Message::Script(ScriptMessage::GetTargetContent), &mut |value| {
            responses.push(value)
        });
        resource.on_message(&Message::Script(ScriptMessage::GetTargetText), &mut |value| {
            responses.push(value)
        });
        assert_eq!(responses[0].as_string().as_deref(), Some("<p>123</p>"));
        assert_eq!(responses[1].as_string().as_deref(), Some("123"));
        drop(target);
        node.remove();
    }

    #[wasm_bindgen_test]
    fn test_content_request_on_detached_node_is_refused() {
        let (node, _target, resource) = target_in_body("textarea");
        node.remove();
        let mut response = JsValue::NULL;
        resource.on_message(&Message::Script(ScriptMessage::GetTargetContent), &mut |value| {
            response = value
        });
        assert_eq!(response, JsValue::FALSE);
    }

    #[wasm_bindgen_test]
    fn test_insert_link_replaces_content_and_emulates_typing() {
        let (node, _target, resource) = target_in_body("textarea");
        node.dyn_ref::<HtmlTextAreaElement>().unwrap().set_value("draft text");

        let text_inputs = Rc::new(RefCell::new(Vec::<String>::new()));
        let recorded = Rc::clone(&text_inputs);
        let listener = Closure::wrap(Box::new(move |event: InputEvent| {
            recorded.borrow_mut().push(event.data().unwrap_or_default());
        }) as Box<dyn FnMut(InputEvent)>);
        node.add_event_listener_with_callback("textInput", listener.as_ref().unchecked_ref())
            .unwrap();

        let mut response = JsValue::NULL;
        resource.on_message(
            &Message::Script(ScriptMessage::InsertLink {
                link: String::from("https://example.org/posts/1"),
            }),
            &mut |value| response = value,
        );
        assert_eq!(response, JsValue::TRUE);
        assert_eq!(
            node.dyn_ref::<HtmlTextAreaElement>().unwrap().value().trim(),
            "https://example.org/posts/1"
        );
        assert_eq!(
            *text_inputs.borrow(),
            vec![String::from("https://example.org/posts/1"), String::from(" ")]
        );
        node.remove();
    }

    #[wasm_bindgen_test]
    fn test_set_text_request_is_confirmed() {
        let (node, _target, resource) = target_in_body("textarea");
        let mut response = JsValue::NULL;
        let kept_open = resource.on_message(
            &Message::Script(ScriptMessage::SetTargetText {
                text: String::from("replacement"),
            }),
            &mut |value| response = value,
        );
        assert!(kept_open);
        assert_eq!(response, JsValue::TRUE);
        assert_eq!(node.dyn_ref::<HtmlTextAreaElement>().unwrap().value(), "replacement");
        node.remove();
    }

    #[wasm_bindgen_test]
    fn test_monitor_follows_activation_and_state() {
        let (node, target, resource) = target_in_body("textarea");
        assert!(!target.is_monitoring());

        resource.broadcast_internal(Internal::TargetActivated);
        assert!(target.is_monitoring());

        resource.broadcast_internal(Internal::TargetDeactivated);
        assert!(!target.is_monitoring());

        // composing keeps the monitor running without focus
        resource.broadcast_internal(Internal::TargetActivated);
        resource.set_state(ResourceState::Open);
        resource.broadcast_internal(Internal::TargetDeactivated);
        assert!(target.is_monitoring());

        resource.set_state(ResourceState::Close);
        assert!(!target.is_monitoring());
        node.remove();
    }
}
