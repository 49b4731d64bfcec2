//! Entry point logic of the content script: watches the host page for
//! editable elements being used, assembles resources around them, and
//! relays extension messages into the pool.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use web_sys::Element;

use crate::item::button::Button;
use crate::item::controller::Controller;
use crate::item::target::Target;
use crate::item::tooltip::Tooltip;
use crate::item::ttl_select::TtlSelect;
use crate::message::{Internal, Message, Respond, Routing, ScriptMessage};
use crate::resource::{Resource, ResourcePool, Role};
use crate::util;
use crate::util::errors::CustomError;

pub struct Service {
    pool: Rc<ResourcePool>,
    context_id: String,
    enabled: Cell<bool>,
    last_right_click_target: RefCell<Option<Element>>,
}

impl Service {
    pub fn new() -> Rc<Self> {
        Self::with_pool(ResourcePool::new())
    }

    pub fn with_pool(pool: Rc<ResourcePool>) -> Rc<Self> {
        Rc::new(Self {
            pool,
            context_id: generate_context_id(),
            enabled: Cell::new(false),
            last_right_click_target: RefCell::new(None),
        })
    }

    pub fn pool(&self) -> &Rc<ResourcePool> {
        &self.pool
    }

    /// Identifier distinguishing this frame's content script instance,
    /// matched against the routing fields of extension messages.
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Gates resource creation, set from the extension option once its
    /// value arrives.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    /// Assembles the standing items of a resource around an editable
    /// element and registers it with the pool. The application item only
    /// joins later, when composing actually starts.
    pub fn create_resource(&self, target_node: Element) -> Rc<Resource> {
        let resource = Resource::new(&self.pool);
        resource.set_instance(Role::Controller, Controller::new(&self.context_id));
        resource.set_instance(Role::Target, Target::new(target_node));
        resource.set_instance(Role::Button, Button::new());
        resource.set_instance(Role::Tooltip, Tooltip::new());
        resource.set_instance(Role::TtlSelect, TtlSelect::new(&self.context_id));
        resource.attach();
        resource
    }

    /// Focus or click landed on an element: if it is editable, find or
    /// create its resource and announce the activation.
    pub fn on_activated(&self, target: &Element) {
        if !self.enabled.get() {
            return;
        }
        let Some(target) = editable_root(target) else { return };
        let resource = match self.pool.get_by_node(Role::Target, &target) {
            Some(resource) => resource,
            None => self.create_resource(target),
        };
        resource.broadcast_internal(Internal::TargetActivated);
    }

    /// An editable element lost focus. Without a known resource there is
    /// nothing to tell, the host page may have rebuilt the element.
    pub fn on_deactivated(&self, target: &Element) {
        let Some(target) = editable_root(target) else { return };
        if let Some(resource) = self.pool.get_by_node(Role::Target, &target) {
            resource.broadcast_internal(Internal::TargetDeactivated);
        }
    }

    /// Remembers the node under the pointer on right click, the context
    /// menu click report arriving later carries no target of its own.
    pub fn note_right_click(&self, target: Element) {
        *self.last_right_click_target.borrow_mut() = Some(target);
    }

    pub fn on_context_menu_clicked(&self, app: &str) {
        let Some(target) = self.last_right_click_target.borrow().clone() else { return };
        let Some(target) = editable_root(&target) else { return };
        if let Some(resource) = self.pool.get_by_node(Role::Target, &target) {
            resource.broadcast_internal(Internal::ContextMenuClicked {
                app: String::from(app),
            });
        }
    }

    /// Relays a message from the extension into the pool. Messages not
    /// addressed to this context, or of no known shape, are ignored.
    /// Returns whether any receiver keeps the response channel open.
    pub fn relay(&self, message: JsValue, respond: Respond) -> bool {
        let Ok(routing) = serde_wasm_bindgen::from_value::<Routing>(message.clone()) else {
            return false;
        };
        if routing.target_context_id.as_deref() != Some(&self.context_id) {
            return false;
        }
        let Ok(script_message) = serde_wasm_bindgen::from_value::<ScriptMessage>(message) else {
            return false;
        };
        self.pool.broadcast(
            &Message::Script(script_message),
            routing.target_resource_id.as_ref(),
            respond,
        )
    }

    /// Installs the page listeners feeding this service. Activation uses
    /// the capture phase for focus events since they don't bubble, and
    /// frame removals are watched to synthesize the blur the frame can
    /// no longer report itself.
    pub fn register_dom_listeners(self: &Rc<Self>) -> Result<(), CustomError> {
        let document = util::document()?;
        let listen = |event_type: &str,
                      capture: bool,
                      handler: Box<dyn FnMut(web_sys::Event)>|
         -> Result<(), CustomError> {
            let closure = Closure::wrap(handler);
            document
                .add_event_listener_with_callback_and_bool(
                    event_type,
                    closure.as_ref().unchecked_ref(),
                    capture,
                )
                .or(Err(CustomError::StandardMismatch {
                    message: String::from("document refused an event listener"),
                }))?;
            closure.forget();
            Ok(())
        };

        let service = Rc::clone(self);
        listen(
            "click",
            false,
            Box::new(move |event| {
                if let Some(target) = event_target(&event) {
                    service.on_activated(&target);
                }
            }),
        )?;
        let service = Rc::clone(self);
        listen(
            "focus",
            true,
            Box::new(move |event| {
                if let Some(target) = event_target(&event) {
                    service.on_activated(&target);
                }
            }),
        )?;
        let service = Rc::clone(self);
        listen(
            "blur",
            true,
            Box::new(move |event| {
                if let Some(target) = event_target(&event) {
                    service.on_deactivated(&target);
                }
            }),
        )?;
        let service = Rc::clone(self);
        listen(
            "mousedown",
            true,
            Box::new(move |event| {
                let right_button = event
                    .dyn_ref::<web_sys::MouseEvent>()
                    .is_some_and(|event| event.button() == 2);
                if right_button {
                    if let Some(target) = event_target(&event) {
                        service.note_right_click(target);
                    }
                }
            }),
        )?;
        let service = Rc::clone(self);
        listen(
            "DOMNodeRemoved",
            false,
            Box::new(move |event| {
                let Some(target) = event_target(&event) else { return };
                if target.node_name() != "IFRAME" {
                    return;
                }
                if let Some(resource) = service.pool.get_by_node(Role::App, &target) {
                    resource.broadcast_internal(Internal::AppBlurred);
                }
            }),
        )?;
        Ok(())
    }
}

fn event_target(event: &web_sys::Event) -> Option<Element> {
    event.target()?.dyn_ref::<Element>().cloned()
}

/// The outermost editable element around an event target, [None] when
/// the target doesn't take text input at all.
fn editable_root(target: &Element) -> Option<Element> {
    if !util::is_editable(target) {
        return None;
    }
    util::outermost_editable(target)
}

fn generate_context_id() -> String {
    format!(
        "{:x}{:x}",
        (js_sys::Math::random() * f64::from(u32::MAX)) as u64,
        js_sys::Date::now() as u64,
    )
}

#[cfg(test)]
mod test {
    use js_sys::{JsString, Object, Reflect};
    use wasm_bindgen_test::wasm_bindgen_test;

    use super::*;

    fn textarea_in_body() -> Element {
        let node = util::document().unwrap().create_element("textarea").unwrap();
        util::body().unwrap().append_child(&node).unwrap();
        node
    }

    fn cleanup(service: &Service, node: &Element) {
        for resource in
            std::iter::from_fn(|| service.pool().get_by_node(Role::Target, node))
        {
            resource.destroy();
        }
        node.remove();
    }

    #[wasm_bindgen_test]
    fn test_activation_reuses_the_existing_resource() {
        let node = textarea_in_body();
        let service = Service::new();
        service.set_enabled(true);
        service.on_activated(&node);
        service.on_activated(&node);
        assert_eq!(service.pool().len(), 1);
        cleanup(&service, &node);
    }

    #[wasm_bindgen_test]
    fn test_disabled_service_creates_nothing() {
        let node = textarea_in_body();
        let service = Service::new();
        service.on_activated(&node);
        assert!(service.pool().is_empty());
        node.remove();
    }

    #[wasm_bindgen_test]
    fn test_non_editable_elements_are_ignored() {
        let node = util::document().unwrap().create_element("div").unwrap();
        util::body().unwrap().append_child(&node).unwrap();
        let service = Service::new();
        service.set_enabled(true);
        service.on_activated(&node);
        assert!(service.pool().is_empty());
        node.remove();
    }

    #[wasm_bindgen_test]
    fn test_relay_filters_by_context_id() {
        let node = textarea_in_body();
        let service = Service::new();
        service.set_enabled(true);
        service.on_activated(&node);
        let resource = service.pool().get_by_node(Role::Target, &node).unwrap();

        let message = |context_id: &str| {
            let object = Object::new();
            for (key, value) in [
                ("action", "posting/contentScript/TTLChanged"),
                ("value", "86400"),
                ("targetContextId", context_id),
            ] {
                Reflect::set(&object, &JsString::from(key), &JsString::from(value)).unwrap();
            }
            JsValue::from(object)
        };

        service.relay(message("someone else"), &mut |_| ());
        assert_eq!(resource.ttl(), None);
        service.relay(message(service.context_id()), &mut |_| ());
        assert_eq!(resource.ttl(), Some(String::from("86400")));
        cleanup(&service, &node);
    }
}
