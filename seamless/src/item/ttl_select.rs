//! The expiration dropdown shown when hovering the compose button while
//! an application is injected. It is rendered inside an extension frame
//! so host page scripts can neither read nor forge interactions with it,
//! which means showing it involves a ready handshake with the frame.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Element, HtmlElement};

use super::button::Button;
use super::floating::FloatingPanel;
use crate::message::{AppMessage, FrameSize, Internal, Message, Respond, ScriptMessage};
use crate::resource::item::ResourceItem;
use crate::resource::{Resource, Role};
use crate::util;

const SELECT_MARGIN: f64 = 0.0;

const SELECT_PAGE: &str = "applications/Message/ttlselect.html";

pub struct TtlSelect {
    weak_self: Weak<TtlSelect>,
    context_id: String,
    resource: RefCell<Weak<Resource>>,
    app_id: RefCell<String>,
    panel: RefCell<Option<Rc<FloatingPanel>>>,
    ready_callback: RefCell<Option<Box<dyn FnOnce(FrameSize)>>>,
    _listeners: RefCell<Vec<Closure<dyn FnMut(web_sys::Event)>>>,
}

impl TtlSelect {
    pub fn new(context_id: &str) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            context_id: String::from(context_id),
            resource: RefCell::new(Weak::new()),
            app_id: RefCell::new(String::new()),
            panel: RefCell::new(None),
            ready_callback: RefCell::new(None),
            _listeners: RefCell::new(Vec::new()),
        })
    }

    /// Shows the dropdown with the given expiration preselected. If the
    /// frame has to be re-added to the page, revealing waits for its
    /// ready report carrying the menu size.
    pub fn show(&self, selected_ttl: Option<String>) {
        let Some(panel) = self.panel.borrow().clone() else { return };
        if panel.is_visible() {
            return;
        }
        if self.button_node().is_none() {
            return;
        }
        panel.cancel_pending_removal();
        panel.reset_animation();
        panel.set_visible(true);

        if panel.is_appended() {
            self.reveal(selected_ttl);
        } else {
            self.assign_frame_url(panel.node());
            // the callback must be registered before the frame starts
            // loading, its ready report may beat the current task
            let weak = self.weak_self.clone();
            *self.ready_callback.borrow_mut() = Some(Box::new(move |size| {
                if let Some(select) = weak.upgrade() {
                    select.apply_frame_size(size);
                    select.reveal(selected_ttl);
                }
            }));
            panel.ensure_appended();
        }
    }

    pub fn hide(&self) {
        if let Some(panel) = self.panel.borrow().clone() {
            panel.hide();
        }
    }

    fn apply_frame_size(&self, size: FrameSize) {
        if let Some(panel) = self.panel.borrow().clone() {
            util::set_styles(
                panel.node(),
                &[
                    ("width", &format!("{}px", size.width)),
                    ("height", &format!("{}px", size.height)),
                ],
            );
        }
    }

    /// Positions the frame, asks it to lay the menu out for the chosen
    /// side, and fades in once it confirms. Hovering out anywhere along
    /// the way abandons the reveal.
    fn reveal(&self, selected_ttl: Option<String>) {
        let Some(panel) = self.panel.borrow().clone() else { return };
        let Some(button) = self.button_node() else { return };
        panel.reposition(&button);
        if !panel.is_visible() {
            return;
        }
        let initialize = AppMessage::InitializeTtlSelect {
            is_above: panel.is_above(),
            selected_ttl,
        }
        .send_to_app(&self.app_id.borrow(), true);
        let weak = self.weak_self.clone();
        spawn_local(async move {
            if JsFuture::from(initialize).await.is_err() {
                return;
            }
            let Some(select) = weak.upgrade() else { return };
            let Some(panel) = select.panel.borrow().clone() else { return };
            if panel.is_visible() {
                panel.update_visibility();
            }
        });
    }

    fn button_node(&self) -> Option<HtmlElement> {
        let resource = self.resource.borrow().upgrade()?;
        let button = resource.instance(Role::Button)?;
        Some(button.as_any().downcast_ref::<Button>()?.node_element())
    }

    /// The frame document only starts loading once the select is first
    /// shown, so editors that are never composed into fetch nothing.
    fn assign_frame_url(&self, node: &HtmlElement) {
        if node.has_attribute("src") {
            return;
        }
        let Some(resource) = self.resource.borrow().upgrade() else { return };
        node.set_attribute(
            "src",
            &super::injected_page_url(
                SELECT_PAGE,
                &self.context_id,
                resource.id(),
                &self.app_id.borrow(),
            ),
        )
        .expect("attribute assignment on an owned element");
    }

    fn create_frame(&self) -> Rc<FloatingPanel> {
        let node = util::document()
            .expect("content script runs in a document")
            .create_element("iframe")
            .expect("known element name")
            .unchecked_into::<HtmlElement>();
        for (attribute, value) in [
            ("frameborder", "0"),
            ("scrolling", "no"),
            ("allowtransparency", "true"),
        ] {
            node.set_attribute(attribute, value)
                .expect("attribute assignment on an owned element");
        }
        super::mark_injected(&node, Role::TtlSelect);
        util::set_styles(&node, &[("position", "fixed"), ("z-index", "2147483643")]);

        let mut listeners = self._listeners.borrow_mut();
        for (event_type, message) in [
            ("mouseenter", Internal::TtlSelectMouseEntered),
            ("mouseleave", Internal::TtlSelectMouseLeft),
        ] {
            let weak = self.weak_self.clone();
            let closure = Closure::wrap(Box::new(move |_: web_sys::Event| {
                let resource = weak.upgrade().and_then(|select| select.resource.borrow().upgrade());
                if let Some(resource) = resource {
                    resource.broadcast_internal(message.clone());
                }
            }) as Box<dyn FnMut(web_sys::Event)>);
            node.add_event_listener_with_callback(event_type, closure.as_ref().unchecked_ref())
                .expect("event listener registration on an owned node");
            listeners.push(closure);
        }
        FloatingPanel::new(node, SELECT_MARGIN)
    }
}

impl ResourceItem for TtlSelect {
    fn attach_resource(self: Rc<Self>, resource: &Rc<Resource>) {
        *self.app_id.borrow_mut() =
            format!("posting.ttl.{}{}", self.context_id, resource.id().as_str());
        *self.resource.borrow_mut() = Rc::downgrade(resource);
        let panel = self.create_frame();
        *self.panel.borrow_mut() = Some(panel);
    }

    fn detach_resource(self: Rc<Self>) {
        *self.resource.borrow_mut() = Weak::new();
        self.ready_callback.borrow_mut().take();
        self._listeners.borrow_mut().clear();
        if let Some(panel) = self.panel.borrow_mut().take() {
            panel.detach();
        }
    }

    fn is_valid(&self) -> bool {
        self.panel
            .borrow()
            .as_ref()
            .is_none_or(|panel| panel.is_valid())
    }

    fn node(&self) -> Option<Element> {
        self.panel
            .borrow()
            .as_ref()
            .map(|panel| panel.node().clone().into())
    }

    fn on_message(self: Rc<Self>, message: &Message, _respond: Respond) -> bool {
        if let Message::Script(ScriptMessage::TtlSelectReady { size }) = message {
            if let Some(ready) = self.ready_callback.borrow_mut().take() {
                ready(*size);
            }
        }
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
