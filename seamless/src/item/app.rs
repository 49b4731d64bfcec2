//! The compose application frame injected over the editable element.
//! The frame document belongs to the extension, so everything it needs
//! from the host page travels through the extension message channel.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use wasm_bindgen::prelude::*;
use web_sys::{Element, HtmlElement};

use crate::interop;
use crate::message::{AppMessage, Internal, Message, Respond, ScriptMessage};
use crate::resource::item::ResourceItem;
use crate::resource::{Resource, ResourceState, Role};
use crate::util;

/// Border styles copied onto the frame so it takes the exact place of
/// the editable element.
const BORDER_STYLES: [&str; 12] = [
    "border-bottom-color",
    "border-bottom-style",
    "border-bottom-width",
    "border-left-color",
    "border-left-style",
    "border-left-width",
    "border-right-color",
    "border-right-style",
    "border-right-width",
    "border-top-color",
    "border-top-style",
    "border-top-width",
];

/// Text styles forwarded into the frame so typing there feels like
/// typing into the editable element.
const INHERIT_STYLES: [&str; 19] = [
    "color",
    "font-family",
    "font-size",
    "font-stretch",
    "font-style",
    "font-variant",
    "font-weight",
    "letter-spacing",
    "line-height",
    "padding-bottom",
    "padding-left",
    "padding-right",
    "padding-top",
    "text-align",
    "text-anchor",
    "text-decoration",
    "text-indent",
    "text-shadow",
    "text-transform",
];

pub struct App {
    weak_self: Weak<App>,
    context_id: String,
    app_name: RefCell<String>,
    app_id: RefCell<String>,
    resource: RefCell<Weak<Resource>>,
    node: RefCell<Option<HtmlElement>>,
    _listeners: RefCell<Vec<Closure<dyn FnMut(web_sys::Event)>>>,
}

impl App {
    pub fn new(app_name: &str, context_id: &str) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            context_id: String::from(context_id),
            app_name: RefCell::new(String::from(app_name)),
            app_id: RefCell::new(String::new()),
            resource: RefCell::new(Weak::new()),
            node: RefCell::new(None),
            _listeners: RefCell::new(Vec::new()),
        })
    }

    /// Re-injects the frame for the given application page, for reuse of
    /// the item after a close removed its previous frame.
    pub fn inject_frame(&self, app_name: &str) {
        *self.app_name.borrow_mut() = String::from(app_name);
        self.build_frame();
    }

    fn build_frame(&self) {
        let target = self
            .resource
            .borrow()
            .upgrade()
            .and_then(|resource| resource.instance(Role::Target))
            .and_then(|target| target.node());
        let Some(target) = target else { return };
        let Some(resource) = self.resource.borrow().upgrade() else { return };

        let node = util::document()
            .expect("content script runs in a document")
            .create_element("iframe")
            .expect("known element name")
            .unchecked_into::<HtmlElement>();
        for (attribute, value) in [("frameborder", "0"), ("scrolling", "yes")] {
            node.set_attribute(attribute, value)
                .expect("attribute assignment on an owned element");
        }
        super::mark_injected(&node, Role::App);
        node.set_attribute(
            "src",
            &super::injected_page_url(
                &format!("applications/{}/seamless.html", self.app_name.borrow()),
                &self.context_id,
                resource.id(),
                &self.app_id.borrow(),
            ),
        )
        .expect("attribute assignment on an owned element");

        let position = if target.node_name() == "BODY" { "fixed" } else { "absolute" };
        util::set_styles(
            &node,
            &[
                ("width", "0"),
                ("height", "0"),
                ("display", "none"),
                ("box-sizing", "border-box"),
                ("z-index", "2147483640"),
                ("position", position),
            ],
        );

        // frames report blur, focus is reported from inside the frame
        let weak = self.weak_self.clone();
        let on_blur = Closure::wrap(Box::new(move |_: web_sys::Event| {
            let resource = weak.upgrade().and_then(|app| app.resource.borrow().upgrade());
            if let Some(resource) = resource {
                resource.broadcast_internal(Internal::AppBlurred);
            }
        }) as Box<dyn FnMut(web_sys::Event)>);
        node.add_event_listener_with_callback("blur", on_blur.as_ref().unchecked_ref())
            .expect("event listener registration on an owned node");
        self._listeners.borrow_mut().push(on_blur);

        target
            .parent_element()
            .expect("editable target has a parent element")
            .append_child(&node)
            .expect("appending an owned node");
        *self.node.borrow_mut() = Some(node);
    }

    fn remove_frame(&self) {
        if let Some(node) = self.node.borrow_mut().take() {
            node.remove();
        }
    }

    fn message_app(&self, message: AppMessage) {
        let _ = message.send_to_app(&self.app_id.borrow(), false);
    }

    /// Lays the frame exactly over the editable element.
    fn reposition(&self) {
        let target = self
            .resource
            .borrow()
            .upgrade()
            .and_then(|resource| resource.instance(Role::Target))
            .and_then(|target| target.node());
        let Some(target) = target else { return };
        let Some(target) = target.dyn_ref::<HtmlElement>().cloned() else { return };
        let Some(node) = self.node.borrow().clone() else { return };
        let Some(rect) = util::first_client_rect(&target) else { return };
        let Ok(mut corner) = util::position(&target) else { return };
        corner.top += util::css_px(&target, "margin-top");
        corner.left += util::css_px(&target, "margin-left");
        util::set_styles(
            &node,
            &[
                ("left", &format!("{}px", corner.left)),
                ("top", &format!("{}px", corner.top)),
                ("width", &format!("{}px", rect.width())),
                ("height", &format!("{}px", rect.height())),
                ("display", "block"),
            ],
        );
    }

    /// Mirrors the target's border on the frame and forwards its text
    /// styles to the application document.
    fn copy_style(&self) {
        let target = self
            .resource
            .borrow()
            .upgrade()
            .and_then(|resource| resource.instance(Role::Target))
            .and_then(|target| target.node());
        let Some(target) = target else { return };
        let Some(node) = self.node.borrow().clone() else { return };

        for property in BORDER_STYLES {
            if let Ok(value) = util::css(&target, property) {
                util::set_styles(&node, &[(property, &value)]);
            }
        }
        let mut styles = BTreeMap::new();
        for property in INHERIT_STYLES {
            if let Ok(value) = util::css(&target, property) {
                styles.insert(String::from(property), value);
            }
        }
        self.message_app(AppMessage::UpdateStyles { styles });
    }

    fn on_state_changed(&self, state: ResourceState) {
        match state {
            ResourceState::Open => {
                self.copy_style();
                util::block_window_switching_blur_event();
                if let Some(node) = self.node.borrow().clone() {
                    let _ = node.focus();
                }
            }
            ResourceState::Close => self.remove_frame(),
        }
        self.message_app(AppMessage::StateChanged { state });
    }
}

impl ResourceItem for App {
    fn attach_resource(self: Rc<Self>, resource: &Rc<Resource>) {
        *self.app_id.borrow_mut() =
            format!("posting.app.{}{}", self.context_id, resource.id().as_str());
        *self.resource.borrow_mut() = Rc::downgrade(resource);
        self.build_frame();
    }

    fn detach_resource(self: Rc<Self>) {
        *self.resource.borrow_mut() = Weak::new();
        self._listeners.borrow_mut().clear();
        self.remove_frame();
    }

    fn destroy(self: Rc<Self>) {
        self.remove_frame();
    }

    /// An app without a frame is fine, the frame only exists while the
    /// resource is open.
    fn is_valid(&self) -> bool {
        self.node
            .borrow()
            .as_ref()
            .is_none_or(|node| node.is_connected())
    }

    fn node(&self) -> Option<Element> {
        self.node.borrow().clone().map(Into::into)
    }

    fn on_message(self: Rc<Self>, message: &Message, _respond: Respond) -> bool {
        match message {
            Message::Internal(Internal::AppFocused) => {
                let _ = interop::send_to_extension(&AppMessage::Focused {
                    app_id: self.app_id.borrow().clone(),
                });
            }
            Message::Internal(Internal::AppBlurred) => {
                let _ = interop::send_to_extension(&AppMessage::Blurred {
                    app_id: self.app_id.borrow().clone(),
                });
            }
            Message::Internal(Internal::TargetPositionChanged) => {
                let open = self
                    .resource
                    .borrow()
                    .upgrade()
                    .is_some_and(|resource| resource.state() == ResourceState::Open);
                if open {
                    self.reposition();
                }
            }
            Message::Internal(Internal::StateChanged { state }) => self.on_state_changed(*state),
            Message::Internal(Internal::CloseRequested) => {
                self.message_app(AppMessage::UserClose)
            }
            Message::Script(ScriptMessage::TextareaFocused) => {
                let resource = self.resource.borrow().upgrade();
                if let Some(resource) = resource {
                    resource.broadcast_internal(Internal::AppFocused);
                }
            }
            Message::Script(ScriptMessage::AppStarted) => {
                let resource = self.resource.borrow().upgrade();
                if let Some(resource) = resource {
                    resource.set_state(ResourceState::Open);
                    self.reposition();
                }
            }
            Message::Script(ScriptMessage::AppClosed) => {
                let resource = self.resource.borrow().upgrade();
                if let Some(resource) = resource {
                    resource.set_state(ResourceState::Close);
                }
            }
            Message::Script(ScriptMessage::TtlChanged { value }) => {
                self.message_app(AppMessage::SetTtl { ttl: value.clone() })
            }
            _ => {}
        }
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
