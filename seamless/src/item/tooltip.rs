//! The hint text shown when hovering the compose button while no
//! application is injected. Visibility is driven by the controller, the
//! tooltip itself only renders.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use wasm_bindgen::JsCast;
use web_sys::{Element, HtmlElement};

use super::button::Button;
use super::floating::FloatingPanel;
use crate::resource::item::ResourceItem;
use crate::resource::{Resource, Role};
use crate::util;

const TOOLTIP_MARGIN: f64 = 5.0;

pub struct Tooltip {
    panel: Rc<FloatingPanel>,
    resource: RefCell<Weak<Resource>>,
}

impl Tooltip {
    pub fn new() -> Rc<Self> {
        let node = util::document()
            .expect("content script runs in a document")
            .create_element("div")
            .expect("known element name")
            .unchecked_into::<HtmlElement>();
        util::set_styles(
            &node,
            &[
                ("padding", "5px"),
                ("background", "rgba(0, 0, 0, 0.7)"),
                ("color", "#FFF"),
                ("font-size", "12px"),
                ("line-height", "15px"),
                ("position", "fixed"),
                ("font-family", "Seravek, Segoe UI, Verdana, Arial"),
                ("z-index", "2147483642"),
            ],
        );
        super::mark_injected(&node, Role::Tooltip);
        Rc::new(Self {
            panel: FloatingPanel::new(node, TOOLTIP_MARGIN),
            resource: RefCell::new(Weak::new()),
        })
    }

    pub fn show(&self, text: &str) {
        let Some(button) = self.button_node() else { return };
        self.panel.node().set_text_content(Some(text));
        self.panel.show(&button);
    }

    pub fn hide(&self) {
        self.panel.hide();
    }

    fn button_node(&self) -> Option<HtmlElement> {
        let resource = self.resource.borrow().upgrade()?;
        let button = resource.instance(Role::Button)?;
        let node = button.as_any().downcast_ref::<Button>()?.node_element();
        Some(node)
    }
}

impl ResourceItem for Tooltip {
    fn attach_resource(self: Rc<Self>, resource: &Rc<Resource>) {
        *self.resource.borrow_mut() = Rc::downgrade(resource);
    }

    fn detach_resource(self: Rc<Self>) {
        *self.resource.borrow_mut() = Weak::new();
        self.panel.detach();
    }

    fn is_valid(&self) -> bool {
        self.panel.is_valid()
    }

    fn node(&self) -> Option<Element> {
        Some(self.panel.node().clone().into())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
