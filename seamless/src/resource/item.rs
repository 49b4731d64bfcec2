//! The trait implemented by every attachable part of a resource.

use std::any::Any;
use std::rc::Rc;

use web_sys::Element;

use super::Resource;
use crate::message::{Message, Respond};

/// One participant of a resource, filling exactly one [Role](super::Role).
/// Items receive every message broadcast to their resource and may hold a
/// host page node that identifies them within the pool.
pub trait ResourceItem {
    /// Accepts membership of a resource. Called by
    /// [Resource::set_instance](super::Resource::set_instance), items
    /// typically remember the resource weakly to message their siblings.
    fn attach_resource(self: Rc<Self>, resource: &Rc<Resource>);

    /// Revokes membership, the counterpart of [ResourceItem::attach_resource].
    /// Called when the item is replaced or its resource is destroyed.
    fn detach_resource(self: Rc<Self>);

    /// Releases anything held beyond the resource membership, such as DOM
    /// nodes injected into the host page.
    fn destroy(self: Rc<Self>) {}

    /// Whether the item still holds everything it needs to operate.
    /// A resource with any invalid item is itself invalid.
    fn is_valid(&self) -> bool {
        true
    }

    /// The host page node this item is keyed by, if any.
    fn node(&self) -> Option<Element> {
        None
    }

    /// Handles a message broadcast to the owning resource, returning
    /// whether the response channel should be kept open for an
    /// asynchronous reply through `respond`.
    fn on_message(self: Rc<Self>, message: &Message, respond: Respond) -> bool {
        let _ = (message, respond);
        false
    }

    /// Concrete view of the item, for callers that looked it up by role
    /// and need more than the trait surface.
    fn as_any(&self) -> &dyn Any;
}
