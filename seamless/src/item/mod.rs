//! The concrete resource items: the editable target, the compose button,
//! the floating panels around it, the injected application frame, and
//! the controller coordinating them.

pub mod app;
pub mod button;
pub mod controller;
pub mod floating;
pub mod target;
pub mod tooltip;
pub mod ttl_select;

use web_sys::Element;

use crate::interop;
use crate::resource::{ResourceId, Role};

/// Attribute marking a node as injected by this extension, so that link
/// discovery and other content scripts leave it alone.
const EXCLUDE_ATTRIBUTE: &str = "data-seamless-exclude";

/// Attribute naming the role of an injected node, for diagnostics.
const ROLE_ATTRIBUTE: &str = "data-seamless-role";

fn mark_injected(element: &Element, role: Role) {
    element
        .set_attribute(EXCLUDE_ATTRIBUTE, "true")
        .expect("attribute assignment on an owned element");
    element
        .set_attribute(ROLE_ATTRIBUTE, &role.to_string())
        .expect("attribute assignment on an owned element");
}

/// Extension URL of an injected application page. The context and
/// resource identifiers in the query let the page message this content
/// script back without touching the host page channel.
fn injected_page_url(page: &str, context_id: &str, resource_id: &ResourceId, app_id: &str) -> String {
    interop::prepend_extension_base_url(&format!(
        "{}?contextid={}&resid={}&appid={}",
        page,
        js_sys::encode_uri_component(context_id),
        js_sys::encode_uri_component(resource_id.as_str()),
        js_sys::encode_uri_component(app_id),
    ))
}
