//! Tagged message types for the three namespaces crossing this content
//! script: `posting/contentScript/*` arriving from injected applications
//! through the background script, `posting/internal/*` circulating
//! between the items of one resource, and `posting/app/*` sent to an
//! injected application. Each former duck-typed `{action: ...}` object
//! maps to one variant here.

use std::collections::BTreeMap;

use js_sys::Promise;
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsValue;

use crate::interop;
use crate::resource::{ResourceId, ResourceState};

/// Response callback of an inbound message channel. Handlers that want
/// to answer later return `true` from `on_message` to keep it open.
pub type Respond<'a> = &'a mut dyn FnMut(JsValue);

/// Routing fields of an inbound message envelope, all optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routing {
    #[serde(default)]
    pub target_context_id: Option<String>,
    #[serde(default)]
    pub target_resource_id: Option<ResourceId>,
}

/// Messages produced by injected applications (or the background script
/// on their behalf) and consumed by content script items.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "action")]
pub enum ScriptMessage {
    #[serde(rename = "posting/contentScript/appStarted")]
    AppStarted,
    #[serde(rename = "posting/contentScript/appClosed")]
    AppClosed,
    #[serde(rename = "posting/contentScript/loading")]
    Loading { state: bool },
    #[serde(rename = "posting/contentScript/textareaFocused")]
    TextareaFocused,
    #[serde(rename = "posting/contentScript/TTLChanged")]
    TtlChanged { value: String },
    #[serde(rename = "posting/contentScript/TTLSelectReady")]
    TtlSelectReady { size: FrameSize },
    #[serde(rename = "posting/contentScript/getTargetContent")]
    GetTargetContent,
    #[serde(rename = "posting/contentScript/getTargetText")]
    GetTargetText,
    #[serde(rename = "posting/contentScript/setTargetText")]
    SetTargetText { text: String },
    #[serde(rename = "posting/contentScript/emitEnterEvent")]
    EmitEnterEvent {
        #[serde(default)]
        keys: Vec<String>,
    },
    #[serde(rename = "posting/contentScript/insertLink")]
    InsertLink { link: String },
}

/// Inner size reported by an injected frame once its document is ready.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct FrameSize {
    pub width: f64,
    pub height: f64,
}

/// Messages generated by the resource or one of its items and broadcast
/// to the sibling items of the same resource. They never cross the
/// process boundary and carry no response channel.
#[derive(Clone, Debug, PartialEq)]
pub enum Internal {
    ResourceDestroyed,
    StateChanged { state: ResourceState },
    TargetActivated,
    TargetDeactivated,
    TargetPositionChanged,
    ButtonMouseEntered,
    ButtonMouseLeft,
    ButtonClicked,
    ButtonStateChanged { show_tooltip: bool },
    CloseRequested,
    ContextMenuClicked { app: String },
    TtlSelectMouseEntered,
    TtlSelectMouseLeft,
    AppFocused,
    AppBlurred,
}

/// Any message deliverable to a resource item.
#[derive(Clone, Debug)]
pub enum Message {
    Internal(Internal),
    Script(ScriptMessage),
}

/// Messages addressed to an injected application. The background script
/// forwards them by the `targetAppId` of the envelope.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "action")]
pub enum AppMessage {
    #[serde(rename = "posting/app/setTTL")]
    SetTtl { ttl: String },
    #[serde(rename = "posting/app/userClose")]
    UserClose,
    #[serde(rename = "posting/app/stateChanged")]
    StateChanged { state: ResourceState },
    #[serde(rename = "posting/app/updateStyles")]
    UpdateStyles { styles: BTreeMap<String, String> },
    #[serde(rename = "posting/app/initializeTTLSelect", rename_all = "camelCase")]
    InitializeTtlSelect {
        is_above: bool,
        selected_ttl: Option<String>,
    },
    #[serde(rename = "posting/app/focused", rename_all = "camelCase")]
    Focused { app_id: String },
    #[serde(rename = "posting/app/blurred", rename_all = "camelCase")]
    Blurred { app_id: String },
}

impl AppMessage {
    /// Envelopes the message for one application instance and hands it to
    /// the extension channel.
    pub fn send_to_app(self, target_app_id: &str, has_response: bool) -> Promise {
        interop::send_to_extension(&AppEnvelope {
            message: self,
            target_app_id: String::from(target_app_id),
            has_response: has_response.then_some(true),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AppEnvelope {
    #[serde(flatten)]
    message: AppMessage,
    target_app_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    has_response: Option<bool>,
}

#[cfg(test)]
mod test {
    use js_sys::{JsString, Object, Reflect};
    use wasm_bindgen_test::wasm_bindgen_test;

    use super::*;

    fn object_with_action(action: &str) -> JsValue {
        let object = Object::new();
        Reflect::set(&object, &JsString::from("action"), &JsString::from(action)).unwrap();
        JsValue::from(object)
    }

    #[wasm_bindgen_test]
    fn test_script_message_parses_tagged_action() {
        let message = object_with_action("posting/contentScript/insertLink");
        Reflect::set(
            &message,
            &JsString::from("link"),
            &JsString::from("https://example.org/posts/1.json"),
        )
        .unwrap();
        assert_eq!(
            serde_wasm_bindgen::from_value::<ScriptMessage>(message).unwrap(),
            ScriptMessage::InsertLink {
                link: String::from("https://example.org/posts/1.json")
            }
        );
    }

    #[wasm_bindgen_test]
    fn test_unknown_action_is_rejected() {
        let message = object_with_action("posting/contentScript/unheardOf");
        assert!(serde_wasm_bindgen::from_value::<ScriptMessage>(message).is_err());
        let actionless = JsValue::from(Object::new());
        assert!(serde_wasm_bindgen::from_value::<ScriptMessage>(actionless).is_err());
    }

    #[wasm_bindgen_test]
    fn test_routing_fields_are_optional() {
        let bare = serde_wasm_bindgen::from_value::<Routing>(JsValue::from(Object::new()));
        let routing = bare.unwrap();
        assert!(routing.target_context_id.is_none());
        assert!(routing.target_resource_id.is_none());
    }

    #[wasm_bindgen_test]
    fn test_app_envelope_keeps_action_flat() {
        let envelope = AppEnvelope {
            message: AppMessage::SetTtl { ttl: String::from("86400") },
            target_app_id: String::from("posting.app.abc"),
            has_response: None,
        };
        let serialized = serde_wasm_bindgen::to_value(&envelope).unwrap();
        let action = Reflect::get(&serialized, &JsString::from("action")).unwrap();
        assert_eq!(action.as_string().as_deref(), Some("posting/app/setTTL"));
        let target = Reflect::get(&serialized, &JsString::from("targetAppId")).unwrap();
        assert_eq!(target.as_string().as_deref(), Some("posting.app.abc"));
    }
}
