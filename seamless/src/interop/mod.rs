//! Bindings to the extension shim and the extension runtime. The shim
//! script owns the browser message channel and exposes it to this module,
//! the same way the background entry of the extension exposes
//! `addRuntimeListener`.

pub mod timers;

use js_sys::Promise;
use serde::Serialize;
use serde_wasm_bindgen::Serializer;
use wasm_bindgen::prelude::*;

#[wasm_bindgen(raw_module = "./content.js")]
extern "C" {
    #[wasm_bindgen(js_name = "messageExtension")]
    fn message_extension(message: JsValue) -> Promise;
}

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["browser", "runtime"], js_name = "getURL")]
    pub fn prepend_extension_base_url(path: &str) -> String;
}

/// Sends a message through the extension channel, resolving with the
/// response once the receiver replies.
pub fn send_to_extension(message: &impl Serialize) -> Promise {
    match message.serialize(MAP_SERIALIZER) {
        Ok(serialized) => message_extension(serialized),
        Err(error) => Promise::reject(&JsValue::from(error)),
    }
}

const MAP_SERIALIZER: &Serializer = &Serializer::new().serialize_maps_as_objects(true);
