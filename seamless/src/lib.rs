//! Content script runtime for composing private messages in place.
//! Editable elements of the host page get a compose button and, on
//! demand, an extension frame laid over them; the link to the posted
//! content is typed back into the element as if the user wrote it.

mod interop;
mod item;
mod message;
mod resource;
mod service;
mod util;

use std::panic;
use std::rc::Rc;

use js_sys::Function;
use once_cell::unsync::Lazy;
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_futures::spawn_local;

use crate::service::Service;

#[cfg(test)]
wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);

thread_local! {
    static SERVICE: Lazy<Rc<Service>> = Lazy::new(Service::new);
}

/// Query for a single extension option value.
#[derive(Serialize)]
struct OptionsQuery {
    ask: &'static str,
}

#[wasm_bindgen(start)]
fn main() -> Result<(), JsValue> {
    panic::set_hook(Box::new(console_error_panic_hook::hook));
    util::register_blur_guard().map_err(|error| JsError::new(&error.to_string()))?;
    SERVICE
        .with(|service| service.register_dom_listeners())
        .map_err(|error| JsError::new(&error.to_string()))?;
    spawn_local(async {
        let query = interop::send_to_extension(&OptionsQuery {
            ask: "options/isPostingButtonEnabled",
        });
        if let Ok(enabled) = JsFuture::from(query).await {
            SERVICE.with(|service| service.set_enabled(enabled.as_bool().unwrap_or(false)));
        }
    });
    Ok(())
}

/// Receives a message forwarded by the background script. Returns
/// whether `respond` may still be invoked after this call returns, the
/// convention keeping the extension message channel open.
#[wasm_bindgen(js_name = "onBackgroundMessage")]
pub fn on_background_message(message: JsValue, respond: Function) -> bool {
    SERVICE.with(|service| {
        service.relay(message, &mut |value| {
            drop(respond.call1(&JsValue::NULL, &value));
        })
    })
}

/// Receives a context menu click reported by the background script,
/// carrying the name of the application the user picked.
#[wasm_bindgen(js_name = "onContextMenuClicked")]
pub fn on_context_menu_clicked(app: String) {
    SERVICE.with(|service| service.on_context_menu_clicked(&app));
}
