//! Cancellable wrappers over the window timer functions. Dropping a
//! handle clears the underlying timer, so replacing the handle stored in
//! a cell both cancels and reschedules in one step.

use wasm_bindgen::prelude::*;

/// A pending one-shot callback. The timer is cleared on drop; clearing
/// an already fired timer is a no-op.
pub struct Timeout {
    id: i32,
    _closure: Closure<dyn FnMut()>,
}

impl Timeout {
    pub fn new(delay_ms: i32, callback: impl FnOnce() + 'static) -> Self {
        let mut callback = Some(callback);
        let closure = Closure::wrap(Box::new(move || {
            if let Some(callback) = callback.take() {
                callback();
            }
        }) as Box<dyn FnMut()>);
        let id = web_sys::window()
            .expect("content script runs in a window")
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                closure.as_ref().unchecked_ref(),
                delay_ms,
            )
            .expect("window timer registration");
        Self { id, _closure: closure }
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        if let Some(window) = web_sys::window() {
            window.clear_timeout_with_handle(self.id);
        }
    }
}

/// A repeating callback, cleared on drop like [Timeout].
pub struct Interval {
    id: i32,
    _closure: Closure<dyn FnMut()>,
}

impl Interval {
    pub fn new(period_ms: i32, mut callback: impl FnMut() + 'static) -> Self {
        let closure = Closure::wrap(Box::new(move || callback()) as Box<dyn FnMut()>);
        let id = web_sys::window()
            .expect("content script runs in a window")
            .set_interval_with_callback_and_timeout_and_arguments_0(
                closure.as_ref().unchecked_ref(),
                period_ms,
            )
            .expect("window timer registration");
        Self { id, _closure: closure }
    }
}

impl Drop for Interval {
    fn drop(&mut self) {
        if let Some(window) = web_sys::window() {
            window.clear_interval_with_handle(self.id);
        }
    }
}
