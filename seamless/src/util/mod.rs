//! Host page helpers: element geometry in the style of the jQuery
//! `offset`/`position` family, editable element detection, and the
//! window blur guard used when moving focus into an injected frame.

pub mod errors;

use std::cell::Cell;

use wasm_bindgen::prelude::*;
use web_sys::{Document, DomRect, Element, HtmlElement, HtmlTextAreaElement, Window};

use self::errors::CustomError;

pub fn window() -> Result<Window, CustomError> {
    web_sys::window().ok_or(CustomError::StandardMismatch {
        message: String::from("content script must run in a window"),
    })
}

pub fn document() -> Result<Document, CustomError> {
    window()?.document().ok_or(CustomError::StandardMismatch {
        message: String::from("window must carry a document"),
    })
}

/// Computed style of an element, empty string if the property is unknown.
pub fn css(element: &Element, property: &str) -> Result<String, CustomError> {
    let error = || CustomError::StandardMismatch {
        message: format!("computed style for `{}` is unavailable", property),
    };
    let style = window()?
        .get_computed_style(element)
        .or_else(|_| Err(error()))?
        .ok_or_else(error)?;
    style.get_property_value(property).or_else(|_| Err(error()))
}

/// Numeric computed style in pixels, zero when empty or unparsable.
pub fn css_px(element: &Element, property: &str) -> f64 {
    css(element, property)
        .ok()
        .and_then(|value| value.trim_end_matches("px").parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Coordinates relative to either the document or an offset parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coordinates {
    pub top: f64,
    pub left: f64,
}

/// The closest positioned ancestor, falling back to the document element.
pub fn offset_parent(element: &HtmlElement) -> Result<Element, CustomError> {
    let mut current = element.offset_parent();
    while let Some(parent) = current.clone() {
        if parent.node_name() == "HTML" {
            break;
        }
        if css(&parent, "position")? != "static" {
            break;
        }
        current = parent
            .dyn_ref::<HtmlElement>()
            .and_then(HtmlElement::offset_parent);
    }
    current
        .or(document()?.document_element())
        .ok_or(CustomError::StandardMismatch {
            message: String::from("document element is missing"),
        })
}

/// Coordinates of the element relative to the document.
pub fn offset(element: &Element) -> Result<Coordinates, CustomError> {
    let rect = element.get_bounding_client_rect();
    let window = window()?;
    let scroll_error = |_| CustomError::StandardMismatch {
        message: String::from("window scroll offsets are unavailable"),
    };
    let root = document()?
        .document_element()
        .ok_or(CustomError::StandardMismatch {
            message: String::from("document element is missing"),
        })?;
    Ok(Coordinates {
        top: rect.top() + window.page_y_offset().map_err(scroll_error)?
            - f64::from(root.client_top()),
        left: rect.left() + window.page_x_offset().map_err(scroll_error)?
            - f64::from(root.client_left()),
    })
}

/// Coordinates of the element relative to its offset parent.
pub fn position(element: &HtmlElement) -> Result<Coordinates, CustomError> {
    let mut parent_offset = Coordinates { top: 0.0, left: 0.0 };
    let offset = if css(element, "position")? == "fixed" {
        let rect = element.get_bounding_client_rect();
        Coordinates { top: rect.top(), left: rect.left() }
    } else {
        let offset_parent = offset_parent(element)?;
        let offset = self::offset(element)?;
        if offset_parent.node_name() != "HTML" {
            parent_offset = self::offset(&offset_parent)?;
        }
        parent_offset.top += css_px(&offset_parent, "border-top-width");
        parent_offset.left += css_px(&offset_parent, "border-left-width");
        offset
    };
    Ok(Coordinates {
        top: offset.top - parent_offset.top - css_px(element, "margin-top"),
        left: offset.left - parent_offset.left - css_px(element, "margin-left"),
    })
}

/// First client rect of the element, [None] for undisplayed elements.
/// `offsetWidth`/`offsetHeight` would report a wrong bounding box for
/// wrapped inline elements, so the rect list is used instead.
pub fn first_client_rect(element: &Element) -> Option<DomRect> {
    element.get_client_rects().item(0)
}

/// The host page body, which injected nodes are appended to.
pub fn body() -> Result<HtmlElement, CustomError> {
    document()?.body().ok_or(CustomError::StandardMismatch {
        message: String::from("document body is missing"),
    })
}

/// Assigns inline style properties in bulk on an owned element.
pub fn set_styles(element: &HtmlElement, styles: &[(&str, &str)]) {
    let style = element.style();
    for (property, value) in styles {
        style
            .set_property(property, value)
            .expect("inline style assignment on an owned element");
    }
}

/// Whether an element accepts user text input.
pub fn is_editable(element: &Element) -> bool {
    if let Some(textarea) = element.dyn_ref::<HtmlTextAreaElement>() {
        return !textarea.read_only() && !textarea.disabled();
    }
    element
        .dyn_ref::<HtmlElement>()
        .is_some_and(HtmlElement::is_content_editable)
}

/// The outermost content editable ancestor of an event target.
/// Child elements of a rich-text editor receive the DOM events, while
/// the resource must be keyed by the editor element itself.
pub fn outermost_editable(element: &Element) -> Option<Element> {
    if element.node_name() == "HTML" {
        return None;
    }
    let mut target = element.clone();
    while let Some(parent) = target.parent_element() {
        if parent.node_name() == "HTML" {
            break;
        }
        if !parent
            .dyn_ref::<HtmlElement>()
            .is_some_and(HtmlElement::is_content_editable)
        {
            break;
        }
        target = parent;
    }
    Some(target)
}

thread_local! {
    static BLUR_LOCKS: Cell<(u32, u32)> = const { Cell::new((0, 0)) };
}

/// Suppresses the next window `blur` and `focusout` events, so that host
/// page scripts don't observe focus moving into an injected frame.
/// Window blur fires twice per switch, once for the focused element and
/// once for the window itself.
pub fn block_window_switching_blur_event() {
    BLUR_LOCKS.with(|locks| locks.set((2, 1)));
}

/// Installs the capture phase listeners consumed by
/// [block_window_switching_blur_event]. Must be installed as early as
/// possible to take priority over host page listeners.
pub fn register_blur_guard() -> Result<(), CustomError> {
    let window = window()?;
    let guard = Closure::wrap(Box::new(|event: web_sys::Event| {
        let consumed = BLUR_LOCKS.with(|locks| {
            let (blur, focusout) = locks.get();
            match event.type_().as_str() {
                "blur" if blur > 0 => {
                    locks.set((blur - 1, focusout));
                    true
                }
                "focusout" if focusout > 0 => {
                    locks.set((blur, focusout - 1));
                    true
                }
                _ => false,
            }
        });
        if consumed {
            event.stop_immediate_propagation();
        }
    }) as Box<dyn FnMut(web_sys::Event)>);
    for event_type in ["blur", "focusout"] {
        window
            .add_event_listener_with_callback_and_bool(
                event_type,
                guard.as_ref().unchecked_ref(),
                true,
            )
            .or(Err(CustomError::StandardMismatch {
                message: String::from("window refused an event listener"),
            }))?;
    }
    guard.forget();
    Ok(())
}

#[cfg(test)]
mod test {
    use wasm_bindgen_test::wasm_bindgen_test;

    use super::*;

    fn element(html_tag: &str) -> Element {
        document()
            .unwrap()
            .create_element(html_tag)
            .expect("known element name")
    }

    #[wasm_bindgen_test]
    fn test_textarea_is_editable() {
        let textarea = element("textarea");
        assert!(is_editable(&textarea));
        textarea
            .dyn_ref::<HtmlTextAreaElement>()
            .unwrap()
            .set_read_only(true);
        assert!(!is_editable(&textarea));
    }

    #[wasm_bindgen_test]
    fn test_plain_div_is_not_editable() {
        assert!(!is_editable(&element("div")));
    }

    #[wasm_bindgen_test]
    fn test_outermost_editable_climbs_editor_children() {
        let document = document().unwrap();
        let body = document.body().unwrap();
        let editor = element("div");
        editor.set_attribute("contenteditable", "true").unwrap();
        let paragraph = element("p");
        editor.append_child(&paragraph).unwrap();
        body.append_child(&editor).unwrap();

        assert_eq!(outermost_editable(&paragraph), Some(editor.clone()));
        assert_eq!(outermost_editable(&editor), Some(editor.clone()));
        editor.remove();
    }
}
