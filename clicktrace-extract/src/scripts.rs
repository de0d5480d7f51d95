//! Page-context scripts run by the extraction strategies.
//!
//! Every script is a WebDriver-style function body: it reads its inputs from
//! `arguments` and hands its result back with `return`. `arguments[0]` is
//! always the marker identifier.

/// Marker global coerced to a string, or `null` when it is undefined or falsy.
pub const GLOBAL_LOOKUP: &str = r#"
    const value = window[arguments[0]];
    if (!value) return null;
    return typeof value === "object" ? JSON.stringify(value) : String(value);
"#;

/// First non-empty of `localStorage` then `sessionStorage` under the marker key.
pub const STORAGE_LOOKUP: &str = r#"
    const name = arguments[0];
    const read = (store) => {
        try { return window[store].getItem(name); } catch (e) { return null; }
    };
    return read("localStorage") || read("sessionStorage") || null;
"#;

/// Text of every script element, newline-joined.
pub const INLINE_SCRIPT_TEXT: &str = r#"
    return Array.from(document.scripts).map(s => s.textContent || "").join("\n");
"#;

/// Serialized HTML of the whole document.
pub const DOCUMENT_HTML: &str = r#"
    return document.documentElement ? document.documentElement.outerHTML : "";
"#;

/// First element whose class, id, name or data-* attribute mentions the
/// marker. `arguments[1]` and `arguments[2]` cap the text and HTML lengths.
pub const STRUCTURAL_MARKER: &str = r#"
    const marker = arguments[0];
    const textLimit = arguments[1];
    const htmlLimit = arguments[2];
    const mentions = (el) => Array.from(el.attributes).some(attr => {
        const name = attr.name.toLowerCase();
        if (name === "class" || name === "id" || name === "name") {
            return attr.value.includes(marker);
        }
        return name.startsWith("data-") && (name.includes(marker.toLowerCase()) || attr.value.includes(marker));
    });
    const el = Array.from(document.querySelectorAll("*")).find(mentions);
    if (!el) return null;
    const anchor = el.closest("a[href]") || el.querySelector("a[href]");
    const href = anchor ? anchor.href : null;
    return {
        value: href || "present",
        details: {
            href: href,
            text: (el.textContent || "").trim().slice(0, textLimit),
            tag: el.tagName.toLowerCase(),
            htmlSnippet: (el.outerHTML || "").trim().slice(0, htmlLimit)
        }
    };
"#;

/// Whether the marker global is currently defined.
pub const MARKER_DEFINED: &str = r#"
    return typeof window[arguments[0]] !== "undefined";
"#;

/// Raw `src` attribute of every iframe element in the document.
pub const IFRAME_SOURCES: &str = r#"
    return Array.from(document.querySelectorAll("iframe"))
        .map(e => e.getAttribute("src"))
        .filter(Boolean);
"#;
