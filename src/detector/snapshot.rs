use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// One `<form>` element observed on the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawForm {
    pub selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// A select/radio option as extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOption {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub text: String,
}

/// An interactive element as extracted from the live DOM, before
/// classification. Label resolution inputs are carried as separate candidates
/// so the detector can apply the priority chain off-DOM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawElement {
    pub tag: String,
    pub selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dom_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css_classes: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub visible: bool,
    /// Index into [`PageSnapshot::forms`]; None for orphan elements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<RawOption>,
    /// Text of a `<label for=...>` matching this element's id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_for_text: Option<String>,
    /// Text of an ancestor `<label>` wrapping this element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrapping_label_text: Option<String>,
    /// Nearest preceding sibling text node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preceding_text: Option<String>,
}

/// Visible text of a clickable element (link or button), used for entry-point
/// and submit heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawClickable {
    pub tag: String,
    pub selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css_classes: Option<String>,
    /// Index into [`PageSnapshot::forms`] when enclosed by a form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_index: Option<usize>,
}

/// One observation of the page, produced by the browser driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub forms: Vec<RawForm>,
    /// Interactive form elements in DOM order.
    #[serde(default)]
    pub elements: Vec<RawElement>,
    /// Links and buttons in DOM order.
    #[serde(default)]
    pub clickables: Vec<RawClickable>,
    /// src URLs of iframes on the page (captcha detection input).
    #[serde(default)]
    pub frame_urls: Vec<String>,
}

impl PageSnapshot {
    /// Fingerprint used to recognize "the page changed" after a submit.
    /// Cheap and order-sensitive; not cryptographic.
    pub fn fingerprint(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.url.hash(&mut hasher);
        self.title.hash(&mut hasher);
        for el in &self.elements {
            el.selector.hash(&mut hasher);
            el.name.hash(&mut hasher);
        }
        for c in &self.clickables {
            c.selector.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Parse the JSON value returned by [`SNAPSHOT_SCRIPT`].
pub fn parse_snapshot(value: &serde_json::Value) -> Result<PageSnapshot> {
    serde_json::from_value(value.clone()).map_err(|e| anyhow!("failed to parse snapshot: {}", e))
}

/// JavaScript evaluated in the page to extract forms, fields and clickables.
///
/// Kept in one pass so element order is the DOM discovery order that the
/// fill phase later relies on.
pub const SNAPSHOT_SCRIPT: &str = r#"
(() => {
    const isVisible = (el) => {
        const rect = el.getBoundingClientRect();
        if (rect.width === 0 || rect.height === 0) return false;
        const style = window.getComputedStyle(el);
        if (style.display === 'none') return false;
        if (style.visibility === 'hidden') return false;
        if (style.opacity === '0') return false;
        return true;
    };

    const getSelector = (el) => {
        if (el.id) return '#' + CSS.escape(el.id);
        const testId = el.getAttribute('data-testid') ||
                       el.getAttribute('data-test') ||
                       el.getAttribute('data-cy');
        if (testId) return `[data-testid="${testId}"]`;
        if (el.name) {
            return `${el.tagName.toLowerCase()}[name="${CSS.escape(el.name)}"]`;
        }
        let selector = el.tagName.toLowerCase();
        if (el.className && typeof el.className === 'string') {
            const classes = el.className.trim().split(/\s+/).filter(c => c && !c.includes(':'));
            if (classes.length > 0) {
                selector += '.' + classes.slice(0, 2).map(c => CSS.escape(c)).join('.');
            }
        }
        const parent = el.parentElement;
        if (parent) {
            const siblings = Array.from(parent.children).filter(c => c.tagName === el.tagName);
            if (siblings.length > 1) {
                const idx = siblings.indexOf(el) + 1;
                selector += `:nth-of-type(${idx})`;
            }
        }
        return selector;
    };

    const precedingText = (el) => {
        let node = el.previousSibling;
        while (node) {
            if (node.nodeType === Node.TEXT_NODE) {
                const text = node.textContent.trim();
                if (text.length > 0) return text;
            } else if (node.nodeType === Node.ELEMENT_NODE) {
                const text = (node.textContent || '').trim();
                if (text.length > 0) return text;
            }
            node = node.previousSibling;
        }
        return null;
    };

    const forms = Array.from(document.querySelectorAll('form'));
    const formInfos = forms.map((form, i) => ({
        selector: form.id ? '#' + CSS.escape(form.id) : `form:nth-of-type(${i + 1})`,
        action: form.getAttribute('action') || null,
        method: form.getAttribute('method') || null
    }));

    const labelFor = {};
    document.querySelectorAll('label[for]').forEach(label => {
        const target = label.getAttribute('for');
        if (target && !labelFor[target]) {
            labelFor[target] = (label.textContent || '').trim();
        }
    });

    const elements = [];
    document.querySelectorAll('input, select, textarea').forEach(el => {
        const tag = el.tagName.toLowerCase();
        const type = (el.getAttribute('type') || '').toLowerCase() || null;
        if (tag === 'input' && (type === 'hidden' || type === 'submit' || type === 'button' || type === 'image')) return;

        const form = el.closest('form');
        const wrappingLabel = el.closest('label');

        let options = [];
        if (tag === 'select') {
            options = Array.from(el.options).map(opt => ({
                value: opt.hasAttribute('value') ? opt.value : null,
                text: (opt.textContent || '').trim()
            }));
        }

        elements.push({
            tag: tag,
            selector: getSelector(el),
            input_type: type,
            name: el.name || null,
            dom_id: el.id || null,
            placeholder: el.placeholder || null,
            aria_label: el.getAttribute('aria-label') || null,
            css_classes: (typeof el.className === 'string' && el.className) || null,
            required: el.required === true,
            max_length: (el.maxLength && el.maxLength > 0) ? el.maxLength : null,
            visible: isVisible(el),
            form_index: form ? forms.indexOf(form) : null,
            options: options,
            label_for_text: el.id ? (labelFor[el.id] || null) : null,
            wrapping_label_text: wrappingLabel ? (wrappingLabel.textContent || '').trim() : null,
            preceding_text: precedingText(el)
        });
    });

    const clickables = [];
    document.querySelectorAll('a, button, input[type="submit"], input[type="button"], [role="button"]').forEach(el => {
        if (!isVisible(el)) return;
        const tag = el.tagName.toLowerCase();
        const form = el.closest('form');
        clickables.push({
            tag: tag,
            selector: getSelector(el),
            text: (el.value && tag === 'input') ? el.value : ((el.textContent || '').trim() || null),
            input_type: (el.getAttribute('type') || '').toLowerCase() || null,
            css_classes: (typeof el.className === 'string' && el.className) || null,
            form_index: form ? forms.indexOf(form) : null
        });
    });

    const frame_urls = Array.from(document.querySelectorAll('iframe'))
        .map(f => f.getAttribute('src'))
        .filter(src => src);

    return {
        url: window.location.href,
        title: document.title,
        forms: formInfos,
        elements: elements,
        clickables: clickables,
        frame_urls: frame_urls
    };
})()
"#;
