use anyhow::{Context, Result};
use chromiumoxide::page::Page;

use crate::interaction::click::selector_to_js;

/// Replace an input's value with `text`, firing the events frameworks listen for.
///
/// Goes through the native value setter so React/Vue controlled inputs see
/// the change.
pub async fn fill_field(page: &Page, selector: &str, text: &str) -> Result<()> {
    let selector_js = selector_to_js(selector)?;

    let js = format!(
        r#"(() => {{
            const el = {selector_js};
            if (!el) throw new Error('Element not found: ' + {sel_str});
            el.scrollIntoView({{ block: 'center', behavior: 'instant' }});
            el.focus();
            const text = {text};
            if (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA') {{
                const proto = el.tagName === 'INPUT'
                    ? window.HTMLInputElement.prototype
                    : window.HTMLTextAreaElement.prototype;
                const setter = Object.getOwnPropertyDescriptor(proto, 'value')?.set;
                if (setter) {{
                    setter.call(el, text);
                }} else {{
                    el.value = text;
                }}
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            }} else if (el.isContentEditable) {{
                el.textContent = '';
                document.execCommand('insertText', false, text);
            }} else {{
                throw new Error('Element is not fillable: ' + {sel_str});
            }}
            return true;
        }})()"#,
        selector_js = selector_js,
        sel_str = serde_json::to_string(selector)?,
        text = serde_json::to_string(text)?
    );

    page.evaluate(js.as_str())
        .await
        .with_context(|| format!("Failed to fill {}", selector))?;

    Ok(())
}
