use anyhow::{bail, Context, Result};
use chromiumoxide::page::Page;
use serde::Deserialize;

/// How a click ended up being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickMethod {
    /// Pointer events at the element's center, followed by `click()`.
    Pointer,
    /// The element was covered; its form was submitted with it as submitter.
    FormSubmit,
    /// The element was covered and has no form; plain `el.click()`.
    Script,
}

#[derive(Deserialize)]
struct ClickReport {
    error: Option<String>,
    method: Option<ClickMethod>,
}

/// JS expression resolving a CSS selector to its first match (or null).
pub fn selector_to_js(selector: &str) -> Result<String> {
    Ok(format!(
        "document.querySelector({})",
        serde_json::to_string(selector)?
    ))
}

/// Click a login control.
///
/// Visible, unobscured elements get real pointer events. Submit buttons
/// hidden behind cookie banners or overlays still submit their form through
/// `requestSubmit`, so validation handlers run as for a real click.
pub async fn hybrid_click(page: &Page, selector: &str) -> Result<ClickMethod> {
    let js = format!(
        r#"(() => {{
            const el = {selector_js};
            if (!el) return {{ error: 'Element not found: ' + {sel_str} }};
            if (el.disabled) return {{ error: 'Element is disabled: ' + {sel_str} }};

            el.scrollIntoView({{ block: 'center', inline: 'center', behavior: 'instant' }});
            const rect = el.getBoundingClientRect();
            const style = getComputedStyle(el);
            const shown = rect.width > 0 && rect.height > 0
                && style.display !== 'none'
                && style.visibility !== 'hidden'
                && parseFloat(style.opacity) !== 0;

            const x = rect.left + rect.width / 2;
            const y = rect.top + rect.height / 2;
            const top = shown ? document.elementFromPoint(x, y) : null;
            if (top && (top === el || el.contains(top) || top.contains(el))) {{
                const opts = {{ bubbles: true, cancelable: true, clientX: x, clientY: y, button: 0 }};
                el.dispatchEvent(new MouseEvent('mousemove', opts));
                el.dispatchEvent(new MouseEvent('mousedown', opts));
                el.dispatchEvent(new MouseEvent('mouseup', opts));
                el.click();
                return {{ method: 'pointer' }};
            }}

            const form = el.form;
            if (form && el.type === 'submit' && typeof form.requestSubmit === 'function') {{
                form.requestSubmit(el);
                return {{ method: 'form_submit' }};
            }}
            el.click();
            return {{ method: 'script' }};
        }})()"#,
        selector_js = selector_to_js(selector)?,
        sel_str = serde_json::to_string(selector)?
    );

    let report: ClickReport = page
        .evaluate(js.as_str())
        .await
        .with_context(|| format!("Failed to click {}", selector))?
        .into_value()
        .context("Failed to parse click result")?;

    match (report.error, report.method) {
        (Some(error), _) => bail!("{}", error),
        (None, Some(method)) => Ok(method),
        (None, None) => bail!("Click on {} returned no result", selector),
    }
}
