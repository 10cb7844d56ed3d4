use std::time::Duration;

use anyhow::Result;
use chromiumoxide::page::Page;

use crate::browser::WaitCondition;
use crate::interaction::click::selector_to_js;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Quiet window with no finished resource fetch that counts as network-idle.
const IDLE_WINDOW_MS: f64 = 500.0;

/// Wait up to `timeout` for a selector to resolve to a non-null element.
/// Returns Ok(()) when found, Err if timeout.
pub async fn wait_for_selector(page: &Page, selector: &str, timeout: Duration) -> Result<()> {
    let selector_js = selector_to_js(selector)?;
    let check_js = format!(
        r#"(() => {{ const el = {selector_js}; return el !== null && el !== undefined; }})()"#,
        selector_js = selector_js
    );

    let found = poll_js(page, &check_js, timeout, |found: bool| found).await;
    if found {
        Ok(())
    } else {
        anyhow::bail!(
            "Timed out after {}ms waiting for element: {}",
            timeout.as_millis(),
            selector
        )
    }
}

pub async fn wait_for_condition(
    page: &Page,
    condition: WaitCondition,
    timeout: Duration,
) -> Result<()> {
    let met = match condition {
        WaitCondition::NetworkIdle => {
            // Milliseconds since the last resource finished, or -1 while loading.
            let idle_js = r#"(() => {
                if (document.readyState !== 'complete') return -1;
                const entries = performance.getEntriesByType('resource');
                const last = entries.reduce((m, e) => Math.max(m, e.responseEnd || e.startTime), 0);
                return performance.now() - last;
            })()"#;
            poll_js(page, idle_js, timeout, |quiet_ms: f64| quiet_ms >= IDLE_WINDOW_MS).await
        }
    };

    if met {
        Ok(())
    } else {
        anyhow::bail!(
            "Timed out after {}ms waiting for {:?}",
            timeout.as_millis(),
            condition
        )
    }
}

/// Evaluate `js` every poll interval until `done` accepts its value or time runs out.
/// Evaluation errors (mid-navigation contexts) count as "not yet".
async fn poll_js<T, F>(page: &Page, js: &str, timeout: Duration, done: F) -> bool
where
    T: serde::de::DeserializeOwned,
    F: Fn(T) -> bool,
{
    let mut elapsed = Duration::ZERO;
    loop {
        let value: Option<T> = page
            .evaluate(js)
            .await
            .ok()
            .and_then(|r| r.into_value().ok());

        if value.map(&done).unwrap_or(false) {
            return true;
        }
        if elapsed >= timeout {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
        elapsed += POLL_INTERVAL;
    }
}
