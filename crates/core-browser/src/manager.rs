// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::element::{BrowserElement, INTERACTIVE_SELECTORS};
use crate::error::BrowserError;
use crate::overlay;

const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(10);
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

struct Inner {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    page: Page,
    current_url: Option<String>,
    elements: Vec<BrowserElement>,
}

/// Owns one lazily-allocated browser context. `Initialize()` is idempotent;
/// every public operation initializes on first use if it hasn't happened
/// yet, matching spec §4.E's "any operation on an uninitialized manager
/// initializes it first" rule.
pub struct BrowserManager {
    headless: bool,
    inner: Mutex<Option<Inner>>,
}

#[derive(Debug, Deserialize)]
struct RawElement {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    tag: String,
    text: String,
}

impl BrowserManager {
    pub fn new(headless: bool) -> Self {
        Self {
            headless,
            inner: Mutex::new(None),
        }
    }

    pub async fn initialize(&self) -> Result<(), BrowserError> {
        let mut guard = self.inner.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let mut builder = BrowserConfig::builder();
        if !self.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| BrowserError::Launch(anyhow::anyhow!(e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.into()))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(BrowserError::from)?;

        *guard = Some(Inner {
            browser,
            handler_task,
            page,
            current_url: None,
            elements: Vec::new(),
        });
        Ok(())
    }

    async fn ensure(&self) -> Result<(), BrowserError> {
        if self.inner.lock().await.is_some() {
            return Ok(());
        }
        self.initialize().await
    }

    pub async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.ensure().await?;
        let mut guard = self.inner.lock().await;
        let inner = guard.as_mut().expect("initialized above");

        timeout(NAVIGATION_TIMEOUT, inner.page.goto(url))
            .await
            .map_err(|_| BrowserError::Timeout)?
            .map_err(BrowserError::from)?;
        timeout(NAVIGATION_TIMEOUT, inner.page.wait_for_navigation())
            .await
            .map_err(|_| BrowserError::Timeout)?
            .map_err(BrowserError::from)?;

        inner.current_url = Some(url.to_string());
        Ok(())
    }

    pub async fn current_url(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .as_ref()
            .and_then(|i| i.current_url.clone())
    }

    pub async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        self.ensure().await?;
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().expect("initialized above");
        self.take_screenshot(inner, false).await
    }

    pub async fn take_full_page_screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        self.ensure().await?;
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().expect("initialized above");
        self.take_screenshot(inner, true).await
    }

    async fn take_screenshot(&self, inner: &Inner, full_page: bool) -> Result<Vec<u8>, BrowserError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        timeout(DEFAULT_OP_TIMEOUT, inner.page.screenshot(params))
            .await
            .map_err(|_| BrowserError::Timeout)?
            .map_err(BrowserError::from)
    }

    /// Overlay the last enumeration's indices on a fresh screenshot. A pure
    /// image transform; does not touch the page.
    pub async fn screenshot_with_overlay(&self) -> Result<Vec<u8>, BrowserError> {
        let png = self.screenshot().await?;
        let guard = self.inner.lock().await;
        let elements = guard.as_ref().map(|i| i.elements.clone()).unwrap_or_default();
        overlay::render(&png, &elements)
    }

    pub async fn enumerate(&self) -> Result<Vec<BrowserElement>, BrowserError> {
        self.ensure().await?;
        let mut guard = self.inner.lock().await;
        let inner = guard.as_mut().expect("initialized above");

        let selectors: Vec<String> = INTERACTIVE_SELECTORS.iter().map(|s| s.to_string()).collect();
        let script = enumerate_script(&selectors);
        let raw: Vec<RawElement> = timeout(DEFAULT_OP_TIMEOUT, inner.page.evaluate(script))
            .await
            .map_err(|_| BrowserError::Timeout)?
            .map_err(BrowserError::from)?
            .into_value()
            .map_err(|e| BrowserError::Script(e.to_string()))?;

        let elements: Vec<BrowserElement> = raw
            .into_iter()
            .enumerate()
            .map(|(index, r)| BrowserElement {
                index,
                x: r.x,
                y: r.y,
                width: r.width,
                height: r.height,
                tag: r.tag,
                text: r.text.chars().take(100).collect(),
                clickable: true,
            })
            .collect();

        inner.elements = elements.clone();
        Ok(elements)
    }

    fn element_at(inner: &Inner, index: usize) -> Result<BrowserElement, BrowserError> {
        inner
            .elements
            .get(index)
            .cloned()
            .ok_or(BrowserError::StaleIndex(index))
    }

    pub async fn click(&self, index: usize) -> Result<(), BrowserError> {
        self.act_at_index(index, "el.click();").await
    }

    pub async fn double_click(&self, index: usize) -> Result<(), BrowserError> {
        self.act_at_index(
            index,
            "el.dispatchEvent(new MouseEvent('dblclick', {bubbles: true}));",
        )
        .await
    }

    pub async fn right_click(&self, index: usize) -> Result<(), BrowserError> {
        self.act_at_index(
            index,
            "el.dispatchEvent(new MouseEvent('contextmenu', {bubbles: true}));",
        )
        .await
    }

    pub async fn hover(&self, index: usize) -> Result<(), BrowserError> {
        self.act_at_index(
            index,
            "el.dispatchEvent(new MouseEvent('mouseover', {bubbles: true}));",
        )
        .await
    }

    pub async fn scroll_to_element(&self, index: usize) -> Result<(), BrowserError> {
        self.act_at_index(index, "el.scrollIntoView({block: 'center'});").await
    }

    pub async fn type_at(&self, index: usize, text: &str) -> Result<(), BrowserError> {
        let escaped = escape_js_string(text);
        let script = format!(
            "el.focus(); el.value = (el.value || '') + \"{escaped}\"; \
             el.dispatchEvent(new Event('input', {{bubbles: true}}));"
        );
        self.act_at_index(index, &script).await
    }

    async fn act_at_index(&self, index: usize, body: &str) -> Result<(), BrowserError> {
        self.ensure().await?;
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().expect("initialized above");
        let element = Self::element_at(inner, index)?;
        let (cx, cy) = element.center();
        let script = format!(
            "(() => {{ const el = document.elementFromPoint({cx}, {cy}); \
             if (!el) return false; {body} return true; }})()"
        );
        let ok: bool = timeout(DEFAULT_OP_TIMEOUT, inner.page.evaluate(script))
            .await
            .map_err(|_| BrowserError::Timeout)?
            .map_err(BrowserError::from)?
            .into_value()
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        if !ok {
            return Err(BrowserError::StaleIndex(index));
        }
        Ok(())
    }

    pub async fn click_by_selector(&self, selector: &str) -> Result<(), BrowserError> {
        self.with_element(selector, |el| async move {
            el.click().await.map_err(BrowserError::from)?;
            Ok(())
        })
        .await
    }

    pub async fn type_by_selector(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        self.with_element(selector, |el| async move {
            el.type_str(text).await.map_err(BrowserError::from)?;
            Ok(())
        })
        .await
    }

    pub async fn select_option(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let escaped_sel = escape_js_string(selector);
        let escaped_val = escape_js_string(value);
        let script = format!(
            "(() => {{ const el = document.querySelector(\"{escaped_sel}\"); \
             if (!el) return false; el.value = \"{escaped_val}\"; \
             el.dispatchEvent(new Event('change', {{bubbles: true}})); return true; }})()"
        );
        self.eval_bool(&script).await
    }

    pub async fn check_checkbox(&self, selector: &str) -> Result<(), BrowserError> {
        self.set_checkbox(selector, true).await
    }

    pub async fn uncheck_checkbox(&self, selector: &str) -> Result<(), BrowserError> {
        self.set_checkbox(selector, false).await
    }

    async fn set_checkbox(&self, selector: &str, checked: bool) -> Result<(), BrowserError> {
        let escaped = escape_js_string(selector);
        let script = format!(
            "(() => {{ const el = document.querySelector(\"{escaped}\"); \
             if (!el) return false; el.checked = {checked}; \
             el.dispatchEvent(new Event('change', {{bubbles: true}})); return true; }})()"
        );
        self.eval_bool(&script).await
    }

    pub async fn get_text(&self, selector: &str) -> Result<String, BrowserError> {
        self.with_element(selector, |el| async move {
            Ok(el.inner_text().await.map_err(BrowserError::from)?.unwrap_or_default())
        })
        .await
    }

    pub async fn get_attribute(&self, selector: &str, name: &str) -> Result<Option<String>, BrowserError> {
        let escaped_sel = escape_js_string(selector);
        let escaped_name = escape_js_string(name);
        let script = format!(
            "(() => {{ const el = document.querySelector(\"{escaped_sel}\"); \
             return el ? el.getAttribute(\"{escaped_name}\") : null; }})()"
        );
        self.evaluate(&script).await
    }

    pub async fn is_element_visible(&self, selector: &str) -> Result<bool, BrowserError> {
        let escaped = escape_js_string(selector);
        let script = format!(
            "(() => {{ const el = document.querySelector(\"{escaped}\"); \
             if (!el) return false; const r = el.getBoundingClientRect(); \
             return r.width > 0 && r.height > 0; }})()"
        );
        self.evaluate(&script).await
    }

    pub async fn submit_form(&self, selector: &str) -> Result<(), BrowserError> {
        let escaped = escape_js_string(selector);
        let script = format!(
            "(() => {{ const el = document.querySelector(\"{escaped}\"); \
             if (!el) return false; el.submit(); return true; }})()"
        );
        self.eval_bool(&script).await
    }

    pub async fn fill_form(&self, fields: &[(String, String)]) -> Result<(), BrowserError> {
        for (selector, value) in fields {
            self.type_by_selector(selector, value).await?;
        }
        Ok(())
    }

    pub async fn go_back(&self) -> Result<(), BrowserError> {
        self.ensure().await?;
        let guard = self.inner.lock().await;
        guard
            .as_ref()
            .expect("initialized above")
            .page
            .evaluate("history.back()")
            .await
            .map(|_| ())
            .map_err(BrowserError::from)
    }

    pub async fn go_forward(&self) -> Result<(), BrowserError> {
        self.ensure().await?;
        let guard = self.inner.lock().await;
        guard
            .as_ref()
            .expect("initialized above")
            .page
            .evaluate("history.forward()")
            .await
            .map(|_| ())
            .map_err(BrowserError::from)
    }

    pub async fn reload(&self) -> Result<(), BrowserError> {
        self.ensure().await?;
        let guard = self.inner.lock().await;
        guard
            .as_ref()
            .expect("initialized above")
            .page
            .reload()
            .await
            .map(|_| ())
            .map_err(BrowserError::from)
    }

    pub async fn set_viewport(&self, width: u32, height: u32) -> Result<(), BrowserError> {
        self.ensure().await?;
        let guard = self.inner.lock().await;
        let script = format!("window.resizeTo({width}, {height})");
        guard
            .as_ref()
            .expect("initialized above")
            .page
            .evaluate(script)
            .await
            .map(|_| ())
            .map_err(BrowserError::from)
    }

    pub async fn scroll(&self, dx: i64, dy: i64) -> Result<(), BrowserError> {
        let script = format!("window.scrollBy({dx}, {dy})");
        self.evaluate::<Value>(&script).await.map(|_| ())
    }

    pub async fn execute_script(&self, script: &str) -> Result<Value, BrowserError> {
        self.evaluate(script).await
    }

    pub async fn get_page_title(&self) -> Result<String, BrowserError> {
        self.evaluate("document.title").await
    }

    pub async fn get_page_html(&self) -> Result<String, BrowserError> {
        self.evaluate("document.documentElement.outerHTML").await
    }

    pub async fn wait_for_element(&self, selector: &str, wait: Duration) -> Result<(), BrowserError> {
        self.ensure().await?;
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().expect("initialized above");
        timeout(wait, inner.page.find_element(selector))
            .await
            .map_err(|_| BrowserError::Timeout)?
            .map_err(|_| BrowserError::SelectorNotFound(selector.to_string()))?;
        Ok(())
    }

    pub async fn get_cookies(&self) -> Result<Value, BrowserError> {
        self.ensure().await?;
        let guard = self.inner.lock().await;
        let cookies = guard
            .as_ref()
            .expect("initialized above")
            .page
            .get_cookies()
            .await
            .map_err(BrowserError::from)?;
        serde_json::to_value(cookies).map_err(|e| BrowserError::Script(e.to_string()))
    }

    pub async fn clear_cookies(&self) -> Result<(), BrowserError> {
        self.ensure().await?;
        let guard = self.inner.lock().await;
        guard
            .as_ref()
            .expect("initialized above")
            .page
            .delete_cookies(vec![])
            .await
            .map(|_| ())
            .map_err(BrowserError::from)
    }

    async fn with_element<F, Fut, T>(&self, selector: &str, f: F) -> Result<T, BrowserError>
    where
        F: FnOnce(chromiumoxide::Element) -> Fut,
        Fut: std::future::Future<Output = Result<T, BrowserError>>,
    {
        self.ensure().await?;
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().expect("initialized above");
        let element = timeout(DEFAULT_OP_TIMEOUT, inner.page.find_element(selector))
            .await
            .map_err(|_| BrowserError::Timeout)?
            .map_err(|_| BrowserError::SelectorNotFound(selector.to_string()))?;
        f(element).await
    }

    async fn eval_bool(&self, script: &str) -> Result<(), BrowserError> {
        let ok: bool = self.evaluate(script).await?;
        if ok {
            Ok(())
        } else {
            Err(BrowserError::SelectorNotFound(script.to_string()))
        }
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T, BrowserError> {
        self.ensure().await?;
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().expect("initialized above");
        timeout(DEFAULT_OP_TIMEOUT, inner.page.evaluate(script))
            .await
            .map_err(|_| BrowserError::Timeout)?
            .map_err(BrowserError::from)?
            .into_value()
            .map_err(|e| BrowserError::Script(e.to_string()))
    }

    /// Cancels both the allocator and browser contexts.
    pub async fn cleanup(&self) -> Result<(), BrowserError> {
        let mut guard = self.inner.lock().await;
        if let Some(inner) = guard.take() {
            inner.handler_task.abort();
            let _ = inner.browser.close().await;
        }
        Ok(())
    }
}

fn enumerate_script(selectors: &[String]) -> String {
    let selector_list = selectors
        .iter()
        .map(|s| format!("\"{}\"", s.replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"(() => {{
            const selectors = [{selector_list}];
            const seen = new Set();
            const out = [];
            for (const sel of selectors) {{
                for (const el of document.querySelectorAll(sel)) {{
                    if (seen.has(el)) continue;
                    seen.add(el);
                    const r = el.getBoundingClientRect();
                    if (r.width <= 0 || r.height <= 0) continue;
                    if (r.x < 0 && r.y < 0) continue;
                    out.push({{
                        x: r.x, y: r.y, width: r.width, height: r.height,
                        tag: el.tagName.toLowerCase(),
                        text: (el.textContent || '').trim().slice(0, 100),
                    }});
                }}
            }}
            return out;
        }})()"#
    )
}

fn escape_js_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
//
// Live CDP sessions need a real Chromium binary, unavailable in this test
// environment; these cover the pure pieces (script construction, escaping)
// without launching a browser.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_js_string_handles_quotes_and_backslashes() {
        assert_eq!(escape_js_string(r#"he said "hi""#), r#"he said \"hi\""#);
        assert_eq!(escape_js_string(r"C:\path"), r"C:\\path");
    }

    #[test]
    fn enumerate_script_embeds_every_selector() {
        let selectors = vec!["button".to_string(), "a[href]".to_string()];
        let script = enumerate_script(&selectors);
        assert!(script.contains("\"button\""));
        assert!(script.contains("\"a[href]\""));
    }

    #[test]
    fn new_manager_starts_uninitialized() {
        let manager = BrowserManager::new(true);
        assert!(manager.inner.try_lock().unwrap().is_none());
    }
}
