use crate::map_browser::behavioral::BehavioralEngine;
use fantoccini::elements::{Element, ElementRef};
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, Locator as WdLocator};
use mapreview_common::{Locator, ProbeError};
use serde_json::{json, Value};
use tracing::debug;
use webdriver::command::{SwitchToFrameParameters, VoidWebDriverExtensionCommand, WebDriverCommand};
use webdriver::common::FrameId;

const ENTER_KEY: &str = "\u{E007}";

/// Key under which WebDriver serializes element references in script results.
const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const CENTER_POINT_JS: &str = r#"
    const r = arguments[0].getBoundingClientRect();
    return { x: r.left + r.width / 2, y: r.top + r.height / 2 };
"#;

const HIT_TEST_JS: &str = "return document.elementFromPoint(arguments[0], arguments[1]);";

const ENCLOSES_JS: &str = "return arguments[0] === arguments[1] || arguments[0].contains(arguments[1]);";

const SCROLL_CENTER_JS: &str = "arguments[0].scrollIntoView({block: 'center'});";

const HOVER_JS: &str = r#"
    const el = arguments[0];
    for (const type of ['mouseover', 'mouseenter', 'mousemove']) {
        el.dispatchEvent(new MouseEvent(type, { bubbles: true, cancelable: true, view: window }));
    }
"#;

const FORCED_CLICK_JS: &str = "arguments[0].click();";

/// Map a WebDriver failure onto the crawl failure taxonomy.
pub fn classify(err: CmdError) -> ProbeError {
    match err {
        CmdError::WaitTimeout => ProbeError::Timeout("webdriver wait".to_string()),
        CmdError::Standard(wd) => {
            let message = wd.to_string();
            match wd.error {
                ErrorStatus::NoSuchElement => ProbeError::NotFound(message),
                ErrorStatus::StaleElementReference => ProbeError::Stale(message),
                ErrorStatus::ElementClickIntercepted | ErrorStatus::ElementNotInteractable => {
                    ProbeError::Intercepted(message)
                }
                ErrorStatus::Timeout | ErrorStatus::ScriptTimeout => ProbeError::Timeout(message),
                ErrorStatus::NoSuchFrame | ErrorStatus::NoSuchWindow => {
                    ProbeError::ContextNotFound(message)
                }
                _ => ProbeError::Backend(message),
            }
        }
        other => ProbeError::Backend(other.to_string()),
    }
}

fn to_arg(element: &Element) -> Result<Value, ProbeError> {
    serde_json::to_value(element).map_err(|e| ProbeError::Backend(e.to_string()))
}

/// Page-level primitives over one WebDriver session.
///
/// Every method maps WebDriver errors through [`classify`]; none of them
/// retries on its own.
pub struct MapPage {
    pub(crate) client: Client,
    pub(crate) behavioral_engine: BehavioralEngine,
    main_window: Option<WindowHandle>,
}

impl MapPage {
    /// Construct a page wrapper around an existing WebDriver client.
    pub fn new(
        client: Client,
        behavioral_engine: BehavioralEngine,
        main_window: Option<WindowHandle>,
    ) -> Self {
        Self {
            client,
            behavioral_engine,
            main_window,
        }
    }

    pub fn behavioral(&self) -> &BehavioralEngine {
        &self.behavioral_engine
    }

    /// Navigate the current window to `url`.
    pub async fn goto(&mut self, url: &str) -> Result<(), ProbeError> {
        self.behavioral_engine.random_delay(300, 1200).await;
        self.client.goto(url).await.map_err(classify)
    }

    /// Return the HTML source of the active frame.
    pub async fn get_content(&self) -> Result<String, ProbeError> {
        self.client.source().await.map_err(classify)
    }

    /// Find a single element, `Ok(None)` when nothing matches right now.
    pub async fn find_element(&self, locator: &Locator) -> Result<Option<Element>, ProbeError> {
        let wd = match locator {
            Locator::Css(s) => WdLocator::Css(s),
            Locator::Xpath(s) => WdLocator::XPath(s),
        };
        match self.client.find(wd).await.map_err(classify) {
            Ok(element) => Ok(Some(element)),
            Err(ProbeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn is_displayed(&self, element: &Element) -> Result<bool, ProbeError> {
        element.is_displayed().await.map_err(classify)
    }

    /// Displayed and enabled, the same condition chromedriver waits on
    /// for "clickable".
    pub async fn is_clickable(&self, element: &Element) -> Result<bool, ProbeError> {
        Ok(self.is_displayed(element).await? && element.is_enabled().await.map_err(classify)?)
    }

    /// Viewport coordinates of the element's visual center.
    pub async fn center_point(&self, element: &Element) -> Result<(f64, f64), ProbeError> {
        let v = self
            .client
            .execute(CENTER_POINT_JS, vec![to_arg(element)?])
            .await
            .map_err(classify)?;
        let x = v.get("x").and_then(Value::as_f64);
        let y = v.get("y").and_then(Value::as_f64);
        match (x, y) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(ProbeError::Backend(format!("unexpected rect payload: {v}"))),
        }
    }

    /// The topmost element at a viewport point.
    pub async fn element_at(&self, x: f64, y: f64) -> Result<Option<Element>, ProbeError> {
        let v = self
            .client
            .execute(HIT_TEST_JS, vec![json!(x), json!(y)])
            .await
            .map_err(classify)?;
        if v.is_null() {
            return Ok(None);
        }
        let id = v
            .get(W3C_ELEMENT_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| ProbeError::Backend(format!("hit-test returned a non-element: {v}")))?;
        Ok(Some(Element::from_element_id(
            self.client.clone(),
            ElementRef::from(id.to_string()),
        )))
    }

    /// Whether `inner` is `outer` or one of its descendants.
    pub async fn encloses(&self, outer: &Element, inner: &Element) -> Result<bool, ProbeError> {
        let v = self
            .client
            .execute(ENCLOSES_JS, vec![to_arg(outer)?, to_arg(inner)?])
            .await
            .map_err(classify)?;
        Ok(v.as_bool().unwrap_or(false))
    }

    pub async fn scroll_into_center(&self, element: &Element) -> Result<(), ProbeError> {
        self.client
            .execute(SCROLL_CENTER_JS, vec![to_arg(element)?])
            .await
            .map(|_| ())
            .map_err(classify)
    }

    /// Dispatch pointer-over events without clicking.
    pub async fn hover(&self, element: &Element) -> Result<(), ProbeError> {
        self.client
            .execute(HOVER_JS, vec![to_arg(element)?])
            .await
            .map(|_| ())
            .map_err(classify)
    }

    pub async fn click(&self, element: &Element) -> Result<(), ProbeError> {
        element.click().await.map_err(classify)?;
        Ok(())
    }

    /// Click through script, bypassing the browser's hit-testing.
    pub async fn forced_click(&self, element: &Element) -> Result<(), ProbeError> {
        self.client
            .execute(FORCED_CLICK_JS, vec![to_arg(element)?])
            .await
            .map(|_| ())
            .map_err(classify)
    }

    /// Clear the field and type `text` with human-like timings.
    pub async fn type_text(&self, element: &Element, text: &str) -> Result<(), ProbeError> {
        element.clear().await.map_err(classify)?;
        self.behavioral_engine
            .type_text_human_like(element, text)
            .await
            .map_err(|e| match e.downcast::<CmdError>() {
                Ok(cmd) => classify(cmd),
                Err(other) => ProbeError::Backend(other.to_string()),
            })
    }

    pub async fn press_enter(&self, element: &Element) -> Result<(), ProbeError> {
        element.send_keys(ENTER_KEY).await.map_err(classify)
    }

    pub async fn scroll_by(&self, dy: i64) -> Result<(), ProbeError> {
        self.client
            .execute("window.scrollBy(0, arguments[0]);", vec![json!(dy)])
            .await
            .map(|_| ())
            .map_err(classify)
    }

    /// Return to the main window's top-level document.
    pub async fn enter_root(&self) -> Result<(), ProbeError> {
        if let Some(main) = &self.main_window {
            self.client
                .switch_to_window(main.clone())
                .await
                .map_err(classify)?;
        }
        self.client
            .issue_cmd(WebDriverCommand::<VoidWebDriverExtensionCommand>::SwitchToFrame(
                SwitchToFrameParameters { id: FrameId::Top },
            ))
            .await
            .map_err(classify)?;
        Ok(())
    }

    /// Descend into an embedded frame element.
    pub async fn enter_frame(&self, frame: Element) -> Result<(), ProbeError> {
        frame.enter_frame().await.map_err(classify)?;
        Ok(())
    }

    pub async fn window_count(&self) -> Result<usize, ProbeError> {
        Ok(self.client.windows().await.map_err(classify)?.len())
    }

    pub async fn enter_window(&self, index: usize) -> Result<(), ProbeError> {
        let windows = self.client.windows().await.map_err(classify)?;
        let handle = windows
            .get(index)
            .cloned()
            .ok_or_else(|| ProbeError::ContextNotFound(format!("window #{index}")))?;
        self.client.switch_to_window(handle).await.map_err(classify)
    }

    /// Close every window except the main one and return to it.
    pub async fn close_secondary_windows(&self) -> Result<(), ProbeError> {
        let Some(main) = &self.main_window else {
            return Ok(());
        };
        for handle in self.client.windows().await.map_err(classify)? {
            if &handle == main {
                continue;
            }
            self.client
                .switch_to_window(handle)
                .await
                .map_err(classify)?;
            self.client.close_window().await.map_err(classify)?;
            debug!(target: "browser.session", "closed secondary window");
        }
        self.client
            .switch_to_window(main.clone())
            .await
            .map_err(classify)
    }
}
