//! An in-memory [`Probe`] with scripted element behaviour.
//!
//! Time is logical: [`Probe::pause`] advances a clock instead of sleeping, so
//! polls and backoffs run instantly while still being observable through
//! [`ScriptedProbe::pauses`].
//!
//! Every element lives in one document: the root, an embedded frame or a
//! secondary window. It can only be located while that document is active.

use crate::probe::{Point, Probe};
use async_trait::async_trait;
use mapreview_common::{Locator, ProbeError};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Handle of a scripted element: its index in the probe.
pub type Handle = usize;

/// The element reported by hit-tests while a target is occluded.
const OVERLAY: Handle = usize::MAX;

#[derive(Debug, Clone)]
enum FrameContent {
    Static(String),
    /// Markup picked by the most recent typed query, see [`ScriptedProbe::route`].
    Routed,
}

/// Behaviour of one element.
#[derive(Debug, Clone)]
pub struct ScriptedElement {
    locator: Locator,
    appear_after: Duration,
    visible: bool,
    clickable: bool,
    click_failures: VecDeque<ProbeError>,
    intercepted: bool,
    occlusions: u32,
    vanish_after: Option<u32>,
    opens_window: Option<String>,
    frame: Option<FrameContent>,
    activations: u32,
    placement: Active,
    unlocked_by: Option<Handle>,
}

impl ScriptedElement {
    pub fn new(locator: Locator) -> Self {
        Self {
            locator,
            appear_after: Duration::ZERO,
            visible: true,
            clickable: true,
            click_failures: VecDeque::new(),
            intercepted: false,
            occlusions: 0,
            vanish_after: None,
            opens_window: None,
            frame: None,
            activations: 0,
            placement: Active::Root,
            unlocked_by: None,
        }
    }

    /// Lives inside the frame element `frame` instead of the root document.
    pub fn inside(mut self, frame: Handle) -> Self {
        self.placement = Active::Frame(frame);
        self
    }

    /// Lives in the `index`-th secondary window (1-based, in opening order).
    pub fn in_window(mut self, index: usize) -> Self {
        self.placement = Active::Window(index);
        self
    }

    /// Absent until the element `trigger` has been activated once.
    pub fn unlocked_by(mut self, trigger: Handle) -> Self {
        self.unlocked_by = Some(trigger);
        self
    }

    /// Absent until the logical clock reaches `delay`.
    pub fn appear_after(mut self, delay: Duration) -> Self {
        self.appear_after = delay;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.clickable = false;
        self
    }

    /// Direct clicks fail with these errors, in order, before succeeding.
    pub fn click_failures(mut self, failures: impl IntoIterator<Item = ProbeError>) -> Self {
        self.click_failures.extend(failures);
        self
    }

    /// Both direct and forced clicks are always intercepted.
    pub fn always_intercepted(mut self) -> Self {
        self.intercepted = true;
        self
    }

    /// The next `n` hit-tests at this element's center report an overlay.
    pub fn occluded(mut self, n: u32) -> Self {
        self.occlusions = n;
        self
    }

    /// Removed from the document after `n` successful activations.
    pub fn vanishes_after(mut self, n: u32) -> Self {
        self.vanish_after = Some(n);
        self
    }

    /// Each successful activation opens a new window showing `html`.
    pub fn opens_window(mut self, html: impl Into<String>) -> Self {
        self.opens_window = Some(html.into());
        self
    }

    fn present(&self, clock: Duration) -> bool {
        clock >= self.appear_after && !self.vanished()
    }

    fn vanished(&self) -> bool {
        self.vanish_after.is_some_and(|n| self.activations >= n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Active {
    Root,
    Frame(Handle),
    Window(usize),
}

/// Scripted browsing session.
#[derive(Debug)]
pub struct ScriptedProbe {
    elements: Vec<ScriptedElement>,
    clock: Duration,
    pauses: Vec<Duration>,
    root_html: String,
    windows: Vec<String>,
    active: Active,
    routes: Vec<(String, String)>,
    typing_failures: Vec<String>,
    cancel_on_typing: Vec<(String, CancellationToken)>,
    cancel_on_pause: Option<CancellationToken>,
    last_query: String,
    typed: Vec<String>,
    navigations: Vec<String>,
    clicks: HashMap<String, usize>,
    forced: HashMap<String, usize>,
    scrolls: Vec<i64>,
    root_entries: usize,
    submits: usize,
    windows_closed: usize,
}

impl Default for ScriptedProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            clock: Duration::ZERO,
            pauses: Vec::new(),
            root_html: "<html><body></body></html>".to_string(),
            windows: Vec::new(),
            active: Active::Root,
            routes: Vec::new(),
            typing_failures: Vec::new(),
            cancel_on_typing: Vec::new(),
            cancel_on_pause: None,
            last_query: String::new(),
            typed: Vec::new(),
            navigations: Vec::new(),
            clicks: HashMap::new(),
            forced: HashMap::new(),
            scrolls: Vec::new(),
            root_entries: 0,
            submits: 0,
            windows_closed: 0,
        }
    }

    pub fn set_root_html(&mut self, html: impl Into<String>) {
        self.root_html = html.into();
    }

    pub fn add_element(&mut self, element: ScriptedElement) -> Handle {
        self.elements.push(element);
        self.elements.len() - 1
    }

    /// An embedded frame matched by the CSS `selector` showing `html`.
    pub fn add_frame(&mut self, selector: &str, html: impl Into<String>) -> Handle {
        self.add_frame_after(selector, html, Duration::ZERO)
    }

    pub fn add_frame_after(&mut self, selector: &str, html: impl Into<String>, delay: Duration) -> Handle {
        let mut element = ScriptedElement::new(Locator::css(selector)).appear_after(delay);
        element.frame = Some(FrameContent::Static(html.into()));
        self.add_element(element)
    }

    /// A frame whose markup is chosen by [`ScriptedProbe::route`].
    pub fn add_routed_frame(&mut self, selector: &str) -> Handle {
        let mut element = ScriptedElement::new(Locator::css(selector));
        element.frame = Some(FrameContent::Routed);
        self.add_element(element)
    }

    /// Routed frames show `html` after a query containing `needle` was typed.
    pub fn route(&mut self, needle: &str, html: impl Into<String>) {
        self.routes.push((needle.to_string(), html.into()));
    }

    /// Typing a query containing `needle` fails with a backend error.
    pub fn fail_typing_for(&mut self, needle: &str) {
        self.typing_failures.push(needle.to_string());
    }

    /// Typing a query containing `needle` cancels `token`.
    pub fn cancel_on_typing(&mut self, needle: &str, token: CancellationToken) {
        self.cancel_on_typing.push((needle.to_string(), token));
    }

    /// The first pause cancels `token`, as if Ctrl-C arrived mid-wait.
    pub fn cancel_on_pause(&mut self, token: CancellationToken) {
        self.cancel_on_pause = Some(token);
    }

    /// Open a secondary window showing `html`.
    pub fn open_window(&mut self, html: impl Into<String>) {
        self.windows.push(html.into());
    }

    pub fn clicks(&self, selector: &str) -> usize {
        self.clicks.get(selector).copied().unwrap_or(0)
    }

    pub fn forced_clicks(&self, selector: &str) -> usize {
        self.forced.get(selector).copied().unwrap_or(0)
    }

    pub fn scrolls(&self) -> Vec<i64> {
        self.scrolls.clone()
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.clone()
    }

    /// Total logical time spent pausing.
    pub fn paused(&self) -> Duration {
        self.pauses.iter().sum()
    }

    pub fn root_entries(&self) -> usize {
        self.root_entries
    }

    pub fn typed(&self) -> Vec<String> {
        self.typed.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.clone()
    }

    pub fn submits(&self) -> usize {
        self.submits
    }

    pub fn windows_closed(&self) -> usize {
        self.windows_closed
    }

    fn element(&self, handle: Handle) -> Result<&ScriptedElement, ProbeError> {
        match self.elements.get(handle) {
            Some(element) if !element.vanished() => Ok(element),
            _ => Err(ProbeError::Stale(format!("handle {handle}"))),
        }
    }

    fn element_mut(&mut self, handle: Handle) -> Result<&mut ScriptedElement, ProbeError> {
        match self.elements.get_mut(handle) {
            Some(element) if !element.vanished() => Ok(element),
            _ => Err(ProbeError::Stale(format!("handle {handle}"))),
        }
    }

    fn record(map: &mut HashMap<String, usize>, locator: &Locator) {
        *map.entry(locator.as_str().to_string()).or_default() += 1;
    }

    fn activate(&mut self, handle: Handle) -> Result<(), ProbeError> {
        let element = self.element_mut(handle)?;
        element.activations += 1;
        if let Some(html) = element.opens_window.clone() {
            self.windows.push(html);
        }
        Ok(())
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    type Element = Handle;

    async fn navigate(&mut self, url: &str) -> Result<(), ProbeError> {
        self.navigations.push(url.to_string());
        Ok(())
    }

    async fn locate(&mut self, locator: &Locator) -> Result<Option<Handle>, ProbeError> {
        let (clock, active) = (self.clock, self.active);
        let unlocked = |e: &ScriptedElement| {
            e.unlocked_by
                .is_none_or(|trigger| self.elements.get(trigger).is_some_and(|t| t.activations > 0))
        };
        Ok(self.elements.iter().position(|e| {
            &e.locator == locator && e.placement == active && e.present(clock) && unlocked(e)
        }))
    }

    async fn is_visible(&mut self, element: &Handle) -> Result<bool, ProbeError> {
        if *element == OVERLAY {
            return Ok(true);
        }
        Ok(self.element(*element)?.visible)
    }

    async fn is_clickable(&mut self, element: &Handle) -> Result<bool, ProbeError> {
        if *element == OVERLAY {
            return Ok(true);
        }
        let e = self.element(*element)?;
        Ok(e.visible && e.clickable)
    }

    async fn center_point(&mut self, element: &Handle) -> Result<Point, ProbeError> {
        self.element(*element)?;
        Ok(Point {
            x: *element as f64,
            y: 0.0,
        })
    }

    async fn hit_test(&mut self, point: Point) -> Result<Option<Handle>, ProbeError> {
        let handle = point.x as Handle;
        let element = self.element_mut(handle)?;
        if element.occlusions > 0 {
            element.occlusions -= 1;
            return Ok(Some(OVERLAY));
        }
        Ok(Some(handle))
    }

    async fn encloses(&mut self, outer: &Handle, inner: &Handle) -> Result<bool, ProbeError> {
        Ok(outer == inner)
    }

    async fn scroll_into_center(&mut self, element: &Handle) -> Result<(), ProbeError> {
        self.element(*element).map(|_| ())
    }

    async fn hover(&mut self, element: &Handle) -> Result<(), ProbeError> {
        self.element(*element).map(|_| ())
    }

    async fn click(&mut self, element: &Handle) -> Result<(), ProbeError> {
        let locator = self.element(*element)?.locator.clone();
        Self::record(&mut self.clicks, &locator);
        let scripted = self.element_mut(*element)?;
        if scripted.intercepted {
            return Err(ProbeError::Intercepted(format!("overlay over {locator}")));
        }
        if let Some(failure) = scripted.click_failures.pop_front() {
            return Err(failure);
        }
        self.activate(*element)
    }

    async fn forced_click(&mut self, element: &Handle) -> Result<(), ProbeError> {
        let locator = self.element(*element)?.locator.clone();
        Self::record(&mut self.forced, &locator);
        if self.element(*element)?.intercepted {
            return Err(ProbeError::Intercepted(format!("overlay over {locator}")));
        }
        self.activate(*element)
    }

    async fn type_text(&mut self, element: &Handle, text: &str) -> Result<(), ProbeError> {
        self.element(*element)?;
        self.typed.push(text.to_string());
        for (needle, token) in &self.cancel_on_typing {
            if text.contains(needle.as_str()) {
                token.cancel();
            }
        }
        if self.typing_failures.iter().any(|n| text.contains(n.as_str())) {
            return Err(ProbeError::Backend(format!("scripted typing failure for `{text}`")));
        }
        self.last_query = text.to_string();
        Ok(())
    }

    async fn submit(&mut self, element: &Handle) -> Result<(), ProbeError> {
        self.element(*element)?;
        self.submits += 1;
        Ok(())
    }

    async fn scroll_by(&mut self, dy: i64) -> Result<(), ProbeError> {
        self.scrolls.push(dy);
        Ok(())
    }

    async fn content(&mut self) -> Result<String, ProbeError> {
        match self.active {
            Active::Root => Ok(self.root_html.clone()),
            Active::Window(index) => self
                .windows
                .get(index - 1)
                .cloned()
                .ok_or_else(|| ProbeError::ContextNotFound(format!("window #{index}"))),
            Active::Frame(handle) => match &self.element(handle)?.frame {
                Some(FrameContent::Static(html)) => Ok(html.clone()),
                Some(FrameContent::Routed) => Ok(self
                    .routes
                    .iter()
                    .find(|(needle, _)| self.last_query.contains(needle.as_str()))
                    .map(|(_, html)| html.clone())
                    .unwrap_or_default()),
                None => Err(ProbeError::ContextNotFound(format!("handle {handle} is not a frame"))),
            },
        }
    }

    async fn enter_root(&mut self) -> Result<(), ProbeError> {
        self.active = Active::Root;
        self.root_entries += 1;
        Ok(())
    }

    async fn enter_frame(&mut self, frame: Handle) -> Result<(), ProbeError> {
        if self.element(frame)?.frame.is_none() {
            return Err(ProbeError::ContextNotFound(format!("handle {frame} is not a frame")));
        }
        self.active = Active::Frame(frame);
        Ok(())
    }

    async fn window_count(&mut self) -> Result<usize, ProbeError> {
        Ok(1 + self.windows.len())
    }

    async fn enter_window(&mut self, index: usize) -> Result<(), ProbeError> {
        match index {
            0 => self.active = Active::Root,
            i if i <= self.windows.len() => self.active = Active::Window(i),
            i => return Err(ProbeError::ContextNotFound(format!("window #{i}"))),
        }
        Ok(())
    }

    async fn close_secondary_windows(&mut self) -> Result<(), ProbeError> {
        self.windows_closed += self.windows.len();
        self.windows.clear();
        self.active = Active::Root;
        Ok(())
    }

    async fn pause(&mut self, duration: Duration) {
        self.clock += duration;
        self.pauses.push(duration);
        if let Some(token) = self.cancel_on_pause.take() {
            token.cancel();
        }
    }
}
