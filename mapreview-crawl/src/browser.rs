//! [`Probe`] over a live WebDriver page.

use crate::probe::{Point, Probe};
use async_trait::async_trait;
use fantoccini::elements::Element;
use mapreview_common::{Locator, ProbeError};
use mapreview_drivers::map_browser::page::MapPage;
use std::time::Duration;

#[async_trait]
impl Probe for MapPage {
    type Element = Element;

    async fn navigate(&mut self, url: &str) -> Result<(), ProbeError> {
        self.goto(url).await
    }

    async fn locate(&mut self, locator: &Locator) -> Result<Option<Element>, ProbeError> {
        self.find_element(locator).await
    }

    async fn is_visible(&mut self, element: &Element) -> Result<bool, ProbeError> {
        self.is_displayed(element).await
    }

    async fn is_clickable(&mut self, element: &Element) -> Result<bool, ProbeError> {
        MapPage::is_clickable(self, element).await
    }

    async fn center_point(&mut self, element: &Element) -> Result<Point, ProbeError> {
        let (x, y) = MapPage::center_point(self, element).await?;
        Ok(Point { x, y })
    }

    async fn hit_test(&mut self, point: Point) -> Result<Option<Element>, ProbeError> {
        self.element_at(point.x, point.y).await
    }

    async fn encloses(&mut self, outer: &Element, inner: &Element) -> Result<bool, ProbeError> {
        MapPage::encloses(self, outer, inner).await
    }

    async fn scroll_into_center(&mut self, element: &Element) -> Result<(), ProbeError> {
        MapPage::scroll_into_center(self, element).await
    }

    async fn hover(&mut self, element: &Element) -> Result<(), ProbeError> {
        MapPage::hover(self, element).await
    }

    async fn click(&mut self, element: &Element) -> Result<(), ProbeError> {
        MapPage::click(self, element).await
    }

    async fn forced_click(&mut self, element: &Element) -> Result<(), ProbeError> {
        MapPage::forced_click(self, element).await
    }

    async fn type_text(&mut self, element: &Element, text: &str) -> Result<(), ProbeError> {
        MapPage::type_text(self, element, text).await
    }

    async fn submit(&mut self, element: &Element) -> Result<(), ProbeError> {
        self.press_enter(element).await
    }

    async fn scroll_by(&mut self, dy: i64) -> Result<(), ProbeError> {
        MapPage::scroll_by(self, dy).await
    }

    async fn content(&mut self) -> Result<String, ProbeError> {
        self.get_content().await
    }

    async fn enter_root(&mut self) -> Result<(), ProbeError> {
        MapPage::enter_root(self).await
    }

    async fn enter_frame(&mut self, frame: Element) -> Result<(), ProbeError> {
        MapPage::enter_frame(self, frame).await
    }

    async fn window_count(&mut self) -> Result<usize, ProbeError> {
        MapPage::window_count(self).await
    }

    async fn enter_window(&mut self, index: usize) -> Result<(), ProbeError> {
        MapPage::enter_window(self, index).await
    }

    async fn close_secondary_windows(&mut self) -> Result<(), ProbeError> {
        MapPage::close_secondary_windows(self).await
    }

    async fn pause(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
