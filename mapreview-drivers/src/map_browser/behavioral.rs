use anyhow::Result;
use fantoccini::elements::Element;
use rand::rngs::OsRng;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone)]
/// Produces human-like delays and typing behavior.
pub struct BehavioralEngine {
    /// Per-character delay bounds in milliseconds.
    keystroke_ms: (u64, u64),
}

impl Default for BehavioralEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BehavioralEngine {
    pub fn new() -> Self {
        Self {
            keystroke_ms: (30, 150),
        }
    }

    /// Random duration between `min` and `max` milliseconds.
    pub fn jitter(&self, min: u64, max: u64) -> Duration {
        let mut rng = OsRng;
        Duration::from_millis(rng.gen_range(min..=max.max(min)))
    }

    /// Sleep for a random duration between `min` and `max` milliseconds.
    pub async fn random_delay(&self, min: u64, max: u64) {
        sleep(self.jitter(min, max)).await;
    }

    /// Type the provided text with small random delays between characters.
    pub async fn type_text_human_like(&self, element: &Element, text: &str) -> Result<()> {
        let (min, max) = self.keystroke_ms;
        for ch in text.chars() {
            element.send_keys(&ch.to_string()).await?;
            self.random_delay(min, max).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_in_bounds() {
        let engine = BehavioralEngine::new();
        for _ in 0..64 {
            let d = engine.jitter(250, 500);
            assert!(d >= Duration::from_millis(250) && d <= Duration::from_millis(500));
        }
    }

    #[test]
    fn inverted_bounds_collapse_to_min() {
        assert_eq!(BehavioralEngine::new().jitter(300, 100), Duration::from_millis(300));
    }
}
