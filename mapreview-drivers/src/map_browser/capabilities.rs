use mapreview_common::BrowserSettings;
use serde_json::json;
use std::collections::HashMap;
use webdriver::capabilities::Capabilities;

/// Chrome command-line arguments for the given settings.
pub fn chrome_arguments(settings: &BrowserSettings) -> Vec<String> {
    let mut args = vec![
        "--disable-dev-shm-usage".to_string(),
        "--no-sandbox".to_string(),
        format!(
            "--window-size={},{}",
            settings.window_width, settings.window_height
        ),
        format!("--lang={}", settings.language),
    ];
    if let Some(ua) = &settings.user_agent {
        args.push(format!("--user-agent={ua}"));
    }
    if settings.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    args
}

/// W3C capabilities carrying `goog:chromeOptions`.
pub fn chrome_capabilities(settings: &BrowserSettings) -> Capabilities {
    let mut caps = Capabilities::new();
    let mut chrome_opts = HashMap::new();
    chrome_opts.insert("args".to_string(), json!(chrome_arguments(settings)));
    caps.insert("goog:chromeOptions".to_string(), json!(chrome_opts));
    caps
}
