use clicktrace_config::{BrowserConfig, IdentityConfig};
use serde_json::{json, Value};

/// Viewport every session starts with.
pub const WINDOW_SIZE: (u32, u32) = (1920, 1080);

/// Flags for a sandbox-free, single-process Chromium as shipped for
/// serverless runtimes.
pub const BUNDLED_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--single-process",
    "--no-zygote",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--hide-scrollbars",
    "--mute-audio",
];

/// Chrome command-line arguments that make a session look like an ordinary
/// desktop browser with the configured identity.
pub fn build_identity_arguments(identity: &IdentityConfig) -> Vec<String> {
    vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-infobars".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-sandbox".to_string(),
        format!("--user-agent={}", identity.user_agent),
        format!("--window-size={},{}", WINDOW_SIZE.0, WINDOW_SIZE.1),
        format!("--lang={}", primary_language(&identity.accept_language)),
    ]
}

/// Full argument list for a session: identity flags, launcher-specific flags,
/// headless mode, then the user's extras. Duplicates are dropped, first wins.
pub fn build_chrome_arguments(
    browser: &BrowserConfig,
    identity: &IdentityConfig,
    launcher_args: &[&str],
) -> Vec<String> {
    let mut args = build_identity_arguments(identity);
    args.extend(launcher_args.iter().map(|a| a.to_string()));
    if browser.headless {
        args.push("--headless=new".to_string());
    }
    args.extend(browser.args.iter().cloned());

    let mut seen = std::collections::HashSet::new();
    args.retain(|arg| seen.insert(arg.clone()));
    args
}

/// First language tag of an `Accept-Language` value, quality stripped.
fn primary_language(accept_language: &str) -> &str {
    accept_language
        .split(',')
        .next()
        .and_then(|tag| tag.split(';').next())
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .unwrap_or("en-US")
}

/// `Network.setUserAgentOverride` parameters.
pub fn user_agent_override(identity: &IdentityConfig) -> Value {
    json!({
        "userAgent": identity.user_agent,
        "acceptLanguage": identity.accept_language,
    })
}

/// `Network.setExtraHTTPHeaders` parameters. Empty values are left out.
pub fn extra_headers(identity: &IdentityConfig) -> Value {
    let headers: serde_json::Map<String, Value> = [
        ("Accept", &identity.accept),
        ("Accept-Language", &identity.accept_language),
        ("Referer", &identity.referer),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(name, value)| (name.to_string(), json!(value)))
    .collect();
    json!({ "headers": headers })
}
