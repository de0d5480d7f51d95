//! WebDriver implementation of the extraction pipeline's browser traits.
//!
//! - [`clicktrace_browser::launcher`]: local and bundled Chrome launchers,
//!   selected by [`clicktrace_browser::launcher::launcher_from_config`]
//! - [`clicktrace_browser::browser::WebDriverBrowser`]: one session per request
//! - [`clicktrace_browser::page::WebDriverPage`]: a window; navigation, identity, frame walk
//! - [`clicktrace_browser::frame::WebDriverFrame`]: script evaluation inside a frame path
//! - [`clicktrace_browser::identity`]: Chrome flags and DevTools identity payloads
pub mod clicktrace_browser;

pub use clicktrace_browser::browser::WebDriverBrowser;
pub use clicktrace_browser::launcher::{
    launcher_from_config, BundledChromeLauncher, DynLauncher, LocalChromeLauncher,
};
pub use clicktrace_browser::page::WebDriverPage;
