//! Bundled authorization flows.

pub mod simple_popup;

pub use simple_popup::{BrowserLauncher, PopupSettings, SimplePopupFlow, SystemBrowser};
