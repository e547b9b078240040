//! Authorization configurations, flows, token cache, and the authorization runner.

pub mod configuration;
pub mod error;
pub mod events;
pub mod flow;
pub mod flows;
pub mod manager;
pub mod session;
pub mod status;
pub mod store;

pub use configuration::{AuthorizationConfiguration, AuthorizationTarget};
pub use error::{AuthError, InvalidTokenError, InvalidTokenSource};
pub use events::{Subject, SubscriptionId, TokenStored, TokensRemoved};
pub use flow::{AuthorizationFlow, FnFlow, FlowFn, SIMPLE_POPUP};
pub use flows::{BrowserLauncher, PopupSettings, SimplePopupFlow, SystemBrowser};
pub use manager::{RenderAuthorization, RenderFn, RunOptions, TokenManager, Trigger};
pub use session::{SessionBus, SessionEvent};
pub use status::{transition, AuthorizationStatus, StatusEvent};
pub use store::{GetTokenOptions, TokenStore};
