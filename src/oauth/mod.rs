pub mod broker;
pub mod state;

pub use broker::OAuthBroker;
pub use state::{OAuthState, StateSigner};
