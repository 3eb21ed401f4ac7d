pub mod classify;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod identity;
pub mod logging;
pub mod watcher;

pub use classify::{ChangeClassifier, ChangeKind, ReloadCategory};
pub use config::Settings;
pub use dispatch::{DebounceState, DebouncedDispatcher};
pub use gateway::{GatewayError, HttpGateway, ReloadGateway, RemoteId};
pub use identity::{
    BootstrapError, IdentityBootstrapper, IdentityError, IdentityStore, ServiceAccountCredential,
};
pub use watcher::{ConfigWatcher, WatchError};
