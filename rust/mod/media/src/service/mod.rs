pub mod health;
pub mod proxy;
pub mod resolver;
pub mod selector;
pub mod session;

pub use health::{start_refresher, HealthMonitor, HealthProbe, HttpHealthProbe};
pub use proxy::{ProxyConfig, ProxyService};
pub use resolver::MetadataResolver;
pub use selector::{BackendSelector, ModeListener, SubscriptionId, ACTIVE_MODE_KEY};
pub use session::{StreamOutcome, StreamSession};
