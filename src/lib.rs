//! redis-keystore - declarative keyset management for Redis
//!
//! Converges a Redis database to a declared set of string keys and values,
//! reports the observed state back and assigns each managed keyset a stable
//! identity. Store traffic can be routed through an SSH bastion.

pub mod config;
pub mod forwarding;
pub mod keyset;
pub mod reconciler;
pub mod ssh;
pub mod store;

pub use config::{Endpoint, EndpointConfig};
pub use keyset::{Change, Keyset, ResourceId};
pub use reconciler::{Lifecycle, ManagedKeyset, ReconcileError, Reconciler};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging on stderr, filtered by `RUST_LOG` (default `info`)
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
