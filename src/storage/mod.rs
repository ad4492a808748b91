//! Storage for configuration and persisted session state.

pub mod config;
pub mod kv;
pub mod paths;

pub use config::{
    Config, ConfigOverrides, ConfigSource, ConfigSources, ENV_BASE_URL, ENV_CACHE_CAPACITY,
    ENV_CONFIG, ENV_ENVIRONMENT, ENV_NO_LOADING, ENV_RETRY_COUNT, ENV_TIMEOUT_MS, Environment,
    ResolvedConfig,
};
pub use kv::{FileStore, KeyValueStore, KeyringStore, MemoryStore, StoreKind, open_store};
pub use paths::AppPaths;
