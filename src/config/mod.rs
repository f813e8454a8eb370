mod settings;

pub use settings::{IpSourceConfig, ProviderConfig, RetryConfig, RetryPolicy, Settings};
