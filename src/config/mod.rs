pub mod env;
pub mod types;

pub use env::{
    deploy_from_env, deploy_from_lookup, producer_from_env, producer_from_lookup, ConfigError,
};
pub use types::{DeployConfig, ProducerConfig, SourceKind};
