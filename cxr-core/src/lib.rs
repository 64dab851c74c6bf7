pub mod builder;
pub mod config;
pub mod data;
pub mod error;

pub use builder::build_transformation;
pub use config::{ExperimentConfig, Phase, TrainConfig};
pub use error::{ConfigError, DataModuleError, DatasetError, ImaGenomeError, LoaderError, TokenizerError};
