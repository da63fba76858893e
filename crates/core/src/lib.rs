#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod metrics;
pub mod process;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, KmsieveError};

// 설정
pub use config::{FilterMode, KmsieveConfig};
