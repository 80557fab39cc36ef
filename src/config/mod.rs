// src/config/mod.rs
pub mod engine;

pub use engine::{
    EngineConfig, PathsConfig, TasksConfig, DEFAULT_ENGINE_CONFIG_PATH, ENV_ENGINE_CONFIG_PATH,
    ENV_MIN_SAMPLE_SIZE, ENV_TASK_TTL_SECS,
};
