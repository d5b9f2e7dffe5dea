//! 库所/迁移网：构建、发生、离线分析与事件驱动运行时。
#![warn(non_snake_case)]

pub mod analysis;
pub mod config;
pub mod net;
pub mod options;
pub mod report;
pub mod runtime;

pub use config::Config;
pub use net::{Engine, Marking, Net, NetBuilder, Place};
pub use runtime::{Event, Runtime, RuntimeError};
