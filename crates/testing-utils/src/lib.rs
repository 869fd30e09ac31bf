//! # Standings Testing Utils
//!
//! 各 crate 共享的测试工具：
//!
//! - **构建器**: 带默认值的任务、比赛数据和积分行构建器
//! - **模拟仓储**: 可注入故障和延迟的比赛数据源
//! - **临时数据库**: 基于临时目录的 SQLite 文件
//! - **辅助函数**: 等待条件、时间偏移等
//!
//! 作为 dev-dependency 使用：
//!
//! ```toml
//! [dev-dependencies]
//! standings-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod containers;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use containers::*;
pub use helpers::*;
pub use mocks::*;
