//! 重算 worker
//!
//! 从任务队列领取 (联赛, 赛季) 重算任务，执行 快照 -> 读取比赛 -> 计算 -> 带版本提交 -> 审计，
//! 并把结果交回队列。多个 worker 可以并行运行，同一个 (联赛, 赛季) 同一时刻只会被一个 worker 处理。

pub mod components;

pub use components::{LeaseHeartbeat, RecalculationExecutor, RecalculationWorker, WorkerPool};
