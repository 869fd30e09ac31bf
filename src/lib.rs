//! 积分榜服务的组装层：按配置连接存储、创建各组件，并提供统一的关闭信号。

pub mod app;
pub mod shutdown;

pub use app::{AppMode, Application, MEMORY_DATABASE_URL};
pub use shutdown::ShutdownManager;
