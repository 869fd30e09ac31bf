use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

/// 优雅关闭管理器
///
/// worker 循环、租约回收、API 服务都订阅同一个广播，收到信号后各自收尾退出。
#[derive(Clone)]
pub struct ShutdownManager {
    /// 触发后置为 `None`，之后的订阅者会立即收到信号
    sender: Arc<Mutex<Option<broadcast::Sender<()>>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        match self.sender.lock().await.as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(1);
                let _ = sender.send(());
                receiver
            }
        }
    }

    /// 广播关闭信号，重复调用无效果。返回本次是否真正触发了关闭
    pub async fn shutdown(&self) -> bool {
        let Some(sender) = self.sender.lock().await.take() else {
            debug!("关闭信号已经发送过");
            return false;
        };

        debug!("发送关闭信号给 {} 个订阅者", sender.receiver_count());
        let _ = sender.send(());
        info!("关闭信号已发送");
        true
    }

    pub async fn is_shutdown(&self) -> bool {
        self.sender.lock().await.is_none()
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
