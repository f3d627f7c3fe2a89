//! 优雅关闭
//!
//! Ctrl+C / SIGTERM 触发同一个 CancellationToken：后台会话清理任务退出，HTTP 服务停止接收新请求。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 关闭原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C 或 /quit
    UserInitiated,
    /// SIGTERM
    Signal,
}

/// 关闭信号
#[derive(Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn trigger(&self, reason: ShutdownReason) {
        if !self.token.is_cancelled() {
            tracing::info!(?reason, "shutting down");
        }
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// 安装系统信号处理器（Ctrl+C, SIGTERM）
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let shutdown = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                shutdown.trigger(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let shutdown = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    shutdown.trigger(ShutdownReason::Signal);
                }
            });
        }
    }

    /// 等待后台任务退出，超时则中止
    pub async fn join(&self, handle: JoinHandle<()>, timeout: Duration) {
        let abort = handle.abort_handle();
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => tracing::debug!("background task finished"),
            Ok(Err(e)) => tracing::warn!(error = %e, "background task ended abnormally"),
            Err(_) => {
                tracing::warn!(?timeout, "background task did not stop in time, aborting");
                abort.abort();
            }
        }
    }
}
