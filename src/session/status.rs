//! バックエンド死活の定期監視
//!
//! 一定間隔で `health()` を呼び、結果を watch チャネルで配信する。
//! `StatusPoller` を drop するとタスクも止まる。

use crate::backend::DetectionBackend;
use layout_review_common::BackendStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct StatusPoller {
    rx: watch::Receiver<BackendStatus>,
    handle: JoinHandle<()>,
}

impl StatusPoller {
    /// 初回チェックは即時
    pub fn spawn<B>(backend: Arc<B>, interval: Duration) -> Self
    where
        B: DetectionBackend + 'static,
    {
        let (tx, rx) = watch::channel(BackendStatus::Unknown);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let status = match backend.health().await {
                    Ok(()) => BackendStatus::Connected,
                    Err(e) => {
                        log::debug!("health check failed: {}", e);
                        BackendStatus::Disconnected
                    }
                };

                let changed = tx.send_if_modified(|current| {
                    if *current == status {
                        return false;
                    }
                    *current = status;
                    true
                });
                if changed {
                    log::info!("backend status: {}", status);
                }
                if tx.is_closed() {
                    break;
                }
            }
        });

        Self { rx, handle }
    }

    pub fn current(&self) -> BackendStatus {
        *self.rx.borrow()
    }

    /// 状態が変わるまで待つ。監視タスクが終了していれば None
    pub async fn changed(&mut self) -> Option<BackendStatus> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    pub fn subscribe(&self) -> watch::Receiver<BackendStatus> {
        self.rx.clone()
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
