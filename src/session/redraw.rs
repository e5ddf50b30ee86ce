//! 再描画要求の集約
//!
//! 状態変更のたびに `request` し、描画側は1フレームに1回 `take_frame` する。
//! 連続した変更（スライダー操作など）は1回の再描画にまとめられる。

use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RedrawCause {
    Page,
    Detections,
    Selection,
    Viewport,
    NaturalSize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedrawFrame {
    pub causes: BTreeSet<RedrawCause>,
    /// このフレームにまとめられた要求の数
    pub coalesced: usize,
}

#[derive(Debug, Default)]
pub struct RedrawScheduler {
    causes: BTreeSet<RedrawCause>,
    requests: usize,
}

impl RedrawScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, cause: RedrawCause) {
        self.causes.insert(cause);
        self.requests += 1;
    }

    pub fn is_pending(&self) -> bool {
        self.requests > 0
    }

    /// 保留中の要求を1フレーム分として取り出す
    pub fn take_frame(&mut self) -> Option<RedrawFrame> {
        if self.requests == 0 {
            return None;
        }
        let frame = RedrawFrame {
            causes: std::mem::take(&mut self.causes),
            coalesced: self.requests,
        };
        self.requests = 0;
        Some(frame)
    }
}
