//! 会话监管：生成周期编号与中断管理
//!
//! 同一时间最多一个在途周期；持有其 CancelHandle，用户 Stop 或 reset 时触发取消。
//! 周期编号单调递增，用来识别已结束或被抢占的周期发来的过期事件。

use crate::transport::{CancelHandle, CancelReason};

/// 生成周期编号
pub type CycleId = u64;

/// 周期级生命周期管理：编号与取消句柄
#[derive(Debug, Default)]
pub struct SessionSupervisor {
    next_id: CycleId,
    active: Option<(CycleId, CancelHandle)>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新周期并返回其编号
    pub fn start(&mut self, cancel: CancelHandle) -> CycleId {
        self.next_id += 1;
        let id = self.next_id;
        self.active = Some((id, cancel));
        id
    }

    pub fn active_id(&self) -> Option<CycleId> {
        self.active.as_ref().map(|(id, _)| *id)
    }

    pub fn is_active(&self, id: CycleId) -> bool {
        self.active_id() == Some(id)
    }

    /// 向在途周期发出取消请求；无在途周期时返回 false
    pub fn cancel(&self, reason: CancelReason) -> bool {
        match &self.active {
            Some((_, cancel)) => {
                cancel.cancel(reason);
                true
            }
            None => false,
        }
    }

    /// 周期收到终止事件后注销
    pub fn finish(&mut self, id: CycleId) -> bool {
        if self.is_active(id) {
            self.active = None;
            true
        } else {
            false
        }
    }

    /// 取消并丢弃在途周期（reset 用）
    pub fn abort(&mut self, reason: CancelReason) {
        if let Some((_, cancel)) = self.active.take() {
            cancel.cancel(reason);
        }
    }
}
