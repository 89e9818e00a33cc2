//! 请求闸门：epoch 令牌 + 可取消防抖
//!
//! 每个管线字段（元地址、代币、ENS）持有一个 `RequestGate`：
//! - 每次新的逻辑输入使 epoch 自增，发出携带该 epoch 的 `Ticket`
//! - 同一输入已在防抖/请求中/已完成时不再发出（去重）
//! - 异步结果只有在 ticket 仍是当前 epoch 时才会写入，否则丢弃
//!
//! 字段状态：`Idle -> PendingDebounce -> InFlight -> {Done, Failed}`。
//! 防抖计时器不需要显式取消：新输入推进 epoch 后，旧 ticket 在醒来时自然失效。

use std::{
    fmt::Debug,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use tokio::sync::watch;
use tracing::debug;

use crate::{error::StealthError, metrics};

/// 字段状态
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldState<V> {
    #[default]
    Idle,
    PendingDebounce,
    InFlight,
    Done(V),
    Failed(StealthError),
}

impl<V> FieldState<V> {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PendingDebounce => "pending_debounce",
            Self::InFlight => "in_flight",
            Self::Done(_) => "done",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::PendingDebounce | Self::InFlight)
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Done(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&StealthError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// 一次请求的身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
    pub epoch: u64,
    pub key: K,
}

/// 一次调用对字段产生的效果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<V> {
    /// 结果已写入字段
    Applied(Result<V, StealthError>),
    /// 相同输入已在处理或已完成，未发出请求
    Deduplicated,
    /// 被更新的输入取代，结果（若有）已丢弃
    Superseded,
}

impl<V> GateOutcome<V> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

#[derive(Debug)]
struct Slot<K, V> {
    epoch: u64,
    key: Option<K>,
    state: FieldState<V>,
}

#[derive(Debug)]
pub struct RequestGate<K, V> {
    field: &'static str,
    slot: Mutex<Slot<K, V>>,
    /// 每次状态变化递增，供 `settled` 等待
    changes: watch::Sender<u64>,
}

impl<K, V> RequestGate<K, V>
where
    K: Clone + PartialEq + Debug,
    V: Clone,
{
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            slot: Mutex::new(Slot {
                epoch: 0,
                key: None,
                state: FieldState::Idle,
            }),
            changes: watch::channel(0).0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<K, V>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn changed(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    /// 新输入。相同 key 正在处理或已完成时返回 None；失败过的 key 允许重新发起。
    pub fn begin(&self, key: K) -> Option<Ticket<K>> {
        let mut slot = self.lock();

        let same_key = slot.key.as_ref() == Some(&key);
        let settled_or_busy = matches!(
            slot.state,
            FieldState::PendingDebounce | FieldState::InFlight | FieldState::Done(_)
        );
        if same_key && settled_or_busy {
            debug!(field = self.field, key = ?key, state = slot.state.as_str(), "request deduplicated");
            metrics::inc_deduplicated(self.field);
            return None;
        }

        slot.epoch += 1;
        slot.key = Some(key.clone());
        slot.state = FieldState::PendingDebounce;
        self.changed();

        Some(Ticket {
            epoch: slot.epoch,
            key,
        })
    }

    /// 输入变为无效或被重置：推进 epoch，使所有未完成的 ticket 失效
    pub fn invalidate(&self) {
        let mut slot = self.lock();
        slot.epoch += 1;
        slot.key = None;
        slot.state = FieldState::Idle;
        self.changed();
    }

    /// 直接写入结果（无需网络请求的快速路径，例如原生资产）
    pub fn set_immediate(&self, key: K, result: Result<V, StealthError>) {
        let mut slot = self.lock();
        slot.epoch += 1;
        slot.key = Some(key);
        slot.state = match result {
            Ok(v) => FieldState::Done(v),
            Err(e) => FieldState::Failed(e),
        };
        self.changed();
    }

    pub fn is_current(&self, ticket: &Ticket<K>) -> bool {
        self.lock().epoch == ticket.epoch
    }

    /// 防抖结束，进入 InFlight；ticket 已过期时返回 false
    pub fn start(&self, ticket: &Ticket<K>) -> bool {
        let mut slot = self.lock();
        if slot.epoch != ticket.epoch {
            return false;
        }
        slot.state = FieldState::InFlight;
        true
    }

    /// 写入结果；ticket 已过期时丢弃并返回 false
    pub fn finish(&self, ticket: &Ticket<K>, result: Result<V, StealthError>) -> bool {
        let mut slot = self.lock();
        if slot.epoch != ticket.epoch {
            debug!(
                field = self.field,
                key = ?ticket.key,
                epoch = ticket.epoch,
                current_epoch = slot.epoch,
                "stale result dropped"
            );
            metrics::inc_stale_dropped(self.field);
            return false;
        }
        slot.state = match result {
            Ok(v) => FieldState::Done(v),
            Err(e) => FieldState::Failed(e),
        };
        self.changed();
        true
    }

    pub fn state(&self) -> FieldState<V> {
        self.lock().state.clone()
    }

    pub fn current_key(&self) -> Option<K> {
        self.lock().key.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// 等待防抖间隔后进入 InFlight；期间若有新输入则返回 false
    pub async fn debounce(&self, ticket: &Ticket<K>, delay: Duration) -> bool {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.start(ticket)
    }

    /// 等待 `key` 的请求落定（Done / Failed）
    ///
    /// 用于去重后的调用方拿到在途请求的结果；key 被替换或字段被重置时返回 None。
    pub async fn settled(&self, key: &K) -> Option<Result<V, StealthError>> {
        loop {
            let mut changes = self.changes.subscribe();
            {
                let slot = self.lock();
                if slot.key.as_ref() != Some(key) {
                    return None;
                }
                match &slot.state {
                    FieldState::Done(v) => return Some(Ok(v.clone())),
                    FieldState::Failed(e) => return Some(Err(e.clone())),
                    FieldState::Idle => return None,
                    FieldState::PendingDebounce | FieldState::InFlight => {}
                }
            }
            if changes.changed().await.is_err() {
                return None;
            }
        }
    }

    /// 完整流程：begin → debounce → 执行请求 → finish
    pub async fn run<F, Fut>(&self, key: K, delay: Duration, request: F) -> GateOutcome<V>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, StealthError>>,
    {
        let Some(ticket) = self.begin(key) else {
            return GateOutcome::Deduplicated;
        };

        if !self.debounce(&ticket, delay).await {
            return GateOutcome::Superseded;
        }

        let result = request().await;
        if self.finish(&ticket, result.clone()) {
            GateOutcome::Applied(result)
        } else {
            GateOutcome::Superseded
        }
    }
}
