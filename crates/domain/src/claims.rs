use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// 任务运行标记
///
/// 每个任务一个 `AtomicBool`，认领通过 compare-and-swap 完成，
/// 不需要跨任务的全局锁。标记只存在于进程内存中，进程重启后全部为 false。
#[derive(Debug, Default)]
pub struct RunningFlags {
    flags: RwLock<HashMap<i64, Arc<AtomicBool>>>,
}

impl RunningFlags {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, task_id: i64) -> Arc<AtomicBool> {
        if let Some(flag) = self
            .flags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task_id)
        {
            return flag.clone();
        }
        self.flags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(task_id)
            .or_default()
            .clone()
    }

    /// 原子地把标记从 false 置为 true，成功返回 true
    pub fn try_claim(&self, task_id: i64) -> bool {
        self.flag(task_id)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self, task_id: i64) {
        self.flag(task_id).store(false, Ordering::Release);
    }

    pub fn is_running(&self, task_id: i64) -> bool {
        self.flags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task_id)
            .map(|flag| flag.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub fn running_count(&self) -> usize {
        self.flags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|flag| flag.load(Ordering::Acquire))
            .count()
    }

    /// 清除所有标记
    pub fn reset(&self) {
        self.flags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
