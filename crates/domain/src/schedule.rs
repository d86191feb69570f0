//! 到期时间计算
//!
//! 这里的函数都是纯函数：结果只取决于描述中的
//! `enabled`、`running`、`last_start_utc`、`last_enabled_utc`、`interval_seconds`
//! 以及传入的评估时间。

use chrono::{DateTime, Utc};

use crate::entities::TaskDescriptor;

/// 到期基准：`max(last_start_utc, last_enabled_utc)`，缺失的一方忽略
pub fn due_baseline(task: &TaskDescriptor) -> Option<DateTime<Utc>> {
    match (task.last_start_utc, task.last_enabled_utc) {
        (Some(start), Some(enabled)) => Some(start.max(enabled)),
        (start, enabled) => start.or(enabled),
    }
}

/// 任务在 `now` 时刻是否到期
///
/// 没有任何基准时间的启用任务立即到期。
pub fn is_due(task: &TaskDescriptor, now: DateTime<Utc>) -> bool {
    if !task.enabled || task.running {
        return false;
    }
    match due_baseline(task) {
        Some(baseline) => now - baseline >= task.interval(),
        None => true,
    }
}

/// 下一次到期的时间点，仅用于展示。禁用的任务返回 None。
pub fn next_due_at(task: &TaskDescriptor) -> Option<DateTime<Utc>> {
    if !task.enabled {
        return None;
    }
    due_baseline(task).map(|baseline| baseline + task.interval())
}
