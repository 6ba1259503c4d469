//! # 白名单刷新后台任务
//!
//! 启动时立即刷新一次，此后按固定间隔刷新；支持立即执行与停止。
//! 刷新失败只记录日志，保留旧快照，下一周期重试。

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};

use super::WhitelistCache;
use crate::config::MIN_REFRESH_INTERVAL_SECONDS;
use crate::error::{ProxyError, Result};
use crate::{
    ldebug, lerror, linfo,
    logging::{LogComponent, LogStage},
};

/// 任务状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// 未启动
    NotStarted,
    /// 运行中
    Running,
    /// 停止中
    Stopping,
    /// 已停止
    Stopped,
}

/// 任务控制信号
#[derive(Debug, Clone, Copy)]
enum TaskControl {
    /// 停止任务
    Stop,
    /// 立即执行一次刷新
    ExecuteNow,
}

/// 任务统计信息
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TaskStats {
    pub started_at: Option<DateTime<Utc>>,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub next_execution_time: Option<DateTime<Utc>>,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    /// 最近一次成功刷新后的条目数
    pub last_entry_count: usize,
    pub last_execution_duration_ms: u64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
}

/// 白名单刷新后台任务
pub struct WhitelistRefreshTask {
    cache: Arc<WhitelistCache>,
    period: StdDuration,

    /// 任务状态
    task_state: Arc<RwLock<TaskState>>,

    /// 任务统计信息
    task_stats: Arc<RwLock<TaskStats>>,

    /// 控制信号发送器
    control_sender: broadcast::Sender<TaskControl>,

    /// 任务句柄
    task_handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl WhitelistRefreshTask {
    /// 创建任务，间隔不低于 60 秒
    pub fn new(cache: Arc<WhitelistCache>, period: StdDuration) -> Self {
        let (control_sender, _) = broadcast::channel(10);
        let floor = StdDuration::from_secs(MIN_REFRESH_INTERVAL_SECONDS);

        Self {
            cache,
            period: period.max(floor),
            task_state: Arc::new(RwLock::new(TaskState::NotStarted)),
            task_stats: Arc::new(RwLock::new(TaskStats::default())),
            control_sender,
            task_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// 实际刷新间隔
    #[must_use]
    pub const fn period(&self) -> StdDuration {
        self.period
    }

    /// 启动后台任务
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.task_state.write().await;
            if matches!(*state, TaskState::Running | TaskState::Stopping) {
                return Err(ProxyError::internal("Whitelist refresh task is already running"));
            }
            *state = TaskState::Running;
        }

        {
            let mut stats = self.task_stats.write().await;
            stats.started_at = Some(Utc::now());
            stats.next_execution_time = Some(Utc::now());
        }

        let handle = self.spawn_task_loop();
        *self.task_handle.write().await = Some(handle);

        linfo!(
            "system",
            LogStage::BackgroundTask,
            LogComponent::Scheduler,
            "task_started",
            &format!(
                "白名单刷新任务已启动，间隔 {} 秒",
                self.period.as_secs()
            )
        );
        Ok(())
    }

    /// 停止后台任务并等待其退出
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.task_state.write().await;
            if !matches!(*state, TaskState::Running) {
                return Err(ProxyError::internal("Whitelist refresh task is not running"));
            }
            *state = TaskState::Stopping;
        }

        let _ = self.control_sender.send(TaskControl::Stop);

        let handle = self.task_handle.write().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                lerror!(
                    "system",
                    LogStage::Shutdown,
                    LogComponent::Scheduler,
                    "task_join_failed",
                    &format!("白名单刷新任务退出异常: {e}")
                );
            }
        }

        *self.task_state.write().await = TaskState::Stopped;
        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::Scheduler,
            "task_stopped",
            "白名单刷新任务已停止"
        );
        Ok(())
    }

    /// 请求立即执行一次刷新
    pub fn execute_now(&self) -> Result<()> {
        self.control_sender
            .send(TaskControl::ExecuteNow)
            .map(|_| ())
            .map_err(|_| ProxyError::internal("Whitelist refresh task is not running"))
    }

    /// 获取任务状态
    pub async fn get_state(&self) -> TaskState {
        self.task_state.read().await.clone()
    }

    /// 获取任务统计信息
    pub async fn get_stats(&self) -> TaskStats {
        self.task_stats.read().await.clone()
    }

    fn spawn_task_loop(&self) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let task_stats = Arc::clone(&self.task_stats);
        let mut control_receiver = self.control_sender.subscribe();
        let period = self.period;

        tokio::spawn(async move {
            // 第一次 tick 立即完成
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::execute_refresh(&cache, &task_stats, period).await;
                    }
                    control = control_receiver.recv() => match control {
                        Ok(TaskControl::Stop) | Err(RecvError::Closed) => break,
                        Ok(TaskControl::ExecuteNow) => {
                            Self::execute_refresh(&cache, &task_stats, period).await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            ldebug!(
                                "system",
                                LogStage::BackgroundTask,
                                LogComponent::Scheduler,
                                "control_lagged",
                                &format!("跳过 {skipped} 个控制信号")
                            );
                        }
                    }
                }
            }

            ldebug!(
                "system",
                LogStage::BackgroundTask,
                LogComponent::Scheduler,
                "loop_ended",
                "白名单刷新循环结束"
            );
        })
    }

    async fn execute_refresh(
        cache: &WhitelistCache,
        task_stats: &RwLock<TaskStats>,
        period: StdDuration,
    ) {
        let execution_start = Instant::now();
        let result = cache.refresh().await;
        let elapsed_ms = u64::try_from(execution_start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut stats = task_stats.write().await;
        let now = Utc::now();
        stats.last_execution_time = Some(now);
        stats.next_execution_time =
            Some(now + Duration::from_std(period).unwrap_or_else(|_| Duration::seconds(60)));
        stats.total_executions += 1;
        stats.last_execution_duration_ms = elapsed_ms;

        match result {
            Ok(count) => {
                stats.successful_executions += 1;
                stats.last_entry_count = count;
                stats.consecutive_errors = 0;
            }
            Err(e) => {
                stats.failed_executions += 1;
                stats.consecutive_errors += 1;
                stats.last_error = Some(e.to_string());
                stats.last_error_time = Some(now);
                lerror!(
                    "system",
                    LogStage::BackgroundTask,
                    LogComponent::Whitelist,
                    "refresh_failed",
                    &format!("白名单刷新失败，保留旧快照: {e}"),
                    consecutive_errors = stats.consecutive_errors
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxyError;
    use crate::store::MockCredentialStore;
    use crate::whitelist::WhitelistEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache_with(store: MockCredentialStore) -> Arc<WhitelistCache> {
        Arc::new(WhitelistCache::new(Arc::new(store)))
    }

    async fn wait_for<F>(mut check: F)
    where
        F: FnMut() -> bool,
    {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        panic!("条件在超时前未满足");
    }

    #[test]
    fn test_period_has_floor() {
        let task = WhitelistRefreshTask::new(
            cache_with(MockCredentialStore::new()),
            StdDuration::from_secs(5),
        );
        assert_eq!(task.period(), StdDuration::from_secs(60));
    }

    #[tokio::test]
    async fn test_start_refreshes_immediately_and_stops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut store = MockCredentialStore::new();
        store.expect_load_whitelist().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![WhitelistEntry {
                user_id: 1,
                token: "tok".to_string(),
                expires_at: Utc::now().naive_utc() + Duration::days(1),
            }])
        });
        let cache = cache_with(store);
        let task = WhitelistRefreshTask::new(Arc::clone(&cache), StdDuration::from_secs(3600));

        task.start().await.unwrap();
        assert_eq!(task.get_state().await, TaskState::Running);
        assert!(task.start().await.is_err());

        wait_for(|| calls.load(Ordering::SeqCst) >= 1).await;
        assert!(cache.is_valid("tok").await);

        task.execute_now().unwrap();
        wait_for(|| calls.load(Ordering::SeqCst) >= 2).await;

        task.stop().await.unwrap();
        assert_eq!(task.get_state().await, TaskState::Stopped);
        assert!(task.execute_now().is_err());
        assert!(task.stop().await.is_err());
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let mut store = MockCredentialStore::new();
        store
            .expect_load_whitelist()
            .returning(|_| Err(ProxyError::database("store unreachable")));
        let task = WhitelistRefreshTask::new(cache_with(store), StdDuration::from_secs(3600));

        task.start().await.unwrap();
        for _ in 0..200 {
            if task.get_stats().await.failed_executions >= 1 {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }

        let stats = task.get_stats().await;
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.consecutive_errors, 1);
        assert!(stats.last_error.unwrap_or_default().contains("store unreachable"));
        assert_eq!(task.get_state().await, TaskState::Running);

        task.stop().await.unwrap();
    }
}
