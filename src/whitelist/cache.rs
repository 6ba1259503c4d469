//! # 白名单缓存
//!
//! 读多写少：读取方持读锁访问当前快照，刷新在锁外查询存储，
//! 只在替换快照的瞬间持写锁。轮换与吊销在写锁内对快照做写时复制，
//! 仅当有刷新在进行时留档，供其完成时重放。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::logging::mask_token;
use crate::store::CredentialStore;
use crate::{
    ldebug, linfo,
    logging::{LogComponent, LogStage},
};

/// 白名单条目，存储数据的派生投影
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhitelistEntry {
    pub user_id: i32,
    pub token: String,
    pub expires_at: NaiveDateTime,
}

impl WhitelistEntry {
    #[must_use]
    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        self.expires_at < now
    }
}

/// 吊销墓碑的保留时长，超过后由成功的刷新清理
const TOMBSTONE_RETENTION_MINUTES: i64 = 10;

/// 对快照的单点变更
#[derive(Debug, Clone)]
enum Mutation {
    /// `observed_at` 为条目从存储读出的时间
    Rotate {
        old: String,
        entry: WhitelistEntry,
        observed_at: NaiveDateTime,
    },
    Revoke {
        token: String,
    },
    RevokeUser {
        user_id: i32,
        at: NaiveDateTime,
    },
}

/// 不可变快照
#[derive(Debug, Clone, Default)]
pub struct WhitelistSnapshot {
    entries: HashMap<String, WhitelistEntry>,
    refreshed_at: Option<NaiveDateTime>,
}

impl WhitelistSnapshot {
    #[must_use]
    pub fn get(&self, token: &str) -> Option<&WhitelistEntry> {
        self.entries.get(token)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub const fn refreshed_at(&self) -> Option<NaiveDateTime> {
        self.refreshed_at
    }
}

/// 写锁保护的全部状态
#[derive(Default)]
struct CacheState {
    snapshot: Arc<WhitelistSnapshot>,
    /// 进行中的刷新的开始时间
    in_flight: Vec<NaiveDateTime>,
    /// 进行中的刷新开始之后的变更，刷新完成时重放
    pending: Vec<(NaiveDateTime, Mutation)>,
    /// 用户被整体吊销的时间，吊销之前读出的条目不再放入
    revoked_users: HashMap<i32, NaiveDateTime>,
}

impl CacheState {
    /// 应用到条目集合，返回是否生效
    fn apply(&self, entries: &mut HashMap<String, WhitelistEntry>, mutation: &Mutation) -> bool {
        match mutation {
            Mutation::Rotate {
                old,
                entry,
                observed_at,
            } => {
                entries.remove(old);
                let revoked = self
                    .revoked_users
                    .get(&entry.user_id)
                    .is_some_and(|revoked_at| observed_at < revoked_at);
                if !revoked {
                    entries.insert(entry.token.clone(), entry.clone());
                }
                !revoked
            }
            Mutation::Revoke { token } => entries.remove(token).is_some(),
            Mutation::RevokeUser { user_id, .. } => {
                let before = entries.len();
                entries.retain(|_, e| e.user_id != *user_id);
                entries.len() != before
            }
        }
    }

    fn record(&mut self, at: NaiveDateTime, mutation: Mutation) -> bool {
        if let Mutation::RevokeUser { user_id, at } = &mutation {
            self.revoked_users.insert(*user_id, *at);
        }
        let mut snapshot = std::mem::take(&mut self.snapshot);
        let applied = self.apply(&mut Arc::make_mut(&mut snapshot).entries, &mutation);
        self.snapshot = snapshot;
        // 没有刷新在进行时，变更已体现在存储中，无需留档
        if !self.in_flight.is_empty() {
            self.pending.push((at, mutation));
        }
        applied
    }

    fn begin_refresh(&mut self) -> NaiveDateTime {
        let started_at = Utc::now().naive_utc();
        self.in_flight.push(started_at);
        started_at
    }

    /// 结束一次刷新（无论成败），只保留仍有刷新需要的变更
    fn end_refresh(&mut self, started_at: NaiveDateTime) {
        if let Some(pos) = self.in_flight.iter().position(|t| *t == started_at) {
            self.in_flight.swap_remove(pos);
        }
        match self.in_flight.iter().min().copied() {
            Some(oldest) => self.pending.retain(|(at, _)| *at >= oldest),
            None => self.pending.clear(),
        }
    }
}

/// 白名单缓存
pub struct WhitelistCache {
    store: Arc<dyn CredentialStore>,
    state: RwLock<CacheState>,
}

impl WhitelistCache {
    /// 创建空缓存，首次 `refresh` 之前所有令牌都无效
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// 从存储整体重建快照并原子替换
    ///
    /// 失败时保留旧快照，错误交给调用方记录
    pub async fn refresh(&self) -> Result<usize> {
        let started_at = self.state.write().await.begin_refresh();
        let loaded = self.store.load_whitelist(started_at).await;

        let mut guard = self.state.write().await;
        let loaded = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                guard.end_refresh(started_at);
                return Err(e);
            }
        };

        let mut entries: HashMap<String, WhitelistEntry> = loaded
            .into_iter()
            .map(|entry| (entry.token.clone(), entry))
            .collect();
        // 查询开始之后的变更可能未体现在查询结果中
        for (at, mutation) in &guard.pending {
            if *at >= started_at {
                guard.apply(&mut entries, mutation);
            }
        }
        let size = entries.len();
        guard.snapshot = Arc::new(WhitelistSnapshot {
            entries,
            refreshed_at: Some(started_at),
        });
        guard.end_refresh(started_at);
        let horizon = started_at - Duration::minutes(TOMBSTONE_RETENTION_MINUTES);
        guard.revoked_users.retain(|_, revoked_at| *revoked_at >= horizon);
        drop(guard);

        linfo!(
            "system",
            LogStage::Cache,
            LogComponent::Whitelist,
            "refreshed",
            &format!("白名单已刷新，共 {size} 个有效令牌")
        );
        Ok(size)
    }

    /// 令牌在当前快照中且本地判断未过期
    pub async fn is_valid(&self, token: &str) -> bool {
        let now = Utc::now().naive_utc();
        let guard = self.state.read().await;
        guard
            .snapshot
            .get(token)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// 查询条目
    pub async fn lookup(&self, token: &str) -> Option<WhitelistEntry> {
        self.state.read().await.snapshot.get(token).cloned()
    }

    /// `lookup` 的别名
    pub async fn get_user_info_by_token(&self, token: &str) -> Option<WhitelistEntry> {
        self.lookup(token).await
    }

    /// 令牌续期或轮换后更新缓存：删除旧键并写入新条目
    ///
    /// 续期时 `old` 与新条目令牌相同，仅更新过期时间。`observed_at` 是新条目
    /// 从存储读出的时间，早于该用户最近一次吊销时不放入
    pub async fn apply_rotation(
        &self,
        old: &str,
        entry: WhitelistEntry,
        observed_at: NaiveDateTime,
    ) {
        let rotated = old != entry.token;
        let new_token = entry.token.clone();
        let mutation = Mutation::Rotate {
            old: old.to_string(),
            entry,
            observed_at,
        };
        let applied = self.mutate(mutation).await;

        ldebug!(
            "system",
            LogStage::TokenRotation,
            LogComponent::Whitelist,
            "apply_rotation",
            "白名单条目已更新",
            old = %mask_token(old),
            new = %mask_token(&new_token),
            rotated = rotated,
            applied = applied
        );
    }

    /// 不等待下一次刷新，直接放入一个已确认可用的条目
    pub async fn admit(&self, entry: WhitelistEntry, observed_at: NaiveDateTime) {
        let token = entry.token.clone();
        let applied = self
            .mutate(Mutation::Rotate {
                old: token.clone(),
                entry,
                observed_at,
            })
            .await;

        ldebug!(
            "system",
            LogStage::Cache,
            LogComponent::Whitelist,
            "admit",
            "白名单条目已加入",
            token = %mask_token(&token),
            applied = applied
        );
    }

    /// 立即移除单个令牌，返回是否存在
    pub async fn revoke(&self, token: &str) -> bool {
        self.mutate(Mutation::Revoke {
            token: token.to_string(),
        })
        .await
    }

    /// 立即移除某用户的全部令牌
    pub async fn revoke_user(&self, user_id: i32) {
        let at = Utc::now().naive_utc();
        self.mutate(Mutation::RevokeUser { user_id, at }).await;
    }

    /// 当前快照
    pub async fn snapshot(&self) -> Arc<WhitelistSnapshot> {
        Arc::clone(&self.state.read().await.snapshot)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.snapshot.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.snapshot.is_empty()
    }

    /// 最近一次成功刷新的时间
    pub async fn last_refreshed_at(&self) -> Option<NaiveDateTime> {
        self.state.read().await.snapshot.refreshed_at()
    }

    async fn mutate(&self, mutation: Mutation) -> bool {
        let at = Utc::now().naive_utc();
        self.state.write().await.record(at, mutation)
    }

    #[cfg(test)]
    async fn pending_len(&self) -> usize {
        self.state.read().await.pending.len()
    }
}
