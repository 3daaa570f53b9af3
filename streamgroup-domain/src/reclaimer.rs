//! 回收器（Reclaimer）
//!
//! 叠加在待确认条目表之上的无状态逻辑：按位点升序扫描超时条目，
//! 逐条以“观测值比较并转移”的方式把所有权交给新属主。
//! 与其他回收者竞争失败的条目被跳过而非报错；条目反复超时会被无限重试，
//! 投递次数交给调用方自行决定毒消息策略。
//!
use crate::clock::Clock;
use crate::error::StreamResult;
use crate::group::GroupKey;
use crate::pending::{PendingEntry, PendingEntryTable};
use crate::store::GroupStore;
use crate::value_object::ConsumerId;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct Reclaimer {
    table: PendingEntryTable,
    store: Arc<dyn GroupStore>,
    clock: Arc<dyn Clock>,
    claim_timeout: Duration,
}

impl Reclaimer {
    pub fn new(store: Arc<dyn GroupStore>, clock: Arc<dyn Clock>, claim_timeout: Duration) -> Self {
        Self {
            table: PendingEntryTable::new(store.clone()),
            store,
            clock,
            claim_timeout,
        }
    }

    /// 认领最多 `limit` 条超时条目，返回转移后的记录（位点升序）
    pub async fn claim_expired(
        &self,
        group: &GroupKey,
        new_owner: &ConsumerId,
        limit: usize,
    ) -> StreamResult<Vec<PendingEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let expired = self
            .table
            .list_expired(group, now, self.claim_timeout)
            .await?;

        let mut claimed = Vec::with_capacity(limit.min(expired.len()));
        for observed in expired {
            if claimed.len() == limit {
                break;
            }
            match self.store.transfer(group, &observed, new_owner, now).await? {
                Some(pending) => {
                    debug!(
                        group = %group,
                        entry_id = %pending.entry_id(),
                        previous_owner = %observed.owner(),
                        new_owner = %new_owner,
                        delivery_count = pending.delivery_count(),
                        "Claimed expired entry"
                    );
                    claimed.push(pending);
                }
                None => {
                    debug!(
                        group = %group,
                        entry_id = %observed.entry_id(),
                        new_owner = %new_owner,
                        "Lost claim race, skipping"
                    );
                }
            }
        }
        Ok(claimed)
    }
}
