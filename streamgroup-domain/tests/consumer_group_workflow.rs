use anyhow::Result as AnyResult;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use streamgroup_domain::clock::ManualClock;
use streamgroup_domain::dispatcher::{Dispatcher, DispatcherConfig};
use streamgroup_domain::entry::Delivery;
use streamgroup_domain::error::StreamError;
use streamgroup_domain::group::GroupKey;
use streamgroup_domain::log::{InMemoryStreamLog, StreamLog};
use streamgroup_domain::retry::RetryPolicy;
use streamgroup_domain::store::InMemoryGroupStore;
use streamgroup_domain::value_object::{ConsumerId, CreateMode, EntryId, StartPosition};

const CLAIM_TIMEOUT: Duration = Duration::from_secs(30);

struct Harness {
    clock: ManualClock,
    log: Arc<InMemoryStreamLog>,
    dispatcher: Dispatcher,
    group: GroupKey,
}

impl Harness {
    async fn new(entries: usize) -> AnyResult<Self> {
        let clock = ManualClock::default();
        let log = Arc::new(InMemoryStreamLog::new(Arc::new(clock.clone())));
        let dispatcher = Dispatcher::builder()
            .log(log.clone())
            .store(Arc::new(InMemoryGroupStore::new()))
            .clock(Arc::new(clock.clone()))
            .config(
                DispatcherConfig::builder()
                    .claim_timeout(CLAIM_TIMEOUT)
                    .build(),
            )
            .build();
        let group = GroupKey::new("orders", "G");

        for i in 1..=entries {
            log.append(group.stream(), Bytes::from(format!("order-{i}")))
                .await?;
        }
        dispatcher
            .registry()
            .create_group(&group, StartPosition::Beginning, CreateMode::Strict)
            .await?;

        Ok(Self {
            clock,
            log,
            dispatcher,
            group,
        })
    }

    async fn cursor(&self) -> AnyResult<EntryId> {
        Ok(self
            .dispatcher
            .registry()
            .group(&self.group)
            .await?
            .last_delivered_id())
    }
}

fn ids(deliveries: &[Delivery]) -> Vec<u64> {
    deliveries.iter().map(|d| d.id().value()).collect()
}

#[tokio::test]
async fn abandoned_entry_is_reclaimed_by_another_consumer() -> AnyResult<()> {
    let h = Harness::new(3).await?;
    let a = ConsumerId::new("A");
    let b = ConsumerId::new("B");

    let got = h.dispatcher.poll(&h.group, &a, 2).await?;
    assert_eq!(ids(&got), vec![1, 2]);
    assert_eq!(h.cursor().await?, EntryId::new(2));

    let got = h.dispatcher.poll(&h.group, &b, 2).await?;
    assert_eq!(ids(&got), vec![3]);
    assert!(got.iter().all(|d| !d.is_reclaimed()));

    // A 确认 2，但从未确认 1
    h.dispatcher.ack(&h.group, &a, EntryId::new(2)).await?;
    h.dispatcher.ack(&h.group, &b, EntryId::new(3)).await?;
    h.clock.advance(CLAIM_TIMEOUT + Duration::from_secs(1));

    let got = h.dispatcher.poll(&h.group, &b, 2).await?;
    assert_eq!(ids(&got), vec![1]);
    assert!(got[0].is_reclaimed());
    assert_eq!(got[0].delivery_count(), 2);
    assert_eq!(got[0].entry().payload(), &Bytes::from("order-1"));

    let pending = h
        .dispatcher
        .pending()
        .get(&h.group, EntryId::new(1))
        .await?
        .expect("entry 1 is still pending");
    assert_eq!(pending.owner(), &b);
    Ok(())
}

#[tokio::test]
async fn stale_owner_ack_is_rejected() -> AnyResult<()> {
    let h = Harness::new(3).await?;
    let a = ConsumerId::new("A");
    let b = ConsumerId::new("B");

    h.dispatcher.poll(&h.group, &a, 2).await?;
    h.dispatcher.poll(&h.group, &b, 2).await?;
    h.dispatcher.ack(&h.group, &a, EntryId::new(2)).await?;
    assert!(
        h.dispatcher
            .pending()
            .get(&h.group, EntryId::new(2))
            .await?
            .is_none()
    );

    h.clock.advance(CLAIM_TIMEOUT + Duration::from_secs(1));
    h.dispatcher.poll(&h.group, &b, 2).await?;

    // 以回收前的属主 A 确认 1
    let err = h
        .dispatcher
        .ack(&h.group, &a, EntryId::new(1))
        .await
        .unwrap_err();
    match err {
        StreamError::OwnershipMismatch {
            entry_id,
            owner,
            actual_owner,
            ..
        } => {
            assert_eq!(entry_id, EntryId::new(1));
            assert_eq!(owner, a);
            assert_eq!(actual_owner, b);
        }
        other => panic!("unexpected error: {other}"),
    }

    // 条目仍由 B 持有，B 可以正常确认
    h.dispatcher.ack(&h.group, &b, EntryId::new(1)).await?;
    assert_eq!(h.dispatcher.monitor().pending_count(&h.group).await?, 1);
    Ok(())
}

#[tokio::test]
async fn repeated_ack_reports_not_found() -> AnyResult<()> {
    let h = Harness::new(1).await?;
    let a = ConsumerId::new("A");

    h.dispatcher.poll(&h.group, &a, 1).await?;
    h.dispatcher.ack(&h.group, &a, EntryId::new(1)).await?;

    let err = h
        .dispatcher
        .ack(&h.group, &a, EntryId::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::NotFound { .. }));
    assert_eq!(h.dispatcher.monitor().pending_count(&h.group).await?, 0);
    assert_eq!(h.cursor().await?, EntryId::new(1));
    Ok(())
}

#[tokio::test]
async fn new_entries_are_a_contiguous_slice_after_the_cursor() -> AnyResult<()> {
    let h = Harness::new(5).await?;
    let a = ConsumerId::new("A");

    let first = h.dispatcher.poll(&h.group, &a, 2).await?;
    let second = h.dispatcher.poll(&h.group, &a, 10).await?;
    assert_eq!(ids(&first), vec![1, 2]);
    assert_eq!(ids(&second), vec![3, 4, 5]);

    // 日志为空时返回空结果，不阻塞
    assert!(h.dispatcher.poll(&h.group, &a, 10).await?.is_empty());

    h.log
        .append(h.group.stream(), Bytes::from_static(b"late"))
        .await?;
    assert_eq!(ids(&h.dispatcher.poll(&h.group, &a, 10).await?), vec![6]);
    Ok(())
}

#[tokio::test]
async fn tail_group_skips_history() -> AnyResult<()> {
    let h = Harness::new(3).await?;
    let late = GroupKey::new("orders", "late-joiners");
    h.dispatcher
        .registry()
        .create_group(&late, StartPosition::Tail, CreateMode::IfNotExists)
        .await?;

    let a = ConsumerId::new("A");
    assert!(h.dispatcher.poll(&late, &a, 10).await?.is_empty());
    h.log
        .append(late.stream(), Bytes::from_static(b"fresh"))
        .await?;
    assert_eq!(ids(&h.dispatcher.poll(&late, &a, 10).await?), vec![4]);

    // 两个消费组互不影响
    assert_eq!(ids(&h.dispatcher.poll(&h.group, &a, 10).await?), vec![1, 2, 3, 4]);
    Ok(())
}

#[tokio::test]
async fn unavailable_log_never_advances_the_cursor() -> AnyResult<()> {
    let h = Harness::new(2).await?;
    let a = ConsumerId::new("A");

    h.log.set_unavailable(true);
    let err = h.dispatcher.poll(&h.group, &a, 2).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(h.cursor().await?, EntryId::ZERO);
    assert_eq!(h.dispatcher.monitor().pending_count(&h.group).await?, 0);

    h.log.set_unavailable(false);
    assert_eq!(ids(&h.dispatcher.poll(&h.group, &a, 2).await?), vec![1, 2]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_outage_is_retried_within_a_poll() -> AnyResult<()> {
    let log = Arc::new(InMemoryStreamLog::default());
    let dispatcher = Arc::new(
        Dispatcher::builder()
            .log(log.clone())
            .store(Arc::new(InMemoryGroupStore::new()))
            .retry(
                RetryPolicy::builder()
                    .max_attempts(5)
                    .initial_backoff(Duration::from_millis(100))
                    .build(),
            )
            .build(),
    );
    let group = GroupKey::new("orders", "G");
    log.append(group.stream(), Bytes::from_static(b"x")).await?;
    dispatcher
        .registry()
        .create_group(&group, StartPosition::Beginning, CreateMode::IfNotExists)
        .await?;

    log.set_unavailable(true);
    let poll = tokio::spawn({
        let dispatcher = dispatcher.clone();
        let group = group.clone();
        async move { dispatcher.poll(&group, &ConsumerId::new("A"), 1).await }
    });
    // 第一次重试的退避期间恢复
    tokio::time::sleep(Duration::from_millis(50)).await;
    log.set_unavailable(false);

    let got = poll.await??;
    assert_eq!(ids(&got), vec![1]);
    Ok(())
}
