//! 演示：一个脚本化生产者 + 一组消费者协作消费同一条流
//!
//! 生产者向 `messages:published` 追加消息；`message-processors` 组内的每个消费者
//! 解析、校验、处理消息并把结果记录到 `messages:processed`；吞吐上报器周期输出处理速率。
//!
mod config;
mod handler;
mod message;
mod producer;

use clap::Parser;
use config::DemoArgs;
use handler::MessageIdJsonHandler;
use message::{GROUP_NAME, PROCESSED_STREAM, PUBLISHED_STREAM};
use producer::Producer;
use std::sync::Arc;
use std::time::Duration;
use streamgroup_domain::dispatcher::Dispatcher;
use streamgroup_domain::group::GroupKey;
use streamgroup_domain::log::InMemoryStreamLog;
use streamgroup_domain::monitor::ThroughputReporter;
use streamgroup_domain::runtime::{ConsumerRuntime, RuntimeHandle};
use streamgroup_domain::store::InMemoryGroupStore;
use streamgroup_domain::value_object::{ConsumerId, CreateMode, StartPosition, StreamName};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = DemoArgs::parse();

    let log_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(log_filter)
        .init();

    args.validate()?;

    let log = Arc::new(InMemoryStreamLog::default());
    let dispatcher = Arc::new(
        Dispatcher::builder()
            .log(log.clone())
            .store(Arc::new(InMemoryGroupStore::new()))
            .config(args.dispatcher_config())
            .build(),
    );
    let group = GroupKey::new(PUBLISHED_STREAM, GROUP_NAME);
    dispatcher
        .registry()
        .create_group(&group, StartPosition::Beginning, CreateMode::IfNotExists)
        .await?;

    let consumers: Vec<RuntimeHandle> = (0..args.consumer_group_size)
        .map(|_| {
            let consumer_id = ConsumerId::random();
            let handler = Arc::new(MessageIdJsonHandler::new(log.clone(), consumer_id.clone()));
            Arc::new(
                ConsumerRuntime::builder()
                    .dispatcher(dispatcher.clone())
                    .group(group.clone())
                    .consumer_id(consumer_id)
                    .handler(handler)
                    .config(args.runtime_config())
                    .build(),
            )
            .start()
        })
        .collect::<Result<_, _>>()?;
    info!(group = %group, size = consumers.len(), "Started consumer group");

    let token = CancellationToken::new();
    let reporter = Arc::new(ThroughputReporter::new(
        log.clone(),
        StreamName::new(PROCESSED_STREAM),
        args.report_interval(),
    ));
    let reporter_task = reporter.spawn(token.clone());

    let producer = Producer::new(log.clone(), args.producer_settings());
    let mut producer_task = tokio::spawn({
        let token = token.clone();
        async move { producer.run(token).await }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, shutting down");
        }
        produced = &mut producer_task => {
            match produced {
                Ok(total) => info!(total, "Producer finished, draining the group"),
                Err(e) => warn!(error = %e, "Producer task failed"),
            }
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received interrupt, shutting down"),
                res = wait_until_drained(&dispatcher, &group) => res?,
            }
        }
    }

    token.cancel();
    for handle in &consumers {
        handle.shutdown();
    }
    for handle in consumers {
        handle.join().await;
    }
    let _ = reporter_task.await;

    let snapshots = dispatcher
        .monitor()
        .snapshot_stream(group.stream())
        .await?;
    for (key, stats) in snapshots {
        info!(
            group = %key,
            pending = stats.pending_count,
            lag = stats.consumer_lag,
            "Consumer group stopped"
        );
    }
    Ok(())
}

/// 等待消费组追上日志尾部且没有待确认条目
async fn wait_until_drained(dispatcher: &Dispatcher, group: &GroupKey) -> anyhow::Result<()> {
    let monitor = dispatcher.monitor();
    loop {
        let stats = monitor.snapshot(group).await?;
        if stats.consumer_lag == 0 && stats.pending_count == 0 {
            info!(group = %group, "Group drained");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}
