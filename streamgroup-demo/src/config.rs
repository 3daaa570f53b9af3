//! 演示程序的命令行参数（均可由环境变量提供）
//!
use crate::message::PUBLISHED_STREAM;
use crate::producer::ProducerSettings;
use anyhow::ensure;
use clap::Parser;
use std::time::Duration;
use streamgroup_domain::dispatcher::DispatcherConfig;
use streamgroup_domain::runtime::RuntimeConfig;
use streamgroup_domain::value_object::StreamName;

#[derive(Parser, Debug, Clone)]
#[command(name = "streamgroup-demo")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scripted producer plus a consumer group draining an in-memory stream")]
pub struct DemoArgs {
    /// Number of consumers in the group
    #[arg(long, env = "CONSUMER_GROUP_SIZE", default_value_t = 3)]
    pub consumer_group_size: usize,

    /// Seconds a delivered entry may stay unacknowledged before another consumer can claim it
    #[arg(long, env = "CLAIM_TIMEOUT_SECS", default_value_t = 30)]
    pub claim_timeout_secs: u64,

    /// Entries fetched per consumer poll
    #[arg(long, env = "CONSUMER_BATCH_SIZE", default_value_t = 10)]
    pub consumer_batch_size: usize,

    /// Consumer poll interval in milliseconds when the stream is drained
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 100)]
    pub poll_interval_ms: u64,

    /// How long the producer runs, in minutes
    #[arg(long, env = "PRODUCER_DURATION", default_value_t = 1)]
    pub producer_duration: u64,

    /// Messages appended per producer cycle
    #[arg(long, env = "PRODUCER_BATCH_SIZE", default_value_t = 100)]
    pub producer_batch_size: usize,

    /// Ignore PRODUCER_DURATION and produce until interrupted
    #[arg(long, env = "PRODUCER_PRODUCE_INDEFINITELY")]
    pub produce_indefinitely: bool,

    /// Throughput report interval in seconds
    #[arg(long, env = "REPORT_SECONDS", default_value_t = 5)]
    pub report_seconds: u64,

    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl DemoArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.consumer_group_size > 0, "CONSUMER_GROUP_SIZE must be positive");
        ensure!(self.consumer_batch_size > 0, "CONSUMER_BATCH_SIZE must be positive");
        ensure!(self.producer_batch_size > 0, "PRODUCER_BATCH_SIZE must be positive");
        ensure!(self.claim_timeout_secs > 0, "CLAIM_TIMEOUT_SECS must be positive");
        ensure!(self.report_seconds > 0, "REPORT_SECONDS must be positive");
        Ok(())
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::builder()
            .claim_timeout(Duration::from_secs(self.claim_timeout_secs))
            .build()
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig::builder()
            .batch_size(self.consumer_batch_size)
            .poll_interval(Duration::from_millis(self.poll_interval_ms))
            .build()
    }

    pub fn producer_settings(&self) -> ProducerSettings {
        ProducerSettings {
            stream: StreamName::new(PUBLISHED_STREAM),
            batch_size: self.producer_batch_size,
            duration: (!self.produce_indefinitely)
                .then(|| Duration::from_secs(self.producer_duration * 60)),
        }
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_seconds)
    }
}
