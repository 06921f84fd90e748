mod scan;

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use futures::StreamExt;
use indicatif::ProgressBar;
use log::{debug, warn};
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

pub use self::scan::*;
use crate::config::IngestOptions;
use crate::error::Error;
use crate::metrics;
use crate::service::SearchService;
use crate::types::ItemRecord;

/// 单张图片的处理状态
#[derive(Debug, Clone, PartialEq)]
pub enum IngestState {
    Pending,
    /// 正在进行第 attempt 次特征提取
    Extracting { attempt: u32 },
    Indexed,
    /// 已放弃，cancelled 表示因取消而终止
    Failed { attempts: u32, error: String, cancelled: bool },
}

/// 待处理的图片
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub id: String,
    pub source: Option<String>,
    pub data: Arc<[u8]>,
}

impl IngestJob {
    pub fn new(id: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self { id: id.into(), source: None, data: data.into() }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// 单张图片的最终状态
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub id: String,
    pub state: IngestState,
}

/// 接收状态变化的回调，参数为条目 ID 和新的状态
pub type StateObserver = Arc<dyn Fn(&str, &IngestState) + Send + Sync>;

/// 一批图片的处理结果
#[derive(Debug, Default)]
pub struct IngestReport {
    /// 成功写入的 ID
    pub indexed: Vec<String>,
    /// 失败的 ID 和错误信息
    pub failed: Vec<(String, String)>,
    /// 因取消而未写入的 ID
    pub cancelled: Vec<String>,
}

impl IngestReport {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome.state {
            IngestState::Indexed => {
                metrics::inc_ingest_count("indexed");
                self.indexed.push(outcome.id);
            }
            IngestState::Failed { cancelled: true, .. } => {
                metrics::inc_ingest_count("cancelled");
                self.cancelled.push(outcome.id);
            }
            IngestState::Failed { error, .. } => {
                metrics::inc_ingest_count("failed");
                self.failed.push((outcome.id, error));
            }
            // 只有终止状态会被记录
            IngestState::Pending | IngestState::Extracting { .. } => {}
        }
    }

    pub fn total(&self) -> usize {
        self.indexed.len() + self.failed.len() + self.cancelled.len()
    }
}

/// 图片写入流水线
///
/// 特征提取失败时按指数退避重试，输入错误（无法解码、维度不一致）不重试。
/// 取消后尚未写入的图片都会以取消状态结束，正在写入的图片会完整写入
pub struct Ingestor {
    service: Arc<SearchService>,
    opts: IngestOptions,
    cancel: CancellationToken,
    observer: Option<StateObserver>,
}

impl Ingestor {
    pub fn new(service: Arc<SearchService>, opts: IngestOptions) -> Self {
        Self { service, opts, cancel: CancellationToken::new(), observer: None }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 每次状态变化时调用 observer
    pub fn with_observer(mut self, observer: StateObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn transition(&self, id: &str, state: IngestState) -> IngestState {
        debug!("{}: {:?}", id, state);
        if let Some(observer) = &self.observer {
            observer(id, &state);
        }
        state
    }

    fn finish(&self, id: String, state: IngestState) -> ItemOutcome {
        let state = self.transition(&id, state);
        ItemOutcome { id, state }
    }

    fn backoff(&self) -> impl Backoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.opts.retry_delay))
            .with_max_interval(Duration::from_millis(self.opts.max_retry_delay))
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }

    /// 处理单张图片
    pub async fn ingest_one(&self, job: IngestJob) -> ItemOutcome {
        let IngestJob { id, source, data } = job;
        let mut backoff = self.backoff();
        let mut attempt = 0;
        self.transition(&id, IngestState::Pending);

        let cancelled = |attempts: u32| IngestState::Failed {
            attempts,
            error: "cancelled".into(),
            cancelled: true,
        };

        let embedding = loop {
            if self.cancel.is_cancelled() {
                return self.finish(id, cancelled(attempt));
            }
            attempt += 1;
            self.transition(&id, IngestState::Extracting { attempt });

            let r = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return self.finish(id, cancelled(attempt));
                }
                r = self.service.extract(data.clone()) => r,
            };

            match r {
                Ok(embedding) => break embedding,
                Err(e) if !e.is_input_error() && attempt <= self.opts.max_retries => {
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or(Duration::from_millis(self.opts.max_retry_delay));
                    warn!("{}: 第 {} 次提取失败，{:?} 后重试：{}", id, attempt, delay, e);
                    metrics::inc_ingest_retry();
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            return self.finish(id, cancelled(attempt));
                        }
                        _ = sleep(delay) => {}
                    }
                }
                Err(e) => {
                    let state = failed(&id, attempt, e);
                    return self.finish(id, state);
                }
            }
        };

        // 开始写入后不再响应取消
        let record = ItemRecord::new(id.clone(), embedding).with_source(source);
        match self.service.commit(record).await {
            Ok(_) => self.finish(id, IngestState::Indexed),
            Err(e) => {
                let state = failed(&id, attempt, e);
                self.finish(id, state)
            }
        }
    }

    /// 并发处理通道中的所有图片，直到通道关闭
    pub async fn run(&self, rx: Receiver<IngestJob>, pb: Option<ProgressBar>) -> IngestReport {
        let jobs = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|job| (job, rx))
        });
        self.drive(jobs, pb).await
    }

    /// 并发处理一批图片
    pub async fn ingest_batch(&self, jobs: Vec<IngestJob>) -> IngestReport {
        self.drive(futures::stream::iter(jobs), None).await
    }

    async fn drive(
        &self,
        jobs: impl futures::Stream<Item = IngestJob>,
        pb: Option<ProgressBar>,
    ) -> IngestReport {
        let outcomes =
            jobs.map(|job| self.ingest_one(job)).buffer_unordered(self.opts.concurrency.max(1));
        let mut outcomes = pin!(outcomes);

        let mut report = IngestReport::default();
        while let Some(outcome) = outcomes.next().await {
            if let Some(pb) = &pb {
                match &outcome.state {
                    IngestState::Failed { error, cancelled: false, .. } => {
                        pb.println(format!("[ERR] {}: {}", outcome.id, error))
                    }
                    _ => pb.set_message(outcome.id.clone()),
                }
                pb.inc(1);
            }
            report.record(outcome);
        }
        report
    }

    /// 在后台运行流水线
    pub fn spawn(self: Arc<Self>, rx: Receiver<IngestJob>) -> JoinHandle<IngestReport> {
        tokio::spawn(async move { self.run(rx, None).await })
    }
}

fn failed(id: &str, attempts: u32, error: Error) -> IngestState {
    warn!("{}: 写入失败：{}", id, error);
    IngestState::Failed { attempts, error: error.to_string(), cancelled: false }
}
