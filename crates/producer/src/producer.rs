use std::path::PathBuf;
use std::time::Duration;

use relay_core::{fs_utils, DataFile, Event, ProducerConfig, RelayError, RelayResult};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::accumulator::BatchAccumulator;

/// 目录扫描器
///
/// 每个周期读取输入目录中的所有普通文件，交给累加器分批；批次交给发布者后，
/// 批次内的数据文件被移到归档目录。
pub struct Producer {
    input_dir: PathBuf,
    archive_dir: PathBuf,
    poll_interval: Duration,
    accumulator: BatchAccumulator,
    event_tx: mpsc::Sender<Event>,
}

impl Producer {
    pub fn new(
        config: &ProducerConfig,
        accumulator: BatchAccumulator,
        event_tx: mpsc::Sender<Event>,
    ) -> Self {
        Self {
            input_dir: config.input_dir.clone(),
            archive_dir: config.archive_dir.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            accumulator,
            event_tx,
        }
    }

    /// 读取输入目录，返回本次读入的文件数
    ///
    /// 子目录跳过；单个文件读取失败只记录日志，目录本身读取失败则返回错误。
    /// 文件按名称排序后读入。
    pub async fn read_directory(&mut self) -> RelayResult<usize> {
        let mut entries = tokio::fs::read_dir(&self.input_dir)
            .await
            .map_err(|e| RelayError::file_system(&self.input_dir, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RelayError::file_system(&self.input_dir, e))?
        {
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => continue,
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "无法获取文件类型，跳过");
                    continue;
                }
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => warn!(name = ?name, "文件名不是有效的UTF-8，跳过"),
            }
        }
        names.sort();

        let mut read = 0;
        for name in names {
            let path = self.input_dir.join(&name);
            let content = match tokio::fs::read(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "读取文件失败，跳过");
                    continue;
                }
            };
            read += 1;

            if let Some(event) = self.accumulator.add_file(DataFile::new(name, content)).await {
                self.dispatch(event).await?;
            }
        }

        Ok(read)
    }

    /// 一个完整周期：扫描后把不足阈值的剩余文件也作为批次发出
    pub async fn run_cycle(&mut self) -> RelayResult<()> {
        let scanned = self.read_directory().await;

        // 扫描中途失败时已读入的文件也要发出，避免下个周期重复读入同一批次
        if let Some(event) = self.accumulator.flush().await {
            self.dispatch(event).await?;
        }

        let count = scanned?;
        if count > 0 {
            info!(files = count, "本周期扫描完成");
        } else {
            debug!(dir = %self.input_dir.display(), "输入目录为空");
        }
        Ok(())
    }

    /// 交给发布者，然后归档数据文件
    async fn dispatch(&mut self, event: Event) -> RelayResult<()> {
        let names: Vec<String> = event.data_files().map(|f| f.name.clone()).collect();

        self.event_tx
            .send(event)
            .await
            .map_err(|_| RelayError::ChannelClosed("事件队列已关闭".to_string()))?;

        for name in names {
            let source = self.input_dir.join(&name);
            let destination = self.archive_dir.join(&name);
            match fs_utils::move_file(&source, &destination).await {
                Ok(()) => debug!(file = %name, "文件已归档"),
                // 留在输入目录的文件会在下个周期再次发布
                Err(e) => error!(file = %name, error = %e, "归档文件失败"),
            }
        }
        Ok(())
    }

    /// 轮询循环，收到关闭信号后返回
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> RelayResult<()> {
        info!(
            input_dir = %self.input_dir.display(),
            archive_dir = %self.archive_dir.display(),
            batch_size = self.accumulator.batch_size(),
            interval_seconds = self.poll_interval.as_secs(),
            "启动目录扫描"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        if e.is_fatal() {
                            error!("目录扫描失败，停止生产端: {}", e);
                            return Err(e);
                        }
                        error!("目录扫描失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，停止目录扫描");
                    break;
                }
            }
        }

        Ok(())
    }
}
