use std::sync::Arc;

use relay_core::{DataFile, Event, RelayError, RelayResult};
use tracing::debug;

use crate::control_file::ControlArtifactGenerator;

/// 批次累加器
///
/// 文件数达到 `batch_size` 时立即完成批次；调用方也可以随时 `flush`
/// 把不足阈值的批次提前完成。
pub struct BatchAccumulator {
    batch_size: usize,
    buffer: Vec<DataFile>,
    generator: Arc<dyn ControlArtifactGenerator>,
}

impl BatchAccumulator {
    pub fn new(batch_size: usize, generator: Arc<dyn ControlArtifactGenerator>) -> RelayResult<Self> {
        if batch_size == 0 {
            return Err(RelayError::config_error("batch_size must be greater than 0"));
        }
        Ok(Self {
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            generator,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 加入一个文件，达到阈值时返回完成的批次
    pub async fn add_file(&mut self, file: DataFile) -> Option<Event> {
        self.buffer.push(file);
        if self.buffer.len() >= self.batch_size {
            self.flush().await
        } else {
            None
        }
    }

    /// 完成当前批次；缓冲区为空时返回None
    ///
    /// 控制文件以批次首个文件命名，生成成功时追加为批次最后一个元素。
    pub async fn flush(&mut self) -> Option<Event> {
        if self.buffer.is_empty() {
            return None;
        }

        let mut files = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        let primary = files[0].name.clone();

        if let Some(artifact) = self.generator.generate(&primary).await {
            files.push(DataFile::control_artifact(artifact));
        }

        debug!(files = files.len(), primary = %primary, "批次已完成");
        Some(Event::new(files))
    }
}
