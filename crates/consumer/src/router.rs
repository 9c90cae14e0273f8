use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use relay_core::{
    fs_utils, ControlFileConfig, Delivery, MessageBroker, QueueBinding, RelayError, RelayResult,
};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::process_list::ProcessList;

#[cfg(unix)]
const OUTPUT_DIR_MODE: u32 = 0o700;
#[cfg(unix)]
const OUTPUT_FILE_MODE: u32 = 0o644;

/// 单条投递的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 数据文件已写入输出目录
    Written { path: PathBuf },
    /// 控制文件名已登记到处理清单
    Registered { filename: String },
    /// 已nack并重新入队
    Requeued { reason: String },
}

/// 单个队列的消费者
///
/// 数据文件写到绑定的输出目录，控制文件只登记到处理清单；
/// 任何失败都nack并重新入队。
pub struct QueueRouter {
    queue: String,
    output_dir: Option<PathBuf>,
    control_file: ControlFileConfig,
    process_list: Arc<ProcessList>,
}

impl QueueRouter {
    pub fn new(
        binding: &QueueBinding,
        control_file: &ControlFileConfig,
        process_list: Arc<ProcessList>,
    ) -> Self {
        Self {
            queue: binding.queue.clone(),
            output_dir: binding.resolved_output_dir().cloned(),
            control_file: control_file.clone(),
            process_list,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// 处理一条投递并完成确认
    pub async fn handle_delivery(&self, delivery: Delivery) -> RelayResult<DeliveryOutcome> {
        match self.route(&delivery).await {
            Ok(outcome) => {
                delivery.ack().await?;
                Ok(outcome)
            }
            Err(e) => {
                warn!(
                    queue = %self.queue,
                    filename = ?delivery.filename(),
                    redelivered = delivery.redelivered,
                    error = %e,
                    "处理消息失败，重新入队"
                );
                delivery.nack(true).await?;
                Ok(DeliveryOutcome::Requeued {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn route(&self, delivery: &Delivery) -> RelayResult<DeliveryOutcome> {
        let filename = delivery
            .filename()
            .ok_or_else(|| RelayError::InvalidDelivery("缺少filename消息头".to_string()))?;
        if !fs_utils::is_plain_file_name(filename) {
            return Err(RelayError::InvalidDelivery(format!(
                "无效的文件名: {filename:?}"
            )));
        }

        let output_dir = self.output_dir.as_ref().ok_or_else(|| {
            RelayError::InvalidDelivery(format!("队列 {} 没有配置输出目录", self.queue))
        })?;

        if self.control_file.is_control_artifact(filename) {
            self.process_list.append(filename).await?;
            info!(queue = %self.queue, filename, "控制文件已登记");
            return Ok(DeliveryOutcome::Registered {
                filename: filename.to_string(),
            });
        }

        ensure_output_dir(output_dir).await?;
        let path = output_dir.join(filename);
        write_output_file(&path, &delivery.body).await?;

        debug!(queue = %self.queue, path = %path.display(), bytes = delivery.body.len(), "文件已写入");
        Ok(DeliveryOutcome::Written { path })
    }

    /// 消费循环，收到关闭信号后在两条投递之间退出
    pub async fn run(
        &self,
        broker: Arc<dyn MessageBroker>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> RelayResult<()> {
        let consumer_tag = format!("relay-{}-{}", self.queue, uuid::Uuid::new_v4());
        broker.declare_queue(&self.queue).await?;
        let mut deliveries = broker
            .consume(&self.queue, &consumer_tag)
            .await
            .map_err(|e| RelayError::ChannelClosed(format!("注册消费者失败: {e}")))?;

        info!(queue = %self.queue, consumer_tag = %consumer_tag, output_dir = ?self.output_dir, "消费者已启动");

        loop {
            tokio::select! {
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        if let Err(e) = self.handle_delivery(delivery).await {
                            error!(queue = %self.queue, error = %e, "确认消息失败");
                        }
                    }
                    Some(Err(e)) => {
                        return Err(RelayError::ChannelClosed(format!(
                            "队列 {} 的消息流出错: {e}",
                            self.queue
                        )));
                    }
                    None => {
                        return Err(RelayError::ChannelClosed(format!(
                            "队列 {} 的消息流已结束",
                            self.queue
                        )));
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!(queue = %self.queue, "收到关闭信号，停止消费");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// 非递归创建输出目录；已存在视为成功
async fn ensure_output_dir(dir: &Path) -> RelayResult<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    #[cfg(unix)]
    builder.mode(OUTPUT_DIR_MODE);

    match builder.create(dir).await {
        Ok(()) => {
            info!(dir = %dir.display(), "输出目录已创建");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(RelayError::file_system(dir, e)),
    }
}

/// 写入数据文件，已存在时覆盖
async fn write_output_file(path: &Path, body: &[u8]) -> RelayResult<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(OUTPUT_FILE_MODE);

    let mut file = options
        .open(path)
        .await
        .map_err(|e| RelayError::file_system(path, e))?;
    file.write_all(body)
        .await
        .map_err(|e| RelayError::file_system(path, e))?;
    file.flush()
        .await
        .map_err(|e| RelayError::file_system(path, e))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use relay_core::{Acknowledger, FILENAME_HEADER};
    use serde_json::Value;

    use super::*;

    /// 记录确认动作的acknowledger
    #[derive(Clone, Default)]
    struct RecordingAcker {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingAcker {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Acknowledger for RecordingAcker {
        async fn ack(&self) -> RelayResult<()> {
            self.calls.lock().unwrap().push("ack".to_string());
            Ok(())
        }

        async fn nack(&self, requeue: bool) -> RelayResult<()> {
            self.calls.lock().unwrap().push(format!("nack(requeue={requeue})"));
            Ok(())
        }
    }

    fn delivery(filename: Option<Value>, body: &str, acker: &RecordingAcker) -> Delivery {
        let mut headers = HashMap::new();
        if let Some(name) = filename {
            headers.insert(FILENAME_HEADER.to_string(), name);
        }
        Delivery::new("starlight", body.as_bytes().to_vec(), headers, Box::new(acker.clone()))
    }

    fn named(name: &str) -> Option<Value> {
        Some(Value::String(name.to_string()))
    }

    struct Fixture {
        root: tempfile::TempDir,
        output: PathBuf,
        process_list: Arc<ProcessList>,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let output = root.path().join("starlight");
        let process_list = Arc::new(ProcessList::new(root.path().join("process_list.txt")));
        Fixture {
            root,
            output,
            process_list,
        }
    }

    fn router(fx: &Fixture, output_dir: &Path) -> QueueRouter {
        QueueRouter::new(
            &QueueBinding::new("starlight", output_dir),
            &ControlFileConfig::default(),
            Arc::clone(&fx.process_list),
        )
    }

    #[tokio::test]
    async fn test_data_file_written_and_acked() {
        let fx = fixture();
        let router = router(&fx, &fx.output);
        let acker = RecordingAcker::default();

        let outcome = router
            .handle_delivery(delivery(named("a.dat"), "hello", &acker))
            .await
            .unwrap();

        let path = fx.output.join("a.dat");
        assert_eq!(outcome, DeliveryOutcome::Written { path: path.clone() });
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello");
        assert_eq!(acker.calls(), vec!["ack"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_dir_created_with_mode_0700() {
        use std::os::unix::fs::PermissionsExt;

        let fx = fixture();
        let router = router(&fx, &fx.output);
        router
            .handle_delivery(delivery(named("a.dat"), "x", &RecordingAcker::default()))
            .await
            .unwrap();

        let mode = std::fs::metadata(&fx.output).unwrap().permissions().mode();
        assert_eq!(mode & 0o777 & !0o700, 0);
    }

    #[tokio::test]
    async fn test_existing_file_is_overwritten() {
        let fx = fixture();
        std::fs::create_dir(&fx.output).unwrap();
        std::fs::write(fx.output.join("a.dat"), "old contents that are longer").unwrap();
        let router = router(&fx, &fx.output);

        router
            .handle_delivery(delivery(named("a.dat"), "new", &RecordingAcker::default()))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(fx.output.join("a.dat")).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_control_artifact_registered_not_written() {
        let fx = fixture();
        let router = router(&fx, &fx.output);
        let acker = RecordingAcker::default();

        let outcome = router
            .handle_delivery(delivery(named("grid_example_7.in"), "", &acker))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DeliveryOutcome::Registered {
                filename: "grid_example_7.in".to_string()
            }
        );
        assert_eq!(acker.calls(), vec!["ack"]);
        assert_eq!(fx.process_list.entries().await.unwrap(), vec!["grid_example_7.in"]);
        assert!(!fx.output.exists());
    }

    #[tokio::test]
    async fn test_control_extension_follows_configuration() {
        let fx = fixture();
        let control_file = ControlFileConfig {
            extension: ".par".to_string(),
            ..ControlFileConfig::default()
        };
        let router = QueueRouter::new(
            &QueueBinding::new("starlight", &fx.output),
            &control_file,
            Arc::clone(&fx.process_list),
        );

        let registered = router
            .handle_delivery(delivery(named("job_1.par"), "", &RecordingAcker::default()))
            .await
            .unwrap();
        let written = router
            .handle_delivery(delivery(named("legacy.in"), "x", &RecordingAcker::default()))
            .await
            .unwrap();

        assert!(matches!(registered, DeliveryOutcome::Registered { .. }));
        assert_eq!(
            written,
            DeliveryOutcome::Written {
                path: fx.output.join("legacy.in")
            }
        );
        assert_eq!(fx.process_list.entries().await.unwrap(), vec!["job_1.par"]);
    }

    #[tokio::test]
    async fn test_missing_filename_requeued_without_side_effects() {
        let fx = fixture();
        let router = router(&fx, &fx.output);

        for header in [None, Some(Value::from(42))] {
            let acker = RecordingAcker::default();
            let outcome = router
                .handle_delivery(delivery(header, "x", &acker))
                .await
                .unwrap();
            assert!(matches!(outcome, DeliveryOutcome::Requeued { .. }));
            assert_eq!(acker.calls(), vec!["nack(requeue=true)"]);
        }
        assert!(!fx.output.exists());
        assert!(fx.process_list.entries().await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_backslash_name_written_and_acked() {
        let fx = fixture();
        let router = router(&fx, &fx.output);
        let acker = RecordingAcker::default();

        let outcome = router
            .handle_delivery(delivery(named("run\\01.dat"), "x", &acker))
            .await
            .unwrap();

        let path = fx.output.join("run\\01.dat");
        assert_eq!(outcome, DeliveryOutcome::Written { path: path.clone() });
        assert!(path.is_file());
        assert_eq!(acker.calls(), vec!["ack"]);
    }

    #[tokio::test]
    async fn test_path_traversal_requeued() {
        let fx = fixture();
        let router = router(&fx, &fx.output);
        let acker = RecordingAcker::default();

        let outcome = router
            .handle_delivery(delivery(named("../escape.dat"), "x", &acker))
            .await
            .unwrap();
        assert!(matches!(outcome, DeliveryOutcome::Requeued { .. }));
        assert!(!fx.root.path().join("escape.dat").exists());
        assert!(!fx.output.exists());
    }

    #[tokio::test]
    async fn test_unbound_queue_requeued_and_creates_nothing() {
        let fx = fixture();
        let router = router(&fx, Path::new(""));

        for name in ["a.dat", "grid_example_1.in"] {
            let acker = RecordingAcker::default();
            let outcome = router
                .handle_delivery(delivery(named(name), "x", &acker))
                .await
                .unwrap();
            assert!(matches!(outcome, DeliveryOutcome::Requeued { .. }));
            assert_eq!(acker.calls(), vec!["nack(requeue=true)"]);
        }
        assert_eq!(std::fs::read_dir(fx.root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_parent_directory_requeued() {
        let fx = fixture();
        let nested = fx.root.path().join("absent").join("starlight");
        let router = router(&fx, &nested);
        let acker = RecordingAcker::default();

        let outcome = router
            .handle_delivery(delivery(named("a.dat"), "x", &acker))
            .await
            .unwrap();
        assert!(matches!(outcome, DeliveryOutcome::Requeued { .. }));
        assert!(!nested.exists());
    }
}
