use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use relay_core::{RelayError, RelayResult};
use tracing::debug;

#[cfg(unix)]
const PROCESS_LIST_MODE: u32 = 0o644;

/// 控制文件名清单（只追加）
///
/// 每次追加都重新以 O_APPEND 打开并用一次 write 写入整行，
/// 多个消费者（包括其他进程）并发追加不会出现半行交错。
#[derive(Debug, Clone)]
pub struct ProcessList {
    path: PathBuf,
}

impl ProcessList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一行 `<filename>\n`
    pub async fn append(&self, filename: &str) -> RelayResult<()> {
        let path = self.path.clone();
        let line = format!("{filename}\n");

        tokio::task::spawn_blocking(move || append_line(&path, line.as_bytes()))
            .await
            .map_err(|e| RelayError::Internal(format!("追加清单任务异常退出: {e}")))??;

        debug!(path = %self.path.display(), filename, "已登记到处理清单");
        Ok(())
    }

    /// 读取已登记的文件名；清单不存在时为空
    pub async fn entries(&self) -> RelayResult<Vec<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(RelayError::file_system(&self.path, e)),
        }
    }
}

fn append_line(path: &Path, line: &[u8]) -> RelayResult<()> {
    let mut options = std::fs::OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(PROCESS_LIST_MODE);
    }

    let mut file = options
        .open(path)
        .map_err(|e| RelayError::file_system(path, e))?;
    file.write_all(line)
        .map_err(|e| RelayError::file_system(path, e))
}
