//! 文件系统工具函数

use std::io::ErrorKind;
use std::path::{Component, Path};

use crate::{RelayError, RelayResult};

/// 检查路径是否存在
///
/// 路径不存在返回 `Ok(false)`，其他I/O错误（例如权限不足）原样返回。
pub async fn path_exists(path: impl AsRef<Path>) -> RelayResult<bool> {
    let path = path.as_ref();
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(RelayError::file_system(path, e)),
    }
}

/// 移动文件（rename，不做复制回退）
pub async fn move_file(source: impl AsRef<Path>, destination: impl AsRef<Path>) -> RelayResult<()> {
    let source = source.as_ref();
    tokio::fs::rename(source, destination.as_ref())
        .await
        .map_err(|e| RelayError::file_system(source, e))
}

/// 文件名只能是单个普通路径分量
///
/// 分隔符按当前平台判断：Unix 上 `\` 是合法的文件名字符。
pub fn is_plain_file_name(name: &str) -> bool {
    if name.is_empty() || name.contains('/') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
