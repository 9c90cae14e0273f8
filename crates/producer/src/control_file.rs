//! 控制文件（.in）生成
//!
//! 模板按行处理，只有固定的一行会被改写：以双空格分隔的字段中，第0个字段替换为
//! 批次首个数据文件名，第5个字段替换为 `output_` 前缀的同名文件。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use relay_core::{fs_utils, ControlFileConfig, RelayError, RelayResult};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

/// 字段分隔符
pub const FIELD_DELIMITER: &str = "  ";
/// 输入文件名所在字段
pub const INPUT_FIELD: usize = 0;
/// 输出文件名所在字段
pub const OUTPUT_FIELD: usize = 5;
pub const OUTPUT_PREFIX: &str = "output_";

/// 文件名冲突时的最大重试次数
const MAX_NAME_ATTEMPTS: usize = 8;

/// 批次完成时生成控制文件
#[async_trait]
pub trait ControlArtifactGenerator: Send + Sync {
    /// 返回生成的控制文件名；任何失败都返回None，批次照常发布
    async fn generate(&self, primary_filename: &str) -> Option<String>;
}

/// 改写模板中的指定行（从1开始计数），其余行原样保留
pub fn render_control_artifact(
    template: &str,
    primary_filename: &str,
    line_number: usize,
) -> RelayResult<String> {
    let mut rendered = String::with_capacity(template.len() + primary_filename.len() * 2);
    let mut found = false;

    for (index, line) in template.lines().enumerate() {
        if index + 1 == line_number {
            let mut fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
            if fields.len() <= OUTPUT_FIELD {
                return Err(RelayError::Template(format!(
                    "第{line_number}行只有{}个字段，至少需要{}个",
                    fields.len(),
                    OUTPUT_FIELD + 1
                )));
            }
            let output_filename = format!("{OUTPUT_PREFIX}{primary_filename}");
            fields[INPUT_FIELD] = primary_filename;
            fields[OUTPUT_FIELD] = &output_filename;
            rendered.push_str(&fields.join(FIELD_DELIMITER));
            found = true;
        } else {
            rendered.push_str(line);
        }
        rendered.push('\n');
    }

    if !found {
        return Err(RelayError::Template(format!(
            "模板不足{line_number}行"
        )));
    }

    Ok(rendered)
}

/// 基于模板文件的控制文件生成器
#[derive(Debug, Clone)]
pub struct ControlFileGenerator {
    template_path: PathBuf,
    output_dir: PathBuf,
    line_number: usize,
    name_prefix: String,
    extension: String,
}

impl ControlFileGenerator {
    pub fn new(config: &ControlFileConfig) -> Self {
        let name_prefix = config
            .template_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .unwrap_or("control")
            .to_string();

        Self {
            template_path: config.template_path.clone(),
            output_dir: config.output_dir.clone(),
            line_number: config.line_number,
            name_prefix,
            extension: config.extension.clone(),
        }
    }

    /// 形如 `grid_example_<随机数>.in`
    fn artifact_name(&self) -> String {
        format!(
            "{}_{}{}",
            self.name_prefix,
            rand::random::<u64>(),
            self.extension
        )
    }

    /// 生成控制文件并返回文件名
    async fn try_generate(&self, primary_filename: &str) -> RelayResult<String> {
        if !fs_utils::path_exists(&self.template_path).await? {
            return Err(RelayError::Template(format!(
                "模板文件不存在: {}",
                self.template_path.display()
            )));
        }

        let template = tokio::fs::read_to_string(&self.template_path)
            .await
            .map_err(|e| RelayError::file_system(&self.template_path, e))?;
        let rendered = render_control_artifact(&template, primary_filename, self.line_number)?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = self.artifact_name();
            let path = self.output_dir.join(&name);

            let file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "控制文件名冲突，重新生成");
                    continue;
                }
                Err(e) => return Err(RelayError::file_system(&path, e)),
            };

            write_or_discard(file, &path, rendered.as_bytes()).await?;

            info!(path = %path.display(), primary = primary_filename, "控制文件已生成");
            return Ok(name);
        }

        Err(RelayError::Internal(format!(
            "连续{MAX_NAME_ATTEMPTS}次生成的控制文件名均已存在"
        )))
    }
}

/// 写入失败时删除已创建的文件，不留下不完整的控制文件
async fn write_or_discard<W>(mut writer: W, path: &Path, content: &[u8]) -> RelayResult<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        writer.write_all(content).await?;
        writer.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(writer);
        if let Err(remove_err) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %remove_err, "删除不完整的控制文件失败");
        }
        return Err(RelayError::file_system(path, e));
    }
    Ok(())
}

#[async_trait]
impl ControlArtifactGenerator for ControlFileGenerator {
    async fn generate(&self, primary_filename: &str) -> Option<String> {
        match self.try_generate(primary_filename).await {
            Ok(name) => Some(name),
            Err(e) => {
                error!(error = %e, primary = primary_filename, "生成控制文件失败，批次将不带控制文件发布");
                None
            }
        }
    }
}
