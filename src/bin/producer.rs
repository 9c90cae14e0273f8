use anyhow::Result;
use relay::app::AppMode;
use relay::common::run_cli;

#[tokio::main]
async fn main() -> Result<()> {
    run_cli(
        "relay-producer",
        "文件中继系统 - 生产端：扫描输入目录，按批次生成控制文件并发布",
        AppMode::Producer,
        "Producer",
    )
    .await
}
