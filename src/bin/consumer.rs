use anyhow::Result;
use relay::app::AppMode;
use relay::common::run_cli;

#[tokio::main]
async fn main() -> Result<()> {
    run_cli(
        "relay-consumer",
        "文件中继系统 - 消费端：把队列中的文件写入输出目录并登记控制文件",
        AppMode::Consumer,
        "Consumer",
    )
    .await
}
