use anyhow::Result;
use clap::Arg;
use relay::common::{build_command, parse_app_mode, start_application, StartupConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_command("relay", "基于消息队列的多目标文件中继系统")
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式")
                .value_parser(["producer", "consumer", "all"])
                .default_value("all"),
        )
        .get_matches();

    let mode_str = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("all");
    let app_mode = parse_app_mode(mode_str)?;

    start_application(StartupConfig::from_matches(&matches), app_mode, "文件中继").await
}
