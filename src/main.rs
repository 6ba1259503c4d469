//! # Ally Gateway 主程序
//!
//! 凭证签发与白名单网关：管理端口负责注册激活，代理端口凭令牌转发上游

use std::path::PathBuf;

use ally_gateway::{
    Result, dual_port_setup, lerror, linfo,
    logging::{self, LogComponent, LogStage},
};
use clap::Parser;

/// 命令行参数
#[derive(Debug, Parser)]
#[command(name = "ally-gateway", version, about = "凭证签发与白名单网关")]
struct Cli {
    /// 配置文件路径，缺省时按 `ALLY_CONFIG_PATH` 或 `config/config.{RUST_ENV}.toml`
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别（被 `RUST_LOG` 覆盖）
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_optimized_logging(Some(&cli.log_level));

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        "服务启动",
        version = env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = dual_port_setup::run_dual_port_servers(cli.config.as_deref()).await {
        lerror!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "service_start_failed",
            &format!("服务启动失败: {e:?}")
        );
        std::process::exit(1);
    }

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Main,
        "service_shutdown",
        "服务正常关闭"
    );
    Ok(())
}
