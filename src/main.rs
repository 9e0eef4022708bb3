use anyhow::Result;
use reddit_auto_submit::orchestrator::App;
use reddit_auto_submit::utils::logging;
use reddit_auto_submit::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::load().await?;

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
