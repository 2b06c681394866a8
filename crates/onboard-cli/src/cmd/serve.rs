use anyhow::Context;
use onboard_core::config::Config;
use std::path::Path;

pub fn run(root: &Path, port: Option<u16>, open_browser: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to read config.yaml")?;
    let port = port.unwrap_or(config.server.port);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(onboard_server::serve(root.to_path_buf(), port, open_browser))
}
