#[path = "lexchat/app.rs"]
mod app;
#[path = "lexchat/args.rs"]
mod args;
#[path = "lexchat/config/mod.rs"]
mod config;
#[path = "lexchat/logging.rs"]
mod logging;
#[path = "lexchat/render.rs"]
mod render;

use std::process::ExitCode;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    app::run().await
}
