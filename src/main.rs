mod app;
mod commands;
mod config;
mod logging;
mod recording;
mod ui;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    app::run().await
}
