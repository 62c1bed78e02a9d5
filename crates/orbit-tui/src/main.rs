mod app;
mod connection;
mod theme;
mod ui;

use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = orbit_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("tui.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,orbit_tui=debug".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // Print log path to stderr so the operator can tail it immediately.
    eprintln!("orbit log: {}", log_path.display());

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(orbit_proto::platform::daemon_address);
    tracing::info!("orbit starting, daemon at {}", address);

    let (app_tx, app_rx) = mpsc::channel::<app::AppMessage>(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(32);

    tokio::spawn(connection::run(address.clone(), app_tx.clone(), cmd_rx));

    let app = app::App::new(address, cmd_tx);
    app.run(app_rx, app_tx).await?;

    Ok(())
}
