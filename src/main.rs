use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use studyassist::{api, config, logging};
use tokio::net::TcpListener;

const MIN_SWEEP: Duration = Duration::from_secs(30);
const MAX_SWEEP: Duration = Duration::from_secs(600);

#[derive(Parser)]
#[command(name = "studyassist", about = "Serve the StudyAssist web application")]
struct Cli {
    /// Port to listen on; overrides PORT / SERVER_PORT.
    #[arg(long)]
    port: Option<u16>,
    /// Extra dotenv file loaded before the environment is read.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(path) = &cli.env_file {
        dotenvy::from_path(path)
            .with_context(|| format!("failed to load env file {}", path.display()))?;
    }
    logging::init_tracing();
    config::init_config();

    let config = config::get_config();
    let state = api::AppState::from_config(config);
    let session_ttl = Duration::from_secs(config.session_ttl_secs);
    let job_ttl = Duration::from_secs(config.job_ttl_secs);
    let sweep_period = session_ttl.min(job_ttl).clamp(MIN_SWEEP, MAX_SWEEP);
    state.spawn_janitor(sweep_period, session_ttl, job_ttl);
    let app = api::create_router(state);

    let (listener, port) = bind_listener(cli.port.or(config.server_port))
        .await
        .context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .await
        .context("server terminated unexpectedly")?;
    Ok(())
}

async fn bind_listener(requested: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = requested {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 5000..=5099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 5000-5099",
    ))
}
