use clap::Parser;
use log::info;
use server::config::Tuning;
use server::events::LogSink;
use server::game::Simulation;
use server::network::Server;
use server::powerup::PowerupOffer;
use shared::Vec3;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Maximum concurrent clients
    #[arg(short, long, default_value = "8")]
    max_clients: usize,

    /// TOML tuning file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for bot spawn placement
    #[arg(long, default_value = "1")]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let tuning = match &args.config {
        Some(path) => {
            info!("Loading tuning from {}", path.display());
            Tuning::load(path)?
        }
        None => Tuning::default(),
    };

    let mut simulation = Simulation::new(tuning, args.seed);
    simulation.subscribe(Box::new(LogSink));

    for x in [-400.0, 400.0] {
        simulation.spawn_barrel(Vec3::new(x, 300.0, 0.0));
    }
    let regen = PowerupOffer::health_regen(&simulation.tuning().pickup);
    simulation.spawn_pickup(Vec3::new(0.0, -300.0, 0.0), regen);
    let speed = PowerupOffer::super_speed(&simulation.tuning().pickup);
    simulation.spawn_pickup(Vec3::new(0.0, 600.0, 0.0), speed);

    let tick_rate = args.tick_rate.max(1);
    let address = format!("{}:{}", args.host, args.port);
    info!("Starting server on {} at {}Hz", address, tick_rate);

    let mut server = Server::new(
        &address,
        Duration::from_secs_f64(1.0 / tick_rate as f64),
        args.max_clients,
        simulation,
    )
    .await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
            let _ = shutdown.send(server::network::ServerMessage::Shutdown);
        }
    });

    server.run().await?;
    Ok(())
}
