use clap::Parser;
use server::network::Server;
use std::time::Duration;

/// Authoritative shooter server with server-side rewind hit verification.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Tick rate (simulation steps per second)
    #[clap(short, long, default_value = "60")]
    tick_rate: u32,
    /// Maximum number of concurrent clients
    #[clap(short, long, default_value = "32")]
    max_clients: usize,
    /// Verify hit claims against live geometry instead of rewound history
    #[clap(long)]
    no_rewind: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64);

    let mut server = Server::new(&addr, tick_duration, args.max_clients, !args.no_rewind).await?;
    server.run().await
}
