//! Endpoint Mapper dump
//!
//! Binds to the DCE RPC endpoint mapper of a remote host and lists every
//! registered endpoint that can be reached over TCP, UDP or a named pipe.
//!
//! USAGE:
//!   epdump [OPTIONS] <HOSTNAME>
//!
//! EXAMPLES:
//!   epdump 192.168.1.10              # Query the endpoint mapper on port 135
//!   epdump -p 1135 dc01.example.com  # Query a non-standard port
//!   RUST_LOG=epmap=trace epdump dc01 # Log every PDU exchanged

mod report;

use clap::Parser;
use epmap::{LookupSessionBuilder, LookupStep, Result, EPM_PORT};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "epdump")]
#[command(version)]
#[command(about = "Dump the endpoints registered with a DCE RPC endpoint mapper")]
struct Args {
    /// Endpoint mapper port
    #[arg(short, long, default_value_t = EPM_PORT)]
    port: u16,

    /// Host name or address of the server to query
    #[arg(value_name = "HOSTNAME")]
    host: String,

    /// Connection timeout in seconds
    #[arg(short, long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - suppress log output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

fn init_tracing(args: &Args) {
    if args.quiet {
        return;
    }
    // RUST_LOG wins over the command line
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level().as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Bind, then print each endpoint as it is returned. Yields the number of
/// endpoints printed.
async fn run(args: &Args) -> Result<usize> {
    println!("{}", report::binding_banner(&args.host, args.port));

    let mut builder = LookupSessionBuilder::new();
    if let Some(secs) = args.timeout {
        builder = builder.connect_timeout(Duration::from_secs(secs));
    }
    let mut session = builder.connect(&args.host, args.port).await?;
    if let Err(err) = session.bind().await {
        session.close().await;
        return Err(err);
    }

    println!("{}", report::QUERY_BANNER);

    let mut count = 0;
    let result = loop {
        match session.next_endpoint().await {
            Ok(LookupStep::Endpoint(entry)) => match report::format_entry(&args.host, &entry) {
                Some(block) => {
                    println!("{}", block);
                    count += 1;
                }
                None => debug!("Skipping entry without a reportable endpoint: {:?}", entry.tower.floors),
            },
            Ok(LookupStep::EnumerationExhausted) => break Ok(count),
            Err(err) => break Err(err),
        }
    };
    session.close().await;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args);

    match run(&args).await {
        Ok(count) => {
            println!("{}", report::summary(count));
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("-epdump: {}.", report::describe_error(&err));
            ExitCode::FAILURE
        }
    }
}
