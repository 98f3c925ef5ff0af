use clap::Parser;
use httptimeout::duration::parse_duration;
use httptimeout::error::AppError;
use httptimeout::report::ConsoleReporter;
use httptimeout::script;
use httptimeout::session;
use httptimeout::session_config::{SessionConfigBuilder, Transport};
use log::LevelFilter;
use pretty_env_logger::env_logger::Target;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Probes an HTTP server's header, body and idle timeouts by sending a
/// scripted request at a controlled pace and reading the response until
/// the server hangs up.
#[derive(Debug, Parser)]
#[command(name = "httptimeout", version)]
struct Args {
    /// Test script: host, headers, byte-sleeps and body sections
    script: PathBuf,

    #[arg(long, value_enum, default_value_t = Transport::Auto)]
    transport: Transport,

    /// Don't verify the server's TLS certificate
    #[arg(long)]
    insecure: bool,

    /// Extra PEM certificates to trust
    #[arg(long)]
    ca_cert: Option<String>,

    #[arg(long, value_parser = parse_duration, default_value = "3s")]
    connect_timeout: Duration,

    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    handshake_timeout: Duration,

    /// How long without a response byte before a stall notice
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    stall_window: Duration,

    /// How often a scripted pause checks whether the server hung up
    #[arg(long, value_parser = parse_duration, default_value = "100ms")]
    poll_increment: Duration,

    #[arg(long)]
    no_color: bool,

    /// More log output on stderr (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    pretty_env_logger::formatted_timed_builder()
        .filter_level(level)
        .parse_default_env()
        .target(Target::Stderr)
        .init();
}

fn run(args: Args) -> Result<(), AppError> {
    let script = script::load(&args.script)?;

    let mut builder = SessionConfigBuilder::new()
        .transport(args.transport)
        .insecure(args.insecure)
        .connect_timeout(args.connect_timeout)
        .handshake_timeout(args.handshake_timeout)
        .stall_window(args.stall_window)
        .poll_increment(args.poll_increment);
    if let Some(ca_cert) = &args.ca_cert {
        builder = builder.ca_cert_path(ca_cert);
    }

    let mut reporter = ConsoleReporter::stdout();
    session::run(&script, &builder.get(), &mut reporter)?;

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.no_color {
        colored::control::set_override(false);
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
