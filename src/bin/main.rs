use assured::{cli, config, telemetry};

fn main() {
    let cli = cli::parse_from(std::env::args_os());

    let cfg = config::load_or_default();
    telemetry::init(telemetry::TelemetryConfig::new(cli.verbose, cfg.logging));

    if let Err(e) = cli::run(cli) {
        tracing::error!("error: {}", e);
        std::process::exit(1);
    }
}
