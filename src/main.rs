use clap::Parser;
use marketlens::adapters::file_config_adapter::FileConfigAdapter;
use marketlens::cli::{run, Cli};
use marketlens::ports::config_port::ConfigPort;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logs go to stderr; stdout carries the JSON result.
fn init_tracing(config: Option<&dyn ConfigPort>) {
    let level = config
        .and_then(|c| c.get_string("logging", "level"))
        .unwrap_or_else(|| "info".to_string());
    let json = config
        .and_then(|c| c.get_string("logging", "format"))
        .is_some_and(|f| f.eq_ignore_ascii_case("json"));

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let config = FileConfigAdapter::from_file(&cli.config).ok();
    init_tracing(config.as_ref().map(|c| c as &dyn ConfigPort));
    run(cli)
}
