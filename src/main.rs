use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

use bizgraph::cli::args::Cli;
use bizgraph::cli::commands::execute_command;
use bizgraph::cli::output;
use bizgraph::exitcode;

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.debug);

    let code = match execute_command(&cli) {
        Ok(()) => exitcode::OK,
        Err(e) => {
            output::error(&e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

/// `-d` count to log level. Anything above three is treated as trace.
fn level_for(count: u8) -> LevelFilter {
    match count {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn setup_logging(count: u8) {
    let level = level_for(count);

    // network logs only; config/toml stay silent
    let own_targets = filter_fn(|metadata| metadata.target().starts_with("bizgraph"));

    // stdout carries exported documents, so logs go to stderr
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(count > 1)
        .with_span_events(if count > 2 {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .with_filter(level)
        .with_filter(own_targets);

    tracing_subscriber::registry().with(layer).init();
    tracing::info!("log level {}", level);
}
