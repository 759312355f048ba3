//! safelight CLI application
//!
//! Runs the build server, or performs one-off builds and signature lookups
//! through the same coordinator.

// CLI binary needs to output to stderr - this is intentional
#![allow(clippy::print_stderr)]

use safelight::tracing::{TracingConfig, init_tracing};
use safelight::{EXIT_CONFIG, EXIT_OK, cli, commands};

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    if let Err(e) = init_tracing(&TracingConfig {
        format: cli.log_format,
        level: cli.log_level,
    }) {
        eprintln!("{e:?}");
        std::process::exit(EXIT_CONFIG);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let exit_code = match runtime.block_on(commands::run(cli)) {
        Ok(()) => EXIT_OK,
        Err(e) => {
            let code = e.exit_code();
            eprintln!("{:?}", miette::Report::new(e));
            code
        }
    };
    std::process::exit(exit_code);
}
