mod app;
mod cli;
mod config;
mod output;

use clap::Parser;

use cli::Cli;
use config::Config;

fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let cli = cli.with_config(config);
    crashreport::logging::init(cli.debug);

    if let Err(e) = app::run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
