use clap::Parser;
use codelens_cli::{cli::Cli, commands, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = commands::run(cli).await {
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}
