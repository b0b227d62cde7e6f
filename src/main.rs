use clap::Parser;
use pnml_preprocessor::Cli;

fn main() {
    env_logger::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Usage problems are not processing failures.
            let _ = err.print();
            std::process::exit(0);
        }
    };
    if let Err(err) = cli.run() {
        eprintln!("ERROR: {err:#}");
        std::process::exit(1);
    }
}
