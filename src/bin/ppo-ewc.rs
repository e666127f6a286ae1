use clap::Parser;
use env_logger::{Env, Target};
use ppo_ewc::cli::Options;
use ppo_ewc::simulation::{run_dir, Trainer};
use std::error::Error;
use std::fs::{self, File};

fn main() -> Result<(), Box<dyn Error>> {
    let opts = Options::parse();
    let config = opts.resolve()?;
    let run_dir = run_dir(&config, &chrono::Local::now());
    fs::create_dir_all(&run_dir)?;

    let mut logger = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if !config.write_terminal {
        let log_file = File::create(run_dir.join(format!("seed{}_terminal.log", config.seed)))?;
        logger.target(Target::Pipe(Box::new(log_file)));
    }
    logger.init();

    let summary = Trainer::new(config, &run_dir)?.run()?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
