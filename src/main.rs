#[cfg(not(feature = "cli"))]
compile_error!("The `pluck` binary requires the `cli` feature. Build with `--features cli`.");

use clap::Parser;
use std::fs::File;
use std::io::Write;
use std::process;

use pluck::cli;
use pluck::cli::app::{Cli, ColorMode, Commands};
use pluck::PluckError;

fn init_logging(debug_level: u8) {
    let level = match debug_level {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug_level);

    match cli.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {} // colored auto-detects tty
    }

    let writer_result: Result<Box<dyn Write>, PluckError> = match &cli.output {
        Some(path) => File::create(path)
            .map(|f| Box::new(f) as Box<dyn Write>)
            .map_err(|e| PluckError::Io(format!("Cannot create {}: {}", path, e))),
        None => Ok(Box::new(std::io::stdout()) as Box<dyn Write>),
    };

    let mut writer = match writer_result {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.code() as i32);
        }
    };

    let result = match cli.command {
        Commands::Trim {
            file,
            trim,
            block_size,
            stage,
            workers,
            checkpoint,
            skip_free,
            json,
        } => cli::trim::execute(
            &cli::trim::TrimOptions {
                file,
                trim,
                block_size,
                stage,
                workers,
                checkpoint,
                skip_free,
                json,
            },
            &mut writer,
        ),

        Commands::Checkpoint { checkpoint, json } => cli::checkpoint::execute(
            &cli::checkpoint::CheckpointOptions { checkpoint, json },
            &mut writer,
        ),

        Commands::Info {
            file,
            supported,
            json,
        } => cli::info::execute(
            &cli::info::InfoOptions {
                file,
                supported,
                json,
            },
            &mut writer,
        ),

        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            clap_complete::generate(shell, &mut cmd, "pluck", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = writer.flush() {
        eprintln!("Error: {}", e);
    }

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(e.code() as i32);
    }
}
