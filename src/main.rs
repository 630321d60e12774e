//! # db-directory
//!
//! Maintenance tool for a database-backed index directory.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use log::{error, info};

use db_directory::app_state::AppState;
use db_directory::config::AppConfig;
use db_directory::{DatabaseDirectory, Result};

/// Inspect and edit the files of a database-backed index directory
#[derive(Parser, Debug)]
#[command(name = "db-directory")]
#[command(version, about, long_about = None)]
struct Cli {
    /// YAML configuration file (defaults to ./config.yaml when present)
    #[arg(short, long, env = "DIRECTORY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// List files
    Ls,

    /// Print file metadata as JSON
    Stat { name: String },

    /// Write file content to stdout
    Cat { name: String },

    /// Store a local file under NAME
    Put {
        name: String,
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Delete a file
    Rm { name: String },

    /// Try to obtain a lock
    Lock { name: String },

    /// Forcibly clear a lock
    Unlock { name: String },
}

fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("db-directory: {}", e);
            process::exit(1);
        }
    };

    init_logging(&config);
    log_mdc::insert("table", config.directory.table_name.clone());

    if let Err(e) = run(config, cli.command) {
        error!("{}", e);
        process::exit(1);
    }
}

fn init_logging(config: &AppConfig) {
    let log_config = &config.logging.config_file;
    if Path::new(log_config).exists() {
        if let Err(e) = log4rs::init_file(log_config, Default::default()) {
            eprintln!("db-directory: cannot load {}: {}", log_config, e);
            env_logger::init();
        }
    } else {
        env_logger::init();
    }
}

fn run(config: AppConfig, command: Command) -> Result<()> {
    let state = AppState::from_config(config)?;
    let dir = state.directory()?;
    info!("Running {:?} on {}", command, dir);

    match command {
        Command::Ls => list(&dir),
        Command::Stat { name } => {
            let info = dir.file_info(&name)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Command::Cat { name } => {
            let mut input = dir.open_input(&name)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            io::copy(&mut input, &mut out)?;
            out.flush()?;
            input.close();
            Ok(())
        }
        Command::Put { name, path } => put(&dir, &name, &path),
        Command::Rm { name } => dir.delete_file(&name),
        Command::Lock { name } => {
            let obtained = dir.make_lock(&name).obtain()?;
            println!("{}: {}", name, if obtained { "obtained" } else { "held elsewhere" });
            Ok(())
        }
        Command::Unlock { name } => dir.clear_lock(&name),
    }
}

fn list(dir: &DatabaseDirectory) -> Result<()> {
    let mut names: Vec<String> = dir.list_files()?.into_iter().collect();
    names.sort();
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

fn put(dir: &DatabaseDirectory, name: &str, path: &Path) -> Result<()> {
    let mut file = File::open(path)?;
    let mut writer = dir.open_writer(name)?;
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_bytes(&buf[..n])?;
    }
    writer.close()?;
    println!("{} {:08x} {}", name, writer.checksum(), writer.length());
    Ok(())
}
