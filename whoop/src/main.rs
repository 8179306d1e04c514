use anyhow::Context;
use log::{error, info};
use std::env;
use std::io::{self, BufRead, Write};

use config::{Config, Environment, File, FileFormat};

use whoop_export::{cli_options, ExportManager};

const DEFAULT_CONFIG: &str = "config/whoop_config.json";
const DEFAULT_LOG_CONFIG: &str = "config/log4rs.yml";

fn prompt_for_code(url: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    writeln!(stdout, "Open the following url and authorize access:\n\n{url}\n")?;
    write!(stdout, "Paste the code from the redirect url: ")?;
    stdout.flush()?;

    let mut code = String::new();
    io::stdin().lock().read_line(&mut code)?;
    Ok(code)
}

fn usage_brief(args: &[String]) -> String {
    let program = args.first().map_or(env!("CARGO_PKG_NAME"), String::as_str);
    format!("Usage: {program} [options]")
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let opts = cli_options();
    let matches = opts
        .parse(args.iter().skip(1))
        .context("failed to parse arguments")?;

    if matches.opt_present("h") {
        print!("{}", opts.usage(&usage_brief(&args)));
        return Ok(());
    }

    let log_config = matches
        .opt_str("log-config")
        .unwrap_or_else(|| String::from(DEFAULT_LOG_CONFIG));
    log4rs::init_file(&log_config, Default::default())
        .with_context(|| format!("failed to initialise logging from {log_config}"))?;

    let config_file = matches
        .opt_str("c")
        .unwrap_or_else(|| String::from(DEFAULT_CONFIG));
    let config = Config::builder()
        .add_source(File::new(&config_file, FileFormat::Json))
        .add_source(Environment::with_prefix("WHOOP").separator("__"))
        .build()
        .with_context(|| format!("failed to read config {config_file}"))?;

    let mut export_manager = ExportManager::new(config, Some(matches))?;
    export_manager.login(prompt_for_code)?;

    let written = export_manager.export_all()?;
    info!("Export finished, {} file(s) written", written.len());
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
