use clap::{Arg, ArgAction, ArgMatches, Command as ClapCommand};
use console::Term;
use eyre::WrapErr;
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tracing::*;

use crate::{get_config, Config, ItemId, LocalLaunch, Session};

/// Build the CLI with clap's builder pattern
fn build_cli() -> ClapCommand {
    ClapCommand::new("report-dh")
        .about("report-dh CLI inspects and initializes the report configuration")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .help("Print report's internal diagnostics")
            .global(true)
            .action(ArgAction::SetTrue))
        .arg(Arg::new("color")
            .long("color")
            .help("Produce color output. Default is \"auto\" [env: CARGO_TERM_COLOR]")
            .global(true)
            .value_parser(["auto", "always", "never"]))
        .subcommand(
            ClapCommand::new("config")
                .about("Print the resolved configuration, or a single value of it")
                .arg(Arg::new("key")
                    .help("Dotted key to print, e.g. launch.project"))
        )
        .subcommand(
            ClapCommand::new("init")
                .about("Write a report.toml in the current directory")
                .arg(Arg::new("endpoint")
                    .long("endpoint")
                    .help("Base URL of the reporting backend"))
                .arg(Arg::new("project")
                    .long("project")
                    .help("Project the launches belong to"))
                .arg(Arg::new("launch")
                    .long("launch")
                    .help("Launch name"))
                .arg(Arg::new("token")
                    .long("token")
                    .help("Access token of the reporting backend"))
                .arg(Arg::new("path")
                    .long("path")
                    .help("Where to write the file")
                    .default_value("report.toml"))
                .arg(Arg::new("force")
                    .long("force")
                    .help("Overwrite an existing file")
                    .action(ArgAction::SetTrue))
        )
        .subcommand(
            ClapCommand::new("ls")
                .about("List the features and stories declared in this binary")
        )
}

/// report-dh CLI.
#[derive(Default)]
pub struct App;

impl App {
    pub fn new() -> App {
        App
    }

    /// Parse command-line args and run the sub command.
    pub fn run(self) -> eyre::Result<()> {
        color_eyre::install()?;
        self.run_from(std::env::args_os())
    }

    pub fn run_from<I, T>(self, args: I) -> eyre::Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = build_cli().try_get_matches_from(args)?;

        if matches.get_flag("verbose") {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(
                    "report=debug,report_core=debug",
                ))
                .with_writer(std::io::stderr)
                .try_init();
        }
        apply_color(&matches);

        let term = Term::stdout();
        match matches.subcommand() {
            Some(("config", config_matches)) => {
                let cfg = get_config().masked();
                match config_matches.get_one::<String>("key") {
                    Some(key) => term.write_line(&cfg.get_str(key)?)?,
                    None => term.write_str(&toml::to_string_pretty(&cfg)?)?,
                }
                Ok(())
            }
            Some(("init", init_matches)) => {
                let path = init_matches
                    .get_one::<String>("path")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("report.toml"));
                init(&path, init_matches)?;
                term.write_line(&format!("wrote {}", path.display()))?;
                Ok(())
            }
            Some(("ls", _)) => {
                for line in list(get_config().clone())? {
                    term.write_line(&line)?;
                }
                Ok(())
            }
            _ => unreachable!("Subcommand required is set to true"),
        }
    }
}

fn apply_color(matches: &ArgMatches) {
    let color_command = matches
        .get_one::<String>("color")
        .and_then(|s| Color::from_str(s).ok());
    let color_env = std::env::var("CARGO_TERM_COLOR");
    let color = match (color_command, color_env) {
        (color @ Some(Color::Always), _) => color,
        (color @ Some(Color::Never), _) => color,
        (None, Ok(color)) => Color::from_str(&color).ok(),
        _ => None,
    };
    match color {
        Some(Color::Always) => {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        }
        Some(Color::Never) => {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        _ => {}
    }
}

/// Write a configuration file built from the command-line values.
fn init(path: &Path, matches: &ArgMatches) -> eyre::Result<()> {
    if path.exists() && !matches.get_flag("force") {
        eyre::bail!("{} already exists; use --force to overwrite it", path.display());
    }

    let mut cfg = Config::default();
    let value = |name: &str| matches.get_one::<String>(name).cloned();
    if let Some(endpoint) = value("endpoint") {
        cfg.launch.endpoint = Some(endpoint);
    }
    if let Some(project) = value("project") {
        cfg.launch.project = project;
    }
    if let Some(launch) = value("launch") {
        cfg.launch.name = launch;
    }
    if let Some(token) = value("token") {
        cfg.launch.token = Some(token);
    }

    debug!("writing {cfg:?} to {}", path.display());
    std::fs::write(path, toml::to_string_pretty(&cfg)?)
        .wrap_err_with(|| format!("failed to write {}", path.display()))
}

/// Render the declared tree by registering the declarations with a throwaway session.
fn list(config: Config) -> eyre::Result<Vec<String>> {
    let launch = Arc::new(LocalLaunch::new());
    let session = Session::start(config, launch.clone())?;
    crate::declare(&session)?;

    fn walk(launch: &LocalLaunch, parent: Option<&ItemId>, depth: usize, out: &mut Vec<String>) {
        for item in launch.children(parent) {
            out.push(format!(
                "{}- [{}] {}",
                "  ".repeat(depth),
                item.item_type,
                item.name
            ));
            walk(launch, Some(&item.id), depth + 1, out);
        }
    }

    let mut out = Vec::new();
    walk(&launch, None, 0, &mut out);
    session.finish()?;
    Ok(out)
}

#[derive(Debug, Clone, Default, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Color {
    #[default]
    Auto,
    Always,
    Never,
}
