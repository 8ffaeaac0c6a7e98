use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use deckhand::config::Config;
use deckhand::plugins::{self, HookServices, PluginCommand, PluginRegistry, Plugins};

/// Deckhand - manage the plugins of a deployment
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage plugins
    #[command(subcommand)]
    Plugins(PluginsCommand),
}

#[derive(Subcommand, Debug)]
enum PluginsCommand {
    /// List installed plugins
    List,
    /// Enable plugins
    Enable {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Disable plugins
    Disable {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Print the directory scanned for plugin files
    Printroot,
    /// Print the patches enabled plugins contribute to a slot
    Patches { slot: String },
    /// Print the services enabled plugins run for a hook phase
    Hooks { phase: String },
    /// Run the command of an enabled plugin
    Run {
        name: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_config_path()?,
    };
    let mut config = if config_path.exists() {
        Config::load_from_file(&config_path)?
    } else {
        Config::default()
    };

    let mut registry = PluginRegistry::from_env();

    match args.command {
        Command::Plugins(command) => {
            run_plugins_command(command, &mut registry, &mut config, &config_path)
        }
    }
}

fn run_plugins_command(
    command: PluginsCommand,
    registry: &mut PluginRegistry,
    config: &mut Config,
    config_path: &Path,
) -> Result<()> {
    match command {
        PluginsCommand::List => {
            for plugin in registry
                .iter_installed()
                .context("Failed to discover plugins")?
            {
                let status = if plugins::is_enabled(config, plugin.name()) {
                    " (enabled)"
                } else {
                    ""
                };
                let version = plugin.version().unwrap_or("unknown");
                println!("{}=={}{}", plugin.name(), version, status);
            }
        }
        PluginsCommand::Enable { names } => {
            for name in &names {
                plugins::enable(registry, config, name)
                    .with_context(|| format!("Failed to enable plugin {name}"))?;
                println!("Plugin {name} enabled");
            }
            config.save_to_file(config_path)?;
            println!("You should now re-generate your environment.");
        }
        PluginsCommand::Disable { names } => {
            for name in &names {
                plugins::disable(registry, config, name)
                    .with_context(|| format!("Failed to disable plugin {name}"))?;
            }
            config.save_to_file(config_path)?;
            println!("You should now re-generate your environment.");
        }
        PluginsCommand::Printroot => {
            println!("{}", registry.plugins_root().display());
        }
        PluginsCommand::Patches { slot } => {
            let enabled = Plugins::new(registry, config)?;
            for (plugin, content) in enabled.iter_patches(&slot) {
                println!("# {plugin}");
                println!("{content}");
            }
        }
        PluginsCommand::Hooks { phase } => {
            let enabled = Plugins::new(registry, config)?;
            for (plugin, services) in enabled.iter_hooks(&phase) {
                match services {
                    HookServices::Services(services) => {
                        println!("{plugin}: {}", services.join(", "));
                    }
                    HookServices::Parameters(parameters) => {
                        for (service, parameter) in parameters {
                            println!("{plugin}: {service}={parameter}");
                        }
                    }
                }
            }
        }
        PluginsCommand::Run { name, args } => {
            let enabled = Plugins::new(registry, config)?;
            let Some((_, command)) = enabled.iter_commands().find(|(plugin, _)| *plugin == name)
            else {
                bail!("Plugin {name} is not enabled or has no command");
            };
            match command {
                PluginCommand::Native(handler) => handler.run(&args)?,
                PluginCommand::Declared(_) => {
                    bail!("Plugin {name} declares a command that cannot be run natively")
                }
            }
        }
    }

    Ok(())
}
