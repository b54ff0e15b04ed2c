mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use adfence_core::dump::DEFAULT_DUMP_DEPTH;

#[derive(Parser)]
#[command(
    name = "adfence",
    version,
    about = "Hides KakaoTalk advertisement panes and closes the gap they leave"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Block ads in the foreground until Ctrl+C, then restore hidden windows
    Run,
    /// Capture the target's window tree as JSON for rule tuning
    Dump {
        /// Directory to write window_dump_<timestamp>.json into (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Maximum child depth to capture
        #[arg(long, default_value_t = DEFAULT_DUMP_DEPTH)]
        depth: u32,
    },
    /// Create default config.toml and rules.toml
    Init,
    /// Show whether a blocker is running and where its files live
    Status,
    /// Start adfence when you log on
    Autostart {
        #[command(subcommand)]
        action: AutostartCommands,
    },
}

#[derive(Subcommand)]
enum AutostartCommands {
    /// Register `adfence run` in the HKCU Run key
    Enable,
    /// Remove the Run key entry
    Disable,
    /// Show whether the entry exists
    Status,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => commands::run::execute(),
        Commands::Dump { out, depth } => commands::dump::execute(out.as_deref(), depth),
        Commands::Init => commands::init::execute(),
        Commands::Status => commands::status::execute(),
        Commands::Autostart { action } => match action {
            AutostartCommands::Enable => commands::autostart::enable(),
            AutostartCommands::Disable => commands::autostart::disable(),
            AutostartCommands::Status => commands::autostart::status(),
        },
    }
}
