use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell as CompShell};
use owo_colors::OwoColorize;
use std::path::PathBuf;

use stampede::commands;

#[derive(Parser)]
#[command(name = "stampede")]
#[command(version = "0.1.0")]
#[command(about = "Scenario-driven HTTP load testing")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load-test scenario
    Run {
        /// Scenario file or directory of *.stampede.yaml files
        target: PathBuf,
        /// JSON report output file
        #[arg(long = "output")]
        output: Option<PathBuf>,
        /// Override: fixed number of virtual users
        #[arg(long = "vus")]
        vus: Option<u32>,
        /// Override: test duration (e.g. "30s", "5m")
        #[arg(long = "duration")]
        duration: Option<String>,
        /// Override: scheduler tick interval (e.g. "250ms")
        #[arg(long = "tick-interval")]
        tick_interval: Option<String>,
        /// Override: drain grace period at the end of the run (e.g. "10s")
        #[arg(long = "grace-timeout")]
        grace_timeout: Option<String>,
        /// Progress report interval during the run
        #[arg(long = "report-interval", default_value = "5s")]
        report_interval: String,
        /// CI mode (no animations)
        #[arg(long = "ci")]
        ci: bool,
    },
    /// Check scenario files without sending any traffic
    Validate {
        /// Scenario file or directory
        target: PathBuf,
    },
    /// Generate shell completions (internal)
    #[command(hide = true)]
    Completions {
        /// Shell: bash, zsh, fish
        shell: String,
    },
}

fn print_banner() {
    let banner = r#"
    ███████╗████████╗ █████╗ ███╗   ███╗██████╗ ███████╗██████╗ ███████╗
    ██╔════╝╚══██╔══╝██╔══██╗████╗ ████║██╔══██╗██╔════╝██╔══██╗██╔════╝
    ███████╗   ██║   ███████║██╔████╔██║██████╔╝█████╗  ██║  ██║█████╗
    ╚════██║   ██║   ██╔══██║██║╚██╔╝██║██╔═══╝ ██╔══╝  ██║  ██║██╔══╝
    ███████║   ██║   ██║  ██║██║ ╚═╝ ██║██║     ███████╗██████╔╝███████╗
    ╚══════╝   ╚═╝   ╚═╝  ╚═╝╚═╝     ╚═╝╚═╝     ╚══════╝╚═════╝ ╚══════╝
"#;

    if atty::is(atty::Stream::Stdout) {
        println!("{}", banner.cyan());
    } else {
        println!("stampede v0.1.0 — scenario-driven HTTP load testing");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Completions { .. }) {
        print_banner();
    }

    match cli.command {
        Commands::Run {
            target,
            output,
            vus,
            duration,
            tick_interval,
            grace_timeout,
            report_interval,
            ci,
        } => {
            let code = commands::run::handle_run(commands::run::RunOptions {
                target,
                output,
                vus,
                duration,
                tick_interval,
                grace_timeout,
                report_interval,
                ci,
            })
            .await?;
            std::process::exit(code);
        }
        Commands::Validate { target } => {
            commands::validate::handle_validate(target).await?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            let sh = match shell.as_str() {
                "bash" => CompShell::Bash,
                "zsh" => CompShell::Zsh,
                "fish" => CompShell::Fish,
                "powershell" | "pwsh" => CompShell::PowerShell,
                "elvish" => CompShell::Elvish,
                other => {
                    eprintln!(
                        "Unsupported shell: {} (use bash|zsh|fish|powershell|elvish)",
                        other
                    );
                    std::process::exit(2);
                }
            };
            generate(sh, &mut cmd, name, &mut std::io::stdout());
        }
    }

    Ok(())
}
