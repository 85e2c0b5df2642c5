use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use researchmesh_core::{
    ConfigLoader, Interaction, ResearchTeamFactory, RunCycle, RunState, TelemetryOptions,
    init_telemetry,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "researchmesh-cli",
    version,
    about = "Multi-agent research over HackerNews, the web and linked articles"
)]
struct Cli {
    /// Optional TOML configuration (falls back to RESEARCHMESH_CONFIG, then ./researchmesh.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log prompts and member outputs.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one research query through the team.
    Run(RunArgs),
    /// Print the team configuration as JSON.
    Team,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Topic or question to research.
    #[arg(long, default_value = "")]
    query: String,

    /// OpenAI API key, used only for this invocation.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    /// Print each member's findings beneath the summary.
    #[arg(long)]
    show_members: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryOptions {
        env_filter: None,
        with_ansi: std::io::stderr().is_terminal(),
        debug: cli.debug,
    })?;

    let mut config = ConfigLoader::load(cli.config.clone())?;
    if cli.debug {
        config.team.debug_mode = true;
    }

    match cli.command {
        Command::Team => {
            let descriptor = ResearchTeamFactory::new(config).descriptor();
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
            Ok(())
        }
        Command::Run(args) => {
            if args.show_members {
                config.team.show_members_responses = true;
            }
            let rt = Runtime::new()?;
            rt.block_on(run_command(args, config))
        }
    }
}

async fn run_command(args: RunArgs, config: researchmesh_core::Config) -> Result<()> {
    let show_members = config.team.show_members_responses;
    info!(model = %config.llm.model, "starting research run");

    let cycle = RunCycle::new(Arc::new(ResearchTeamFactory::new(config)));
    let interaction = Interaction::trigger(args.api_key, args.query);

    let state = cycle
        .handle(&interaction, &mut |state: &RunState| {
            if let RunState::Running = state
                && let Some(message) = state.message()
            {
                eprintln!("{message}");
            }
        })
        .await;

    let message = state_message(&state);
    match state {
        RunState::Completed { output } => {
            eprintln!("{message}");
            println!("{}", output.content);
            if show_members {
                for response in &output.member_responses {
                    println!("\n---\n\n### {}\n\n{}", response.member, response.content);
                }
            }
            Ok(())
        }
        _ => bail!(message),
    }
}

fn state_message(state: &RunState) -> String {
    state.message().unwrap_or_else(|| state.name().to_string())
}
