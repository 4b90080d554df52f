use anyhow::Result;
use clap::{Parser, Subcommand};
use nodeflow::cli::{self, NewCredential, OutputMode, commands};
use nodeflow::config::EngineConfig;
use nodeflow::engine::CancellationToken;
use nodeflow::logging::{self, LogOptions};
use std::io::BufRead;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nodeflow")]
#[command(about = "Workflow automation runtime - run graphs of trigger, model and HTTP nodes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Write logs under ~/.config/nodeflow/logs
    #[arg(long, global = true)]
    log: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow
    Run {
        /// Workflow id
        workflow: String,

        /// Reuse a run id to resume a failed run from its completed steps
        #[arg(long)]
        run_id: Option<String>,

        /// Stream status events and the result as JSON lines
        #[arg(long)]
        json: bool,

        /// Initial data as key=value pairs
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Validate a workflow without running
    Validate {
        /// Workflow id or path to a definition file
        workflow: String,
    },

    /// List model vendors and their settings
    Providers,

    /// Manage stored credentials
    Credential {
        #[command(subcommand)]
        action: CredentialAction,
    },
}

#[derive(Subcommand)]
enum CredentialAction {
    /// Encrypt and store a credential
    Add {
        #[arg(long)]
        id: String,

        /// Owner the credential is scoped to
        #[arg(long)]
        owner: String,

        /// Display name (defaults to the id)
        #[arg(long)]
        name: Option<String>,

        /// Secret value; read from stdin when omitted
        #[arg(long)]
        value: Option<String>,
    },

    /// List an owner's credentials
    List {
        #[arg(long)]
        owner: String,
    },
}

fn read_secret_from_stdin() -> Result<String> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match (&cli.log_file, cli.log) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => {
            let label = match &cli.command {
                Commands::Run { workflow, .. } => workflow.as_str(),
                _ => "nodeflow",
            };
            Some(logging::default_log_path(label)?)
        }
        (None, false) => None,
    };
    let guard = logging::init_logging(&LogOptions {
        debug: cli.debug,
        quiet: cli.quiet,
        json: cli.log_json,
        log_file,
    })?;

    let project_dir = cli.dir.as_deref();
    let config = EngineConfig::load(project_dir)?;

    let mode = match &cli.command {
        Commands::Run { json: true, .. } => OutputMode::Json,
        _ if cli.quiet => OutputMode::Quiet,
        _ => OutputMode::Console,
    };
    let handler = cli::create_handler(mode, cli.debug);

    let code = match cli.command {
        Commands::Run {
            workflow,
            run_id,
            args,
            ..
        } => {
            let engine = commands::build_engine(&config, project_dir)?;
            let cancel = CancellationToken::new();
            let signals = tokio::spawn(cli::setup_signal_handlers(cancel.clone()));

            let code =
                commands::run_workflow(&engine, &workflow, &args, run_id, &cancel, &*handler)
                    .await?;
            signals.abort();
            code
        }

        Commands::Validate { workflow } => {
            commands::validate_workflow(&workflow, &config, project_dir, &*handler).await?
        }

        Commands::Providers => commands::list_providers(&config, &*handler),

        Commands::Credential { action } => match action {
            CredentialAction::Add {
                id,
                owner,
                name,
                value,
            } => {
                let value = match value {
                    Some(value) => value,
                    None => read_secret_from_stdin()?,
                };
                let credential = NewCredential {
                    id: &id,
                    owner_id: &owner,
                    name: name.as_deref().unwrap_or(&id),
                    value: &value,
                };
                commands::add_credential(&config, project_dir, credential, &*handler)?
            }
            CredentialAction::List { owner } => {
                commands::list_credentials(&config, project_dir, &owner, &*handler)?
            }
        },
    };

    if code != 0 {
        // Flush the file writer before exiting
        drop(guard);
        std::process::exit(code);
    }

    Ok(())
}
