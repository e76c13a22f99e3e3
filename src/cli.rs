//! Command-line front end. It only renders projected state; every decision
//! lives in the session and the orchestrator.
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::bootstrap::AppRuntime;
use crate::codec;
use crate::enhance::{EnhancementOutcome, SubmitError};
use crate::error::{AppError, AppResult};
use crate::identity::Identity;
use crate::notification;
use crate::projection::{self, ProjectionInput};
use crate::session::VibeSession;

const SIGN_IN_FAILED: &str = "Error signing in. Check the logs for details.";

const UPGRADE_PAGE: &str = "\
Upgrade Your Account

Paid plans with monthly subscriptions are not available yet. Billing needs a
secure payment backend, which this client does not include.

Subscribe Now (unavailable)";

#[derive(Parser, Debug)]
#[command(
    name = "vibecode",
    version,
    about = "Enhance photos with a saved vibe prompt",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Enhance one photo with the saved or given vibe prompt
    Enhance(EnhanceArgs),
    /// Show or change the saved vibe prompt
    Prompt(PromptArgs),
    /// Print the signed-in identity
    Whoami(TokenArgs),
    /// Forget the stored session
    SignOut,
    /// Show the account upgrade page
    Upgrade,
}

#[derive(Parser, Debug)]
pub struct TokenArgs {
    /// Sign-in token; falls back to VIBECODE_AUTH_TOKEN, then an anonymous session
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,
}

#[derive(Parser, Debug)]
pub struct EnhanceArgs {
    /// Photo to enhance
    #[arg(long, value_name = "PATH")]
    pub image: PathBuf,

    /// Vibe prompt; replaces the saved one for this run
    #[arg(long, value_name = "TEXT")]
    pub prompt: Option<String>,

    /// Where to write the result (default: <stem>_enhanced.<ext> next to the input)
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Send a desktop notification with the outcome
    #[arg(long)]
    pub notify: bool,

    #[command(flatten)]
    pub auth: TokenArgs,
}

#[derive(Parser, Debug)]
pub struct PromptArgs {
    #[command(subcommand)]
    pub action: Option<PromptAction>,

    #[command(flatten)]
    pub auth: TokenArgs,
}

#[derive(Subcommand, Debug)]
pub enum PromptAction {
    /// Save a new vibe prompt
    Set {
        /// Prompt text
        text: String,
    },
}

pub async fn execute(args: RootArgs, runtime: AppRuntime) -> Result<ExitCode> {
    match args.command {
        Command::Enhance(enhance) => run_enhance(&runtime, enhance)
            .await
            .context("enhance failed"),
        Command::Prompt(prompt) => run_prompt(&runtime, prompt)
            .await
            .context("prompt command failed"),
        Command::Whoami(auth) => {
            let session = runtime.session();
            let identity = sign_in(&session, &runtime, &auth)
                .await
                .context(SIGN_IN_FAILED)?;
            let kind = if identity.anonymous {
                "anonymous"
            } else {
                "token"
            };
            println!("{} ({kind})", identity.id);
            Ok(ExitCode::SUCCESS)
        }
        Command::SignOut => {
            runtime
                .identity
                .sign_out()
                .await
                .context("failed to sign out")?;
            println!("Successfully signed out.");
            Ok(ExitCode::SUCCESS)
        }
        Command::Upgrade => {
            println!("{UPGRADE_PAGE}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn sign_in(
    session: &VibeSession,
    runtime: &AppRuntime,
    auth: &TokenArgs,
) -> AppResult<Identity> {
    let token = auth.token.as_deref().or(runtime.initial_token());
    let identity = session.start(token).await?;
    session.wait_for_prompt_load().await;
    Ok(identity)
}

async fn run_prompt(runtime: &AppRuntime, args: PromptArgs) -> AppResult<ExitCode> {
    let session = runtime.session();
    let identity = sign_in(&session, runtime, &args.auth).await?;
    match args.action {
        None => {
            if let Some(notice) = session.state().notice {
                eprintln!("{notice}");
            }
            let prompt = session.prompt();
            if prompt.is_empty() {
                println!("No saved vibe yet.");
            } else {
                println!("{prompt}");
            }
        }
        Some(PromptAction::Set { text }) => {
            runtime.prompts.persist(&identity.id, &text).await?;
            println!("Saved your vibe.");
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_enhance(runtime: &AppRuntime, args: EnhanceArgs) -> AppResult<ExitCode> {
    let session = runtime.session();
    sign_in(&session, runtime, &args.auth).await?;
    if let Some(notice) = session.state().notice {
        eprintln!("{notice}");
    }

    session.upload_image_file(&args.image)?;
    if let Some(prompt) = args.prompt {
        session.set_prompt(prompt);
    }

    let mut updates = session.orchestrator().subscribe();
    let printer = tokio::spawn(async move {
        let mut last = String::new();
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if !snapshot.status.is_in_flight() {
                continue;
            }
            let input = ProjectionInput::from_snapshot(&snapshot).with_presence(true, true, true);
            let text = projection::project(&input).status_text;
            if text != last {
                eprintln!("{text}");
                last = text;
            }
        }
    });
    let submitted = session.enhance().await;
    printer.abort();

    let outcome = match submitted {
        Ok(outcome) => outcome,
        Err(SubmitError::Validation(err)) => {
            eprintln!("{err}");
            return Ok(ExitCode::from(2));
        }
        Err(err) => return Err(AppError::from(err)),
    };

    if args.notify || runtime.config.notify {
        if let Some(body) = notification::outcome_body(&outcome) {
            notification::send(body);
        }
    }
    println!("{}", session.view().status_text);

    match outcome {
        EnhancementOutcome::Succeeded { image, .. } => {
            let output = args
                .output
                .unwrap_or_else(|| default_output_path(&args.image, image.mime_type()));
            codec::write_image_file(&image, &output)?;
            println!("Saved enhanced photo to {}", output.display());
            Ok(ExitCode::SUCCESS)
        }
        EnhancementOutcome::Failed { .. } | EnhancementOutcome::Discarded => {
            Ok(ExitCode::FAILURE)
        }
    }
}

/// `<dir>/<stem>_enhanced.<ext>` where the extension follows the result type.
pub fn default_output_path(input: &Path, mime_type: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo".to_string());
    let file_name = format!("{stem}_enhanced.{}", codec::suggested_extension(mime_type));
    match input.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}
