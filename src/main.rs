use std::cell::Cell;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use mailprompt::models::settings::ReplyType;
use mailprompt::services::host::{ComposeHost, CustomTextPrompt, MailHost};
use mailprompt::services::orchestrator::{PromptCommand, PromptOrchestrator, PromptOutcome};
use mailprompt::services::windows::ChatWindows;
use mailprompt::storage::ConfigService;
use mailprompt::utils::error::AppResult;
use mailprompt_core::{PromptTemplate, TabKind};
use mailprompt_llm::ProviderFactory;

/// Tab id used for the mail given on the command line
const CLI_TAB: u64 = 1;
/// Message id used for the mail given on the command line
const CLI_MESSAGE: u64 = 1;

#[derive(Parser)]
#[command(name = "mailprompt", about = "Run mail prompts against a chat model")]
struct Args {
    /// Settings file (default: ~/.mailprompt/config.json)
    #[arg(long, env = "MAILPROMPT_CONFIG")]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(long)]
    debug: bool,

    /// Prompt id to run (see --list-prompts)
    #[arg(short = 'p', long = "prompt")]
    prompt_id: Option<String>,

    /// File holding the mail body (default: stdin)
    #[arg(long)]
    file: Option<PathBuf>,

    /// Mail subject
    #[arg(long, default_value = "")]
    subject: String,

    /// Selected text; prompts that need a selection fail without it
    #[arg(long, default_value = "")]
    selection: String,

    /// Free text for prompts that ask for it
    #[arg(long)]
    custom: Option<String>,

    /// Signature of the sending identity
    #[arg(long)]
    signature: Option<String>,

    /// Treat the mail as being composed instead of read
    #[arg(long)]
    composing: bool,

    /// List the prompts offered for the mail and exit
    #[arg(long)]
    list_prompts: bool,

    /// List the models of the configured provider and exit
    #[arg(long)]
    list_models: bool,
}

/// The mail given on the command line.
struct CliMail {
    kind: TabKind,
    body: String,
    subject: String,
    selection: String,
    signature: Option<String>,
}

#[async_trait]
impl MailHost for CliMail {
    async fn tab_kind(&self, _tab_id: u64) -> AppResult<TabKind> {
        Ok(self.kind)
    }

    async fn selected_text(&self, _tab_id: u64) -> AppResult<String> {
        Ok(self.selection.clone())
    }

    async fn mail_body(&self, _tab_id: u64) -> AppResult<String> {
        Ok(self.body.clone())
    }

    async fn mail_subject(&self, _tab_id: u64) -> AppResult<String> {
        Ok(self.subject.clone())
    }

    async fn signature(&self, _tab_id: u64) -> AppResult<Option<String>> {
        Ok(self.signature.clone())
    }

    async fn message_id(&self, _tab_id: u64) -> AppResult<Option<u64>> {
        Ok(match self.kind {
            TabKind::Composing => None,
            _ => Some(CLI_MESSAGE),
        })
    }
}

/// Prints what would go into the compose window.
struct StdoutCompose;

#[async_trait]
impl ComposeHost for StdoutCompose {
    async fn reply(&self, message_id: u64, reply_type: ReplyType, body: &str) -> AppResult<()> {
        let to = match reply_type {
            ReplyType::ReplyAll => "all",
            ReplyType::ReplySender => "sender",
        };
        eprintln!("--- reply to {} of mail {} ---", to, message_id);
        println!("{}", body);
        Ok(())
    }

    async fn replace_selection(&self, tab_id: u64, text: &str) -> AppResult<()> {
        eprintln!("--- replacement for the selection in tab {} ---", tab_id);
        println!("{}", text);
        Ok(())
    }
}

struct ArgCustomText(Option<String>);

#[async_trait]
impl CustomTextPrompt for ArgCustomText {
    async fn ask(&self, prompt: &PromptTemplate) -> AppResult<Option<String>> {
        if self.0.is_none() {
            eprintln!("Prompt \"{}\" needs --custom text", prompt.name);
        }
        Ok(self.0.clone())
    }
}

fn read_body(file: Option<&PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut body = String::new();
            std::io::stdin().read_to_string(&mut body)?;
            Ok(body)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ConfigService::open(path)?,
        None => ConfigService::new()?,
    };
    let settings = config.get_config_clone();

    {
        use tracing_subscriber::EnvFilter;
        let default_level = if args.debug || settings.do_debug {
            "debug"
        } else {
            "warn"
        };
        let filter = EnvFilter::try_from_env("MAILPROMPT_LOG")
            .unwrap_or_else(|_| EnvFilter::new(default_level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    tracing::info!("[mailprompt] Settings loaded from {}", config.path().display());

    if args.list_models {
        let provider_config = settings
            .active_provider_config()
            .map_err(anyhow::Error::msg)?;
        match ProviderFactory::new().list_models(&provider_config).await? {
            Some(models) => models.iter().for_each(|m| println!("{}", m)),
            None => eprintln!(
                "{} does not support listing models",
                provider_config.kind()
            ),
        }
        return Ok(());
    }

    let kind = if args.composing {
        TabKind::Composing
    } else {
        TabKind::Reading
    };

    if args.list_prompts {
        for prompt in mailprompt_core::filter_prompts_for_tab(&settings.prompts(), kind) {
            println!("{:<24} {}", prompt.id, prompt.name);
        }
        return Ok(());
    }

    let Some(prompt_id) = args.prompt_id.clone() else {
        anyhow::bail!("no prompt given; use --prompt <id> or --list-prompts");
    };

    let mail = CliMail {
        kind,
        body: read_body(args.file.as_ref())?,
        subject: args.subject.clone(),
        selection: args.selection.clone(),
        signature: args.signature.clone(),
    };

    let windows = Arc::new(ChatWindows::new(ProviderFactory::new()));
    let orchestrator = PromptOrchestrator::new(
        settings,
        windows.clone(),
        Arc::new(mail),
        Arc::new(StdoutCompose),
        Arc::new(ArgCustomText(args.custom.clone())),
    );

    let streamed = Cell::new(false);
    let run = orchestrator.run_streaming(
        PromptCommand {
            prompt_id,
            tab_id: CLI_TAB,
        },
        |token| {
            streamed.set(true);
            eprint!("{}", token);
            let _ = std::io::stderr().flush();
        },
    );
    tokio::pin!(run);

    // Ctrl-C stops waiting and takes the answer as it is
    let outcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("[mailprompt] Forcing completion");
                orchestrator.force_completion().await?;
            }
        }
    };
    if streamed.get() {
        eprintln!();
    }

    match outcome? {
        PromptOutcome::Shown { text } => println!("{}", text),
        PromptOutcome::Replied { .. } | PromptOutcome::Replaced { .. } => {}
        PromptOutcome::Cancelled => eprintln!("Cancelled"),
    }

    windows.close_all().await;
    Ok(())
}
