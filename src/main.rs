use clap::{Parser, Subcommand};
use prof_match::core::export::write_export;
use prof_match::core::{ExportFormat, MatchSnapshot, Phase};
use prof_match::models::UploadedFile;
use prof_match::routes;
use prof_match::views::processing::{self, ProcessingOutcome};
use prof_match::views::results::{self, ResultsView};
use prof_match::views::submission::{self, Submission, SubmissionError, UploadObserver};
use prof_match::{AppState, Settings};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "prof-match", version)]
#[command(about = "Find research supervisors whose work matches your interests", long_about = None)]
struct Cli {
    /// Handoff scope; separate scopes keep separate submissions apart
    #[arg(long, global = true)]
    scope: Option<String>,

    /// Simulate processing instead of calling the matching service
    #[arg(long, global = true)]
    mock: bool,

    /// Configuration file (defaults to config/default.toml + config/local.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct SubmitArgs {
    /// University website, e.g. https://www.mit.edu
    #[arg(long)]
    university: String,

    /// Comma-separated research interests
    #[arg(long)]
    interests: String,

    /// Résumé files (PDF, DOCX or TXT)
    #[arg(long = "resume", num_args = 1..)]
    resumes: Vec<PathBuf>,
}

#[derive(clap::Args)]
struct ExportArgs {
    /// Also write the results in this format
    #[arg(long, value_enum)]
    export: Option<ExportFormat>,

    /// Directory for exported files
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Validate and upload a submission, then start matching
    Submit(SubmitArgs),

    /// Follow the submitted match until it finishes
    Process,

    /// Show the ranked matches
    Results(ExportArgs),

    /// Submit, process and show results in one go
    Run {
        #[command(flatten)]
        submit: SubmitArgs,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Export the ranked matches to a file
    Export {
        #[arg(long, value_enum, default_value = "csv")]
        format: ExportFormat,

        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Check that the matching service is reachable
    Health,

    /// Show one professor's profile
    Professor { id: String },

    /// Delete the remote session and clear saved state
    Cleanup,

    /// Serve an offline-capable proxy in front of the matching service
    ServeOffline,

    /// Print the effective configuration
    Config,
}

#[actix_web::main]
async fn main() {
    // Load .env file if present
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&settings);

    if let Err(e) = dispatch(cli.command, settings).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, config::ConfigError> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    if cli.mock {
        settings.mode.use_mock = true;
    }
    if let Some(scope) = &cli.scope {
        settings.handoff.scope = scope.clone();
    }
    Ok(settings)
}

fn init_logging(settings: &Settings) {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| settings.logging.level.clone());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| settings.logging.format.clone());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true);

    match log_format.as_str() {
        "json" => subscriber.json().init(),
        "pretty" => subscriber.pretty().init(),
        _ => subscriber.init(),
    }
}

async fn dispatch(command: Command, settings: Settings) -> CliResult {
    match command {
        Command::Config => {
            print!("{}", settings.to_toml()?);
            Ok(())
        }
        Command::ServeOffline => Ok(routes::serve_offline(&settings).await?),
        command => {
            let state = AppState::from_settings(settings).await?;
            run_command(command, &state).await
        }
    }
}

async fn run_command(command: Command, state: &AppState) -> CliResult {
    match command {
        Command::Submit(args) => {
            let record = submit(state, &args).await?;
            println!("Match {} started for session {}", record.match_id, record.session_id);
            println!("Next: prof-match process");
            Ok(())
        }
        Command::Process => {
            process(state).await?;
            println!("Next: prof-match results");
            Ok(())
        }
        Command::Results(args) => show_results(state, &args).await,
        Command::Run { submit: args, export } => {
            submit(state, &args).await?;
            process(state).await?;
            show_results(state, &export).await
        }
        Command::Export { format, out } => {
            let results = state
                .handoff
                .read_results()
                .await
                .ok_or("No results to export. Run `prof-match process` first.")?;
            let path = write_export(&results.matches, format, &out).await?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Health => {
            let health = state.api.health().await?;
            println!("{}: {}", state.settings.api.base_url, health.status);
            Ok(())
        }
        Command::Professor { id } => {
            let professor = state.api.get_professor(&id).await?;
            println!("{}", serde_json::to_string_pretty(&professor)?);
            Ok(())
        }
        Command::Cleanup => cleanup(state).await,
        Command::Config | Command::ServeOffline => Ok(()),
    }
}

async fn submit(state: &AppState, args: &SubmitArgs) -> Result<prof_match::SubmissionRecord, Box<dyn Error>> {
    let mut files = Vec::with_capacity(args.resumes.len());
    for path in &args.resumes {
        files.push(UploadedFile::from_path(path).await?);
    }

    let submission = Submission {
        university: args.university.clone(),
        research_interests: args.interests.clone(),
        files,
    };

    let observer: UploadObserver = Arc::new(|name: &str, pct: u8| {
        println!("Uploading {}: {}%", name, pct);
    });

    match submission::submit(state, &submission, Some(observer)).await {
        Ok(record) => Ok(record),
        Err(SubmissionError::Invalid(fields)) => {
            for (field, message) in fields.iter() {
                eprintln!("  {}: {}", field, message);
            }
            Err(SubmissionError::Invalid(fields).into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn process(state: &AppState) -> CliResult {
    let teardown = CancellationToken::new();
    let on_interrupt = teardown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut last: Option<(u8, String)> = None;
    let outcome = processing::run(state, teardown.clone(), |snapshot: &MatchSnapshot| {
        if snapshot.phase != Phase::Polling {
            return;
        }
        let current = (snapshot.progress, snapshot.current_step.clone());
        if last.as_ref() != Some(&current) {
            println!("[{:>3}%] {}", current.0, current.1);
            last = Some(current);
        }
    })
    .await?;
    teardown.cancel();

    match outcome {
        ProcessingOutcome::Completed(results) => {
            info!("Match finished with {} results", results.matches.len());
            Ok(())
        }
        ProcessingOutcome::Redirect(route) => {
            Err(format!("No submission found. Start at {} with `prof-match submit`.", route).into())
        }
        ProcessingOutcome::Failed { message, retry } => {
            eprintln!("Matching failed: {}", message);
            Err(format!("Try again from {} with `prof-match submit`.", retry).into())
        }
        ProcessingOutcome::Abandoned => Err("Processing interrupted".into()),
    }
}

async fn show_results(state: &AppState, args: &ExportArgs) -> CliResult {
    let results = match results::load(&state.handoff).await {
        ResultsView::Redirect(route) => {
            return Err(format!("No results found. Start at {} with `prof-match submit`.", route).into());
        }
        ResultsView::Empty => {
            println!("No Results Found");
            println!("We couldn't find any matching professors. Try different research interests.");
            return Ok(());
        }
        ResultsView::Matches(results) => results,
    };

    print!("{}", results::render(&results));

    if let Some(format) = args.export {
        let path = write_export(&results.matches, format, &args.out).await?;
        println!();
        println!("Exported to {}", path.display());
    }
    Ok(())
}

async fn cleanup(state: &AppState) -> CliResult {
    if let Some(record) = state.handoff.read_submission().await {
        if record.session_id != prof_match::core::mock::MOCK_SESSION_ID {
            match state.api.delete_session(&record.session_id).await {
                Ok(()) => info!("Deleted session {}", record.session_id),
                Err(e) => warn!("Failed to delete session {}: {}", record.session_id, e),
            }
        }
    }

    state.handoff.clear().await?;
    println!("Cleared saved state for scope {}", state.handoff.scope());
    Ok(())
}
