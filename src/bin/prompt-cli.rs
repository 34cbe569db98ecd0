use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use prompt_studio::{
    JobRequest, JobState, Orchestrator, OrchestratorError, Settings,
    generator::StabilityClient,
    improver::GigaChatClient,
    jobs::{OrchestratorOptions, Pipeline},
    storage::{Delivery, ImageLibrary, LocalFileStorage},
    styles, telemetry,
};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

const INTERACTIVE_HELP: &str = "\
Commands:
  exit, q, quit    leave the program
  help, ?          show this help

Anything else is sent as an image prompt.";

#[derive(Parser, Clone, Debug, PartialEq)]
#[command(author, version, about = "Generate images from text prompts via GigaChat and Stability AI")]
struct Cli {
    /// Prompt to generate an image for
    prompt: Option<String>,

    /// File with one prompt per line
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: Option<PathBuf>,

    /// Read prompts from the terminal in a loop
    #[arg(long)]
    interactive: bool,

    /// Send prompts to the generator as typed
    #[arg(long = "no-improve")]
    no_improve: bool,

    /// Image size in pixels
    #[arg(long, num_args = 2, value_names = ["W", "H"], default_values_t = [1024u32, 1024u32])]
    size: Vec<u32>,

    /// Number of images per prompt
    #[arg(long, default_value_t = 1)]
    samples: u32,

    /// Style preset key (see --list-styles)
    #[arg(long, default_value = styles::DEFAULT_STYLE)]
    style: String,

    /// Directory the images are saved to
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    output: Option<PathBuf>,

    /// Check that both APIs are reachable with the configured credentials
    #[arg(long = "test-connection")]
    test_connection: bool,

    /// List the language models available to the configured account
    #[arg(long)]
    models: bool,

    /// List the style presets
    #[arg(long = "list-styles")]
    list_styles: bool,
}

impl Cli {
    fn request_template(&self) -> JobRequest {
        let (width, height) = match self.size.as_slice() {
            [width, height] => (*width, *height),
            _ => (1024, 1024),
        };
        JobRequest::new(String::new())
            .style(self.style.clone())
            .improve(!self.no_improve)
            .size(width, height)
            .samples(self.samples)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = telemetry::init() {
        eprintln!("logging disabled: {err}");
    }

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let settings = Settings::from_env().context("invalid configuration")?;

    if cli.list_styles {
        for style in styles::summaries() {
            println!("  {:<14} {}", style.key, style.name);
        }
        return Ok(true);
    }
    if cli.test_connection {
        return Ok(test_connection(&settings).await);
    }
    if cli.models {
        let client = GigaChatClient::new(settings.gigachat.clone())?;
        let models = client.list_models().await.context("failed to list models")?;
        println!("Available GigaChat models:");
        for model in models {
            match model.owned_by.as_deref() {
                Some(owner) => println!("  - {} ({owner})", model.id),
                None => println!("  - {}", model.id),
            }
        }
        return Ok(true);
    }

    let missing = settings.missing_credentials();
    if !missing.is_empty() {
        eprintln!("Missing environment variables:");
        for name in missing {
            eprintln!("  - {name}");
        }
        eprintln!("Fill in .env (see .env.example).");
        return Ok(false);
    }

    let output_dir = cli.output.clone().unwrap_or_else(|| settings.output_dir.clone());
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("cannot create {}", output_dir.display()))?;
    let storage = LocalFileStorage::new(output_dir.clone(), output_dir.display().to_string());
    let pipeline = Pipeline::from_settings(&settings, Delivery::Files(ImageLibrary::new(storage)))?;
    let orchestrator = Orchestrator::start(pipeline, OrchestratorOptions::from(&settings));
    let template = cli.request_template();

    let all_ok = if cli.interactive || (cli.prompt.is_none() && cli.input.is_none()) {
        interactive(&orchestrator, &template).await?;
        true
    } else {
        let mut all_ok = true;
        if let Some(prompt) = cli.prompt.as_deref() {
            all_ok &= generate_one(&orchestrator, &template, prompt).await;
        }
        if let Some(input) = cli.input.as_deref() {
            all_ok &= batch(&orchestrator, &template, input).await?;
        }
        all_ok
    };

    orchestrator.shutdown().await;
    if all_ok {
        println!("\nAll done. Images are in {}", output_dir.display());
    }
    Ok(all_ok)
}

/// Submits one prompt and follows it to a terminal state.
async fn generate_one(orchestrator: &Orchestrator, template: &JobRequest, prompt: &str) -> bool {
    let request = JobRequest {
        prompt: prompt.to_string(),
        ..template.clone()
    };
    let job_id = match orchestrator.submit(request) {
        Ok(job_id) => job_id,
        Err(OrchestratorError::InvalidInput(message)) => {
            eprintln!("Skipped: {message}");
            return false;
        }
        Err(err) => {
            eprintln!("Could not queue the prompt: {err}");
            return false;
        }
    };

    println!("\nPrompt: {prompt}");
    let finished = orchestrator
        .wait_for(&job_id, POLL_INTERVAL, |job| {
            println!("  [{}] {}", job.state, job.message);
            if job.state == JobState::Generating {
                if let Some(improved) = job.improved_prompt.as_deref() {
                    if improved != job.original_prompt {
                        println!("  Improved prompt: {improved}");
                    }
                }
            }
        })
        .await;

    match finished {
        Ok(job) if job.state == JobState::Completed => {
            for reference in &job.result {
                println!("  Saved: {reference}");
            }
            true
        }
        Ok(job) => {
            eprintln!(
                "  Generation failed: {}",
                job.error.as_deref().unwrap_or("unknown error")
            );
            false
        }
        Err(err) => {
            eprintln!("  Lost track of the job: {err}");
            false
        }
    }
}

async fn batch(orchestrator: &Orchestrator, template: &JobRequest, input: &Path) -> Result<bool> {
    let contents = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("file not found: {}", input.display()))?;
    let prompts: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    println!("Found {} prompts in {}", prompts.len(), input.display());

    let mut all_ok = true;
    for (index, prompt) in prompts.iter().enumerate() {
        println!("\n--- Prompt {}/{} ---", index + 1, prompts.len());
        all_ok &= generate_one(orchestrator, template, prompt).await;
    }
    Ok(all_ok)
}

async fn interactive(orchestrator: &Orchestrator, template: &JobRequest) -> Result<()> {
    println!("Interactive mode. Type 'exit' or 'q' to leave, 'help' for help.\n");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("prompt> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        match prompt.to_lowercase().as_str() {
            "" => continue,
            "exit" | "q" | "quit" => {
                println!("Bye!");
                break;
            }
            "help" | "?" => {
                println!("{INTERACTIVE_HELP}");
                continue;
            }
            _ => {}
        }
        generate_one(orchestrator, template, prompt).await;
    }
    Ok(())
}

async fn test_connection(settings: &Settings) -> bool {
    println!("Testing API connectivity...");
    let mut all_ok = true;

    println!("\n1. Stability AI:");
    if settings.stability.api_key.is_none() {
        println!("   key not found in the environment");
        all_ok = false;
    } else {
        match StabilityClient::new(settings.stability.clone()).check_connection().await {
            Ok(()) => println!("   connected"),
            Err(err) => {
                println!("   error: {err}");
                all_ok = false;
            }
        }
    }

    println!("\n2. GigaChat:");
    if settings.gigachat.authorization_key.is_none() {
        println!("   authorization key not found in the environment");
        all_ok = false;
    } else {
        let check = match GigaChatClient::new(settings.gigachat.clone()) {
            Ok(client) => client.check_connection().await,
            Err(err) => Err(err),
        };
        match check {
            Ok(count) => println!("   token acquired, {count} models available"),
            Err(err) => {
                println!("   error: {err}");
                all_ok = false;
            }
        }
    }

    all_ok
}
