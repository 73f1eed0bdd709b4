//! CLI for editfeed - scroll through AI edits of a photo from the terminal.

use clap::{Args, Parser, Subcommand, ValueEnum};
use editfeed::{
    intake, EditSource, FeedController, FeedItem, GeminiModel, GeminiProvider, ItemState,
    PromptSource,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "editfeed")]
#[command(about = "Generate an endless feed of AI edits of one photo (Gemini)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    gemini: GeminiArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the feed for a photo, writing each edit to disk
    Feed(FeedArgs),

    /// Print a fresh list of edit instructions
    Prompts,

    /// Apply a single instruction to a photo
    Edit(EditArgs),

    /// Verify the API key and model are reachable
    Check,
}

#[derive(Args)]
struct GeminiArgs {
    /// Image model used for edits
    #[arg(long, value_enum, global = true, default_value = "nano-banana")]
    model: ModelArg,

    /// Number of instructions to request
    #[arg(long, global = true, default_value_t = 20)]
    prompt_count: usize,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value_t = 120)]
    timeout: u64,
}

#[derive(Args)]
struct FeedArgs {
    /// Source photo
    image: PathBuf,

    /// Directory for generated images
    #[arg(short, long, default_value = "feed")]
    out_dir: PathBuf,

    /// Stop after this many edits
    #[arg(short, long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct EditArgs {
    /// Source photo
    image: PathBuf,

    /// Edit instruction, e.g. "add a tiny hat"
    instruction: String,

    /// Output file path
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    NanoBanana,
    NanoBananaPro,
}

impl From<ModelArg> for GeminiModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::NanoBanana => GeminiModel::NanoBanana,
            ModelArg::NanoBananaPro => GeminiModel::NanoBananaPro,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let provider = build_provider(&cli.gemini)?;

    match cli.command {
        Commands::Feed(args) => run_feed(provider, args, cli.json).await?,
        Commands::Prompts => list_prompts(&provider, cli.json).await?,
        Commands::Edit(args) => run_edit(&provider, args, cli.json).await?,
        Commands::Check => {
            provider.health_check().await?;
            if cli.json {
                println!("{}", serde_json::json!({ "ok": true, "model": provider.model().as_str() }));
            } else {
                println!("Gemini reachable ({})", provider.model().as_str());
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "editfeed=debug" } else { "editfeed=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_provider(args: &GeminiArgs) -> anyhow::Result<GeminiProvider> {
    if args.prompt_count == 0 {
        anyhow::bail!("--prompt-count must be at least 1");
    }
    Ok(GeminiProvider::builder()
        .model(args.model.into())
        .prompt_count(args.prompt_count)
        .timeout(Duration::from_secs(args.timeout))
        .build()?)
}

async fn run_feed(provider: GeminiProvider, args: FeedArgs, json_output: bool) -> anyhow::Result<()> {
    if args.limit == Some(0) {
        anyhow::bail!("--limit must be at least 1");
    }

    let source = intake::from_path(&args.image)?;
    std::fs::create_dir_all(&args.out_dir)?;

    let feed = FeedController::with_source(Arc::new(provider));
    if let Err(e) = feed.accept_image(source).await {
        let banner = feed.error().unwrap_or_else(|| e.to_string());
        anyhow::bail!("{banner} ({e})");
    }

    if let Some(original) = feed.item(0) {
        report_item(&original, &args.out_dir, json_output)?;
    }

    // Headless presentation: the newest slide is always "on screen".
    let mut generated = 0;
    while let Some(index) = feed.next_index() {
        if args.limit.is_some_and(|limit| generated >= limit) {
            break;
        }
        feed.request_next(index).await?;
        generated += 1;

        if let Some(item) = feed.item(index) {
            report_item(&item, &args.out_dir, json_output)?;
        }
    }

    if json_output {
        let summary = serde_json::json!({
            "type": "summary",
            "generated": generated,
            "instructions": feed.instructions().len(),
            "has_more": feed.has_more(),
        });
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!(
            "\n{} of {} edits generated in {}",
            generated,
            feed.instructions().len(),
            args.out_dir.display()
        );
    }

    Ok(())
}

fn report_item(item: &FeedItem, out_dir: &Path, json_output: bool) -> anyhow::Result<()> {
    let saved = match (item.state(), item.payload()) {
        (ItemState::Ready, Some(payload)) => {
            let ext = payload.format().unwrap_or_default().extension();
            let path = out_dir.join(item_file_name(item.index(), ext));
            payload.save(&path)?;
            Some(path)
        }
        _ => None,
    };

    if json_output {
        let line = serde_json::json!({
            "type": "item",
            "index": item.index(),
            "caption": item.caption(),
            "state": item.state(),
            "output": saved.as_ref().map(|p| p.display().to_string()),
            "failure_reason": item.failure_reason(),
        });
        println!("{}", serde_json::to_string(&line)?);
    } else {
        match (&saved, item.failure_reason()) {
            (Some(path), _) => println!("[{:>2}] ✓ {} -> {}", item.index(), item.caption(), path.display()),
            (None, Some(reason)) => println!("[{:>2}] ✗ {} ({})", item.index(), item.caption(), reason),
            (None, None) => println!("[{:>2}] … {}", item.index(), item.caption()),
        }
    }

    Ok(())
}

fn item_file_name(index: usize, ext: &str) -> String {
    format!("{}.{}", index, ext)
}

async fn list_prompts(provider: &GeminiProvider, json_output: bool) -> anyhow::Result<()> {
    let instructions = provider.instructions().await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&instructions)?);
    } else {
        for (i, instruction) in instructions.iter().enumerate() {
            println!("{:>2}. {}", i + 1, instruction);
        }
    }

    Ok(())
}

async fn run_edit(provider: &GeminiProvider, args: EditArgs, json_output: bool) -> anyhow::Result<()> {
    let source = intake::from_path(&args.image)?;
    let outcome = provider.edit(&source, &args.instruction).await?;

    let Some(image) = outcome.image else {
        anyhow::bail!(
            "{}",
            outcome
                .text
                .unwrap_or_else(|| editfeed::feed::GENERIC_FAILURE.to_string())
        );
    };
    image.save(&args.output)?;

    if json_output {
        let result = serde_json::json!({
            "type": "image",
            "success": true,
            "output": args.output.display().to_string(),
            "size_bytes": image.decoded_len(),
            "mime_type": image.mime_type,
            "text": outcome.text,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Edited image: {} ({} bytes)",
            args.output.display(),
            image.decoded_len()
        );
        if let Some(text) = outcome.text {
            println!("Model says: {}", text);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_file_name() {
        assert_eq!(item_file_name(0, "png"), "0.png");
        assert_eq!(item_file_name(7, "jpg"), "7.jpg");
        assert_eq!(item_file_name(1234, "webp"), "1234.webp");
    }
}
