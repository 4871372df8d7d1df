use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use cf_app::app::App;
use cf_app::config::AppConfig;
use cf_app::generator::Generator;
use cf_app::generator::db::job::JobRecord;
use cf_core::{JobForm, Resolution, VideoModel, VideoSize};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc::unbounded_channel;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "clipforge", version, about = "Submit and track remote video synthesis jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit a job and follow it until it finishes.
    #[command(subcommand)]
    Generate(GenerateCommand),
    /// Query a job once and update history.
    Status { job_id: String },
    /// Resume polling for every unfinished job in history.
    Resume,
    /// List the available models.
    Models,
    #[command(subcommand)]
    History(HistoryCommand),
}

#[derive(Debug, Subcommand)]
enum GenerateCommand {
    /// Transition between a first and a last frame.
    Kf2v {
        #[arg(long)]
        first_frame_url: String,
        #[arg(long)]
        last_frame_url: String,
        #[arg(long)]
        resolution: Option<Resolution>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Text only.
    T2v {
        #[arg(long)]
        size: Option<VideoSize>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Animate a single image.
    I2v {
        #[arg(long)]
        img_url: String,
        #[arg(long)]
        resolution: Option<Resolution>,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Debug, Args)]
struct CommonArgs {
    #[arg(long)]
    prompt: String,
    /// Send the prompt as written.
    #[arg(long)]
    no_prompt_extend: bool,
    #[arg(long)]
    seed: Option<String>,
    /// Return once submitted instead of waiting for the result.
    #[arg(long)]
    detach: bool,
}

impl GenerateCommand {
    fn common(&self) -> &CommonArgs {
        match self {
            Self::Kf2v { common, .. } | Self::T2v { common, .. } | Self::I2v { common, .. } => {
                common
            }
        }
    }

    fn form(&self) -> JobForm {
        let common = self.common();
        let model = match self {
            Self::Kf2v { .. } => VideoModel::KeyframeToVideo,
            Self::T2v { .. } => VideoModel::TextToVideo,
            Self::I2v { .. } => VideoModel::ImageToVideo,
        };

        let mut form = JobForm::new(model, common.prompt.clone());
        form.prompt_extend = !common.no_prompt_extend;
        form.seed = common.seed.clone();

        match self {
            Self::Kf2v {
                first_frame_url,
                last_frame_url,
                resolution,
                ..
            } => {
                form.first_frame_url = Some(first_frame_url.clone());
                form.last_frame_url = Some(last_frame_url.clone());
                form.resolution = *resolution;
            }
            Self::T2v { size, .. } => form.size = *size,
            Self::I2v {
                img_url, resolution, ..
            } => {
                form.img_url = Some(img_url.clone());
                form.resolution = *resolution;
            }
        }
        form
    }
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    List,
    Show { job_id: String },
    /// Print the stored request of a job, ready to edit and resubmit.
    Load { job_id: String },
    Delete { job_id: String },
    Export { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::Models = cli.command {
        print_models();
        return Ok(());
    }

    let config = AppConfig::load().context("loading configuration")?;
    let (tx, rx) = unbounded_channel();
    let generator = Generator::new(&config, tx).await?;
    let mut app = App::new(generator, rx);

    let result = run(&mut app, cli.command).await;
    app.generator.shutdown().await;
    result
}

async fn run(app: &mut App, command: Command) -> Result<()> {
    match command {
        Command::Generate(args) => {
            let record = app.generator.submit(&args.form()).await?;
            println!(
                "{} submitted {} ({}), typically ~{} min",
                record.status.icon(),
                record.job_id,
                record.model.name(),
                record.model.estimated_time_secs() / 60
            );
            if args.common().detach {
                app.generator.cancel(&record.job_id).await;
                println!("Track it later with `clipforge status {}`", record.job_id);
            } else {
                app.watch([record.job_id]).await?;
            }
        }
        Command::Status { job_id } => {
            let report = app.generator.check_status(&job_id).await?;
            println!("{}", cf_app::app::describe(&report.projection.event));
            if report.record.is_none() {
                println!("   (not in local history)");
            }
        }
        Command::Resume => {
            let resumed = app.generator.resume_active().await?;
            if resumed.is_empty() {
                println!("No unfinished jobs in history");
            } else {
                app.watch(resumed).await?;
            }
        }
        Command::Models => print_models(),
        Command::History(cmd) => run_history(app, cmd).await?,
    }
    Ok(())
}

async fn run_history(app: &mut App, command: HistoryCommand) -> Result<()> {
    match command {
        HistoryCommand::List => {
            let records = app.generator.list_history().await?;
            if records.is_empty() {
                println!("History is empty");
            }
            for record in &records {
                print_row(record);
            }
        }
        HistoryCommand::Show { job_id } => {
            let record = app.generator.get(&job_id).await?;
            print_details(&record);
        }
        HistoryCommand::Load { job_id } => {
            let loaded = app.generator.load_from_history(&job_id).await?;
            println!("{}", loaded.spec.to_document().to_pretty_json()?);
        }
        HistoryCommand::Delete { job_id } => {
            if !app.generator.delete(&job_id).await? {
                bail!("no job with id '{job_id}' in history");
            }
            println!("Deleted {job_id}");
        }
        HistoryCommand::Export { path } => {
            let count = app.generator.export_history(&path).await?;
            println!("Exported {count} entries to {}", path.display());
        }
    }
    Ok(())
}

fn print_models() {
    for model in VideoModel::all() {
        println!(
            "{:<20} {:<18} ~{:>2} min  {}",
            model.id(),
            model.name(),
            model.estimated_time_secs() / 60,
            model.description()
        );
    }
}

fn print_row(record: &JobRecord) {
    let prompt: String = record.prompt.chars().take(48).collect();
    println!(
        "{} {:<10} {:<36} {:<20} {} {}",
        record.status.icon(),
        record.status,
        record.job_id,
        record.model.id(),
        record.created_at.format("%Y-%m-%d %H:%M"),
        prompt
    );
}

fn print_details(record: &JobRecord) {
    println!("job:      {}", record.job_id);
    println!("model:    {} ({})", record.model.id(), record.model.name());
    println!("status:   {} {}", record.status.icon(), record.status);
    if let Some(remote) = &record.remote_status {
        println!("remote:   {remote} after {} checks", record.poll_attempt);
    }
    println!("created:  {}", record.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("updated:  {}", record.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("prompt:   {}", record.prompt);
    if let Some(url) = &record.video_url {
        println!("video:    {url}");
    }
    if let Some(expires_at) = record.expires_at {
        println!("expires:  {}", expires_at.format("%Y-%m-%d %H:%M UTC"));
    }
    if let Some(message) = &record.error_message {
        match &record.error_code {
            Some(code) => println!("error:    [{code}] {message}"),
            None => println!("error:    {message}"),
        }
    }
}
