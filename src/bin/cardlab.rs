use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use cardlab::{
    AppConfig, BatchOrchestrator, Card, CardRenderer, CardSurface, Color, HttpInpaintClient,
    JsonFileState, LayerKind, ResultStore, SingleCardOrchestrator, SingleOutcome, Slot,
    StatePersistence,
};

#[derive(Parser, Debug)]
#[command(name = "cardlab", version)]
struct Cli {
    /// Directory the config and result records live in.
    #[arg(long, default_value = "cardlab-state")]
    state_dir: PathBuf,

    /// Base URL of the inpainting service.
    #[arg(long, default_value = "http://localhost:8000")]
    service_url: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate artwork for a single card and store the result.
    Card(CardArgs),
    /// Generate artwork for every slot without a cached result.
    Batch,
    /// Render one layer of a card to a PNG, without calling the service.
    Render(RenderArgs),
    /// Report how much of the grid has artwork.
    Status,
}

#[derive(Parser, Debug, Clone)]
struct CardArgs {
    /// Card color (red, green or blue).
    #[arg(long)]
    color: Color,

    /// Card number (1..=10).
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=10))]
    number: u8,
}

#[derive(Parser, Debug, Clone)]
struct RenderArgs {
    #[arg(long)]
    color: Color,

    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=10))]
    number: u8,

    /// Which layer to render.
    #[arg(long, default_value = "full")]
    layer: LayerKind,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let persist: Arc<dyn StatePersistence> = Arc::new(JsonFileState::new(&cli.state_dir));
    let config = AppConfig::load_or_default(persist.as_ref())?;

    match &cli.cmd {
        Command::Card(args) => cmd_card(&cli, &config, persist, args.clone()).await,
        Command::Batch => cmd_batch(&cli, &config, persist).await,
        Command::Render(args) => cmd_render(&config, persist, args.clone()),
        Command::Status => cmd_status(&config, persist),
    }
}

async fn cmd_card(
    cli: &Cli,
    config: &AppConfig,
    persist: Arc<dyn StatePersistence>,
    args: CardArgs,
) -> anyhow::Result<()> {
    let mut store = ResultStore::load(persist)?;
    let client = HttpInpaintClient::new(&cli.service_url);
    let mut renderer = CardRenderer::new(config.mask_polarity);

    let slot = Slot::new(args.color, args.number);
    let outcome = SingleCardOrchestrator::new(&mut store, &client, config, &mut renderer)
        .generate(slot)
        .await?;

    match outcome {
        SingleOutcome::Completed => eprintln!("generated {slot}"),
        SingleOutcome::Skipped => eprintln!("skipped {slot}: render layers were incomplete"),
    }
    Ok(())
}

async fn cmd_batch(
    cli: &Cli,
    config: &AppConfig,
    persist: Arc<dyn StatePersistence>,
) -> anyhow::Result<()> {
    let mut store = ResultStore::load(persist)?;
    let client = HttpInpaintClient::new(&cli.service_url);
    let mut renderer = CardRenderer::new(config.mask_polarity);

    let report = BatchOrchestrator::new(&mut store, &client, config, &mut renderer)
        .generate_missing()
        .await?;

    eprintln!(
        "generated {} card(s); grid now {}/{} complete",
        report.requested,
        report.completed,
        config.slots().count()
    );
    Ok(())
}

fn cmd_render(
    config: &AppConfig,
    persist: Arc<dyn StatePersistence>,
    args: RenderArgs,
) -> anyhow::Result<()> {
    let store = ResultStore::load(persist)?;
    let card = store
        .get(args.color, args.number)
        .cloned()
        .unwrap_or_else(|| Card::new(args.color, args.number));

    let mut renderer = CardRenderer::new(config.mask_polarity);
    let mut surface = CardSurface::acquire(config.render_width)?;
    let uri = renderer.render(args.layer, &card, &config.style, &mut surface)?;
    let decoded = cardlab::codec::decode_data_uri(&uri)?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &decoded.rgba8_premul,
        decoded.width,
        decoded.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_status(config: &AppConfig, persist: Arc<dyn StatePersistence>) -> anyhow::Result<()> {
    let store = ResultStore::load(persist)?;

    for &color in &config.palette {
        let done = config
            .numbers()
            .filter(|&n| store.is_complete(Slot::new(color, n)))
            .count();
        eprintln!("{color}: {done}/{} complete", config.numbers().count());
    }
    eprintln!(
        "total: {}/{} complete",
        store.completed_count(),
        config.slots().count()
    );
    Ok(())
}
