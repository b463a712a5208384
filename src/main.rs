//! `qrsmith` command line.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use qrsmith::art::{ArtClient, ArtRequest, ArtStyle};
use qrsmith::assistant::{Assistant, AssistantAction};
use qrsmith::colors::{brand_colors, preset, validate_qr_colors, QrColors, Rgb, PRESET_NAMES};
use qrsmith::config::Settings;
use qrsmith::context::recommended_print_size_cm;
use qrsmith::format::{ContactCard, WifiConfig, WifiSecurity};
use qrsmith::generator::{save_batch, GeneratedQr, PreviewDebouncer, PreviewState, QrGenerator};
use qrsmith::optimize::{optimize_for_qr, EccLevel};
use qrsmith::render::{print_qr, save_png};
use qrsmith::security::sanitize_input;
use qrsmith::store::LocalStore;

#[derive(Parser)]
#[command(name = "qrsmith")]
#[command(about = "Smart QR code generator")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to ./qrsmith.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Local store for analytics and rate limits
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StyleArgs {
    /// Foreground color (#RGB or #RRGGBB)
    #[arg(long)]
    fg: Option<String>,

    /// Background color (#RGB or #RRGGBB)
    #[arg(long)]
    bg: Option<String>,

    /// Named color preset
    #[arg(long, conflicts_with_all = ["fg", "bg"])]
    preset: Option<String>,

    /// Fixed error correction level (L, M, Q, H)
    #[arg(long)]
    ecc: Option<EccLevel>,

    /// Image width in pixels
    #[arg(long)]
    width: Option<u32>,
}

#[derive(Args)]
struct OutputArgs {
    /// Write the PNG here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the SVG here
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Print the result as JSON instead of a terminal preview
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect, optimize and render free-form input
    Generate {
        /// Content to encode (words are joined with spaces)
        #[arg(required = true)]
        input: Vec<String>,

        /// Use brand colors for well-known sites
        #[arg(long)]
        brand: bool,

        #[command(flatten)]
        style: StyleArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Build a WiFi network code
    Wifi {
        #[arg(long)]
        ssid: String,

        #[arg(long, default_value = "")]
        password: String,

        /// WPA, WEP or nopass
        #[arg(long, default_value = "WPA")]
        security: WifiSecurity,

        #[arg(long)]
        hidden: bool,

        #[command(flatten)]
        style: StyleArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Build a vCard contact code
    Contact {
        #[arg(long, default_value = "")]
        first: String,
        #[arg(long, default_value = "")]
        last: String,
        #[arg(long)]
        org: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        website: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        note: Option<String>,

        #[command(flatten)]
        style: StyleArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Generate one code per line of a file ("-" reads stdin)
    Batch {
        file: PathBuf,

        /// Directory for qr_<n>.png files
        #[arg(long, default_value = "generated")]
        out_dir: PathBuf,

        #[command(flatten)]
        style: StyleArgs,
    },

    /// Show how input would be classified and optimized
    Detect {
        #[arg(required = true)]
        input: Vec<String>,
    },

    /// Check a color pair, or list presets and brand colors
    Colors {
        foreground: Option<String>,
        background: Option<String>,

        /// Look up brand colors for a URL
        #[arg(long)]
        brand: Option<String>,
    },

    /// Request an AI-styled rendition of the content
    Art {
        content: String,

        #[arg(long, default_value = "artistic")]
        style: ArtStyle,

        /// Save a returned data: URL image here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Chat with the assistant (one message per line on stdin)
    Chat,

    /// Live preview: re-renders after typing pauses (one edit per line on stdin)
    Preview,

    /// Show local usage analytics
    Stats,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "qrsmith=info",
        1 => "qrsmith=debug",
        _ => "qrsmith=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    let store_path = cli.store.clone().unwrap_or_else(|| settings.store.path.clone());
    let store = LocalStore::load(&store_path)
        .with_context(|| format!("failed to open store {}", store_path.display()))?;
    let mut generator =
        QrGenerator::with_store(settings.render, settings.rate_limit_rules(), store);

    match cli.command {
        Commands::Generate {
            input,
            brand,
            style,
            output,
        } => {
            let input = input.join(" ");
            apply_style(&mut generator, &style)?;
            if brand && style.fg.is_none() && style.preset.is_none() {
                if let Some(colors) = brand_colors(&input) {
                    generator.set_colors(colors);
                }
            }
            let qr = generator.generate(&input)?;
            emit(&generator, &qr, &output)?;
        }
        Commands::Wifi {
            ssid,
            password,
            security,
            hidden,
            style,
            output,
        } => {
            apply_style(&mut generator, &style)?;
            let config = WifiConfig {
                hidden,
                ..WifiConfig::new(ssid, password, security)
            };
            let qr = generator.generate_wifi(&config)?;
            emit(&generator, &qr, &output)?;
        }
        Commands::Contact {
            first,
            last,
            org,
            title,
            phone,
            email,
            website,
            address,
            note,
            style,
            output,
        } => {
            apply_style(&mut generator, &style)?;
            let card = ContactCard {
                first_name: first,
                last_name: last,
                organization: org,
                title,
                phone,
                email,
                website,
                address,
                note,
            };
            let qr = generator.generate_contact(&card)?;
            emit(&generator, &qr, &output)?;
        }
        Commands::Batch {
            file,
            out_dir,
            style,
        } => {
            apply_style(&mut generator, &style)?;
            cmd_batch(&mut generator, &file, &out_dir).await?;
        }
        Commands::Detect { input } => cmd_detect(&generator, &input.join(" ")),
        Commands::Colors {
            foreground,
            background,
            brand,
        } => cmd_colors(foreground, background, brand)?,
        Commands::Art {
            content,
            style,
            output,
        } => cmd_art(&settings, &mut generator, content, style, output).await?,
        Commands::Chat => cmd_chat(&mut generator).await?,
        Commands::Preview => cmd_preview(&settings, &generator).await?,
        Commands::Stats => cmd_stats(&mut generator),
    }

    generator.persist().context("failed to save local store")?;
    Ok(())
}

fn apply_style(generator: &mut QrGenerator, style: &StyleArgs) -> Result<()> {
    if let Some(name) = &style.preset {
        let Some(colors) = preset(name) else {
            bail!("unknown preset {name}; choose one of {}", PRESET_NAMES.join(", "));
        };
        generator.set_colors(colors);
    } else if style.fg.is_some() || style.bg.is_some() {
        let current = generator.options().colors;
        let colors = QrColors {
            foreground: style
                .fg
                .as_deref()
                .map(Rgb::from_hex)
                .transpose()?
                .unwrap_or(current.foreground),
            background: style
                .bg
                .as_deref()
                .map(Rgb::from_hex)
                .transpose()?
                .unwrap_or(current.background),
        };
        generator.set_colors(colors);
    }
    if style.ecc.is_some() {
        generator.set_ecc(style.ecc);
    }
    if let Some(width) = style.width {
        let mut options = *generator.options();
        options.width = width;
        generator.set_options(options);
    }
    Ok(())
}

fn emit(generator: &QrGenerator, qr: &GeneratedQr, output: &OutputArgs) -> Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(qr)?);
    } else {
        print_qr(&qr.matrix);
        println!("Type:     {}", qr.content_type.label());
        println!("Content:  {}", qr.content);
        println!(
            "Symbol:   version {}, {} modules, ECC {}",
            qr.matrix.version(),
            qr.modules,
            qr.ecc
        );
        println!(
            "Contrast: {}:1 ({})",
            qr.color_check.contrast_ratio, qr.color_check.accessibility
        );
        println!(
            "Print at least {:.1} cm wide",
            recommended_print_size_cm(qr.modules as usize)
        );
        for warning in &qr.color_check.warnings {
            println!("warning: {warning}");
        }
        for hint in &qr.optimization.suggestions {
            println!("hint: {hint}");
        }
        for suggestion in generator.suggestions(qr.content_type, qr.content.len()) {
            println!("tip: {}", suggestion.message);
        }
    }

    if let Some(path) = &output.output {
        let saved = save_png(&qr.image, path.parent(), path.file_name().and_then(|n| n.to_str()))?;
        eprintln!("Saved {}", saved.display());
    }
    if let Some(path) = &output.svg {
        std::fs::write(path, &qr.svg)
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("Saved {}", path.display());
    }
    Ok(())
}

async fn cmd_batch(generator: &mut QrGenerator, file: &Path, out_dir: &Path) -> Result<()> {
    let text = if file == Path::new("-") {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut text = String::new();
        while let Some(line) = lines.next_line().await? {
            text.push_str(&line);
            text.push('\n');
        }
        text
    } else {
        tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?
    };
    let lines: Vec<&str> = text.lines().collect();

    let report = generator.generate_batch(&lines)?;
    let saved = save_batch(&report, out_dir)?;
    println!(
        "Generated {} of {} codes into {}",
        saved.len(),
        report.total(),
        out_dir.display()
    );
    for failure in &report.failures {
        println!("  #{} {:?}: {}", failure.index, failure.input, failure.error);
    }
    Ok(())
}

fn cmd_detect(generator: &QrGenerator, input: &str) {
    let opt = optimize_for_qr(&sanitize_input(input));
    println!("Type:      {} ({})", opt.content_type.label(), opt.content_type);
    println!("Optimized: {}", opt.content);
    println!(
        "Length:    {} -> {} bytes ({} saved)",
        opt.original_length,
        opt.optimized_length,
        opt.bytes_saved()
    );
    println!("ECC:       {}", opt.ecc);
    for hint in &opt.suggestions {
        println!("hint: {hint}");
    }
    for suggestion in generator.suggestions(opt.content_type, opt.optimized_length) {
        println!("tip: {}", suggestion.message);
    }
}

fn cmd_colors(
    foreground: Option<String>,
    background: Option<String>,
    brand: Option<String>,
) -> Result<()> {
    if let Some(url) = brand {
        match brand_colors(&url) {
            Some(colors) => println!("{} on {}", colors.foreground, colors.background),
            None => println!("No brand palette for {url}"),
        }
        return Ok(());
    }

    let Some(foreground) = foreground else {
        for name in PRESET_NAMES {
            if let Some(colors) = preset(name) {
                println!("{name:<10} {} on {}", colors.foreground, colors.background);
            }
        }
        return Ok(());
    };
    let background = background.unwrap_or_else(|| "#FFFFFF".to_string());
    let check = validate_qr_colors(&foreground, &background)?;
    println!(
        "Contrast {}:1, {}, {}",
        check.contrast_ratio,
        check.accessibility,
        if check.is_valid { "scannable" } else { "not scannable" }
    );
    for warning in &check.warnings {
        println!("warning: {warning}");
    }
    Ok(())
}

async fn cmd_art(
    settings: &Settings,
    generator: &mut QrGenerator,
    content: String,
    style: ArtStyle,
    output: Option<PathBuf>,
) -> Result<()> {
    let Some(endpoint) = settings.art.endpoint.as_deref() else {
        bail!("no art endpoint configured; set QRSMITH_ART_URL or [art].endpoint");
    };
    generator.limiter_mut().check("ai_art", Utc::now())?;

    let client = ArtClient::new(endpoint, settings.art.api_key.as_deref(), settings.art.timeout())?;
    let response = client.generate(&ArtRequest::new(content, style)).await?;

    match (&output, response.image_url.strip_prefix("data:image/png;base64,")) {
        (Some(path), Some(encoded)) => {
            let bytes = general_purpose::STANDARD
                .decode(encoded)
                .context("art service returned an invalid data URL")?;
            std::fs::write(path, bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Saved {}", path.display());
        }
        _ => println!("{}", response.image_url),
    }
    Ok(())
}

async fn cmd_chat(generator: &mut QrGenerator) -> Result<()> {
    let mut assistant = Assistant::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print!("> ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        if matches!(line.trim(), "quit" | "exit") {
            break;
        }
        if let Err(e) = generator.limiter_mut().check("assistant", Utc::now()) {
            println!("{e}");
        } else {
            let reply = assistant.reply(&line);
            println!("{}", reply.text);
            match reply.action {
                Some(AssistantAction::Generate { content, .. }) => {
                    match generator.generate(&content) {
                        Ok(qr) => print_qr(&qr.matrix),
                        Err(e) => println!("{e}"),
                    }
                }
                Some(AssistantAction::SetColors(colors)) => generator.set_colors(colors),
                Some(AssistantAction::ShowHelp) | None => {}
            }
        }
        print!("> ");
        std::io::stdout().flush()?;
    }
    println!();
    Ok(())
}

async fn cmd_preview(settings: &Settings, generator: &QrGenerator) -> Result<()> {
    let mut preview = PreviewDebouncer::new(*generator.options(), settings.preview.debounce());
    let mut rx = preview.subscribe();
    let printer = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            match state {
                PreviewState::Ready(qr) => {
                    print_qr(&qr.matrix);
                    println!("{}: {}", qr.content_type.label(), qr.content);
                }
                PreviewState::Failed(message) => println!("! {message}"),
                PreviewState::Idle => {}
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        preview.schedule(line);
    }
    while preview.is_pending() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    drop(preview);
    printer.await?;
    Ok(())
}

fn cmd_stats(generator: &mut QrGenerator) {
    let analytics = generator.analytics();
    println!("Codes generated: {}", analytics.total_generations);
    if analytics.total_generations > 0 {
        println!("Average length:  {:.1} bytes", analytics.average_length);
    }
    if let Some(favorite) = analytics.most_used_type() {
        println!("Most used:       {}", favorite.label());
    }
    if let Some(hour) = analytics.peak_hour() {
        println!("Busiest hour:    {hour:02}:00");
    }
    for (content_type, count) in &analytics.content_types {
        println!("  {:<14} {count}", content_type.label());
    }

    let now = Utc::now();
    println!("Remaining requests:");
    for feature in ["ai_art", "assistant", "batch", "generate"] {
        if let Some(left) = generator.limiter_mut().remaining(feature, now) {
            println!("  {feature:<10} {left}");
        }
    }
}
