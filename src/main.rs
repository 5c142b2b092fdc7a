use anyhow::Result;
use clap::Parser;
use console::style;
use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use text_to_video::cli::{Cli, Commands};
use text_to_video::config::Config;
use text_to_video::media::VoiceTable;
use text_to_video::{output, utils, RenderPipeline, ScriptParser, VideoError};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_json);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path).await?,
        None => Config::load().await?,
    };

    match cli.command {
        Commands::Render {
            input,
            output,
            jobs,
            seed,
            keep_leading_text,
            report,
            format,
        } => {
            // Check for required external dependencies (non-fatal)
            let missing_deps = utils::check_dependencies().await;
            if !missing_deps.is_empty() {
                eprintln!("{}", style("⚠️  Dependency check warnings:").yellow());
                for dep in missing_deps {
                    eprintln!("   • {}", dep);
                }
                eprintln!("   (Continuing anyway - tools may be available)");
            }

            if let Some(jobs) = jobs {
                config.app.max_concurrent_segments = jobs.max(1);
            }
            if seed.is_some() {
                config.app.seed = seed;
            }
            if keep_leading_text {
                config.parser.keep_leading_text = true;
            }

            let script = read_script(&input)?;
            let mut parsed = ScriptParser::new(config.parser.clone())?.parse(&script);
            let voices = VoiceTable::new(config.aws.polly.voices.clone());
            parsed.flag_unknown_voices(|voice| voices.contains(voice));
            for diagnostic in &parsed.diagnostics {
                tracing::warn!("{}", diagnostic);
            }

            if parsed.segments.is_empty() {
                return Err(VideoError::NoRenderableSegments.into());
            }

            let output_path =
                output.unwrap_or_else(|| utils::default_output_path(&input, &config.video.output_dir));

            tracing::info!("Starting render of {} into {}", input.display(), output_path.display());

            let pipeline = RenderPipeline::new(config).await?.with_progress(!cli.quiet);
            let result = pipeline.render(&parsed.segments, &output_path).await?;

            output::print_report(&result, &format)?;

            if let Some(path) = report {
                output::save_report(&result, &path, &format).await?;
                println!("Report saved to: {}", path.display());
            }
        }
        Commands::Parse {
            input,
            output,
            format,
            keep_leading_text,
        } => {
            if keep_leading_text {
                config.parser.keep_leading_text = true;
            }

            let script = read_script(&input)?;
            let mut parsed = ScriptParser::new(config.parser.clone())?.parse(&script);
            let voices = VoiceTable::new(config.aws.polly.voices.clone());
            parsed.flag_unknown_voices(|voice| voices.contains(voice));

            match output {
                Some(path) => {
                    output::save_script(&parsed, &path, &format).await?;
                    println!("Segments saved to: {}", path.display());
                }
                None => {
                    output::print_script(&parsed, &format)?;
                }
            }
        }
        Commands::Voices => {
            let voices = VoiceTable::new(config.aws.polly.voices.clone());
            println!("{}", style("Available voices:").bold());
            for (id, provider) in voices.entries() {
                println!("  • {:<8} {}", id, provider);
            }
            if let Some(default) = voices.default_voice() {
                println!("Unknown or untagged voices use {}", style(default).cyan());
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::config_path()?,
                };
                println!("Configuration file: {}", path.display());
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "text_to_video=debug"
    } else {
        "text_to_video=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so parse output can be piped
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn read_script(path: &Path) -> Result<String> {
    utils::check_file_accessible(path)?;
    Ok(fs_err::read_to_string(path)?)
}
