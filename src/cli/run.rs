//! Subcommand implementations.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use templet::{CompileSummary, CompilerConfig, Error, TemplateCompiler, log};

use super::{Cli, Commands};

/// Load `templet.toml` if present and apply command-line overrides.
pub fn load_config(cli: &Cli) -> Result<CompilerConfig> {
    let mut config = if cli.config.is_file() {
        CompilerConfig::from_path(&cli.config)
            .with_context(|| format!("failed to load {}", cli.config.display()))?
    } else {
        CompilerConfig::default()
    };

    if let Some(output) = &cli.output {
        config.set_option("output_dir", output.to_string_lossy().into_owned())?;
    }
    if let Commands::Compile {
        locales: Some(locales),
        ..
    } = &cli.command
    {
        config.set_option("locales", locales.clone())?;
    }
    if matches!(cli.command, Commands::Watch { .. }) {
        config.allow_dynamic_recompile = true;
    }
    Ok(config)
}

pub async fn run(cli: &Cli, config: CompilerConfig) -> Result<()> {
    match &cli.command {
        Commands::Compile { input, .. } => {
            let summary = compile(&TemplateCompiler::new(config), input).await?;
            report(&summary);
            Ok(())
        }
        Commands::Render {
            input,
            template,
            data,
            ij,
            locale,
        } => {
            let compiler = TemplateCompiler::new(config);
            compile(&compiler, input).await?;

            let data = parse_json("--data", data.as_deref())?;
            let ij = parse_json("--ij", ij.as_deref())?;
            let output = compiler.render(template, &data, &ij, locale.as_deref())?;
            println!("{output}");
            Ok(())
        }
        Commands::Watch { input } => watch(TemplateCompiler::new(config), input).await,
    }
}

async fn compile(compiler: &TemplateCompiler, input: &Path) -> Result<CompileSummary> {
    compiler
        .compile_templates(input)
        .await
        .with_context(|| format!("failed to compile templates in {}", input.display()))
}

fn report(summary: &CompileSummary) {
    match &summary.output_dir {
        Some(dir) if summary.reused => {
            log!("compile"; "reused {} precompiled templates in {}", summary.files, dir.display());
        }
        Some(dir) => log!("compile"; "compiled {} templates into {}", summary.files, dir.display()),
        None => log!("compile"; "no templates found"),
    }
}

/// Compile once, then keep recompiling changed sources until Ctrl+C.
async fn watch(compiler: TemplateCompiler, input: &Path) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))?;

    // keep watching after a failed initial compile
    if let Err(err) = compiler.compile_templates(input).await
        && !reported_by_listener(&err)
    {
        log!("error"; "{:#}", anyhow::Error::from(err));
    }
    log!("watch"; "watching {} for changes", input.display());

    tokio::task::spawn_blocking(move || rx.recv()).await??;
    log!("watch"; "shutting down...");
    Ok(())
}

/// Whether the status listener already showed `err`. Discovery and watcher
/// setup fail before the listener exists.
fn reported_by_listener(err: &Error) -> bool {
    !matches!(err, Error::Discover(..) | Error::Watch(_))
}

fn parse_json(flag: &str, raw: Option<&str>) -> Result<Value> {
    match raw {
        Some(raw) => serde_json::from_str(raw).with_context(|| format!("invalid JSON in {flag}")),
        None => Ok(Value::Object(Default::default())),
    }
}
