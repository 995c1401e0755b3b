use std::{path::Path, pin::pin, sync::Arc};

use anyhow::Context;
use args::{Args, Command, ConvertArgs, ReplayArgs};
use clap::Parser;
use config::Config;
use futures::{StreamExt, stream};
use llm::{
    AdapterOptions, AdapterRegistry, ConverterFactory, ConverterOptions, MokaReasoningCache, ReasoningCache,
    unified::{ProviderKind, UnifiedStreamEvent},
};
use tokio::io::AsyncWriteExt;

mod args;
mod logger;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(&args.log_filter)?;

    let config = match &args.config {
        Some(path) => {
            Config::load(path).with_context(|| format!("Failed to load configuration from {}", path.display()))?
        }
        None => Config::default(),
    };

    let cache = MokaReasoningCache::from_config(&config.cache);

    match args.command {
        Command::Convert(convert_args) => convert(&config, cache, convert_args).await,
        Command::Replay(replay_args) => replay(&config, cache, replay_args).await,
        Command::Formats => {
            for format in AdapterRegistry::new().supported_formats() {
                println!("{format}");
            }

            Ok(())
        }
    }
}

async fn convert(config: &Config, cache: Option<Arc<dyn ReasoningCache>>, args: ConvertArgs) -> anyhow::Result<()> {
    let mut options = ConverterOptions::from(&config.conversion);

    if let Some(cache) = cache {
        options = options.with_cache(cache);
    }

    let converter = ConverterFactory::create(&args.from, options)?;
    let body = read(&args.request).await?;

    let Ok(provider) = args.provider.parse::<ProviderKind>();
    let converted = converter.convert_str(&body, &provider)?;

    log::debug!(
        "Converted {} request into {} messages for provider {provider}",
        converter.format(),
        converted.messages.len()
    );

    for violation in converted.check_tool_calls() {
        log::warn!(
            "Tool call '{}' to '{}' has invalid arguments: {}",
            violation.tool_call_id,
            violation.tool_name,
            violation.reason
        );
    }

    println!("{}", serde_json::to_string_pretty(&converted)?);

    Ok(())
}

async fn replay(config: &Config, cache: Option<Arc<dyn ReasoningCache>>, args: ReplayArgs) -> anyhow::Result<()> {
    let format = args.to.unwrap_or_else(|| config.streaming.default_output.clone());
    let model = args.model.unwrap_or_else(|| config.streaming.default_model.clone());

    let mut options = AdapterOptions::new(model);

    if let Some(cache) = cache {
        options = options.with_cache(cache);
    }

    let events = parse_events(&read(&args.events).await?)?;
    log::debug!("Replaying {} stream events as {format}", events.len());

    let registry = AdapterRegistry::new();

    if args.aggregate {
        let adapter = registry.create_adapter(&format, options)?;
        let response = llm::aggregate(adapter, stream::iter(events)).await?;

        println!("{}", serde_json::to_string_pretty(&response)?);

        return Ok(());
    }

    let mut frames = pin!(registry.sse_stream(&format, options, stream::iter(events))?);
    let mut stdout = tokio::io::stdout();

    while let Some(frame) = frames.next().await {
        let frame = frame.inspect_err(|e| log::error!("Stream aborted: {e}"))?;
        stdout.write_all(frame.as_bytes()).await?;
    }

    stdout.flush().await?;

    Ok(())
}

async fn read(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// One neutral event per line. Blank lines are skipped.
fn parse_events(content: &str) -> anyhow::Result<Vec<UnifiedStreamEvent>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid stream event on line {}", number + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn events_are_read_line_by_line() {
        let events = parse_events(indoc! {r#"
            {"type": "start"}

            {"type": "text-delta", "id": "t1", "delta": "Hi"}
            {"type": "finish", "finishReason": "stop"}
        "#})
        .unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], UnifiedStreamEvent::Unknown);
    }

    #[test]
    fn invalid_lines_are_reported() {
        let error = parse_events("{\"type\": \"finish\", \"finishReason\": \"stop\"}\nnot json\n").unwrap_err();

        assert_eq!(error.to_string(), "Invalid stream event on line 2");
    }
}
