use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "switchboard", version, about = "Translates LLM requests and streams between API formats")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "SWITCHBOARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `llm=debug`.
    #[arg(long, env = "SWITCHBOARD_LOG", default_value = "info")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Converts a request body into neutral messages, tools and options.
    Convert(ConvertArgs),
    /// Replays neutral stream events (one JSON object per line) as SSE frames.
    Replay(ReplayArgs),
    /// Lists the registered output formats.
    Formats,
}

#[derive(Debug, clap::Args)]
pub struct ConvertArgs {
    /// Input format of the request body.
    #[arg(long, value_name = "FORMAT")]
    pub from: String,

    /// Model provider the request is routed to.
    #[arg(long, default_value = "anthropic")]
    pub provider: String,

    /// JSON request body.
    pub request: PathBuf,
}

#[derive(Debug, clap::Args)]
pub struct ReplayArgs {
    /// Output format. Defaults to `streaming.default_output`.
    #[arg(long, value_name = "FORMAT")]
    pub to: Option<String>,

    /// Model id reported in the output. Defaults to `streaming.default_model`.
    #[arg(long)]
    pub model: Option<String>,

    /// Print the complete response instead of SSE frames.
    #[arg(long)]
    pub aggregate: bool,

    /// Neutral stream events, one JSON object per line.
    pub events: PathBuf,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn replay_arguments() {
        let args = Args::try_parse_from(["switchboard", "replay", "--to", "openai", "--aggregate", "events.jsonl"])
            .unwrap();

        let Command::Replay(replay) = args.command else {
            unreachable!("replay subcommand");
        };

        assert_eq!(replay.to.as_deref(), Some("openai"));
        assert!(replay.aggregate);
        assert_eq!(replay.events, PathBuf::from("events.jsonl"));
        assert_eq!(args.log_filter, "info");
    }

    #[test]
    fn convert_requires_a_format() {
        assert!(Args::try_parse_from(["switchboard", "convert", "request.json"]).is_err());
    }
}
