use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use glob::glob;
use pcapflow_core::{
    DEFAULT_BURST_COUNT, DEFAULT_STREAM_ADDR, ExportError, ExportFormat, ExportSink, Pipeline,
    PipelineError, RunSummary, SourceError,
};
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("PCAPFLOW_BUILD_COMMIT"),
    ", ",
    env!("PCAPFLOW_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "pcapflow")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Turn captured packets into normalized records: export them from capture files or stream them live.",
    long_about = None,
    after_help = "Examples:\n  pcapflow extract capture.pcapng\n  pcapflow extract capture.pcap --format csv --output-dir out\n  pcapflow stream --interface eth0 --listen 127.0.0.1:8765"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export every packet of a capture file as pcap_data.json or pcap_data.csv.
    #[command(
        after_help = "Examples:\n  pcapflow extract capture.pcapng\n  pcapflow extract 'captures/*.pcap' --format csv"
    )]
    Extract {
        /// Path to a .pcap or .pcapng file (a pattern matching exactly one file is accepted)
        input: PathBuf,

        /// Export format
        #[arg(short = 'f', long, value_enum, default_value_t = FormatArg::Json)]
        format: FormatArg,

        /// Directory that receives pcap_data.<format>
        #[arg(short = 'o', long, default_value = ".")]
        output_dir: PathBuf,

        /// Suppress non-error output
        #[arg(long)]
        quiet: bool,
    },
    /// Capture live traffic in bursts and push each record to WebSocket clients.
    #[command(
        after_help = "Examples:\n  pcapflow stream\n  pcapflow stream --interface eth0 --filter 'tcp port 443' --export csv"
    )]
    Stream(StreamArgs),
}

#[derive(Args, Debug)]
struct StreamArgs {
    /// Interface to capture on (system default when omitted)
    #[arg(short = 'i', long)]
    interface: Option<String>,

    /// BPF filter expression
    #[arg(long)]
    filter: Option<String>,

    /// Put the interface into promiscuous mode
    #[arg(long)]
    promiscuous: bool,

    /// Address of the WebSocket endpoint
    #[arg(long, default_value = DEFAULT_STREAM_ADDR)]
    listen: String,

    /// Maximum packets per burst
    #[arg(
        long,
        default_value_t = DEFAULT_BURST_COUNT as u16,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    burst_count: u16,

    /// Maximum sampling time per burst, in milliseconds
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    burst_timeout_ms: u64,

    /// Pause between bursts, in milliseconds
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    burst_interval_ms: u64,

    /// Also export the captured records when the stream stops
    #[arg(long, value_enum)]
    export: Option<FormatArg>,

    /// Directory that receives the export
    #[arg(short = 'o', long, default_value = ".")]
    output_dir: PathBuf,

    /// Suppress non-error output
    #[arg(long)]
    quiet: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FormatArg {
    Json,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract {
            input,
            format,
            output_dir,
            quiet,
        } => {
            init_tracing(quiet);
            cmd_extract(input, format, output_dir, quiet)
        }
        Commands::Stream(args) => {
            init_tracing(args.quiet);
            cmd_stream(args)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{err:#}"), None)
    }
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Source(SourceError::NotFound(path)) => CliError::new(
                format!("input file not found: {}", path.display()),
                Some("use a .pcap or .pcapng file".to_string()),
            ),
            PipelineError::Source(err @ (SourceError::Io(_) | SourceError::Pcap(_))) => {
                CliError::new(
                    format!("failed to read capture: {err}"),
                    Some("expected a valid .pcap or .pcapng file".to_string()),
                )
            }
            PipelineError::Source(err @ SourceError::Capture(_)) => CliError::new(
                err.to_string(),
                Some(
                    "live capture needs root or CAP_NET_RAW; check --interface and --filter"
                        .to_string(),
                ),
            ),
            PipelineError::Export(ExportError::Empty) => CliError::new(
                "no packets to export: a CSV file needs at least one record",
                Some("use JSON to write an empty export".to_string()),
            ),
            PipelineError::Export(err) => CliError::new(
                err.to_string(),
                Some("check that --output-dir is writable".to_string()),
            ),
            other => CliError::new(other.to_string(), None),
        }
    }
}

fn cmd_extract(
    input: PathBuf,
    format: FormatArg,
    output_dir: PathBuf,
    quiet: bool,
) -> Result<(), CliError> {
    let resolved_input = resolve_input_path(&input)?;
    if resolved_input.is_dir() {
        return Err(CliError::new(
            format!("input is not a file: {}", resolved_input.display()),
            Some("use a .pcap or .pcapng file".to_string()),
        ));
    }

    let mut pipeline = Pipeline::new().with_export(ExportSink::new(format.into(), output_dir));
    let summary = pipeline.run_offline(&resolved_input)?;
    if !quiet {
        report_summary(&summary);
    }
    Ok(())
}

fn report_summary(summary: &RunSummary) {
    if let Some(path) = summary.export_path.as_deref() {
        eprintln!(
            "OK: {} records written -> {}",
            summary.records,
            path.display()
        );
    }
    if summary.frame_errors > 0 {
        eprintln!("note: {} malformed frames skipped", summary.frame_errors);
    }
}

#[cfg(feature = "live")]
fn cmd_stream(args: StreamArgs) -> Result<(), CliError> {
    use anyhow::Context;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(live::run(args))
}

#[cfg(not(feature = "live"))]
fn cmd_stream(_args: StreamArgs) -> Result<(), CliError> {
    Err(CliError::new(
        "live capture is not available in this build",
        Some("rebuild pcapflow with the `live` feature".to_string()),
    ))
}

#[cfg(feature = "live")]
mod live {
    use std::time::Duration;

    use anyhow::Context;
    use pcapflow_core::{
        BurstConfig, ExportSink, LiveConfig, Pipeline, StreamServer, StreamSink, open_live,
    };
    use tokio_util::sync::CancellationToken;
    use tracing::{info, warn};

    use super::{CliError, StreamArgs, report_summary};

    pub(super) async fn run(args: StreamArgs) -> Result<(), CliError> {
        let config = LiveConfig {
            interface: args.interface.clone(),
            filter: args.filter.clone(),
            promiscuous: args.promiscuous,
            burst: BurstConfig {
                count: usize::from(args.burst_count),
                timeout: Duration::from_millis(args.burst_timeout_ms),
                interval: Duration::from_millis(args.burst_interval_ms),
            },
            ..LiveConfig::default()
        };

        let sink = StreamSink::with_capacity(config.burst.count);
        let server = StreamServer::bind(&args.listen, sink.clone())
            .await
            .map_err(|err| {
                CliError::new(
                    err.to_string(),
                    Some("choose a free address with --listen".to_string()),
                )
            })?;
        let addr = server.local_addr().context("failed to read listen address")?;

        let shutdown = CancellationToken::new();
        let server_task = server.spawn(shutdown.clone());
        let signal_task = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("received ctrl-c, stopping capture");
                        shutdown.cancel();
                    }
                    Err(err) => warn!(error = %err, "failed to listen for ctrl-c"),
                }
            })
        };

        if !args.quiet {
            eprintln!("streaming on ws://{addr} (Ctrl-C to stop)");
        }

        let mut pipeline = Pipeline::new().with_stream(sink);
        if let Some(format) = args.export {
            pipeline = pipeline.with_export(ExportSink::new(format.into(), args.output_dir.clone()));
        }
        let result = pipeline
            .run_live(|| open_live(&config), shutdown.clone())
            .await;

        shutdown.cancel();
        signal_task.abort();
        if let Err(err) = server_task.await {
            warn!(error = %err, "stream endpoint task failed");
        }

        let summary = result?;
        if !args.quiet {
            report_summary(&summary);
        }
        Ok(())
    }
}

fn resolve_input_path(input: &Path) -> Result<PathBuf, CliError> {
    let pattern = input.to_string_lossy();
    if !is_glob_pattern(&pattern) {
        return Ok(input.to_path_buf());
    }

    let mut matches = Vec::new();
    let paths = glob(&pattern).map_err(|err| {
        CliError::new(
            format!("invalid input pattern '{}'", pattern),
            Some(format!("pattern error: {}", err.msg)),
        )
    })?;
    for entry in paths {
        let path = entry.map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", pattern),
                Some(format!("pattern error: {}", err)),
            )
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }

    match matches.len() {
        0 => Err(CliError::new(
            format!("no files match pattern '{}'", pattern),
            Some("check the path or quote the pattern".to_string()),
        )),
        1 => Ok(matches.remove(0)),
        count => {
            let mut listed = matches
                .iter()
                .take(3)
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            if count > 3 {
                listed.push_str(", ...");
            }
            Err(CliError::new(
                format!("multiple files match pattern '{pattern}' ({count} matches); matches: {listed}"),
                Some("pass a single capture file, or run once per file".to_string()),
            ))
        }
    }
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}
