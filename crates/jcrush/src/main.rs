use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use http::header::{InvalidHeaderValue, CONTENT_TYPE};
use http::status::InvalidStatusCode;
use http::{HeaderValue, StatusCode};
use jcrusher::{
    transform_stream, ConfigError, DriverError, Eligibility, ResponseMetadata, TransformConfig,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Re-serializes one JSON document without insignificant whitespace.
///
/// Input that would not be rewritten for the given status and content type
/// is copied through untouched.
#[derive(Debug, Parser)]
#[command(name = "jcrush", version)]
struct Args {
    /// Input file. Reads standard input when omitted or `-`.
    input: Option<PathBuf>,

    /// TOML file with limits, eligibility rules and read size.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Overrides `read_chunk_bytes` from the config.
    #[arg(long, value_name = "BYTES")]
    chunk_size: Option<usize>,

    /// Response status the body is treated as having.
    #[arg(long, default_value_t = 200)]
    status: u16,

    /// Content type the body is treated as having.
    #[arg(long, value_name = "TYPE", default_value = "application/json")]
    content_type: String,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid --status: {0}")]
    Status(#[from] InvalidStatusCode),
    #[error("invalid --content-type: {0}")]
    ContentType(#[from] InvalidHeaderValue),
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("pass-through copy failed: {0}")]
    Copy(#[source] std::io::Error),
    #[error(transparent)]
    Transform(#[from] DriverError),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("jcrush: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref(), args.chunk_size)?;
    let response = response_metadata(args.status, &args.content_type)?;
    let crush = Eligibility::new(config.eligibility.clone()).should_transform(&response);
    let stdout = tokio::io::stdout();

    match args.input.as_deref() {
        Some(path) if path.as_os_str() != "-" => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|source| CliError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
            process(file, stdout, &config, crush).await
        }
        _ => process(tokio::io::stdin(), stdout, &config, crush).await,
    }
}

fn load_config(
    path: Option<&Path>,
    chunk_size: Option<usize>,
) -> Result<TransformConfig, CliError> {
    let mut config = match path {
        Some(path) => TransformConfig::from_path(path)?,
        None => TransformConfig::default(),
    };
    if let Some(chunk_size) = chunk_size {
        config.read_chunk_bytes = chunk_size;
        config.validate()?;
    }
    Ok(config)
}

fn response_metadata(status: u16, content_type: &str) -> Result<ResponseMetadata, CliError> {
    let mut response = ResponseMetadata::new(StatusCode::from_u16(status)?);
    response
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);
    Ok(response)
}

async fn process<R, W>(
    mut reader: R,
    mut writer: W,
    config: &TransformConfig,
    crush: bool,
) -> Result<(), CliError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !crush {
        info!("response not eligible for rewriting; passing body through");
        let copied = tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(CliError::Copy)?;
        writer.flush().await.map_err(CliError::Copy)?;
        debug!(bytes = copied, "pass-through complete");
        return Ok(());
    }

    let report = transform_stream(reader, writer, config).await?;
    info!(
        input = report.input_bytes,
        output = report.output_bytes,
        discarded = report.discarded_trailing,
        reads = report.reads,
        "document crushed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use jcrusher::TransformError;

    use super::*;

    #[test]
    fn defaults_describe_an_ok_json_response() {
        let args = Args::try_parse_from(["jcrush"]).unwrap();
        assert_eq!(args.input, None);
        assert_eq!(args.status, 200);
        assert_eq!(args.content_type, "application/json");
        assert_eq!(args.chunk_size, None);
    }

    #[test]
    fn flags_are_parsed() {
        let args = Args::try_parse_from([
            "jcrush",
            "body.json",
            "--config",
            "jcrush.toml",
            "--chunk-size",
            "64",
            "--status",
            "404",
            "--content-type",
            "text/plain",
        ])
        .unwrap();
        assert_eq!(args.input, Some(PathBuf::from("body.json")));
        assert_eq!(args.config, Some(PathBuf::from("jcrush.toml")));
        assert_eq!(args.chunk_size, Some(64));
        assert_eq!(args.status, 404);
        assert_eq!(args.content_type, "text/plain");
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = load_config(None, Some(0)).unwrap_err();
        assert!(matches!(err, CliError::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn config_file_and_override_combine() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "read_chunk_bytes = 512\n[limits]\nmax_depth = 4").unwrap();

        let config = load_config(Some(file.path()), Some(16)).unwrap();
        assert_eq!(config.read_chunk_bytes, 16);
        assert_eq!(config.limits.max_depth, 4);
    }

    #[test]
    fn bad_status_is_rejected() {
        assert!(matches!(
            response_metadata(42, "application/json"),
            Err(CliError::Status(_))
        ));
    }

    #[tokio::test]
    async fn eligible_body_is_crushed() {
        let mut output = Vec::new();
        process(
            &b"[ 1,\n 2 ]\n"[..],
            &mut output,
            &TransformConfig::default(),
            true,
        )
        .await
        .unwrap();
        assert_eq!(output, b"[1,2]");
    }

    #[tokio::test]
    async fn ineligible_body_passes_through() {
        let input = b"<p>not json</p>";
        let mut output = Vec::new();
        process(&input[..], &mut output, &TransformConfig::default(), false)
            .await
            .unwrap();
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn malformed_body_is_an_error() {
        let mut output = Vec::new();
        let err = process(&b"{\"a\":"[..], &mut output, &TransformConfig::default(), true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::Transform(DriverError::Transform(TransformError::EarlyShutdown { .. }))
        ));
        assert!(output.is_empty());
    }
}
