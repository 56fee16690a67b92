use std::io::Read;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use inference_orchestrator::{
    ClinicalInference, EngineConfig, FibrosisRequest, InferenceEngine, LesionRequest,
};
use serde_json::Value;

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  hepa-cli fibrosis [PATH|-]   Stiffness estimate, stage and risk for one request");
    eprintln!("  hepa-cli lesion [PATH|-]     Lesion class and risk for one request");
    eprintln!();
    eprintln!("PATH holds a JSON request object, or an array of requests for a batch run.");
    eprintln!("Reads stdin when PATH is '-' or omitted.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --timeout-ms N     Reject the request if it has not started within N ms");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let timeout_ms = timeout_arg(&args)?;
    let positional: Vec<&str> = args
        .iter()
        .enumerate()
        .filter(|(i, a)| {
            !a.starts_with("--") && (*i == 0 || args[*i - 1] != "--timeout-ms")
        })
        .map(|(_, a)| a.as_str())
        .collect();

    let Some(&command) = positional.first() else {
        usage();
    };
    let input = read_input(positional.get(1).copied())?;

    let config = EngineConfig::from_env()?;
    tracing::info!(
        "Configuration loaded: embedding_dim={}, ensemble_size={}, mc_samples={}, confidence={}",
        config.architecture.embedding_dim,
        config.architecture.ensemble_size,
        config.mc_samples,
        config.confidence_level
    );
    let engine = InferenceEngine::from_config(config)?;
    let deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));

    let payload: Value = serde_json::from_str(&input).context("request is not valid JSON")?;
    let output = match (command, payload) {
        ("fibrosis", Value::Array(items)) => {
            let requests: Vec<FibrosisRequest> = serde_json::from_value(Value::Array(items))?;
            batch_output(engine.submit_fibrosis_batch(requests, deadline).await?)?
        }
        ("fibrosis", request) => {
            let request: FibrosisRequest = serde_json::from_value(request)?;
            serde_json::to_value(engine.submit_fibrosis(request, deadline).await?)?
        }
        ("lesion", Value::Array(items)) => {
            let requests: Vec<LesionRequest> = serde_json::from_value(Value::Array(items))?;
            batch_output(engine.submit_lesion_batch(requests, deadline).await?)?
        }
        ("lesion", request) => {
            let request: LesionRequest = serde_json::from_value(request)?;
            serde_json::to_value(engine.submit_lesion(request, deadline).await?)?
        }
        (other, _) => {
            eprintln!("Unknown command '{other}'");
            usage();
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn timeout_arg(args: &[String]) -> Result<Option<u64>> {
    let Some(i) = args.iter().position(|a| a == "--timeout-ms") else {
        return Ok(None);
    };
    let Some(value) = args.get(i + 1) else {
        bail!("--timeout-ms requires a value");
    };
    let ms = value
        .parse()
        .context("--timeout-ms expects a whole number of milliseconds")?;
    Ok(Some(ms))
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        None | Some("-") => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read request from stdin")?;
            Ok(buffer)
        }
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("failed to read {path}")),
    }
}

/// One entry per request; failures are reported in place rather than
/// aborting the rest of the batch.
fn batch_output<T, E>(results: Vec<std::result::Result<T, E>>) -> Result<Value>
where
    T: serde::Serialize,
    E: std::fmt::Display,
{
    let entries = results
        .into_iter()
        .map(|result| match result {
            Ok(report) => serde_json::to_value(report),
            Err(e) => Ok(serde_json::json!({ "error": e.to_string() })),
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if entries.is_empty() {
        bail!("batch request contained no items");
    }
    Ok(Value::Array(entries))
}
