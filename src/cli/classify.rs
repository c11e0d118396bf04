use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use perceiver_signature::{PageCapture, Signature, SignatureClassifier, SignatureSet};
use tokio::fs;

use crate::automation::mail;
use crate::cli::context::CliContext;
use crate::cli::output::{print_structured, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct ClassifyArgs {
    /// Serialized main document
    #[arg(long, value_name = "FILE")]
    pub html: PathBuf,

    /// Serialized child frame, flattened into the document (repeatable)
    #[arg(long = "frame", value_name = "FILE")]
    pub frames: Vec<PathBuf>,

    /// Signature set as YAML or JSON; defaults to the bundled demo mail set
    #[arg(long, value_name = "FILE")]
    pub signatures: Option<PathBuf>,

    /// URL the page was captured at
    #[arg(long)]
    pub url: String,

    /// Override classifier.threshold
    #[arg(long)]
    pub threshold: Option<f64>,
}

pub async fn cmd_classify(
    args: ClassifyArgs,
    ctx: &CliContext,
    format: OutputFormat,
) -> Result<()> {
    let html = fs::read_to_string(&args.html)
        .await
        .with_context(|| format!("Failed to read {}", args.html.display()))?;
    let mut capture = PageCapture::new(&args.url, html);
    for frame in &args.frames {
        let body = fs::read_to_string(frame)
            .await
            .with_context(|| format!("Failed to read {}", frame.display()))?;
        capture = capture.with_frame(PageCapture::new(frame.display().to_string(), body));
    }

    let signatures = match &args.signatures {
        Some(path) => load_signatures(path).await?,
        None => mail::signatures()?,
    };
    let mut config = ctx.config().classifier_config();
    if let Some(threshold) = args.threshold {
        anyhow::ensure!(
            (0.0..=1.0).contains(&threshold),
            "threshold must be within 0.0..=1.0"
        );
        config.threshold = threshold;
    }

    let classifier = SignatureClassifier::new(signatures, config);
    let result = classifier.classify_capture(&capture, &args.url);

    if !print_structured(&format, &result)? {
        println!("state: {} (score {:.2})", result.name, result.score);
        for scored in &result.scored {
            println!("  {:<20} {:.2}", scored.name, scored.confidence);
        }
    }
    Ok(())
}

/// YAML parser covers JSON files too.
async fn load_signatures(path: &Path) -> Result<SignatureSet> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let signatures: Vec<Signature> = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse signatures in {}", path.display()))?;
    Ok(SignatureSet::new(signatures)?)
}
