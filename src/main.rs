mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cli::{Cli, Command};
use musicmatch::audio::format::{classify, ClaimedType, SNIFF_LEN};
use musicmatch::config::{self, Config};
use musicmatch::scoring::{rank, Candidate, FeatureMap};
use musicmatch::session::{AnalysisSession, AnalysisType, EvictionWorker, InputType, SessionStore};
use musicmatch::{AnalysisService, Analyzer, TrackAnalysis};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    match cli.command {
        Command::Detect { files } => detect(&files),
        Command::Analyze {
            files,
            analysis_type,
            input_type,
            pretty,
        } => analyze(&config, &files, analysis_type, input_type, pretty),
        Command::Match { target, candidates } => match_files(&config, &target, &candidates),
        Command::Compare { target, candidates } => compare(&target, &candidates),
    }
}

/// Config file (explicit or auto-detected), then command-line overrides.
fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = match config::discover_config_path(cli.config.as_deref()) {
        Some(path) => {
            let cfg = config::load_config(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };

    if let Some(ref program) = cli.ffmpeg {
        config.transcode.program = program.clone();
    }
    if cli.no_transcode {
        config.transcode.enabled = false;
    }
    if let Some(secs) = cli.transcode_timeout {
        config.transcode.timeout_secs = secs;
    }
    if let Some(rate) = cli.sample_rate {
        config.decode.target_sample_rate = rate;
    }
    config.validate()?;
    Ok(config)
}

fn detect(files: &[PathBuf]) -> Result<()> {
    for path in files {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let format = classify(&bytes[..bytes.len().min(SNIFF_LEN)], &ClaimedType::from_path(path));
        println!("{}\t{}", path.display(), format);
    }
    Ok(())
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files ({eta} remaining)")?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

fn build_service(config: &Config) -> (AnalysisService, Arc<dyn SessionStore>) {
    let store: Arc<dyn SessionStore> = Arc::new(config.session_store());
    let service = AnalysisService::new(Analyzer::from_config(config), store.clone());
    (service, store)
}

/// Analyze files in parallel. Unreadable files are reported and skipped.
fn analyze_all(
    service: &AnalysisService,
    files: &[PathBuf],
    analysis_type: AnalysisType,
    input_type: InputType,
) -> Result<Vec<(PathBuf, AnalysisSession, TrackAnalysis)>> {
    log::info!("Analyzing {} file(s)...", files.len());
    let pb = progress_bar(files.len())?;

    let results: Vec<_> = files
        .par_iter()
        .filter_map(|path| {
            let outcome = std::fs::read(path).map(|bytes| {
                let (session, analysis) =
                    service.analyze_upload(bytes, &ClaimedType::from_path(path), analysis_type, input_type);
                (path.clone(), session, analysis)
            });
            pb.inc(1);
            match outcome {
                Ok(result) => Some(result),
                Err(e) => {
                    log::error!("Failed to read {}: {}", path.display(), e);
                    None
                }
            }
        })
        .collect();

    pb.finish_and_clear();
    Ok(results)
}

fn analyze(
    config: &Config,
    files: &[PathBuf],
    analysis_type: AnalysisType,
    input_type: InputType,
    pretty: bool,
) -> Result<()> {
    let (service, store) = build_service(config);
    let _sweeper = EvictionWorker::spawn(store, config.sweep_interval())
        .context("Failed to start session eviction thread")?;

    for (path, session, analysis) in analyze_all(&service, files, analysis_type, input_type)? {
        let report = json!({
            "file": path.display().to_string(),
            "session": session,
            "analysis": analysis,
        });
        let line = if pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        println!("{}", line);
    }
    Ok(())
}

fn match_files(config: &Config, target: &Path, candidates: &[PathBuf]) -> Result<()> {
    let (service, _store) = build_service(config);

    let mut all = vec![target.to_path_buf()];
    all.extend_from_slice(candidates);
    let results = analyze_all(&service, &all, AnalysisType::Identification, InputType::File)?;

    let target_session = results
        .iter()
        .find(|(path, _, _)| path == target)
        .map(|(_, session, _)| session.id)
        .with_context(|| format!("Target {} could not be analyzed", target.display()))?;

    let catalog: Vec<Candidate> = results
        .iter()
        .filter(|(path, _, _)| path != target)
        .map(|(path, session, _)| Candidate {
            id: path.display().to_string(),
            features: session.features.to_feature_map(),
        })
        .collect();

    let ranked = service.rank_for_session(&target_session, &catalog)?;
    println!("{}", serde_json::to_string_pretty(&ranked)?);
    Ok(())
}

fn compare(target: &Path, candidates: &Path) -> Result<()> {
    let target: FeatureMap = read_json(target)?;
    let candidates: Vec<Candidate> = read_json(candidates)?;
    let ranked = rank(&target, &candidates);
    println!("{}", serde_json::to_string_pretty(&ranked)?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}
