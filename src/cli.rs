use clap::{Parser, Subcommand};
use std::path::PathBuf;

use musicmatch::session::{AnalysisType, InputType};

#[derive(Parser, Debug)]
#[command(name = "musicmatch", about = "Audio clip analysis and track similarity ranking")]
pub struct Cli {
    /// Config file (default: ./musicmatch.toml or ~/.config/musicmatch/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the ffmpeg binary used for the transcode fallback
    #[arg(long, global = true)]
    pub ffmpeg: Option<PathBuf>,

    /// Never shell out to ffmpeg
    #[arg(long, global = true)]
    pub no_transcode: bool,

    /// Seconds before an ffmpeg run is killed
    #[arg(long, global = true)]
    pub transcode_timeout: Option<u64>,

    /// Sample rate every clip is decoded to
    #[arg(long, global = true)]
    pub sample_rate: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the container format detected from each file's signature
    Detect {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Decode, extract and score each file; prints one JSON object per file
    Analyze {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long, value_enum, default_value_t = AnalysisType::FeatureExtraction)]
        analysis_type: AnalysisType,

        #[arg(long, value_enum, default_value_t = InputType::File)]
        input_type: InputType,

        /// Pretty-print JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Analyze a target and candidates, then rank candidates by similarity
    Match {
        target: PathBuf,

        #[arg(required = true)]
        candidates: Vec<PathBuf>,
    },

    /// Rank pre-computed feature maps (JSON) against a target map
    Compare {
        /// JSON object of feature name to value
        target: PathBuf,

        /// JSON array of {"id": ..., "features": {...}}
        candidates: PathBuf,
    },
}
