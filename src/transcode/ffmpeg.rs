use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

use crate::audio::decode::{
    AudioBuffer, CancelFlag, DecodeError, DecodeInput, DecodeSettings, DecodeStrategy,
};
use crate::audio::demux::NativeRateDecode;
use crate::audio::format::ClaimedType;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const STDERR_TAIL_LINES: usize = 5;

/// Rewrites arbitrary input into 16-bit mono PCM WAV by shelling out to ffmpeg.
#[derive(Clone, Debug)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    timeout: Duration,
    temp_dir: Option<PathBuf>,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            temp_dir: None,
        }
    }

    /// Place scratch files in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn scratch_file(&self, suffix: &str) -> Result<NamedTempFile, DecodeError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("musicmatch-").suffix(suffix);
        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file)
    }

    /// Transcode at most `settings.max_duration_secs` of `bytes` to WAV at
    /// the target rate. Scratch files are removed when this returns,
    /// whatever the outcome.
    pub fn transcode(
        &self,
        bytes: &[u8],
        input_ext: Option<&str>,
        settings: &DecodeSettings,
        cancel: &CancelFlag,
    ) -> Result<Vec<u8>, DecodeError> {
        let suffix = input_ext.map(|e| format!(".{}", e)).unwrap_or_default();
        let mut input = self.scratch_file(&suffix)?;
        input.write_all(bytes)?;
        input.flush()?;
        let output = self.scratch_file(".wav")?;
        // A file rather than a pipe, so a chatty child never blocks on a full pipe.
        let stderr = self.scratch_file(".log")?;

        let args = [
            "-y".to_string(),
            "-hide_banner".into(),
            "-loglevel".into(), "error".into(),
            "-i".into(), input.path().to_string_lossy().into_owned(),
            "-t".into(), settings.max_duration_secs.to_string(),
            "-ac".into(), "1".into(),
            "-ar".into(), settings.target_sample_rate.to_string(),
            "-c:a".into(), "pcm_s16le".into(),
            "-f".into(), "wav".into(),
            output.path().to_string_lossy().into_owned(),
        ];

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr.reopen()?))
            .spawn()
            .map_err(|e| {
                DecodeError::ToolUnavailable(format!("{}: {}", self.program.display(), e))
            })?;

        log::debug!(
            "Transcoding {} bytes with {} to {}Hz mono WAV",
            bytes.len(),
            self.program.display(),
            settings.target_sample_rate
        );

        self.wait(child, stderr.path(), cancel)?;

        let wav = std::fs::read(output.path())?;
        if wav.is_empty() {
            return Err(DecodeError::ToolFailed("transcoder produced no output".into()));
        }
        Ok(wav)
    }

    fn wait(&self, mut child: Child, stderr: &Path, cancel: &CancelFlag) -> Result<(), DecodeError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                if status.success() {
                    return Ok(());
                }
                return Err(DecodeError::ToolFailed(format!(
                    "{} ({})",
                    stderr_tail(stderr),
                    status
                )));
            }

            if cancel.is_cancelled() {
                kill(&mut child);
                return Err(DecodeError::Cancelled);
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "Transcoder exceeded {:?}, killing pid {}",
                    self.timeout,
                    child.id()
                );
                kill(&mut child);
                return Err(DecodeError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Last few lines the child wrote to stderr.
fn stderr_tail(path: &Path) -> String {
    let log = match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => return format!("stderr unavailable: {}", e),
    };
    let lines: Vec<&str> = log.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("; ")
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!("Failed to kill transcoder: {}", e);
    }
    let _ = child.wait();
}

/// Fourth strategy: transcode with ffmpeg, then decode the result natively.
pub struct ExternalTranscode {
    transcoder: FfmpegTranscoder,
}

impl ExternalTranscode {
    pub fn new(transcoder: FfmpegTranscoder) -> Self {
        Self { transcoder }
    }
}

impl DecodeStrategy for ExternalTranscode {
    fn name(&self) -> &'static str {
        "external-transcode"
    }

    fn attempt(&self, input: &DecodeInput) -> Result<AudioBuffer, DecodeError> {
        let wav = self.transcoder.transcode(
            &input.bytes,
            input.probe_extension(),
            &input.settings,
            &input.cancel,
        )?;

        let transcoded = DecodeInput::new(
            wav.into(),
            &ClaimedType::new(Some("transcoded.wav"), Some("audio/wav")),
            input.settings,
        )
        .with_cancel(input.cancel.clone());

        NativeRateDecode.attempt(&transcoded)
    }
}
