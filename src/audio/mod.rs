pub mod analysis;
pub mod decode;
pub mod demux;
pub mod features;
pub mod format;
pub mod resample;
pub mod rhythm;
pub mod spectral;
pub mod wav;

use crate::transcode::{ExternalTranscode, FfmpegTranscoder};
use decode::{DecodePipeline, DecodeSettings, DecodeStrategy};

/// The production strategy order. The external transcoder is left out when
/// `transcoder` is `None`.
pub fn standard_pipeline(settings: DecodeSettings, transcoder: Option<FfmpegTranscoder>) -> DecodePipeline {
    let mut strategies: Vec<Box<dyn DecodeStrategy>> = vec![
        Box::new(demux::NativeRateDecode),
        Box::new(demux::ResamplingDecode),
        Box::new(demux::ContainerDemux),
    ];
    if let Some(transcoder) = transcoder {
        strategies.push(Box::new(ExternalTranscode::new(transcoder)));
    }
    strategies.push(Box::new(wav::WavReaderFallback));
    DecodePipeline::new(strategies, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use format::AudioFormat;
    use std::time::Duration;

    #[test]
    fn strategy_order() {
        let pipeline = standard_pipeline(
            DecodeSettings::default(),
            Some(FfmpegTranscoder::new("ffmpeg", Duration::from_secs(30))),
        );
        assert_eq!(
            pipeline.plan(AudioFormat::Webm),
            vec!["native-rate", "resampling", "container-demux", "external-transcode", "wav-reader"]
        );
        assert_eq!(
            pipeline.plan(AudioFormat::Wav),
            vec!["native-rate", "resampling", "external-transcode", "wav-reader"]
        );
    }

    #[test]
    fn transcoder_is_optional() {
        let pipeline = standard_pipeline(DecodeSettings::default(), None);
        assert_eq!(
            pipeline.plan(AudioFormat::Unknown),
            vec!["native-rate", "resampling", "wav-reader"]
        );
    }
}
