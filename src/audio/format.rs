use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Number of leading bytes inspected by [`detect_format`].
pub const SNIFF_LEN: usize = 16;

/// Container format as identified from the byte signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Webm,
    Mp4,
    Wav,
    Mp3,
    Ogg,
    Unknown,
}

impl AudioFormat {
    /// File extension symphonia understands for this format.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            AudioFormat::Webm => Some("webm"),
            AudioFormat::Mp4 => Some("mp4"),
            AudioFormat::Wav => Some("wav"),
            AudioFormat::Mp3 => Some("mp3"),
            AudioFormat::Ogg => Some("ogg"),
            AudioFormat::Unknown => None,
        }
    }

    /// Formats whose container wraps a codec stream that is worth demuxing
    /// explicitly when generic probing fails.
    pub fn is_container(self) -> bool {
        matches!(self, AudioFormat::Webm | AudioFormat::Mp4 | AudioFormat::Ogg)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioFormat::Webm => "webm",
            AudioFormat::Mp4 => "mp4",
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// What the uploader claims the file is. Never trusted over the signature.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimedType {
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl ClaimedType {
    pub fn new(filename: Option<&str>, content_type: Option<&str>) -> Self {
        Self {
            filename: filename.map(str::to_string),
            content_type: content_type.map(str::to_string),
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self {
            filename: path.file_name().and_then(|n| n.to_str()).map(str::to_string),
            content_type: None,
        }
    }

    /// Lower-case extension implied by the claim. A recognised content type
    /// overrides the filename extension.
    pub fn extension(&self) -> Option<String> {
        let content_type = self.content_type.as_deref().unwrap_or_default().to_ascii_lowercase();
        for known in ["webm", "mp4", "ogg", "wav"] {
            if content_type.contains(known) {
                return Some(known.to_string());
            }
        }

        self.filename
            .as_deref()
            .map(Path::new)
            .and_then(|p| p.extension())
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(|e| e.to_ascii_lowercase())
    }
}

/// Classify the input by its magic bytes. Only the first [`SNIFF_LEN`] bytes
/// are looked at.
pub fn detect_format(bytes: &[u8]) -> AudioFormat {
    let header = &bytes[..bytes.len().min(SNIFF_LEN)];

    if header.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return AudioFormat::Webm;
    }

    let ftyp_window = &header[..header.len().min(12)];
    if contains(ftyp_window, b"ftyp") {
        return AudioFormat::Mp4;
    }

    if header.starts_with(b"RIFF") && contains(header, b"WAVE") {
        return AudioFormat::Wav;
    }

    if header.starts_with(&[0xFF, 0xFB]) || header.starts_with(&[0xFF, 0xF3]) {
        return AudioFormat::Mp3;
    }

    if header.starts_with(b"OggS") {
        return AudioFormat::Ogg;
    }

    AudioFormat::Unknown
}

/// Signature first; the claim is only logged when it disagrees.
pub fn classify(bytes: &[u8], claimed: &ClaimedType) -> AudioFormat {
    let detected = detect_format(bytes);
    if let Some(ext) = claimed.extension() {
        if detected != AudioFormat::Unknown && detected.extension() != Some(ext.as_str()) {
            log::debug!("Claimed type '.{}' overridden by {} signature", ext, detected);
        }
    }
    detected
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_header() -> Vec<u8> {
        let mut header = b"RIFF".to_vec();
        header.extend_from_slice(&[0x24, 0x08, 0x00, 0x00]);
        header.extend_from_slice(b"WAVEfmt ");
        header
    }

    #[test]
    fn wav_signature_beats_claimed_extension() {
        let claimed = ClaimedType::new(Some("upload.bin"), Some("application/octet-stream"));
        assert_eq!(classify(&wav_header(), &claimed), AudioFormat::Wav);
    }

    #[test]
    fn detects_each_signature() {
        assert_eq!(detect_format(&[0x1A, 0x45, 0xDF, 0xA3, 0x9F]), AudioFormat::Webm);
        assert_eq!(
            detect_format(b"\x00\x00\x00\x20ftypisom\x00\x00\x02\x00"),
            AudioFormat::Mp4
        );
        assert_eq!(detect_format(&[0xFF, 0xFB, 0x90, 0x64]), AudioFormat::Mp3);
        assert_eq!(detect_format(&[0xFF, 0xF3, 0x48, 0xC4]), AudioFormat::Mp3);
        assert_eq!(detect_format(b"OggS\x00\x02"), AudioFormat::Ogg);
    }

    #[test]
    fn ftyp_past_twelve_bytes_is_not_mp4() {
        assert_eq!(
            detect_format(b"\x00\x00\x00\x00\x00\x00\x00\x00\x00ftyp"),
            AudioFormat::Unknown
        );
    }

    #[test]
    fn riff_without_wave_is_unknown() {
        assert_eq!(detect_format(b"RIFF\x00\x00\x00\x00AVI LIST"), AudioFormat::Unknown);
    }

    #[test]
    fn short_and_empty_inputs_are_unknown() {
        assert_eq!(detect_format(&[]), AudioFormat::Unknown);
        assert_eq!(detect_format(&[0x1A, 0x45]), AudioFormat::Unknown);
    }

    #[test]
    fn id3_tagged_mp3_is_unknown_by_signature() {
        assert_eq!(detect_format(b"ID3\x04\x00\x00\x00\x00"), AudioFormat::Unknown);
    }

    #[test]
    fn content_type_overrides_filename_extension() {
        let claimed = ClaimedType::new(Some("recording.mp3"), Some("audio/webm;codecs=opus"));
        assert_eq!(claimed.extension().as_deref(), Some("webm"));

        let claimed = ClaimedType::new(Some("Track.FLAC"), None);
        assert_eq!(claimed.extension().as_deref(), Some("flac"));

        assert_eq!(ClaimedType::default().extension(), None);
    }
}
