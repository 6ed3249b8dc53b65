/// Errors raised while describing, converting or emitting audio.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("Unsupported audio MIME type: {0}")]
    UnsupportedMime(String),
    #[error("Invalid parameter in audio MIME type: {0}")]
    InvalidMimeParameter(String),
    #[error("Unsupported bit depth: {0}")]
    UnsupportedDepth(u16),
    #[error("Buffer of {len} bytes is not a whole number of {frame}-byte frames")]
    Misaligned { len: usize, frame: usize },
    #[error("Fragment format {found} does not match container format {expected}")]
    FormatMismatch {
        expected: crate::PcmFormat,
        found: crate::PcmFormat,
    },
    #[error("Audio device error: {0}")]
    Device(String),
    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),
    #[error("Resampler construction failed: {0}")]
    Resampler(#[from] rubato::ResamplerConstructionError),
}
