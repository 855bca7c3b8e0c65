use crate::audio_engine::errors::SampleLoadError;

/// Maps interleaved samples from the file's channel layout to the deck layout.
///
/// - Same channel count: unchanged
/// - Mono → stereo: the signal is duplicated to both channels
/// - Any multichannel layout → mono: all channels are averaged
/// - Surround (> 2 channels) → stereo: the front left/right pair is kept
///
/// Anything else (zero channels, or more than two output channels) is rejected.
pub fn map_channels(
    samples: Vec<f32>,
    file_channels: usize,
    output_channels: usize,
) -> Result<Vec<f32>, SampleLoadError> {
    if file_channels == output_channels && file_channels > 0 {
        return Ok(samples);
    }

    match (file_channels, output_channels) {
        (1, 2) => {
            let mut out = Vec::with_capacity(samples.len() * 2);
            for s in samples {
                out.push(s);
                out.push(s);
            }
            Ok(out)
        }
        (n, 1) if n >= 2 => {
            let scale = 1.0 / n as f32;
            Ok(samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() * scale)
                .collect())
        }
        (n, 2) if n > 2 => {
            let mut out = Vec::with_capacity(samples.len() / n * 2);
            for frame in samples.chunks_exact(n) {
                out.push(frame[0]);
                out.push(frame[1]);
            }
            Ok(out)
        }
        _ => Err(SampleLoadError::UnsupportedChannels {
            file_channels,
            output_channels,
        }),
    }
}
