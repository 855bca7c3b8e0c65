//! Audio file loading, decoding and sample rate conversion.
//!
//! Files are decoded with Symphonia, resampled with rubato when the file rate differs from the
//! requested rate, and mapped to the requested channel layout. The result is an immutable
//! [`AudioBuffer`].

use std::fs::File;
use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::{
    audio::SampleBuffer as SymphoniaSampleBuffer, codecs::DecoderOptions,
    errors::Error as SymphoniaError, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use crate::audio_engine::channels::map_channels;
use crate::audio_engine::errors::SampleLoadError;
use crate::messages::AudioBuffer;

/// Input frames fed to the resampler per call.
const RESAMPLE_CHUNK_FRAMES: usize = 8_192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLoadSubtask {
    Decoding,
    Resampling,
    ChannelMapping,
}

/// Progress of one decode step. `percent` is local to the subtask (0.0..=1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleLoadProgress {
    pub subtask: SampleLoadSubtask,
    pub percent: f32,
    pub resampling_required: bool,
}

/// Decodes an audio file into an [`AudioBuffer`].
///
/// `output_rate_hz` of `None` keeps the file's native rate.
pub fn decode_audio_file(
    path: &Path,
    output_channels: usize,
    output_rate_hz: Option<u32>,
) -> Result<AudioBuffer, SampleLoadError> {
    decode_audio_file_with_progress(path, output_channels, output_rate_hz, |_| {})
}

/// Decodes an audio file, reporting progress through `on_progress`.
///
/// # Errors
///
/// - The file cannot be opened
/// - The container or codec is not recognized, or the data is corrupt
/// - The file has no default track, no sample rate, or no samples
/// - The channel layout cannot be mapped to `output_channels`
pub fn decode_audio_file_with_progress(
    path: &Path,
    output_channels: usize,
    output_rate_hz: Option<u32>,
    mut on_progress: impl FnMut(SampleLoadProgress),
) -> Result<AudioBuffer, SampleLoadError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or(SampleLoadError::NoDefaultTrack)?;
    let track_id = track.id;
    let file_rate_hz = track
        .codec_params
        .sample_rate
        .filter(|&rate| rate > 0)
        .ok_or(SampleLoadError::MissingSampleRate)?;
    let total_frames = track.codec_params.n_frames;
    let output_rate_hz = output_rate_hz.unwrap_or(file_rate_hz);
    let resampling_required = file_rate_hz != output_rate_hz;

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let progress = |subtask: SampleLoadSubtask, percent: f32| SampleLoadProgress {
        subtask,
        percent,
        resampling_required,
    };
    on_progress(progress(SampleLoadSubtask::Decoding, 0.0));

    let mut decoded: Vec<f32> = Vec::new();
    let mut file_channels = track
        .codec_params
        .channels
        .map(|channels| channels.count())
        .unwrap_or(0);
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(SampleLoadError::Decode(err)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = match decoder.decode(&packet) {
            Ok(audio_buf) => audio_buf,
            Err(SymphoniaError::DecodeError(err)) => {
                log::warn!("skipping corrupt packet in {}: {err}", path.display());
                continue;
            }
            Err(err) => return Err(SampleLoadError::Decode(err)),
        };
        let spec = *audio_buf.spec();
        file_channels = spec.channels.count();
        let duration = audio_buf.capacity() as u64;

        let mut sample_buf = SymphoniaSampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        decoded.extend_from_slice(sample_buf.samples());

        if let Some(total) = total_frames.filter(|&total| total > 0) {
            let frames = decoded.len() / file_channels.max(1);
            on_progress(progress(
                SampleLoadSubtask::Decoding,
                frames as f32 / total as f32,
            ));
        }
    }
    on_progress(progress(SampleLoadSubtask::Decoding, 1.0));

    if decoded.is_empty() || file_channels == 0 {
        return Err(SampleLoadError::Empty);
    }

    let resampled = if resampling_required {
        log::info!(
            "resampling {} from {file_rate_hz} Hz to {output_rate_hz} Hz",
            path.display()
        );
        on_progress(progress(SampleLoadSubtask::Resampling, 0.0));
        let resampled = resample_interleaved(
            &decoded,
            file_channels,
            file_rate_hz,
            output_rate_hz,
            |percent| on_progress(progress(SampleLoadSubtask::Resampling, percent)),
        )?;
        on_progress(progress(SampleLoadSubtask::Resampling, 1.0));
        resampled
    } else {
        decoded
    };

    on_progress(progress(SampleLoadSubtask::ChannelMapping, 0.0));
    let mapped = map_channels(resampled, file_channels, output_channels)?;
    on_progress(progress(SampleLoadSubtask::ChannelMapping, 1.0));

    Ok(AudioBuffer::from_decoded(
        output_channels,
        output_rate_hz,
        mapped,
    ))
}

/// Converts a buffer to `output_rate_hz`. Returns a shared clone when the rate already matches.
pub fn resample_buffer(
    buffer: &AudioBuffer,
    output_rate_hz: u32,
) -> Result<AudioBuffer, SampleLoadError> {
    if buffer.sample_rate() == output_rate_hz || buffer.is_empty() {
        return Ok(buffer.clone());
    }

    let samples = resample_interleaved(
        buffer.samples(),
        buffer.channels(),
        buffer.sample_rate(),
        output_rate_hz,
        |_| {},
    )?;
    Ok(AudioBuffer::from_decoded(
        buffer.channels(),
        output_rate_hz,
        samples,
    ))
}

/// Band-limited sinc resampling of interleaved audio.
///
/// The output has `round(frames · to / from)` frames with the resampler delay removed.
fn resample_interleaved(
    samples: &[f32],
    channels: usize,
    from_rate_hz: u32,
    to_rate_hz: u32,
    mut on_progress: impl FnMut(f32),
) -> Result<Vec<f32>, SampleLoadError> {
    let frames = samples.len() / channels.max(1);
    if frames == 0 || channels == 0 {
        return Ok(Vec::new());
    }

    let ratio = f64::from(to_rate_hz) / f64::from(from_rate_hz);
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK_FRAMES, channels)?;

    let planar: Vec<Vec<f32>> = (0..channels)
        .map(|ch| samples.iter().skip(ch).step_by(channels).copied().collect())
        .collect();

    let expected = (frames as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];
    let append = |out: &mut Vec<Vec<f32>>, block: Vec<Vec<f32>>| {
        for (dst, src) in out.iter_mut().zip(block) {
            dst.extend_from_slice(&src);
        }
    };

    let mut pos = 0;
    while pos + RESAMPLE_CHUNK_FRAMES <= frames {
        let chunk: Vec<&[f32]> = planar
            .iter()
            .map(|ch| &ch[pos..pos + RESAMPLE_CHUNK_FRAMES])
            .collect();
        append(&mut out, resampler.process(&chunk, None)?);
        pos += RESAMPLE_CHUNK_FRAMES;
        on_progress(pos as f32 / frames as f32);
    }

    if pos < frames {
        let chunk: Vec<&[f32]> = planar.iter().map(|ch| &ch[pos..]).collect();
        append(&mut out, resampler.process_partial(Some(&chunk), None)?);
    }

    // Flush the delay line.
    while out[0].len() < expected + delay {
        let block = resampler.process_partial(None::<&[Vec<f32>]>, None)?;
        if block.first().is_none_or(Vec::is_empty) {
            break;
        }
        append(&mut out, block);
    }

    let mut interleaved = Vec::with_capacity(expected * channels);
    for frame in delay..delay + expected {
        for ch in &out {
            interleaved.push(ch.get(frame).copied().unwrap_or(0.0));
        }
    }
    Ok(interleaved)
}
