//! Playback voice for a channel strip.
//!
//! A [`Voice`] is the transient part of deck playback: a read cursor over the strip's buffer and
//! an optional loop region. The [`ChannelStrip`](crate::audio_engine::channel_strip::ChannelStrip)
//! creates a fresh one on every play and drops it on stop; the processing chain is untouched.

use crate::messages::{AudioBuffer, LoopRegion};

#[derive(Debug, Clone)]
pub struct Voice {
    /// Next frame to read.
    pub frame_pos: usize,

    /// Active loop region, already clamped to the buffer.
    loop_region: Option<(usize, usize)>,
}

impl Voice {
    pub fn new(start_frame: usize) -> Self {
        Self {
            frame_pos: start_frame,
            loop_region: None,
        }
    }

    /// Sets or clears the loop. Degenerate regions (empty or past the end) clear it.
    pub fn set_loop(&mut self, region: Option<LoopRegion>, total_frames: usize) {
        self.loop_region = region.and_then(|region| {
            let start = usize::try_from(region.start_frame).ok()?;
            let end = usize::try_from(region.end_frame)
                .unwrap_or(usize::MAX)
                .min(total_frames);
            (start < end).then_some((start, end))
        });
    }

    pub fn loop_region(&self) -> Option<(usize, usize)> {
        self.loop_region
    }

    /// Reads the next stereo frame, wrapping inside the loop. `None` once the buffer is exhausted.
    #[inline]
    pub fn next_frame(&mut self, buffer: &AudioBuffer) -> Option<(f32, f32)> {
        if let Some((start, end)) = self.loop_region {
            if self.frame_pos >= end {
                self.frame_pos = start;
            }
        }

        if self.frame_pos >= buffer.frames() {
            return None;
        }

        let frame = buffer.stereo_frame(self.frame_pos);
        self.frame_pos += 1;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_buffer(frames: usize) -> AudioBuffer {
        AudioBuffer::from_mono(44_100, (0..frames).map(|i| i as f32).collect()).unwrap()
    }

    #[test]
    fn test_voice_reads_until_end() {
        let buffer = ramp_buffer(3);
        let mut voice = Voice::new(1);

        assert_eq!(voice.next_frame(&buffer), Some((1.0, 1.0)));
        assert_eq!(voice.next_frame(&buffer), Some((2.0, 2.0)));
        assert_eq!(voice.next_frame(&buffer), None);
        assert_eq!(voice.next_frame(&buffer), None);
    }

    #[test]
    fn test_voice_wraps_inside_loop() {
        let buffer = ramp_buffer(10);
        let mut voice = Voice::new(2);
        voice.set_loop(
            Some(LoopRegion {
                start_frame: 2,
                end_frame: 4,
            }),
            buffer.frames(),
        );

        let read: Vec<f32> = (0..5).filter_map(|_| voice.next_frame(&buffer)).map(|f| f.0).collect();
        assert_eq!(read, vec![2.0, 3.0, 2.0, 3.0, 2.0]);
    }

    #[test]
    fn test_loop_clamped_to_buffer() {
        let mut voice = Voice::new(0);
        voice.set_loop(
            Some(LoopRegion {
                start_frame: 4,
                end_frame: 100,
            }),
            8,
        );
        assert_eq!(voice.loop_region(), Some((4, 8)));

        voice.set_loop(
            Some(LoopRegion {
                start_frame: 9,
                end_frame: 12,
            }),
            8,
        );
        assert_eq!(voice.loop_region(), None);
    }

    #[test]
    fn test_voice_stereo_buffer() {
        let buffer = AudioBuffer::new(2, 44_100, vec![0.1, -0.1, 0.2, -0.2]).unwrap();
        let mut voice = Voice::new(0);
        assert_eq!(voice.next_frame(&buffer), Some((0.1, -0.1)));
        assert_eq!(voice.next_frame(&buffer), Some((0.2, -0.2)));
        assert_eq!(voice.next_frame(&buffer), None);
    }
}
