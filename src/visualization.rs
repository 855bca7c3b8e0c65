//! Live spectrum of the master output.
//!
//! The audio callback pushes a mono copy of the master mix into a bounded ring. A
//! [`SpectrumMonitor`] drains that ring into a rolling window and turns the newest window into
//! byte-scaled frequency data. A [`RefreshLoop`] polls on its own thread at a fixed rate until it
//! is cancelled or dropped.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rtrb::Consumer;

use crate::analysis::AnalysisError;
use crate::analysis::energy::EnergyProfile;
use crate::analysis::spectral::{MagnitudeAnalyzer, SpectralFrame};

pub struct SpectrumMonitor {
    consumer: Consumer<f32>,
    sample_rate: u32,
    analyzer: MagnitudeAnalyzer,

    /// Circular history of the most recent `window_size` samples.
    history: Vec<f32>,
    write_pos: usize,

    window: Vec<f32>,
    magnitudes: Vec<f32>,
}

impl SpectrumMonitor {
    pub fn new(
        consumer: Consumer<f32>,
        sample_rate: u32,
        window_size: usize,
    ) -> Result<Self, AnalysisError> {
        let analyzer = MagnitudeAnalyzer::new(window_size)?;
        Ok(Self {
            consumer,
            sample_rate,
            analyzer,
            history: vec![0.0; window_size],
            write_pos: 0,
            window: Vec::with_capacity(window_size),
            magnitudes: Vec::with_capacity(window_size / 2),
        })
    }

    pub fn window_size(&self) -> usize {
        self.history.len()
    }

    pub fn bin_count(&self) -> usize {
        self.history.len() / 2
    }

    /// Moves everything the callback has produced into the rolling window. Returns the number of
    /// samples read.
    pub fn poll(&mut self) -> usize {
        let available = self.consumer.slots();
        let Ok(chunk) = self.consumer.read_chunk(available) else {
            return 0;
        };

        let (first, second) = chunk.as_slices();
        let len = self.history.len();
        for &sample in first.iter().chain(second) {
            self.history[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % len;
        }
        chunk.commit_all();
        available
    }

    /// Polls, then analyzes the newest window.
    pub fn frame(&mut self) -> SpectralFrame {
        self.poll();

        self.window.clear();
        self.window.extend_from_slice(&self.history[self.write_pos..]);
        self.window.extend_from_slice(&self.history[..self.write_pos]);
        self.analyzer.process(&self.window, &mut self.magnitudes);

        SpectralFrame::new(
            self.magnitudes.clone(),
            self.sample_rate,
            self.history.len(),
        )
    }

    /// Byte frequency data, one value per bin, as a browser analyser node reports it.
    pub fn frequency_data(&mut self) -> Vec<u8> {
        self.frame()
            .magnitudes()
            .iter()
            .map(|&m| m.round().clamp(0.0, 255.0) as u8)
            .collect()
    }

    pub fn energy(&mut self) -> EnergyProfile {
        EnergyProfile::from_frame(&self.frame())
    }
}

/// Background polling loop, cancelled by [`RefreshLoop::cancel`] or on drop.
pub struct RefreshLoop {
    cancelled: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl RefreshLoop {
    /// Calls `tick` every `interval` until it breaks or the loop is cancelled.
    pub fn spawn<F>(interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let handle = thread::Builder::new()
            .name("deckmix-refresh".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    if tick().is_break() {
                        break;
                    }
                    thread::park_timeout(interval);
                }
                log::debug!("refresh loop stopped");
            })?;

        Ok(Self {
            cancelled,
            handle: Some(handle),
        })
    }

    /// Convenience loop feeding `on_frame` with the monitor's frequency data at `hz`.
    pub fn frequency_data<F>(
        mut monitor: SpectrumMonitor,
        hz: f32,
        mut on_frame: F,
    ) -> std::io::Result<Self>
    where
        F: FnMut(&[u8]) -> ControlFlow<()> + Send + 'static,
    {
        let interval = Duration::from_secs_f32(1.0 / hz.clamp(1.0, 1_000.0));
        Self::spawn(interval, move || on_frame(&monitor.frequency_data()))
    }

    /// Stops the loop after the current tick. Does not wait.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(handle) = self.handle.as_ref() {
            handle.thread().unpark();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancels and waits for the thread to exit.
    pub fn join(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RefreshLoop {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    use rtrb::RingBuffer;

    use super::*;

    const FS: u32 = 44_100;
    const WINDOW: usize = 1_024;

    #[test]
    fn test_silence_is_all_zero() {
        let (_producer, consumer) = RingBuffer::new(4_096);
        let mut monitor = SpectrumMonitor::new(consumer, FS, WINDOW).unwrap();
        let data = monitor.frequency_data();
        assert_eq!(data.len(), WINDOW / 2);
        assert!(data.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        let (mut producer, consumer) = RingBuffer::new(4_096);
        let mut monitor = SpectrumMonitor::new(consumer, FS, WINDOW).unwrap();

        // Bin 40 exactly.
        let freq = 40.0 * FS as f32 / WINDOW as f32;
        for n in 0..3_000 {
            let phase = 2.0 * std::f32::consts::PI * freq * n as f32 / FS as f32;
            producer.push(phase.sin()).unwrap();
        }

        let data = monitor.frequency_data();
        assert_eq!(data[40], 255);
        // The main lobe is a few bins wide; far bins stay silent.
        assert_eq!(data[10], 0);
        assert_eq!(data[200], 0);
    }

    #[test]
    fn test_poll_drains_ring() {
        let (mut producer, consumer) = RingBuffer::new(64);
        let mut monitor = SpectrumMonitor::new(consumer, FS, 32).unwrap();
        for _ in 0..50 {
            producer.push(0.5).unwrap();
        }
        assert_eq!(monitor.poll(), 50);
        assert_eq!(monitor.poll(), 0);
        assert_eq!(producer.slots(), 64);
    }

    #[test]
    fn test_invalid_window() {
        let (_producer, consumer) = RingBuffer::<f32>::new(16);
        assert!(SpectrumMonitor::new(consumer, FS, 100).is_err());
    }

    #[test]
    fn test_refresh_loop_ticks_until_cancelled() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let refresh = RefreshLoop::spawn(Duration::from_millis(1), move || {
            counter.fetch_add(1, Ordering::Relaxed);
            ControlFlow::Continue(())
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::Relaxed) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        refresh.cancel();
        refresh.join();

        let after = ticks.load(Ordering::Relaxed);
        assert!(after >= 3);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::Relaxed), after);
    }

    #[test]
    fn test_refresh_loop_stops_on_break() {
        let refresh = RefreshLoop::spawn(Duration::from_millis(1), || ControlFlow::Break(())).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while refresh.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!refresh.is_running());
    }

    #[test]
    fn test_drop_cancels_long_interval() {
        let started = Instant::now();
        let refresh =
            RefreshLoop::spawn(Duration::from_secs(60), || ControlFlow::Continue(())).unwrap();
        drop(refresh);
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
