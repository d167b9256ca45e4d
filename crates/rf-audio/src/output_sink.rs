//! The eight-channel output sink.
//!
//! `OutputSink` opens a cpal output stream against the transducer
//! array and exposes a blocking `write_block` call: the engine hands
//! over one interleaved int16 block and blocks until every sample has
//! been accepted, which is how the spec models "absorbs backpressure"
//! against cpal's callback-pull model. An `rtrb` single-producer/
//! single-consumer ring buffer bridges the two; the cpal callback is
//! the consumer, `write_block` is the producer.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, Device, SampleFormat, Stream, StreamConfig};
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, PushError, RingBuffer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::{AudioError, AudioResult};

const OUTPUT_CHANNELS: usize = 8;

/// The live output stream plus the bridging ring and fatal-error flag.
pub struct OutputSink {
    _stream: Stream,
    producer: Mutex<Producer<i16>>,
    fatal: Arc<AtomicBool>,
    block_size: usize,
}

impl OutputSink {
    /// Open the device. `block_size` is the engine's period size in
    /// frames (1200 by default); the ring is sized for two periods of
    /// headroom, matching the device's own double-buffering.
    pub fn open(device: &Device, sample_rate: u32, block_size: usize) -> AudioResult<Self> {
        let supported = device
            .supported_output_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .find(|c| {
                c.channels() as usize == OUTPUT_CHANNELS
                    && c.min_sample_rate().0 <= sample_rate
                    && c.max_sample_rate().0 >= sample_rate
            })
            .ok_or_else(|| {
                AudioError::ConfigError(format!(
                    "no {OUTPUT_CHANNELS}-channel S16 config at {sample_rate}Hz"
                ))
            })?
            .with_sample_rate(cpal::SampleRate(sample_rate));

        let sample_format = supported.sample_format();
        let config = StreamConfig {
            channels: OUTPUT_CHANNELS as u16,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: CpalBufferSize::Fixed(block_size as u32),
        };

        // Two periods of headroom, matching the device's own double buffering.
        let (producer, mut consumer) = RingBuffer::<i16>::new(block_size * OUTPUT_CHANNELS * 2);
        let fatal = Arc::new(AtomicBool::new(false));

        let stream = match sample_format {
            SampleFormat::I16 => {
                let fatal = Arc::clone(&fatal);
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _| {
                        pop_into(&mut consumer, data);
                    },
                    move |err| {
                        log::error!("output stream error: {err}");
                        fatal.store(true, Ordering::Release);
                    },
                    None,
                )
            }
            SampleFormat::F32 => {
                let fatal = Arc::clone(&fatal);
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _| {
                        let mut scratch = vec![0i16; data.len()];
                        pop_into(&mut consumer, &mut scratch);
                        for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                            *dst = *src as f32 / 32768.0;
                        }
                    },
                    move |err| {
                        log::error!("output stream error: {err}");
                        fatal.store(true, Ordering::Release);
                    },
                    None,
                )
            }
            other => {
                return Err(AudioError::ConfigError(format!(
                    "unsupported sample format {other:?}"
                )));
            }
        }
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            producer: Mutex::new(producer),
            fatal,
            block_size,
        })
    }

    /// Write one interleaved block (`block_size * 8` samples),
    /// blocking (via short sleeps) until the whole block has been
    /// accepted by the ring. Returns an error if the stream reported
    /// a fatal device error meanwhile.
    pub fn write_block(&self, interleaved: &[i16]) -> AudioResult<()> {
        debug_assert_eq!(interleaved.len(), self.block_size * OUTPUT_CHANNELS);

        let mut producer = self.producer.lock();
        let mut offset = 0;
        while offset < interleaved.len() {
            if self.fatal.load(Ordering::Acquire) {
                return Err(AudioError::StreamError("output device vanished".into()));
            }
            match producer.push(interleaved[offset]) {
                Ok(()) => offset += 1,
                Err(PushError::Full(_)) => std::thread::sleep(Duration::from_micros(200)),
            }
        }
        Ok(())
    }

    pub fn has_failed(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }
}

/// Pop up to `out.len()` samples from the consumer, zero-filling any
/// shortfall (the device callback must never block on an empty ring).
fn pop_into(consumer: &mut Consumer<i16>, out: &mut [i16]) {
    for slot in out.iter_mut() {
        *slot = consumer.pop().unwrap_or(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_round_trips_under_capacity() {
        let (mut producer, mut consumer) = RingBuffer::<i16>::new(64);
        for i in 0..32i16 {
            producer.push(i).unwrap();
        }
        let mut out = vec![0i16; 32];
        pop_into(&mut consumer, &mut out);
        assert_eq!(out, (0..32i16).collect::<Vec<_>>());
    }

    #[test]
    fn ring_zero_fills_shortfall() {
        let (mut producer, mut consumer) = RingBuffer::<i16>::new(16);
        for &v in &[1i16, 2, 3] {
            producer.push(v).unwrap();
        }
        let mut out = vec![-1i16; 8];
        pop_into(&mut consumer, &mut out);
        assert_eq!(out, vec![1, 2, 3, 0, 0, 0, 0, 0]);
    }
}
