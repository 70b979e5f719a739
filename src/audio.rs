use std::{
    io::Read,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use cpal::{
    FromSample, SampleFormat, SizedSample, StreamConfig,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use hound::WavReader;
use rubato::{FftFixedInOut, Resampler};

use crate::alert::AlertSink;

const RESAMPLE_CHUNK: usize = 1024;

/// Mono alert sound held in memory.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AlertClip {
    pub fn from_wav(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open alert sound {}", path.display()))?;
        Self::from_wav_reader(std::io::BufReader::new(file))
            .with_context(|| format!("failed to decode alert sound {}", path.display()))
    }

    /// Decode any PCM or float WAV, mixing all channels down to mono.
    pub fn from_wav_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = WavReader::new(reader)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let full_scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / full_scale))
                    .collect::<Result<_, _>>()?
            }
        };

        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    pub fn resampled(self, target_rate: u32) -> Result<Self> {
        if target_rate == self.sample_rate || self.samples.is_empty() {
            return Ok(Self {
                sample_rate: target_rate,
                ..self
            });
        }

        let mut resampler = FftFixedInOut::<f32>::new(
            self.sample_rate as usize,
            target_rate as usize,
            RESAMPLE_CHUNK,
            1,
        )?;
        let delay = resampler.output_delay();
        let expected =
            (self.samples.len() as u64 * target_rate as u64 / self.sample_rate as u64) as usize;

        let mut out = Vec::with_capacity(expected + delay);
        let mut pos = 0;
        while out.len() < expected + delay {
            let need = resampler.input_frames_next();
            let mut chunk: Vec<f32> = self.samples.iter().skip(pos).take(need).copied().collect();
            chunk.resize(need, 0.0);
            pos += need;
            let waves = resampler.process(&[chunk], None)?;
            out.extend_from_slice(&waves[0]);
        }
        out.drain(..delay);
        out.truncate(expected);

        Ok(Self {
            samples: out,
            sample_rate: target_rate,
        })
    }
}

/// Shared between the player handle and the output callback. The cursor
/// sitting at `samples.len()` means idle.
#[derive(Debug)]
struct Playback {
    samples: Vec<f32>,
    cursor: AtomicUsize,
}

impl Playback {
    fn new(samples: Vec<f32>) -> Self {
        let cursor = AtomicUsize::new(samples.len());
        Self { samples, cursor }
    }

    fn rewind(&self) {
        self.cursor.store(0, Ordering::Release);
    }

    fn is_playing(&self) -> bool {
        self.cursor.load(Ordering::Acquire) < self.samples.len()
    }

    fn fill<T>(&self, data: &mut [T], channels: usize)
    where
        T: SizedSample + FromSample<f32>,
    {
        let start = self.cursor.load(Ordering::Acquire);
        let mut pos = start;
        for frame in data.chunks_mut(channels.max(1)) {
            let value = match self.samples.get(pos) {
                Some(&value) => {
                    pos += 1;
                    value
                }
                None => 0.0,
            };
            for sample in frame {
                *sample = T::from_sample(value);
            }
        }
        // a rewind that landed mid-callback wins
        let _ = self
            .cursor
            .compare_exchange(start, pos, Ordering::AcqRel, Ordering::Relaxed);
    }
}

/// Plays the alert clip on the default output device.
///
/// The output stream stays open for the life of the player; `play` only
/// rewinds the shared cursor.
pub struct CpalAlertPlayer {
    _stream: cpal::Stream,
    playback: Arc<Playback>,
    duration: Duration,
}

impl CpalAlertPlayer {
    pub fn open(path: &Path) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default audio output device"))?;
        let supported = device
            .default_output_config()
            .context("failed to query audio output config")?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        let clip = AlertClip::from_wav(path)?.resampled(config.sample_rate.0)?;
        let duration = clip.duration();
        let playback = Arc::new(Playback::new(clip.samples));

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, playback.clone()),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, playback.clone()),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, playback.clone()),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, playback.clone()),
            other => Err(anyhow!("unsupported output sample format {other:?}")),
        }?;
        stream.play().context("failed to start audio output stream")?;

        log::info!(
            "alert sound {} ready ({:.2}s at {} Hz, {} channels)",
            path.display(),
            duration.as_secs_f32(),
            config.sample_rate.0,
            config.channels
        );

        Ok(Self {
            _stream: stream,
            playback,
            duration,
        })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    playback: Arc<Playback>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| playback.fill(data, channels),
        |err| log::error!("audio output stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

impl AlertSink for CpalAlertPlayer {
    fn play(&mut self) -> Result<()> {
        self.playback.rewind();
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }
}
