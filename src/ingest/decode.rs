//! File → mono f32 samples at the fingerprint sample rate.

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

const RESAMPLE_CHUNK: usize = 1024;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("FLAC decode error: {0}")]
    Flac(#[from] claxon::Error),
    #[error("Decode error: {0}")]
    Symphonia(#[from] SymphoniaError),
    #[error("Resample error: {0}")]
    Resample(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Interleaved samples straight out of the decoder.
struct RawAudio {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

/// Load an audio file as mono samples at `sample_rate`, using claxon for FLAC
/// and symphonia for everything else.
pub fn load_mono(path: &Path, sample_rate: u32) -> Result<Vec<f32>, DecodeError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let raw = if ext == "flac" {
        load_flac(path)?
    } else {
        load_symphonia(path, &ext)?
    };

    log::debug!(
        "Decoded {}: {} samples, {} Hz, {} ch",
        path.display(),
        raw.samples.len(),
        raw.sample_rate,
        raw.channels
    );

    let mono = to_mono(&raw.samples, raw.channels);
    resample(&mono, raw.sample_rate, sample_rate)
}

fn load_flac(path: &Path) -> Result<RawAudio, DecodeError> {
    let mut reader = claxon::FlacReader::open(path)?;
    let info = reader.streaminfo();
    let scale = (1u64 << (info.bits_per_sample - 1)) as f32;

    let samples = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / scale))
        .collect::<Result<Vec<f32>, _>>()?;

    Ok(RawAudio {
        samples,
        sample_rate: info.sample_rate,
        channels: info.channels as usize,
    })
}

fn load_symphonia(path: &Path, ext: &str) -> Result<RawAudio, DecodeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if !ext.is_empty() {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::UnsupportedFormat("No audio track found".to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::UnsupportedFormat("Unknown sample rate".to_string()))?;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Skipping corrupt packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let buf = sample_buf.get_or_insert_with(|| {
            SampleBuffer::new(decoded.capacity() as u64, *decoded.spec())
        });
        channels = decoded.spec().channels.count();
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    Ok(RawAudio {
        samples,
        sample_rate,
        channels: channels.max(1),
    })
}

/// Average interleaved channels into one.
fn to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Band-limited resample. A no-op when the rates already agree.
fn resample(input: &[f32], from: u32, to: u32) -> Result<Vec<f32>, DecodeError> {
    if from == to || input.is_empty() {
        return Ok(input.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = f64::from(to) / f64::from(from);
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let expected = (input.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(expected + RESAMPLE_CHUNK);
    let mut chunk = vec![0.0f32; RESAMPLE_CHUNK];

    // Trailing zero chunks flush the filter delay
    let delay = resampler.output_delay();
    let mut position = 0;
    while output.len() < expected + delay {
        let end = (position + RESAMPLE_CHUNK).min(input.len());
        let filled = end.saturating_sub(position);
        chunk[..filled].copy_from_slice(&input[position.min(end)..end]);
        chunk[filled..].fill(0.0);
        position = end;

        let out = resampler
            .process(&[chunk.as_slice()], None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
        output.extend_from_slice(&out[0]);
    }

    let end = (delay + expected).min(output.len());
    Ok(output[delay.min(end)..end].to_vec())
}
