use std::{fs::File, io::ErrorKind, path::Path};

use hound::{SampleFormat, WavReader, WavWriter};
use ndarray::Array2;
use rubato::{FftFixedInOut, Resampler};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use crate::{
    error::{DatasetError, Result},
    types::AudioData,
};

const RESAMPLE_CHUNK: usize = 1024;

/// Decode every audio track of a (multi-track) container.
///
/// Tracks are returned in container order; for a stem file that is
/// mixture, drums, bass, other, vocals.
pub fn read_stems<P: AsRef<Path>>(path: P) -> Result<Vec<AudioData>> {
    let path: &Path = path.as_ref();

    let file: File = File::open(path)?;
    let mss: MediaSourceStream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint: Hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DatasetError::decode(path, e))?;
    let mut format = probed.format;

    let mut track_ids: Vec<u32> = Vec::new();
    let mut decoders: Vec<Box<dyn Decoder>> = Vec::new();
    let mut stems: Vec<AudioData> = Vec::new();
    for track in format
        .tracks()
        .iter()
        .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL)
    {
        let decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DatasetError::decode(path, e))?;
        track_ids.push(track.id);
        decoders.push(decoder);
        stems.push(AudioData {
            samples: Vec::new(),
            sample_rate: track.codec_params.sample_rate.unwrap_or(0),
            channels: track
                .codec_params
                .channels
                .map(|c| c.count() as u16)
                .unwrap_or(0),
        });
    }
    if stems.is_empty() {
        return Err(DatasetError::decode(path, "no audio tracks found"));
    }

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DatasetError::decode(path, e)),
        };
        let Some(slot) = track_ids.iter().position(|&id| id == packet.track_id()) else {
            continue;
        };

        let decoded = decoders[slot]
            .decode(&packet)
            .map_err(|e| DatasetError::decode(path, e))?;
        let spec = *decoded.spec();
        let stem = &mut stems[slot];
        stem.sample_rate = spec.rate;
        stem.channels = spec.channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        stem.samples.extend_from_slice(buffer.samples());
    }

    log::debug!(
        "Decoded {} tracks from {} ({} frames in track 0)",
        stems.len(),
        path.display(),
        stems[0].frames()
    );

    Ok(stems)
}

/// Read frames `[start, stop)` of a wav file as f32, shape `(frames, channels)`.
///
/// `stop = None` reads to the end. Ranges past the end are clipped, so the
/// result can be shorter than requested.
pub fn read_wav_window<P: AsRef<Path>>(
    path: P,
    start: usize,
    stop: Option<usize>,
) -> Result<Array2<f32>> {
    let mut reader = WavReader::open(path.as_ref())?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    let total = reader.duration() as usize;

    let start = start.min(total);
    let stop = stop.unwrap_or(total).clamp(start, total);
    reader.seek(start as u32)?;

    let n = (stop - start) * channels;
    let mut samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .take(n)
            .collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .take(n)
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let frames = samples.len() / channels;
    samples.truncate(frames * channels);
    Ok(Array2::from_shape_vec((frames, channels), samples)?)
}

/// Number of frames in a wav file, without decoding it.
pub fn wav_frames<P: AsRef<Path>>(path: P) -> Result<usize> {
    Ok(WavReader::open(path.as_ref())?.duration() as usize)
}

pub fn write_audio<P: AsRef<Path>>(path: P, audio: &AudioData) -> Result<()> {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    for sample in &audio.samples {
        let s = (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        writer.write_sample(s)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Resample interleaved audio to `target_sr`. Equal rates return a copy.
pub fn resample(audio: &AudioData, target_sr: u32) -> Result<AudioData> {
    if audio.sample_rate == target_sr || audio.samples.is_empty() {
        return Ok(AudioData {
            samples: audio.samples.clone(),
            sample_rate: target_sr,
            channels: audio.channels,
        });
    }
    let channels = audio.channels.max(1) as usize;
    let frames = audio.frames();

    let mut resampler = FftFixedInOut::<f32>::new(
        audio.sample_rate as usize,
        target_sr as usize,
        RESAMPLE_CHUNK,
        channels,
    )?;
    let chunk_in = resampler.input_frames_next();
    // the fft resampler delays its output by half an output chunk
    let delay = resampler.output_frames_next() / 2;

    let mut planar: Vec<Vec<f32>> = vec![Vec::with_capacity(frames); channels];
    for frame in audio.samples.chunks_exact(channels) {
        for (ch, &s) in planar.iter_mut().zip(frame) {
            ch.push(s);
        }
    }

    let ratio = target_sr as f64 / audio.sample_rate as f64;
    let expected = (frames as f64 * ratio).ceil() as usize;
    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + 2 * delay); channels];

    let mut pos = 0;
    let mut input: Vec<Vec<f32>> = vec![vec![0.0; chunk_in]; channels];
    while pos < frames {
        let end = (pos + chunk_in).min(frames);
        for (buf, ch) in input.iter_mut().zip(&planar) {
            buf[..end - pos].copy_from_slice(&ch[pos..end]);
            buf[end - pos..].fill(0.0);
        }
        let processed = resampler.process(&input, None)?;
        for (o, p) in out.iter_mut().zip(processed) {
            o.extend_from_slice(&p);
        }
        pos = end;
    }
    // One more zero chunk flushes the samples still held in the overlap buffer
    for buf in input.iter_mut() {
        buf.fill(0.0);
    }
    let processed = resampler.process(&input, None)?;
    for (o, p) in out.iter_mut().zip(processed) {
        o.extend_from_slice(&p);
    }

    let stop = (delay + expected).min(out[0].len());
    let mut samples = Vec::with_capacity(expected * channels);
    for i in delay..stop {
        for ch in &out {
            samples.push(ch[i]);
        }
    }

    Ok(AudioData {
        samples,
        sample_rate: target_sr,
        channels: channels as u16,
    })
}
