//! WAV encoding for synthesized audio.

use std::io::{Cursor, Seek, Write};
use std::path::Path;

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};

use crate::tts::Waveform;

fn spec(sample_rate: u32) -> WavSpec {
    WavSpec { channels: 1, sample_rate, bits_per_sample: 16, sample_format: SampleFormat::Int }
}

fn write_samples<W: Write + Seek>(mut writer: WavWriter<W>, samples: &[f32]) -> Result<()> {
    for &sample in samples {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(sample_i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Write a waveform as 16-bit PCM mono WAV, creating parent directories.
pub fn write_wav(path: impl AsRef<Path>, waveform: &Waveform) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let writer = WavWriter::create(path, spec(waveform.sample_rate)).with_context(|| format!("failed to create {}", path.display()))?;
    write_samples(writer, &waveform.samples).with_context(|| format!("failed to write {}", path.display()))
}

/// Encode a waveform as an in-memory WAV file.
pub fn encode_wav(waveform: &Waveform) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    let writer = WavWriter::new(&mut buffer, spec(waveform.sample_rate))?;
    write_samples(writer, &waveform.samples)?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_and_memory_encodings_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.wav");
        let wave = Waveform::new(vec![0.0, 0.5, -0.5, 2.0], 16000);

        write_wav(&path, &wave).unwrap();
        let bytes = encode_wav(&wave).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), bytes);

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16383, -16383, i16::MAX]);
    }

    #[test]
    fn test_unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        assert!(write_wav(blocker.join("out.wav"), &Waveform::new(vec![0.0], 16000)).is_err());
    }
}
