//! Ownership of the loaded model and its readiness.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::error::LoadError;
use crate::tts::{DeviceSpec, SpeechSynthesizer, SynthesizerLoader};

/// File that tells health probes the model is loaded. Present only while it is.
#[derive(Debug, Clone)]
pub struct ReadinessMarker {
    path: PathBuf,
}

impl ReadinessMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_present(&self) -> bool {
        self.path.exists()
    }

    /// Write `ready:<unix seconds>` via a temporary file and rename.
    pub fn publish(&self, at: OffsetDateTime) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, format!("ready:{}", at.unix_timestamp()))?;
        std::fs::rename(&tmp, &self.path)
    }

    pub fn clear(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Snapshot of the resource for health reporting.
#[derive(Debug, Clone)]
pub struct ResourceState {
    pub loaded: bool,
    pub device: DeviceSpec,
    pub loaded_at: Option<OffsetDateTime>,
}

#[derive(Default)]
struct Slot {
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    loaded_at: Option<OffsetDateTime>,
}

/// Owns the model. Written only by `load` and `release`; job processing
/// just takes a shared handle.
pub struct ResourceHolder {
    loader: Box<dyn SynthesizerLoader>,
    device: DeviceSpec,
    marker: ReadinessMarker,
    load_lock: Mutex<()>, // Serializes load/release without blocking readiness queries
    slot: RwLock<Slot>,
}

impl ResourceHolder {
    pub fn new(loader: Box<dyn SynthesizerLoader>, device: DeviceSpec, marker: ReadinessMarker) -> Self {
        Self { loader, device, marker, load_lock: Mutex::new(()), slot: RwLock::new(Slot::default()) }
    }

    pub fn model_name(&self) -> String {
        self.loader.model_name()
    }

    pub fn device(&self) -> DeviceSpec {
        self.device
    }

    pub fn marker(&self) -> &ReadinessMarker {
        &self.marker
    }

    /// Load the model and publish the readiness marker. A no-op when already loaded.
    ///
    /// # Errors
    /// Returns an error if the model cannot be loaded or the marker cannot be
    /// written; either leaves the holder unloaded.
    pub fn load(&self) -> Result<(), LoadError> {
        let _loading = self.load_lock.lock();

        if self.is_ready() {
            info!("Model already loaded");
            return Ok(());
        }

        info!("Loading {} on {}...", self.loader.model_name(), self.device);
        let started = Instant::now();
        let synthesizer = self.loader.load(&self.device)?;
        info!("Model loaded in {:.2}s", started.elapsed().as_secs_f64());

        let now = OffsetDateTime::now_utc();
        *self.slot.write() = Slot { synthesizer: Some(synthesizer), loaded_at: Some(now) };

        if let Err(source) = self.marker.publish(now) {
            *self.slot.write() = Slot::default();
            return Err(LoadError::Marker { path: self.marker.path.clone(), source });
        }

        info!("Readiness marker written: {}", self.marker.path.display());
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.slot.read().synthesizer.is_some()
    }

    /// Shared handle for one synthesis call, or `None` when not loaded.
    pub fn handle(&self) -> Option<Arc<dyn SpeechSynthesizer>> {
        self.slot.read().synthesizer.clone()
    }

    pub fn state(&self) -> ResourceState {
        let slot = self.slot.read();
        ResourceState { loaded: slot.synthesizer.is_some(), device: self.device, loaded_at: slot.loaded_at }
    }

    /// Drop the model and remove the readiness marker.
    pub fn release(&self) {
        let _loading = self.load_lock.lock();

        let released = std::mem::take(&mut *self.slot.write());
        if let Err(e) = self.marker.clear() {
            warn!("Failed to remove readiness marker {}: {}", self.marker.path.display(), e);
        }

        if released.synthesizer.is_some() {
            info!("Model released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;
    use crate::testing::{FakeLoader, FakeSynth};

    fn holder(dir: &Path, loader: FakeLoader) -> ResourceHolder {
        ResourceHolder::new(Box::new(loader), DeviceSpec::for_provider(Provider::Cpu), ReadinessMarker::new(dir.join("ready")))
    }

    #[test]
    fn test_load_publishes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let holder = holder(dir.path(), FakeLoader::new(FakeSynth::one_second()));

        assert!(!holder.is_ready());
        assert!(!holder.marker().is_present());

        holder.load().unwrap();
        assert!(holder.is_ready());
        assert!(holder.state().loaded_at.is_some());

        let content = std::fs::read_to_string(dir.path().join("ready")).unwrap();
        assert!(content.starts_with("ready:"));
    }

    #[test]
    fn test_load_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FakeLoader::new(FakeSynth::one_second());
        let loads = loader.load_count();
        let holder = holder(dir.path(), loader);

        holder.load().unwrap();
        holder.load().unwrap();
        assert_eq!(loads.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_load_leaves_unready() {
        let dir = tempfile::tempdir().unwrap();
        let holder = holder(dir.path(), FakeLoader::failing());

        let err = holder.load().unwrap_err();
        assert!(matches!(err, LoadError::Model(_)));
        assert!(!holder.is_ready());
        assert!(!holder.marker().is_present());
    }

    #[test]
    fn test_marker_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the marker's parent directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let holder = ResourceHolder::new(
            Box::new(FakeLoader::new(FakeSynth::one_second())),
            DeviceSpec::for_provider(Provider::Cpu),
            ReadinessMarker::new(blocker.join("ready")),
        );

        assert!(matches!(holder.load(), Err(LoadError::Marker { .. })));
        assert!(!holder.is_ready());
    }

    #[test]
    fn test_release_clears_state_and_marker() {
        let dir = tempfile::tempdir().unwrap();
        let holder = holder(dir.path(), FakeLoader::new(FakeSynth::one_second()));

        holder.load().unwrap();
        holder.release();
        assert!(!holder.is_ready());
        assert!(holder.handle().is_none());
        assert!(!holder.marker().is_present());

        // Releasing twice is harmless
        holder.release();
    }
}
