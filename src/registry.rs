//! Many subjects, one framework each.
//!
//! Subjects are spread over a fixed number of shards by a `blake3` hash of
//! their key. A shard's map lock is held only long enough to look up or
//! insert the subject; the update itself runs under that subject's own mutex,
//! so different subjects never contend on the update cycle.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use blake3::Hasher;
use tracing::debug;

use crate::config::FrameworkConfig;
use crate::error::{TrustDriftError, TrustDriftResult};
use crate::events::EventSink;
use crate::framework::{FrameworkMetrics, StatusSnapshot, TrustDriftFramework};
use crate::signals::BehavioralSignals;

/// Shard count used by [`SubjectRegistry::with_defaults`].
pub const DEFAULT_SHARDS: usize = 16;

type Shard = RwLock<HashMap<String, Arc<Mutex<TrustDriftFramework>>>>;

fn lock_err(context: &'static str) -> TrustDriftError {
    TrustDriftError::internal(format!("poisoned lock: {context}"))
}

fn shard_index(subject: &str, shards: usize) -> usize {
    let mut h = Hasher::new();
    h.update(subject.as_bytes());
    let hash = h.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_le_bytes(bytes) % shards as u64) as usize
}

/// Lazily creates and serves one [`TrustDriftFramework`] per subject key.
pub struct SubjectRegistry {
    config: FrameworkConfig,
    sink: Option<Arc<dyn EventSink>>,
    shards: Vec<Shard>,
}

impl fmt::Debug for SubjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectRegistry")
            .field("config", &self.config)
            .field("shards", &self.shards.len())
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl SubjectRegistry {
    /// Creates an empty registry. Every subject gets a copy of `config`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `config` is invalid.
    pub fn new(config: FrameworkConfig, shards: usize) -> TrustDriftResult<Self> {
        config.validate()?;
        let shards = (0..shards.max(1)).map(|_| RwLock::new(HashMap::new())).collect();
        Ok(Self {
            config,
            sink: None,
            shards,
        })
    }

    /// Registry with the default configuration and shard count.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            config: FrameworkConfig::default(),
            sink: None,
            shards: (0..DEFAULT_SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    /// Sink attached to every framework created from now on.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn shard(&self, subject: &str) -> &Shard {
        &self.shards[shard_index(subject, self.shards.len())]
    }

    fn get(&self, subject: &str) -> TrustDriftResult<Option<Arc<Mutex<TrustDriftFramework>>>> {
        let map = self.shard(subject).read().map_err(|_| lock_err("registry.get"))?;
        Ok(map.get(subject).cloned())
    }

    fn get_or_create(&self, subject: &str) -> TrustDriftResult<Arc<Mutex<TrustDriftFramework>>> {
        if let Some(fw) = self.get(subject)? {
            return Ok(fw);
        }
        let mut map = self
            .shard(subject)
            .write()
            .map_err(|_| lock_err("registry.insert"))?;
        if let Some(fw) = map.get(subject) {
            return Ok(Arc::clone(fw));
        }
        let mut fw = TrustDriftFramework::new(self.config.clone())?;
        if let Some(sink) = &self.sink {
            fw = fw.with_sink(Arc::clone(sink));
        }
        debug!(subject, "created framework for new subject");
        let fw = Arc::new(Mutex::new(fw));
        map.insert(subject.to_string(), Arc::clone(&fw));
        Ok(fw)
    }

    /// Runs one update cycle for `subject`, creating its framework on first use.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock was poisoned by a panicking thread.
    pub fn update(
        &self,
        subject: &str,
        user_trust: f64,
        actual_reliability: f64,
        signals: Option<&BehavioralSignals>,
        intervention: Option<f64>,
    ) -> TrustDriftResult<StatusSnapshot> {
        let fw = self.get_or_create(subject)?;
        let mut fw = fw.lock().map_err(|_| lock_err("registry.update"))?;
        Ok(fw.update(user_trust, actual_reliability, signals, intervention))
    }

    /// Runs `f` against an existing subject's framework.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock was poisoned.
    pub fn with_subject<T>(
        &self,
        subject: &str,
        f: impl FnOnce(&mut TrustDriftFramework) -> T,
    ) -> TrustDriftResult<Option<T>> {
        let Some(fw) = self.get(subject)? else {
            return Ok(None);
        };
        let mut fw = fw.lock().map_err(|_| lock_err("registry.with_subject"))?;
        Ok(Some(f(&mut fw)))
    }

    /// Metrics of one subject, if it has been seen.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock was poisoned.
    pub fn metrics(&self, subject: &str) -> TrustDriftResult<Option<FrameworkMetrics>> {
        self.with_subject(subject, |fw| fw.get_metrics())
    }

    /// Forgets a subject. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock was poisoned.
    pub fn remove(&self, subject: &str) -> TrustDriftResult<bool> {
        let mut map = self
            .shard(subject)
            .write()
            .map_err(|_| lock_err("registry.remove"))?;
        Ok(map.remove(subject).is_some())
    }

    /// Known subject keys, sorted.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock was poisoned.
    pub fn subjects(&self) -> TrustDriftResult<Vec<String>> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let map = shard.read().map_err(|_| lock_err("registry.subjects"))?;
            out.extend(map.keys().cloned());
        }
        out.sort();
        Ok(out)
    }

    /// Number of known subjects.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock was poisoned.
    pub fn len(&self) -> TrustDriftResult<usize> {
        let mut n = 0;
        for shard in &self.shards {
            n += shard.read().map_err(|_| lock_err("registry.len"))?.len();
        }
        Ok(n)
    }

    /// # Errors
    ///
    /// Returns an internal error if a lock was poisoned.
    pub fn is_empty(&self) -> TrustDriftResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Configuration given to every new subject.
    #[must_use]
    pub const fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    /// Number of shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_index_is_stable_and_bounded() {
        for key in ["alice", "bob", "", "subject-42"] {
            let a = shard_index(key, 7);
            assert_eq!(a, shard_index(key, 7));
            assert!(a < 7);
        }
        assert_eq!(shard_index("anything", 1), 0);
    }

    #[test]
    fn test_subjects_are_isolated() {
        let reg = SubjectRegistry::with_defaults();
        reg.update("a", 0.9, 0.5, None, None).unwrap();
        reg.update("a", 0.9, 0.5, None, None).unwrap();
        let b = reg.update("b", 0.6, 0.6, None, None).unwrap();
        assert_eq!(b.interaction, 1);
        assert_eq!(reg.len().unwrap(), 2);
        assert_eq!(reg.subjects().unwrap(), vec!["a".to_string(), "b".to_string()]);

        let ma = reg.metrics("a").unwrap().unwrap();
        assert_eq!(ma.interactions, 2);
        assert_eq!(ma.total_reactive, 2);
        assert_eq!(reg.metrics("b").unwrap().unwrap().total_reactive, 0);
        assert!(reg.metrics("missing").unwrap().is_none());
    }

    #[test]
    fn test_remove_forgets_state() {
        let reg = SubjectRegistry::with_defaults();
        reg.update("x", 0.5, 0.5, None, None).unwrap();
        assert!(reg.remove("x").unwrap());
        assert!(!reg.remove("x").unwrap());
        assert!(reg.is_empty().unwrap());
        assert_eq!(reg.update("x", 0.5, 0.5, None, None).unwrap().interaction, 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let cfg = FrameworkConfig {
            window_size: 0,
            ..FrameworkConfig::default()
        };
        assert!(SubjectRegistry::new(cfg, 4).unwrap_err().is_validation());
    }

    #[test]
    fn test_debug_output_names_registry_shape() {
        let reg = SubjectRegistry::new(FrameworkConfig::default(), 3).unwrap();
        let text = format!("{reg:?}");
        assert!(text.starts_with("SubjectRegistry"), "{text}");
        assert!(text.contains("shards: 3"), "{text}");
        assert!(text.contains("has_sink: false"), "{text}");
    }
}
