//! Saving committed driver state to disk and restoring it on a cold start.
//!
//! Only the committed snapshot and artifact set survive a restart. Node
//! values are not persisted, so the first pass after a restore recomputes
//! every node, but reconciles against the restored artifacts: an unchanged
//! project reports no added, removed, or updated artifacts.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use weft_cache::{CacheError, StateStore};
use weft_common::WeftResult;
use weft_config::WeftConfig;

use crate::driver::{CommittedState, Driver};
use crate::input::InputSnapshot;
use crate::output::Artifact;
use crate::pipeline::Pipeline;
use crate::value::NodeId;

const WEFT_VERSION: &str = env!("CARGO_PKG_VERSION");

fn encode_snapshot(snapshot: &InputSnapshot) -> Result<Vec<u8>, CacheError> {
    bincode::serde::encode_to_vec(snapshot, bincode::config::standard()).map_err(|e| {
        CacheError::Serialization {
            reason: e.to_string(),
        }
    })
}

fn decode_snapshot(bytes: &[u8]) -> Option<InputSnapshot> {
    match bincode::serde::decode_from_slice(bytes, bincode::config::standard()) {
        Ok((snapshot, _)) => Some(snapshot),
        Err(e) => {
            debug!("stored snapshot could not be decoded: {}", e);
            None
        }
    }
}

impl Driver {
    /// Writes the committed state to `dir`.
    pub fn save_state(&self, dir: &Path) -> Result<(), CacheError> {
        let state = self.state();
        self.save_to(&state, dir)
    }

    pub(crate) fn persist(&self, state: &CommittedState) -> Result<(), CacheError> {
        self.save_to(state, self.cache_dir())
    }

    fn save_to(&self, state: &CommittedState, dir: &Path) -> Result<(), CacheError> {
        let mut store = StateStore::load_or_create(dir, WEFT_VERSION, self.pipeline().fingerprint());
        store.set_generation(state.generation);
        store.replace_artifacts(
            state
                .artifacts
                .values()
                .map(|a| (a.name.as_str(), a.origin.as_raw(), a.content.as_str())),
        )?;
        if let Some(snapshot) = &state.snapshot {
            store.store_snapshot(&encode_snapshot(snapshot)?)?;
        }
        store.save()?;
        let removed = store.gc()?;
        debug!(
            "Saved generation {} to {} ({} stale files removed)",
            state.generation,
            dir.display(),
            removed
        );
        Ok(())
    }

    /// Creates a driver and seeds it with the state saved in `dir`.
    ///
    /// Anything unusable in `dir` (missing, corrupt, another Weft version, or
    /// another pipeline shape) yields a driver with empty state.
    pub fn restore(pipeline: Pipeline, config: &WeftConfig, dir: &Path) -> WeftResult<Self> {
        let driver = Driver::new(pipeline, config)?;
        let store = StateStore::load_or_create(dir, WEFT_VERSION, driver.pipeline().fingerprint());
        if store.generation() == 0 {
            return Ok(driver);
        }

        let Some(stored) = store.load_artifacts() else {
            debug!("stored artifacts in {} are incomplete; starting cold", dir.display());
            return Ok(driver);
        };
        let Some(snapshot) = store.load_snapshot().and_then(|bytes| decode_snapshot(&bytes)) else {
            debug!("no usable snapshot in {}; starting cold", dir.display());
            return Ok(driver);
        };

        let artifacts: BTreeMap<String, Artifact> = stored
            .into_iter()
            .map(|a| {
                let artifact = Artifact {
                    name: a.name,
                    content: a.content,
                    origin: NodeId::from_raw(a.origin),
                };
                (artifact.name.clone(), artifact)
            })
            .collect();
        driver.replace_state(Arc::new(CommittedState {
            generation: store.generation(),
            cache: Default::default(),
            snapshot: Some(snapshot),
            artifacts,
        }));
        info!(
            "Restored generation {} from {}",
            store.generation(),
            dir.display()
        );
        Ok(driver)
    }
}
