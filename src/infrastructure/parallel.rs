//! Parallel batch checking
//!
//! Each check owns its universe; workers share nothing but the registry
//! snapshot.

use crate::analysis::checker::check_jelly;
use crate::core::concrete::ConcreteType;
use crate::errors::TypeError;
use crate::frontend::config::CheckOptions;
use crate::jelly::JellyType;
use crate::registry::{Registry, RegistrySnapshot};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Result of checking one jelly type
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Position in the submitted batch
    pub index: usize,
    pub outcome: Result<ConcreteType, TypeError>,
    pub duration_ms: u64,
}

impl CheckResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Checks every item against `snapshot`, in parallel.
///
/// `workers == 0` uses rayon's global pool; any other value runs the batch
/// on a dedicated pool of that size. Results come back in input order.
pub fn check_batch(
    snapshot: Arc<RegistrySnapshot>,
    items: &[JellyType],
    options: CheckOptions,
    workers: usize,
) -> Result<Vec<CheckResult>, rayon::ThreadPoolBuildError> {
    let started = Instant::now();
    let registry: Arc<dyn Registry> = snapshot;

    let run = || -> Vec<CheckResult> {
        items
            .par_iter()
            .enumerate()
            .map(|(index, jelly)| check_one(index, jelly, registry.clone(), options))
            .collect()
    };

    let results = if workers == 0 {
        run()
    } else {
        rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()?
            .install(run)
    };

    info!(
        items = results.len(),
        failed = results.iter().filter(|r| !r.is_ok()).count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "batch checked"
    );
    Ok(results)
}

fn check_one(
    index: usize,
    jelly: &JellyType,
    registry: Arc<dyn Registry>,
    options: CheckOptions,
) -> CheckResult {
    let start = Instant::now();
    let outcome = check_jelly(jelly, registry, options);
    debug!(index, ok = outcome.is_ok(), "checked");
    CheckResult {
        index,
        outcome,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}
