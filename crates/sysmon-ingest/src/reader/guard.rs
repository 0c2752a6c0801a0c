/// Torn-read detection over the producer's write sequence.
///
/// The producer bumps `writeSequence` to an odd value before writing and to
/// the next even value after. A copy is consistent when the sequence inside
/// the copy is even and still equals the live value after the copy finished.
/// The guard retries a bounded number of times and never spins: if the budget
/// runs out the last copy is decoded anyway and marked possibly torn.
use crate::config::ConsistencyConfig;
use crate::error::{DecodeError, ReadError};
use crate::layout;
use crate::model::Snapshot;
use crate::region::SharedRegion;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of a guarded read.
#[derive(Debug, Clone, PartialEq)]
pub struct StableRead {
    pub snapshot: Snapshot,
    /// Copies discarded before the returned one.
    pub retries: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ConsistencyGuard {
    retry_budget: u32,
    retry_delay: Duration,
}

impl Default for ConsistencyGuard {
    fn default() -> Self {
        Self::from_config(&ConsistencyConfig::default())
    }
}

impl ConsistencyGuard {
    pub fn new(retry_budget: u32, retry_delay: Duration) -> Self {
        Self {
            retry_budget,
            retry_delay,
        }
    }

    pub fn from_config(config: &ConsistencyConfig) -> Self {
        Self::new(config.retry_budget, config.retry_delay())
    }

    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    /// Copy and decode `region`, selecting the layout from the copy.
    pub fn read_stable(&self, region: &dyn SharedRegion) -> Result<StableRead, ReadError> {
        self.read_stable_with(region, layout::decode_snapshot)
    }

    /// Copy `region` until the copy is consistent (or the budget is spent)
    /// and decode it with `decode`.
    ///
    /// Layouts without a write sequence are decoded from a single copy.
    pub fn read_stable_with<F>(
        &self,
        region: &dyn SharedRegion,
        decode: F,
    ) -> Result<StableRead, ReadError>
    where
        F: Fn(&[u8]) -> Result<Snapshot, DecodeError>,
    {
        if region.is_empty() {
            return Err(ReadError::EmptyRegion {
                name: region.name().to_owned(),
            });
        }

        let mut retries = 0;
        loop {
            let raw = region.copy_all();
            let abi = layout::peek_abi(&raw).unwrap_or(0);
            let counted = layout::select(raw.len(), abi)
                .ok()
                .and_then(|(rev, _)| Some((rev, rev.sequence_offset?)));

            let Some((rev, offset)) = counted else {
                let snapshot = decode(&raw)?;
                return Ok(StableRead { snapshot, retries });
            };

            let copied = rev.sequence_of(&raw);
            let live = region.read_u32(offset);

            match (copied, live) {
                (Some(seq), Some(now)) if seq == now && seq % 2 == 0 => {
                    let snapshot = decode(&raw)?;
                    return Ok(StableRead { snapshot, retries });
                }
                _ if retries >= self.retry_budget => {
                    warn!(
                        region = region.name(),
                        ?copied,
                        ?live,
                        retries,
                        "write sequence unstable after retries, returning possibly torn snapshot"
                    );
                    let mut snapshot = decode(&raw)?;
                    snapshot.mark_possibly_torn();
                    return Ok(StableRead { snapshot, retries });
                }
                _ => {
                    retries += 1;
                    debug!(?copied, ?live, attempt = retries, "torn read, retrying");
                    std::thread::sleep(self.retry_delay);
                }
            }
        }
    }
}
