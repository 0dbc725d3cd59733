//! Advancing the trusted state from a provider.
//!
//! A sync either completes a step or leaves that step's state untouched:
//! committee hand-offs are verified on a working copy and committed together,
//! then the head moves only if the fetched block certificate verifies.

use serde::{Deserialize, Serialize};
use tessera_core::{BlockNumber, LightClientState, Period, VerificationError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::provider::{ensure_block_order, ensure_committee_order, BlockRequest, Provider, ProviderError};

/// Most committee certificates requested in one call.
pub const MAX_COMMITTEE_BATCH: usize = 128;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Provider returned no block certificate")]
    NoBlockCertificate,

    #[error("Provider has no committee certificate for period {period}")]
    MissingCommittee { period: Period },

    #[error("Invalid committee for period {period}: {source}")]
    InvalidCommittee {
        period: Period,
        #[source]
        source: VerificationError,
    },

    #[error("Invalid block certificate for block {number}: {source}")]
    InvalidBlock {
        number: BlockNumber,
        #[source]
        source: VerificationError,
    },
}

impl SyncError {
    /// A certificate was not attested by the committee it had to come from.
    ///
    /// Covers failed hand-offs, a later-period block whose chain of hand-offs
    /// back to the trusted committee is missing, and block certificates whose
    /// signers are not the trusted committee or fall short of quorum.
    pub fn is_invalid_committee(&self) -> bool {
        match self {
            SyncError::InvalidCommittee { .. } | SyncError::MissingCommittee { .. } => true,
            SyncError::InvalidBlock { source, .. } => matches!(
                source,
                VerificationError::InvalidSignature
                    | VerificationError::UnknownMember { .. }
                    | VerificationError::InsufficientQuorum { .. }
                    | VerificationError::NoSigners
            ),
            _ => false,
        }
    }
}

/// What one successful sync did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncReport {
    pub head: BlockNumber,
    pub committees_adopted: usize,
    pub head_advanced: bool,
}

/// Bring `state` up to the provider's latest certified block.
pub fn sync(state: &mut LightClientState, provider: &dyn Provider) -> Result<SyncReport, SyncError> {
    let latest = provider.block_certificates(BlockRequest::Latest, 1)?;
    ensure_block_order(BlockRequest::Latest, 1, &latest)?;
    let certificate = latest.into_iter().next().ok_or(SyncError::NoBlockCertificate)?;

    let number = certificate.subject.number;
    let target = state.period_of(number);
    let trusted = state.trusted_period();

    let unchanged = SyncReport {
        head: state.head(),
        committees_adopted: 0,
        head_advanced: false,
    };

    if target < trusted || number < state.head() {
        warn!(
            fetched = number,
            head = state.head(),
            period = target,
            trusted_period = trusted,
            "Provider head is behind the trusted head, ignoring"
        );
        return Ok(unchanged);
    }
    if number == state.head() && certificate.subject.hash == state.head_hash() {
        debug!(head = number, "Already at provider head");
        return Ok(unchanged);
    }

    let mut committees_adopted = 0;
    if target > trusted {
        let mut rotation = state.begin_rotation();
        while rotation.period() < target {
            let first = rotation.period() + 1;
            let wanted = usize::try_from(target - rotation.period())
                .unwrap_or(usize::MAX)
                .min(MAX_COMMITTEE_BATCH);

            let batch = provider.committee_certificates(first, wanted)?;
            ensure_committee_order(first, wanted, &batch)?;
            if batch.is_empty() {
                return Err(SyncError::MissingCommittee { period: first });
            }

            for certificate in &batch {
                let period = certificate.subject.period;
                rotation
                    .extend(certificate)
                    .map_err(|source| SyncError::InvalidCommittee { period, source })?;
            }
        }

        committees_adopted = state
            .commit_rotation(rotation)
            .map_err(|source| SyncError::InvalidCommittee {
                period: target,
                source,
            })?;
    }

    let head = state
        .advance_head(&certificate)
        .map_err(|source| SyncError::InvalidBlock { number, source })?;

    info!(head, period = target, committees_adopted, "Synced");
    Ok(SyncReport {
        head,
        committees_adopted,
        head_advanced: true,
    })
}

/// Counters describing a client's sync and proof activity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Current verified head.
    pub head: BlockNumber,
    /// Period of the trusted committee.
    pub trusted_period: Period,
    pub syncs_completed: u64,
    pub syncs_failed: u64,
    pub committees_adopted: u64,
    pub proofs_verified: u64,
    pub proofs_rejected: u64,
}

impl SyncProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sync(&mut self, report: &SyncReport, state: &LightClientState) {
        self.syncs_completed += 1;
        self.committees_adopted += report.committees_adopted as u64;
        self.head = state.head();
        self.trusted_period = state.trusted_period();
    }

    /// Record a failed sync. A failure after a committed rotation still moves
    /// the trusted period, so the state is re-read.
    pub fn record_failure(&mut self, state: &LightClientState) {
        self.syncs_failed += 1;
        self.head = state.head();
        self.trusted_period = state.trusted_period();
    }

    pub fn record_proof(&mut self, verified: bool) {
        if verified {
            self.proofs_verified += 1;
        } else {
            self.proofs_rejected += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tessera_core::test_utils::{certify, committee_of, TestValidator};
    use tessera_core::{
        BlockCertificate, BlockStatement, ChainParams, CommitteeCertificate, CommitteeStatement,
        EthGetProofResponse,
    };

    const PERIOD: u64 = 10;

    /// Serves a fixed latest block and committee certificates by period.
    struct Chain {
        latest: Option<BlockCertificate>,
        committees: BTreeMap<Period, CommitteeCertificate>,
        requests: Mutex<Vec<(Period, usize)>>,
    }

    impl Provider for Chain {
        fn committee_certificates(
            &self,
            first: Period,
            max: usize,
        ) -> Result<Vec<CommitteeCertificate>, ProviderError> {
            self.requests.lock().unwrap().push((first, max));
            Ok(self
                .committees
                .range(first..)
                .take(max)
                .map(|(_, c)| c.clone())
                .collect())
        }

        fn block_certificates(
            &self,
            _request: BlockRequest,
            _max: usize,
        ) -> Result<Vec<BlockCertificate>, ProviderError> {
            Ok(self.latest.clone().into_iter().collect())
        }

        fn account_proof(
            &self,
            _address: [u8; 20],
            _storage_keys: &[[u8; 32]],
            _height: BlockNumber,
        ) -> Result<Option<EthGetProofResponse>, ProviderError> {
            Ok(None)
        }

        fn close(&mut self) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn committee(seed: u8) -> Vec<TestValidator> {
        (0..3).map(|i| TestValidator::new(seed + i, 1)).collect()
    }

    fn hand_off(signers: &[TestValidator], period: Period, next: &[TestValidator]) -> CommitteeCertificate {
        certify(
            signers,
            &[0, 1, 2],
            CommitteeStatement {
                chain_id: 1,
                period,
                committee: committee_of(next),
            },
        )
    }

    fn block(signers: &[TestValidator], number: BlockNumber) -> BlockCertificate {
        certify(
            signers,
            &[0, 1, 2],
            BlockStatement {
                chain_id: 1,
                number,
                hash: [number as u8; 32],
                state_root: [0x5A; 32],
            },
        )
    }

    /// Committees for periods 0..=n, each handing off to the next.
    fn committee_chain(n: u8) -> (Vec<Vec<TestValidator>>, BTreeMap<Period, CommitteeCertificate>) {
        let committees: Vec<_> = (0..=n).map(|p| committee(10 * (p + 1))).collect();
        let certs = (1..=n as u64)
            .map(|p| {
                let p_usize = p as usize;
                (p, hand_off(&committees[p_usize - 1], p, &committees[p_usize]))
            })
            .collect();
        (committees, certs)
    }

    fn genesis_state(genesis: &[TestValidator]) -> LightClientState {
        LightClientState::from_genesis(ChainParams::new(1, PERIOD), committee_of(genesis)).unwrap()
    }

    #[test]
    fn test_sync_within_genesis_period() {
        let genesis = committee(1);
        let mut state = genesis_state(&genesis);
        let chain = Chain {
            latest: Some(block(&genesis, 7)),
            committees: BTreeMap::new(),
            requests: Mutex::new(vec![]),
        };

        let report = sync(&mut state, &chain).unwrap();
        assert_eq!(report.head, 7);
        assert_eq!(report.committees_adopted, 0);
        assert!(chain.requests.lock().unwrap().is_empty());

        // Same head again is a no-op.
        let again = sync(&mut state, &chain).unwrap();
        assert!(!again.head_advanced);
        assert_eq!(again.head, 7);
    }

    #[test]
    fn test_sync_rotates_through_every_period_in_order() {
        let (committees, certs) = committee_chain(3);
        let mut state = genesis_state(&committees[0]);
        let chain = Chain {
            latest: Some(block(&committees[3], 3 * PERIOD + 1)),
            committees: certs,
            requests: Mutex::new(vec![]),
        };

        let report = sync(&mut state, &chain).unwrap();
        assert_eq!(report.head, 3 * PERIOD + 1);
        assert_eq!(report.committees_adopted, 3);
        assert_eq!(state.trusted_period(), 3);
        assert_eq!(state.head_state_root(), [0x5A; 32]);
        assert_eq!(*chain.requests.lock().unwrap(), vec![(1, 3)]);
    }

    #[test]
    fn test_missing_committee_leaves_state_untouched() {
        let (committees, mut certs) = committee_chain(3);
        certs.remove(&2);
        let mut state = genesis_state(&committees[0]);
        let before = state.clone();
        let chain = Chain {
            latest: Some(block(&committees[3], 3 * PERIOD)),
            committees: certs,
            requests: Mutex::new(vec![]),
        };

        // Period 2 is skipped, so the batch is [1, 3]: an ordering violation.
        let err = sync(&mut state, &chain).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Provider(ProviderError::OutOfOrder { expected: 2, got: 3, .. })
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn test_forged_hand_off_rejected_atomically() {
        let (committees, mut certs) = committee_chain(2);
        let forger = committee(200);
        // Period 2 hand-off signed by a committee nobody trusts.
        certs.insert(2, hand_off(&forger, 2, &forger));
        let mut state = genesis_state(&committees[0]);
        let before = state.clone();
        let chain = Chain {
            latest: Some(block(&forger, 2 * PERIOD + 5)),
            committees: certs,
            requests: Mutex::new(vec![]),
        };

        let err = sync(&mut state, &chain).unwrap_err();
        assert!(matches!(err, SyncError::InvalidCommittee { period: 2, .. }));
        assert!(err.is_invalid_committee());
        // Period 1 verified fine but is not retained.
        assert_eq!(state, before);
    }

    #[test]
    fn test_bad_block_keeps_verified_rotation() {
        let (committees, certs) = committee_chain(1);
        let mut state = genesis_state(&committees[0]);
        let chain = Chain {
            // Period 1 block signed by the genesis committee instead of period 1's.
            latest: Some(block(&committees[0], PERIOD + 2)),
            committees: certs,
            requests: Mutex::new(vec![]),
        };

        let err = sync(&mut state, &chain).unwrap_err();
        assert!(matches!(err, SyncError::InvalidBlock { number, .. } if number == PERIOD + 2));
        assert!(err.is_invalid_committee());
        assert_eq!(state.trusted_period(), 1);
        assert_eq!(state.trusted_committee(), &committee_of(&committees[1]));
        assert_eq!(state.head(), 0);
    }

    #[test]
    fn test_stale_provider_head_is_ignored() {
        let genesis = committee(1);
        let mut state = genesis_state(&genesis);
        state.advance_head(&block(&genesis, 8)).unwrap();

        let chain = Chain {
            latest: Some(block(&genesis, 5)),
            committees: BTreeMap::new(),
            requests: Mutex::new(vec![]),
        };
        let report = sync(&mut state, &chain).unwrap();
        assert_eq!(report.head, 8);
        assert!(!report.head_advanced);
        assert_eq!(state.head(), 8);
    }

    #[test]
    fn test_later_block_without_hand_offs_is_invalid_committee() {
        let genesis = vec![TestValidator::new(1, 1)];
        let stranger = TestValidator::new(2, 1);
        let mut state = genesis_state(&genesis);
        let before = state.clone();

        let chain = Chain {
            latest: Some(stranger.certify_alone(BlockStatement {
                chain_id: 1,
                number: 3 * PERIOD + 1,
                hash: [0x31; 32],
                state_root: [0x5A; 32],
            })),
            committees: BTreeMap::new(),
            requests: Mutex::new(vec![]),
        };

        let err = sync(&mut state, &chain).unwrap_err();
        assert!(matches!(err, SyncError::MissingCommittee { period: 1 }));
        assert!(err.is_invalid_committee());
        assert_eq!(state, before);
    }

    #[test]
    fn test_transport_failure_is_not_invalid_committee() {
        let err = SyncError::Provider(ProviderError::Closed);
        assert!(!err.is_invalid_committee());
        assert!(!SyncError::NoBlockCertificate.is_invalid_committee());
    }

    #[test]
    fn test_empty_latest_is_an_error() {
        let genesis = committee(1);
        let mut state = genesis_state(&genesis);
        let chain = Chain {
            latest: None,
            committees: BTreeMap::new(),
            requests: Mutex::new(vec![]),
        };
        assert!(matches!(sync(&mut state, &chain), Err(SyncError::NoBlockCertificate)));
    }

    #[test]
    fn test_progress_counters() {
        let genesis = committee(1);
        let mut state = genesis_state(&genesis);
        let mut progress = SyncProgress::new();

        let report = SyncReport {
            head: 0,
            committees_adopted: 2,
            head_advanced: true,
        };
        progress.record_sync(&report, &state);
        progress.record_failure(&state);
        progress.record_proof(true);
        progress.record_proof(false);
        progress.record_proof(true);

        assert_eq!(progress.syncs_completed, 1);
        assert_eq!(progress.syncs_failed, 1);
        assert_eq!(progress.committees_adopted, 2);
        assert_eq!(progress.proofs_verified, 2);
        assert_eq!(progress.proofs_rejected, 1);

        state.advance_head(&block(&genesis, 3)).unwrap();
        progress.record_failure(&state);
        assert_eq!(progress.head, 3);
    }
}
