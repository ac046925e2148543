//! Cluster trust: the cluster identity and the set of accepted issuers.
//!
//! The issuer list is an allow-list of public keys whose signatures on
//! workload manifests this host accepts. The cluster's own key is always on it.

use tracing::{error, info};

use super::identity::{self, KeyKind, PublicKey, Seed};

/// Resolved cluster identity and issuer allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTrust {
    pub public_key: PublicKey,
    pub seed: Seed,
    /// Operator issuers in their original order, plus `public_key` if absent.
    pub issuers: Vec<String>,
    /// `true` when no valid operator seed was supplied.
    pub is_adhoc: bool,
}

/// Build cluster trust from the operator's seed (empty = none) and issuers.
///
/// Precedence: a seed that derives a cluster key wins; an empty or malformed
/// seed falls back to a freshly generated ad-hoc identity whose issuer list
/// holds only that key.
pub fn reconcile_cluster_trust(cluster_seed: &str, cluster_issuers: &[String]) -> ClusterTrust {
    let adhoc = identity::generate(KeyKind::Cluster);

    if cluster_seed.is_empty() {
        info!(cluster_key = %adhoc.public_key, "no cluster seed supplied, using ad-hoc cluster identity");
        return adhoc_trust(adhoc);
    }

    match identity::from_seed(cluster_seed, KeyKind::Cluster) {
        Ok(operator) => {
            let mut issuers = cluster_issuers.to_vec();
            if !issuers.iter().any(|i| i == operator.public_key.as_str()) {
                issuers.push(operator.public_key.to_string());
            }
            info!(cluster_key = %operator.public_key, issuers = issuers.len(), "using operator cluster identity");
            ClusterTrust {
                public_key: operator.public_key,
                seed: operator.seed,
                issuers,
                is_adhoc: false,
            }
        }
        Err(e) => {
            error!(
                seed = %cluster_seed,
                error = %e,
                "invalid cluster seed, falling back to ad-hoc cluster identity"
            );
            adhoc_trust(adhoc)
        }
    }
}

fn adhoc_trust(adhoc: identity::KeyPair) -> ClusterTrust {
    ClusterTrust {
        issuers: vec![adhoc.public_key.to_string()],
        public_key: adhoc.public_key,
        seed: adhoc.seed,
        is_adhoc: true,
    }
}
