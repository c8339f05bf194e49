//! Dropclaim CLI file formats

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use dropclaim_core::epoch::Epoch;
use dropclaim_core::hash::{to_hex, Hash};
use dropclaim_core::intent::ClaimDomain;
use dropclaim_core::leaf::{Amount, Identity};
use dropclaim_core::types::{EligibilityEntry, ProofBundle};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Published epoch: the public list plus its root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochFile {
    pub version: u64,
    pub root: String,
    pub entries: Vec<EligibilityEntry>,
}

impl EpochFile {
    pub fn from_epoch(epoch: &Epoch) -> Self {
        Self {
            version: epoch.version(),
            root: to_hex(&epoch.root()),
            entries: epoch.entries().to_vec(),
        }
    }

    /// Rebuild the tree and check it still matches the recorded root
    pub fn to_epoch(&self) -> Result<Epoch> {
        let epoch = Epoch::new(self.version, self.entries.clone()).context("invalid eligibility list")?;
        let rebuilt = to_hex(&epoch.root());
        if !rebuilt.eq_ignore_ascii_case(&self.root) {
            bail!("epoch file root {} does not match rebuilt root {}", self.root, rebuilt);
        }
        Ok(epoch)
    }
}

/// Proof handed to a claimant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofFile {
    pub identity: Identity,
    pub amount: Amount,
    #[serde(flatten)]
    pub bundle: ProofBundle,
}

/// Generated claimant key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFile {
    pub secret_key: String,
    pub identity: Identity,
}

/// Signing domain flags shared by `sign`, `recover` and `simulate`
#[derive(Args, Debug, Clone)]
pub struct DomainArgs {
    /// Domain name
    #[arg(long, default_value = "Dropclaim")]
    pub domain_name: String,

    /// Domain version
    #[arg(long, default_value = "1")]
    pub domain_version: String,

    /// Chain id
    #[arg(long, default_value_t = 1)]
    pub chain_id: u64,

    /// Verifying contract (enforcement point) address
    #[arg(long)]
    pub contract: String,
}

impl DomainArgs {
    pub fn to_domain(&self) -> Result<ClaimDomain> {
        let contract = Identity::from_hex(&self.contract).context("invalid --contract")?;
        let domain = ClaimDomain::new(
            self.domain_name.clone(),
            self.domain_version.clone(),
            self.chain_id,
            contract,
        );
        domain.validate().context("incomplete signing domain")?;
        Ok(domain)
    }
}

pub fn parse_root(s: &str) -> Result<Hash> {
    dropclaim_core::hash::hash_from_hex(s).context("invalid root")
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> Epoch {
        Epoch::new(
            2,
            vec![
                EligibilityEntry::new(Identity::new([1; 20]), Amount::from(100u64)),
                EligibilityEntry::new(Identity::new([2; 20]), Amount::from(50u64)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_epoch_file_roundtrip_checks_root() {
        let mut file = EpochFile::from_epoch(&epoch());
        assert_eq!(file.to_epoch().unwrap().root(), epoch().root());

        file.entries[0].amount = Amount::from(101u64);
        assert!(file.to_epoch().is_err());
    }

    #[test]
    fn test_proof_file_is_flat() {
        let e = epoch();
        let identity = Identity::new([1; 20]);
        let amount = Amount::from(100u64);
        let file = ProofFile {
            identity,
            amount,
            bundle: e.proof_for(&identity, &amount).unwrap(),
        };

        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["amount"], "100");
        assert!(json["root"].is_string());
        assert!(json["proof"]["siblings"].is_array());
    }

    #[test]
    fn test_domain_args() {
        let args = DomainArgs {
            domain_name: "Dropclaim".into(),
            domain_version: "1".into(),
            chain_id: 1,
            contract: "0x00000000000000000000000000000000000000c1".into(),
        };
        assert_eq!(args.to_domain().unwrap().chain_id, 1);

        let bad = DomainArgs {
            contract: "0x00".into(),
            ..args
        };
        assert!(bad.to_domain().is_err());
    }
}
