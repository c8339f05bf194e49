//! Dropclaim CLI - build eligibility epochs, sign claim intents, simulate relaying
//!
//! Commands:
//! - build: Build an epoch (root + public list) from an eligibility list
//! - root: Print the root of an epoch file
//! - prove: Produce the proof for one (identity, amount) pair
//! - verify: Check a proof against a root
//! - keygen / sign / recover: Claimant-side key and intent handling
//! - simulate: Run signed requests through the relay against an in-memory ledger

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use dropclaim::logging::{self, LogLevel};
use dropclaim::{
    ClaimRequest, MemoryLedger, MemoryProofSource, RelayConfig, RelayCoordinator, RetryPolicy, SystemClock,
};
use dropclaim_core::epoch::Epoch;
use dropclaim_core::hash::to_hex;
use dropclaim_core::intent::{ClaimIntent, Nonce};
use dropclaim_core::leaf::{Amount, Identity};
use dropclaim_core::signature::{identity_of, recover_signer, sign_intent};
use dropclaim_core::types::EligibilityEntry;
use dropclaim_core::verifier::verify;
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

mod types;

use types::*;

#[derive(Parser)]
#[command(name = "dropclaim")]
#[command(about = "Merkle-gated one-time reward claims with signed intents", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an epoch from an eligibility list
    Build {
        /// JSON array of {identity, amount}
        #[arg(short, long)]
        input: PathBuf,

        /// Epoch version
        #[arg(long, default_value_t = 1)]
        version: u64,

        /// Output epoch file
        #[arg(short, long, default_value = "epoch.json")]
        output: PathBuf,
    },

    /// Print the root of an epoch
    Root {
        #[arg(short, long, default_value = "epoch.json")]
        epoch: PathBuf,
    },

    /// Produce the inclusion proof for an entry
    Prove {
        #[arg(short, long, default_value = "epoch.json")]
        epoch: PathBuf,

        /// Recipient address
        #[arg(short, long)]
        identity: String,

        /// Listed amount (decimal)
        #[arg(short, long)]
        amount: String,

        /// Output proof file
        #[arg(short, long, default_value = "proof.json")]
        output: PathBuf,
    },

    /// Verify a proof against a root
    Verify {
        #[arg(short, long)]
        identity: String,

        #[arg(short, long)]
        amount: String,

        #[arg(short, long, default_value = "proof.json")]
        proof: PathBuf,

        /// Root to check against (defaults to the root stored in the proof file)
        #[arg(short, long)]
        root: Option<String>,
    },

    /// Generate a claimant key
    Keygen {
        /// Also write the key to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Sign a claim intent
    Sign {
        /// Secret key (hex)
        #[arg(short, long)]
        key: String,

        #[arg(short, long)]
        amount: String,

        /// Intent nonce (random when omitted)
        #[arg(short, long)]
        nonce: Option<String>,

        /// Unix deadline (one hour from now when omitted)
        #[arg(short, long)]
        deadline: Option<u64>,

        #[command(flatten)]
        domain: DomainArgs,

        #[arg(short, long, default_value = "request.json")]
        output: PathBuf,
    },

    /// Recover the signer of a claim request
    Recover {
        #[arg(short, long, default_value = "request.json")]
        request: PathBuf,

        #[command(flatten)]
        domain: DomainArgs,
    },

    /// Relay requests against an in-memory enforcement point
    Simulate {
        #[arg(short, long, default_value = "epoch.json")]
        epoch: PathBuf,

        /// JSON array of claim requests
        #[arg(short, long)]
        requests: PathBuf,

        /// Fail this many forwards with a transport error first
        #[arg(long, default_value_t = 0)]
        fail_first: u32,

        #[command(flatten)]
        domain: DomainArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::try_init(LogLevel::from_verbosity(cli.verbose))?;

    match cli.command {
        Commands::Build { input, version, output } => cmd_build(&input, version, &output),
        Commands::Root { epoch } => cmd_root(&epoch),
        Commands::Prove { epoch, identity, amount, output } => cmd_prove(&epoch, &identity, &amount, &output),
        Commands::Verify { identity, amount, proof, root } => cmd_verify(&identity, &amount, &proof, root.as_deref()),
        Commands::Keygen { output } => cmd_keygen(output.as_deref()),
        Commands::Sign { key, amount, nonce, deadline, domain, output } => {
            cmd_sign(&key, &amount, nonce.as_deref(), deadline, &domain, &output)
        }
        Commands::Recover { request, domain } => cmd_recover(&request, &domain),
        Commands::Simulate { epoch, requests, fail_first, domain } => {
            cmd_simulate(&epoch, &requests, fail_first, &domain).await
        }
    }
}

fn cmd_build(input: &Path, version: u64, output: &Path) -> Result<()> {
    println!("🪂 Dropclaim - Building epoch\n");

    let entries: Vec<EligibilityEntry> = read_json(input)?;
    let epoch = Epoch::new(version, entries).context("cannot build epoch")?;

    println!("   Entries: {}", epoch.len());
    println!("   Depth: {}", epoch.tree().depth());
    println!("   Root: {}", to_hex(&epoch.root()));

    write_json(output, &EpochFile::from_epoch(&epoch))?;
    println!("\n✅ Epoch {} saved to {:?}", version, output);
    println!("\n📋 NEXT STEP: set this root on the enforcement point (operator only)");
    Ok(())
}

fn cmd_root(epoch: &Path) -> Result<()> {
    let file: EpochFile = read_json(epoch)?;
    let epoch = file.to_epoch()?;
    println!("{}", to_hex(&epoch.root()));
    Ok(())
}

fn cmd_prove(epoch: &Path, identity: &str, amount: &str, output: &Path) -> Result<()> {
    println!("🪂 Dropclaim - Generating proof\n");

    let epoch = read_json::<EpochFile>(epoch)?.to_epoch()?;
    let identity = Identity::from_hex(identity).context("invalid --identity")?;
    let amount = Amount::from_dec_str(amount).context("invalid --amount")?;

    let bundle = epoch
        .proof_for(&identity, &amount)
        .with_context(|| format!("{} is not eligible for {}", identity, amount))?;

    println!("   Identity: {}", identity);
    println!("   Amount: {}", amount);
    println!("   Leaf: {}", to_hex(&bundle.leaf));
    println!("   Proof length: {}", bundle.proof.len());

    write_json(output, &ProofFile { identity, amount, bundle })?;
    println!("\n✅ Proof saved to {:?}", output);
    Ok(())
}

fn cmd_verify(identity: &str, amount: &str, proof: &Path, root: Option<&str>) -> Result<()> {
    println!("🪂 Dropclaim - Verifying proof\n");

    let identity = Identity::from_hex(identity).context("invalid --identity")?;
    let amount = Amount::from_dec_str(amount).context("invalid --amount")?;
    let file: ProofFile = read_json(proof)?;
    let root = match root {
        Some(r) => parse_root(r)?,
        None => file.bundle.root,
    };

    if verify(&identity, &amount, &file.bundle.proof, &root) {
        println!("✅ Proof is VALID for root {}", to_hex(&root));
        Ok(())
    } else {
        println!("❌ Proof is INVALID for root {}", to_hex(&root));
        bail!("proof does not verify")
    }
}

fn cmd_keygen(output: Option<&Path>) -> Result<()> {
    let key = SigningKey::random(&mut OsRng);
    let file = KeyFile {
        secret_key: format!("0x{}", hex::encode(key.to_bytes())),
        identity: identity_of(&key),
    };

    println!("🪂 Dropclaim - New claimant key\n");
    println!("   Identity: {}", file.identity);
    println!("   Secret key: {}", file.secret_key);

    if let Some(path) = output {
        write_json(path, &file)?;
        println!("\n✅ Key saved to {:?} (keep it private!)", path);
    }
    Ok(())
}

fn cmd_sign(
    key: &str,
    amount: &str,
    nonce: Option<&str>,
    deadline: Option<u64>,
    domain: &DomainArgs,
    output: &Path,
) -> Result<()> {
    println!("🪂 Dropclaim - Signing claim intent\n");

    let secret = hex::decode(key.trim().trim_start_matches("0x")).context("secret key is not hex")?;
    let key = SigningKey::from_slice(&secret).context("invalid secret key")?;
    let domain = domain.to_domain()?;

    let nonce = match nonce {
        Some(n) => Nonce::from_dec_str(n).context("invalid --nonce")?,
        None => random_nonce()?,
    };
    let deadline = deadline.unwrap_or_else(|| unix_now() + 3600);
    let amount = Amount::from_dec_str(amount).context("invalid --amount")?;

    let intent = ClaimIntent::new(identity_of(&key), amount, nonce, deadline);
    let signature = sign_intent(&intent, &domain, &key).context("signing failed")?;

    println!("   Recipient: {}", intent.recipient);
    println!("   Amount: {}", intent.amount);
    println!("   Nonce: {}", intent.nonce);
    println!("   Deadline: {}", intent.deadline);
    println!("   Digest: {}", to_hex(&intent.signing_digest(&domain)));

    write_json(output, &ClaimRequest { intent, signature })?;
    println!("\n✅ Signed request saved to {:?}", output);
    Ok(())
}

fn cmd_recover(request: &Path, domain: &DomainArgs) -> Result<()> {
    let request: ClaimRequest = read_json(request)?;
    let domain = domain.to_domain()?;
    let signer = recover_signer(&request.intent, &domain, &request.signature).context("recovery failed")?;

    println!("🪂 Dropclaim - Recovered signer\n");
    println!("   Signer: {}", signer);
    if signer == request.intent.recipient {
        println!("✅ Signer is the recipient");
    } else {
        println!("❌ Signer is NOT the recipient {}", request.intent.recipient);
    }
    Ok(())
}

async fn cmd_simulate(epoch: &Path, requests: &Path, fail_first: u32, domain: &DomainArgs) -> Result<()> {
    println!("🪂 Dropclaim - Simulating relay\n");

    let epoch = read_json::<EpochFile>(epoch)?.to_epoch()?;
    let requests: Vec<ClaimRequest> = read_json(requests)?;
    let domain = domain.to_domain()?;

    let ledger = Arc::new(MemoryLedger::for_epoch(domain.verifying_contract, &epoch));
    ledger.fail_next_submissions(fail_first);
    let source = Arc::new(MemoryProofSource::new(epoch));
    let config = RelayConfig::new(domain).with_retry(RetryPolicy::immediate(1));
    let coordinator = RelayCoordinator::start(config, source, ledger.clone(), Arc::new(SystemClock))
        .await
        .context("relay failed to start")?;

    let mut accepted = Vec::new();
    for (i, request) in requests.into_iter().enumerate() {
        let recipient = request.intent.recipient;
        match coordinator.submit(request).await {
            Ok(ack) => {
                println!("   #{} {} → submitted ({}, {})", i, recipient, ack.tx, ack.reference);
                accepted.push(ack);
            }
            Err(e) => {
                let rejection = e.rejection();
                println!(
                    "   #{} {} → ❌ {} ({}{})",
                    i,
                    recipient,
                    rejection.kind,
                    rejection.message,
                    if rejection.retryable { ", retryable" } else { "" }
                );
            }
        }
    }

    for event in ledger.finalize_all() {
        debug!(?event, "ledger event");
        coordinator.handle_event(event);
    }

    println!("\n   Final status:");
    for ack in &accepted {
        println!("   {} {:?}", ack.reference, coordinator.status(&ack.reference));
    }

    let stats = coordinator.stats();
    println!("\n📊 Stats");
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// 128 random bits
fn random_nonce() -> Result<Nonce> {
    let value = (u128::from(OsRng.next_u64()) << 64) | u128::from(OsRng.next_u64());
    Ok(Nonce::from_dec_str(&value.to_string())?)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
