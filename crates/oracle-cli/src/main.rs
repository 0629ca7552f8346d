//! DKG Oracle CLI
//!
//! Runs a complete DKG ceremony against an in-process session factory:
//! - Registration, commitment and sharing rounds with one task per participant
//! - Share verification, complaints and complaint answers
//! - Optional misbehaving participant to exercise exclusion
//! - Session snapshot and key shares written as JSON

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use oracle_core::crypto::FieldElement;
use oracle_core::keygen::Dealer;
use oracle_core::{
    KeyShare, SessionFactory, SessionId, SessionState, SessionView, DEFAULT_PARTIES,
    DEFAULT_THRESHOLD,
};
use rand::rngs::OsRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

/// DKG Oracle - threshold key generation coordinator
#[derive(Parser)]
#[command(name = "dkg-oracle")]
#[command(about = "Coordinate distributed key generation ceremonies")]
#[command(version)]
struct Cli {
    /// Output directory for session snapshots and key shares
    #[arg(short, long, env = "ORACLE_DEST", default_value = "./data")]
    dest: PathBuf,

    /// Emit logs as JSON
    #[arg(long, env = "ORACLE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full ceremony with local participants
    Ceremony {
        /// Threshold (t-of-n)
        #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: usize,

        /// Roster size
        #[arg(short = 'n', long, default_value_t = DEFAULT_PARTIES)]
        size: usize,

        /// Participants to register; registration closes early when below the roster size
        #[arg(short, long)]
        register: Option<usize>,

        /// Roster index of a participant that deals a garbled share and
        /// answers the resulting complaint dishonestly
        #[arg(short, long)]
        corrupt: Option<usize>,
    },

    /// Print a saved session snapshot or key share
    Inspect {
        /// JSON file written by `ceremony`
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into());
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Commands::Ceremony {
            threshold,
            size,
            register,
            corrupt,
        } => {
            std::fs::create_dir_all(&cli.dest)?;
            run_ceremony(&cli.dest, threshold, size, register.unwrap_or(size), corrupt).await?;
        }
        Commands::Inspect { ref file } => {
            inspect(file)?;
        }
    }

    Ok(())
}

async fn run_ceremony(
    dest: &Path,
    threshold: usize,
    size: usize,
    register: usize,
    corrupt: Option<usize>,
) -> Result<()> {
    if register > size {
        bail!("Cannot register {} participants in a roster of {}", register, size);
    }

    let factory = Arc::new(SessionFactory::default());
    let session = factory.create(threshold, size)?;

    info!(
        session = %session,
        address = %factory.address_of(session)?,
        threshold,
        size,
        "Starting DKG ceremony"
    );

    let mut dealers = Vec::with_capacity(register);
    for _ in 0..register {
        let dealer = Dealer::new(&mut OsRng);
        factory.register(session, dealer.id())?;
        dealers.push(dealer);
    }
    if register < size {
        factory.close_registration(session)?;
    }

    let dealers = commitment_round(&factory, session, dealers).await?;
    let dealers = sharing_round(&factory, session, dealers, corrupt).await?;
    let dealers = verification_round(&factory, session, dealers).await?;
    complaint_round(&factory, session, &dealers, corrupt)?;

    let view = factory.get_state(session)?;
    save_json(&dest.join(format!("session.{}.json", session.0)), &view)?;

    let public_key = match (view.state, view.public_key) {
        (SessionState::Finalized, Some(public_key)) => public_key,
        _ => bail!("Session {} ended in state {}", session, view.state),
    };

    for dealer in dealers.iter().filter(|d| view.active().any(|p| p.id == d.id())) {
        let index = view
            .participant(&dealer.id())
            .map(|p| p.index)
            .context("Participant missing from roster")?;
        let key_share = dealer.assemble_key_share(&view, &factory.shares_for(session, index)?)?;

        let path = dest.join(format!("keyshare.{}.{}.json", session.0, index));
        save_json(&path, &key_share)?;
        info!(index, path = ?path, "Key share saved");
    }

    info!(
        session = %session,
        participants = view.effective_size,
        excluded = view.disputes.len(),
        "DKG ceremony completed"
    );
    println!("Public Key: {}", public_key.to_hex());

    Ok(())
}

/// Every participant commits concurrently
async fn commitment_round(
    factory: &Arc<SessionFactory>,
    session: SessionId,
    dealers: Vec<Dealer>,
) -> Result<Vec<Dealer>> {
    let tasks: Vec<_> = dealers
        .into_iter()
        .map(|mut dealer| {
            let factory = Arc::clone(factory);
            tokio::spawn(async move {
                let view = factory.get_state(session)?;
                let message = dealer.commit(&view, &mut OsRng)?;
                factory.submit_commitment(session, dealer.id(), message)?;
                Ok::<_, oracle_core::Error>(dealer)
            })
        })
        .collect();

    let mut dealers = Vec::with_capacity(tasks.len());
    for task in tasks {
        dealers.push(task.await??);
    }
    Ok(dealers)
}

/// Every participant deals concurrently. A rejected share list is logged
/// and the ceremony continues without that participant.
async fn sharing_round(
    factory: &Arc<SessionFactory>,
    session: SessionId,
    dealers: Vec<Dealer>,
    corrupt: Option<usize>,
) -> Result<Vec<Dealer>> {
    let tasks: Vec<_> = dealers
        .into_iter()
        .map(|dealer| {
            let factory = Arc::clone(factory);
            tokio::spawn(async move {
                let view = factory.get_state(session)?;
                let mut message = dealer.deal(&view, &mut OsRng)?;

                let index = view.participant(&dealer.id()).map(|p| p.index);
                if index.is_some() && index == corrupt {
                    if let Some(share) = message.shares.first_mut() {
                        warn!(index = ?index, recipient = share.recipient, "Dealing a garbled share");
                        share.ciphertext[0] ^= 1;
                    }
                }

                if let Err(e) = factory.submit_shares(session, dealer.id(), message) {
                    warn!(participant = %dealer.id().short(), error = %e, "Share list rejected");
                }
                Ok::<_, oracle_core::Error>(dealer)
            })
        })
        .collect();

    let mut dealers = Vec::with_capacity(tasks.len());
    for task in tasks {
        dealers.push(task.await??);
    }
    Ok(dealers)
}

/// Every active participant checks the shares addressed to it, complains
/// about the ones that fail and confirms
async fn verification_round(
    factory: &Arc<SessionFactory>,
    session: SessionId,
    dealers: Vec<Dealer>,
) -> Result<Vec<Dealer>> {
    let tasks: Vec<_> = dealers
        .into_iter()
        .map(|dealer| {
            let factory = Arc::clone(factory);
            tokio::spawn(async move {
                let view = factory.get_state(session)?;
                let index = match view.participant(&dealer.id()) {
                    Some(p) if !p.is_excluded() && view.state == SessionState::Sharing => p.index,
                    _ => return Ok(dealer),
                };

                let received = factory.shares_for(session, index)?;
                for accused in dealer.check_shares(&view, &received)? {
                    factory.file_complaint(session, dealer.id(), accused)?;
                }
                factory.confirm_shares(session, dealer.id())?;
                Ok::<_, oracle_core::Error>(dealer)
            })
        })
        .collect();

    let mut dealers = Vec::with_capacity(tasks.len());
    for task in tasks {
        dealers.push(task.await??);
    }
    Ok(dealers)
}

/// Accused dealers publish the disputed shares
fn complaint_round(
    factory: &SessionFactory,
    session: SessionId,
    dealers: &[Dealer],
    corrupt: Option<usize>,
) -> Result<()> {
    let view = factory.get_state(session)?;

    for complaint in view.complaints.iter().filter(|c| !c.is_answered()) {
        let dealer = dealers
            .iter()
            .find(|d| view.participant(&d.id()).map(|p| p.index) == Some(complaint.accused));
        let Some(dealer) = dealer else { continue };

        let mut share = match dealer.answer_complaint(&view, complaint.accuser) {
            Ok(share) => share,
            Err(e) => {
                warn!(accused = complaint.accused, error = %e, "Cannot answer complaint");
                continue;
            }
        };
        if Some(complaint.accused) == corrupt {
            warn!(accused = complaint.accused, "Answering a complaint dishonestly");
            share = FieldElement(-share.0);
        }

        if let Err(e) = factory.answer_complaint(session, dealer.id(), complaint.accuser, share) {
            warn!(accused = complaint.accused, error = %e, "Complaint answer rejected");
        }
    }

    Ok(())
}

fn inspect(file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    if let Ok(view) = serde_json::from_str::<SessionView>(&json) {
        println!("Session {}:", view.id);
        println!("  Address: {}", view.address);
        println!("  State: {}", view.state);
        println!("  Threshold: {}", view.threshold());
        println!("  Participants: {}/{}", view.effective_size, view.params.size);
        if let Some(public_key) = view.public_key {
            println!("  Public Key: {}", public_key.to_hex());
        }
        println!("  Complaints: {}", view.complaints.len());
        for dispute in &view.disputes {
            println!(
                "  Excluded: index {} ({:?}): {}",
                dispute.accused_index, dispute.round, dispute.reason
            );
        }
        return Ok(());
    }

    let key_share: KeyShare = serde_json::from_str(&json)
        .with_context(|| format!("{} is neither a session nor a key share", file.display()))?;

    println!("Key Share Info:");
    println!("  Index: {}", key_share.index);
    println!("  N Participants: {}", key_share.n_participants);
    println!("  Threshold: {}", key_share.threshold);
    println!("  Public Key: {}", key_share.public_key.to_hex());
    println!("  Verified: {}", key_share.verify());

    Ok(())
}

fn save_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
