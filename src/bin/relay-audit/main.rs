//! relay-audit CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command, DeriveIndexArgs, SimulateArgs};
use color_eyre::eyre::eyre;
use relay_audit::audit::index_from_entropy;
use relay_audit::{
    create_event_channel, Address, AuditConfig, AuditKeeper, ChainContext, EvidenceLedger,
    EvidenceType, InMemoryChain, MemStore, RelayProof, Servicer, SessionHeader,
};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("relay-audit v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.load_config()?;
    match cli.command {
        Command::Simulate(args) => simulate(args, &config).await,
        Command::DeriveIndex(args) => derive_index(&args),
        Command::InitConfig { output } => init_config(output, &config),
    }
}

/// Deterministic stand-in for a relay served by worker `worker`.
fn relay_record(header: &SessionHeader, servicer: Address, worker: u64, seq: u64) -> RelayProof {
    let mut h = Sha256::new();
    h.update(b"simulated-relay");
    h.update(header.application_key.as_bytes());
    h.update(worker.to_be_bytes());
    h.update(seq.to_be_bytes());
    let request_hash: [u8; 32] = h.finalize().into();

    RelayProof {
        request_hash,
        entropy: (worker << 32) | seq,
        session_start_height: header.session_start_height,
        servicer_address: servicer,
        application_key: header.application_key.clone(),
        chain: header.chain.clone(),
        evidence_type: EvidenceType::Relay,
        signature: Sha256::digest(request_hash).to_vec(),
    }
}

async fn simulate(args: SimulateArgs, config: &AuditConfig) -> color_eyre::Result<()> {
    if args.workers == 0 || args.relays == 0 {
        return Err(eyre!("--relays and --workers must be positive"));
    }

    let params = config.params;
    let mut chain = InMemoryChain::new(params, args.seed.as_bytes());
    let (events_tx, mut events) = create_event_channel();
    let mut keeper = AuditKeeper::with_events(MemStore::new(), events_tx);
    let servicer = Servicer::new(args.servicer, EvidenceLedger::with_config(&config.evidence));
    let header = SessionHeader::new(args.app_key, args.chain, chain.current_height());

    info!(
        "Serving {} relays for {header} with {} workers",
        args.relays, args.workers
    );
    let tasks = (0..args.workers).map(|worker| {
        let servicer = servicer.clone();
        let header = header.clone();
        let share = args.relays / args.workers + u64::from(worker < args.relays % args.workers);
        tokio::spawn(async move {
            for seq in 0..share {
                servicer.record_relay(relay_record(&header, servicer.address(), worker, seq))?;
                tokio::task::yield_now().await;
            }
            Ok::<_, relay_audit::Error>(share)
        })
    });
    let mut served = 0;
    for result in futures::future::join_all(tasks).await {
        served += result??;
    }
    info!("Served {served} relays");

    // The session ends; the claim goes in before the lookahead block exists.
    chain.advance(params.blocks_per_session.saturating_sub(1));
    let claim = servicer.build_claim(&header, EvidenceType::Relay)?;
    let entry = keeper.submit_claim(&chain, claim)?;

    chain.advance_to(entry.lookahead_height);
    let proof = servicer.answer_audit(&chain, &entry)?;
    let receipt = keeper.submit_proof(&chain, &proof)?;
    servicer.release(&header, EvidenceType::Relay);

    while let Ok(event) = events.try_recv() {
        info!("Event: {event:?}");
    }

    println!("Receipt");
    println!("  servicer:      {}", receipt.servicer_address);
    println!("  session:       {}", receipt.header);
    println!("  evidence type: {}", receipt.evidence_type);
    println!("  total:         {}", receipt.total);
    println!("  audited index: {}", proof.proof.leaf_index);
    println!("  settled at:    {}", chain.current_height());
    Ok(())
}

fn derive_index(args: &DeriveIndexArgs) -> color_eyre::Result<()> {
    let header = SessionHeader::new(args.app_key.clone(), args.chain.clone(), args.start_height);
    header.validate()?;
    let index = index_from_entropy(&args.entropy, &header, args.total)?;
    println!("{index}");
    Ok(())
}

fn init_config(output: Option<PathBuf>, config: &AuditConfig) -> color_eyre::Result<()> {
    let path = output.unwrap_or_else(|| config.root_dir.join("config.toml"));
    if path.exists() {
        warn!("Overwriting {}", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    config.to_file(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
