//! xrd-verify CLI - offline verification of signed federated messages.
//!
//! Reads certificates, OCSP responses, signatures and hash chains from files
//! and runs the corresponding verifier against a trust store assembled from
//! the command line.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use xrd_verify_core::hashchain::{inputs_from, HashChainVerifier};
use xrd_verify_core::resolver::{MapResolver, PartContent};
use xrd_verify_core::signature::{MessagePart, SignatureContainer, SignatureVerifier};
use xrd_verify_core::{
    CertChainVerifier, CertStatus, Certificate, Identity, OcspResponse, OcspValidityCache,
    OcspVerifier, TrustError, TrustSnapshot, TrustStore, VerifierConfig,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// xrd-verify - verify certificate chains, OCSP responses, hash chains and
/// message signatures of a federated message exchange.
#[derive(Parser)]
#[command(name = "xrd-verify")]
#[command(version = VERSION)]
#[command(about = "Offline trust verification for signed federated messages")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a signature over message parts
    Signature {
        /// Signature document
        #[arg(long)]
        signature: PathBuf,

        /// Hash chain result of a batch signature
        #[arg(long)]
        hash_chain_result: Option<PathBuf>,

        /// Hash chain of a batch signature
        #[arg(long, requires = "hash_chain_result")]
        hash_chain: Option<PathBuf>,

        /// Message part as NAME=FILE, e.g. /message.xml=body.xml
        #[arg(long = "part", value_parser = parse_named_path)]
        parts: Vec<(String, PathBuf)>,

        /// Expected signer as INSTANCE/CLASS/CODE
        #[arg(long)]
        signer: Option<Identity>,

        /// Verification time (RFC 3339); validity windows are skipped without it
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        #[command(flatten)]
        trust: TrustArgs,
    },

    /// Verify an OCSP response and report the certificate status
    Ocsp {
        /// DER OCSP response
        #[arg(long)]
        response: PathBuf,

        /// Certificate the response is about
        #[arg(long)]
        subject: PathBuf,

        /// Issuer of the subject certificate
        #[arg(long)]
        issuer: PathBuf,

        /// Verification time (RFC 3339), now by default
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        #[command(flatten)]
        trust: TrustArgs,
    },

    /// Build and verify a certificate chain
    Chain {
        /// End-entity certificate
        #[arg(long)]
        cert: PathBuf,

        /// Additional candidate issuers
        #[arg(long)]
        pool: Vec<PathBuf>,

        /// DER OCSP responses for the chain
        #[arg(long)]
        ocsp: Vec<PathBuf>,

        /// Skip revocation checking
        #[arg(long)]
        chain_only: bool,

        /// Verification time (RFC 3339); validity windows are skipped without it
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        #[command(flatten)]
        trust: TrustArgs,
    },

    /// Verify a hash chain result against message parts
    Hashchain {
        /// Hash chain result document
        #[arg(long)]
        result: PathBuf,

        /// Hash chain document as NAME=FILE, NAME being the file part of
        /// the URIs that reference it
        #[arg(long = "chain", value_parser = parse_named_path)]
        chains: Vec<(String, PathBuf)>,

        /// Message part as NAME=FILE
        #[arg(long = "part", value_parser = parse_named_path)]
        parts: Vec<(String, PathBuf)>,
    },
}

/// Trust store contents.
#[derive(Args)]
struct TrustArgs {
    /// Trust anchor certificate file (PEM or DER, may hold several)
    #[arg(long)]
    anchor: Vec<PathBuf>,

    /// Intermediate CA certificate file
    #[arg(long)]
    intermediate: Vec<PathBuf>,

    /// OCSP responder as CA_FILE=RESPONDER_FILE
    #[arg(long, value_parser = parse_responder)]
    responder: Vec<(PathBuf, PathBuf)>,

    /// Maximum certificate path length, trust anchor included
    #[arg(long, default_value = "16")]
    max_depth: usize,

    /// Accept OCSP responses whose nextUpdate has passed
    #[arg(long)]
    ignore_next_update: bool,

    /// Reject OCSP responses older than this many seconds
    #[arg(long)]
    ocsp_freshness: Option<u64>,
}

/// Outcome printed for every command.
#[derive(Serialize)]
struct Report {
    command: &'static str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cert_status: Option<CertStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chain: Option<Vec<ChainEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorReport>,
}

#[derive(Serialize)]
struct ChainEntry {
    subject: String,
    sha256: String,
}

#[derive(Serialize)]
struct ErrorReport {
    code: &'static str,
    category: xrd_verify_core::ErrorCategory,
    message: String,
    tamper_signal: bool,
}

impl Report {
    fn pass(command: &'static str) -> Self {
        Self {
            command,
            status: "pass",
            cert_status: None,
            chain: None,
            error: None,
        }
    }

    fn fail(command: &'static str, e: &TrustError) -> Self {
        Self {
            command,
            status: "fail",
            cert_status: None,
            chain: None,
            error: Some(ErrorReport {
                code: e.code(),
                category: e.category(),
                message: e.to_string(),
                tamper_signal: e.is_tamper_signal(),
            }),
        }
    }
}

fn parse_named_path(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        },
        _ => Err(format!("expected NAME=FILE, got '{s}'")),
    }
}

fn parse_responder(s: &str) -> Result<(PathBuf, PathBuf), String> {
    parse_named_path(s).map(|(ca, responder)| (PathBuf::from(ca), responder))
}

/// Read a file, reporting failures as the error a missing input would cause.
fn read(path: &Path) -> Result<Vec<u8>, TrustError> {
    std::fs::read(path).map_err(|e| TrustError::InvalidReference {
        uri: format!("{}: {e}", path.display()),
    })
}

fn load_certs(path: &Path) -> Result<Vec<Certificate>, TrustError> {
    Certificate::from_pem_or_der(&read(path)?)
}

fn load_cert(path: &Path) -> Result<Certificate, TrustError> {
    load_certs(path)?
        .into_iter()
        .next()
        .ok_or_else(|| TrustError::malformed_signature(format!("{} holds no certificate", path.display())))
}

impl TrustArgs {
    fn snapshot(&self) -> Result<TrustSnapshot, TrustError> {
        let config = VerifierConfig {
            max_path_depth: self.max_depth,
            verify_next_update: !self.ignore_next_update,
            ocsp_freshness: self.ocsp_freshness.map(Duration::from_secs),
            ..VerifierConfig::default()
        };

        let mut builder = TrustSnapshot::builder().config(config);
        for path in &self.anchor {
            builder = builder.anchors(load_certs(path)?);
        }
        for path in &self.intermediate {
            builder = builder.intermediates(load_certs(path)?);
        }
        for (ca, responder) in &self.responder {
            builder = builder.ocsp_responder(&load_cert(ca)?, load_cert(responder)?);
        }
        Ok(builder.build())
    }
}

fn run(command: Commands) -> Result<Report, (&'static str, TrustError)> {
    match command {
        Commands::Signature {
            signature,
            hash_chain_result,
            hash_chain,
            parts,
            signer,
            at,
            trust,
        } => run_signature(
            &signature,
            hash_chain_result.as_deref(),
            hash_chain.as_deref(),
            &parts,
            signer.as_ref(),
            at,
            &trust,
        )
        .map_err(|e| ("signature", e)),
        Commands::Ocsp {
            response,
            subject,
            issuer,
            at,
            trust,
        } => run_ocsp(&response, &subject, &issuer, at, &trust).map_err(|e| ("ocsp", e)),
        Commands::Chain {
            cert,
            pool,
            ocsp,
            chain_only,
            at,
            trust,
        } => run_chain(&cert, &pool, &ocsp, chain_only, at, &trust).map_err(|e| ("chain", e)),
        Commands::Hashchain {
            result,
            chains,
            parts,
        } => run_hashchain(&result, &chains, &parts).map_err(|e| ("hashchain", e)),
    }
}

fn run_signature(
    signature: &Path,
    hash_chain_result: Option<&Path>,
    hash_chain: Option<&Path>,
    parts: &[(String, PathBuf)],
    signer: Option<&Identity>,
    at: Option<DateTime<Utc>>,
    trust: &TrustArgs,
) -> Result<Report, TrustError> {
    let mut container = SignatureContainer::new(read(signature)?);
    if let Some(result) = hash_chain_result {
        let chain = hash_chain.map(read).transpose()?;
        container = container.with_hash_chain(read(result)?, chain);
    }
    let parts = parts
        .iter()
        .map(|(name, path)| Ok(MessagePart::from_bytes(name.clone(), read(path)?)))
        .collect::<Result<Vec<_>, TrustError>>()?;

    let snapshot = trust.snapshot()?;
    let cache = Arc::new(OcspValidityCache::from_config(snapshot.config()));
    let verifier = SignatureVerifier::new(TrustStore::new(snapshot), Some(cache));
    verifier.verify(&container, signer, at, &parts)?;
    Ok(Report::pass("signature"))
}

fn run_ocsp(
    response: &Path,
    subject: &Path,
    issuer: &Path,
    at: Option<DateTime<Utc>>,
    trust: &TrustArgs,
) -> Result<Report, TrustError> {
    let response = OcspResponse::from_der(&read(response)?)?;
    let subject = load_cert(subject)?;
    let issuer = load_cert(issuer)?;
    let snapshot = trust.snapshot()?;

    let status = OcspVerifier::new(&snapshot).verify_validity_and_status(
        &response,
        &subject,
        &issuer,
        at.unwrap_or_else(Utc::now),
    )?;
    Ok(Report {
        cert_status: Some(status),
        ..Report::pass("ocsp")
    })
}

fn run_chain(
    cert: &Path,
    pool: &[PathBuf],
    ocsp: &[PathBuf],
    chain_only: bool,
    at: Option<DateTime<Utc>>,
    trust: &TrustArgs,
) -> Result<Report, TrustError> {
    let cert = load_cert(cert)?;
    let mut candidates = Vec::new();
    for path in pool {
        candidates.extend(load_certs(path)?);
    }
    let responses = ocsp
        .iter()
        .map(|path| OcspResponse::from_der(&read(path)?))
        .collect::<Result<Vec<_>, _>>()?;

    let snapshot = trust.snapshot()?;
    let verifier = CertChainVerifier::new(&snapshot);
    let chain = verifier.build_chain(&cert, &candidates)?;
    debug!(len = chain.len(), "chain built");
    if chain_only {
        verifier.verify_chain_only(&chain, at)?;
    } else {
        verifier.verify(&chain, &responses, at)?;
    }

    Ok(Report {
        chain: Some(
            chain
                .iter()
                .map(|c| ChainEntry {
                    subject: c.subject().to_string(),
                    sha256: hex::encode(c.fingerprint()),
                })
                .collect(),
        ),
        ..Report::pass("chain")
    })
}

fn run_hashchain(
    result: &Path,
    chains: &[(String, PathBuf)],
    parts: &[(String, PathBuf)],
) -> Result<Report, TrustError> {
    let mut resolver = MapResolver::new();
    for (name, path) in chains {
        resolver.insert(name.clone(), read(path)?);
    }
    let inputs: HashMap<String, Option<PartContent>> = inputs_from(
        parts
            .iter()
            .map(|(name, path)| Ok((name.clone(), Some(PartContent::Bytes(read(path)?)))))
            .collect::<Result<Vec<_>, TrustError>>()?,
    );

    HashChainVerifier::new(&resolver).verify(&read(result)?, &inputs)?;
    Ok(Report::pass("hashchain"))
}

fn print_report(report: &Report, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("cannot serialize report: {e}"),
        }
        return;
    }

    match &report.error {
        None => println!("\x1b[32m[PASS]\x1b[0m {}", report.command),
        Some(error) => {
            println!("\x1b[31m[FAIL]\x1b[0m {}: {}", report.command, error.message);
            println!("  code:     {}", error.code);
            println!("  category: {:?}", error.category);
            if error.tamper_signal {
                println!("  content was altered after signing");
            }
        },
    }
    if let Some(status) = &report.cert_status {
        println!("  status:   {status}");
    }
    if let Some(chain) = &report.chain {
        for (depth, entry) in chain.iter().enumerate() {
            println!("  [{depth}] {}", entry.subject);
            println!("      sha256: {}", entry.sha256);
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_output = cli.format == "json";

    // Logs go to stderr so JSON output stays parseable.
    let level = match (json_output, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let report = match run(cli.command) {
        Ok(report) => report,
        Err((command, e)) => Report::fail(command, &e),
    };
    print_report(&report, json_output);

    if report.error.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
#[path = "../../tests/it/support.rs"]
mod support;
