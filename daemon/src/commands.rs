//! Key and proof subcommands.

use anyhow::Context;
use serde_json::json;
use sortes_crypto::{PublicKey, U256};
use sortes_keystore::{FileBackend, VrfKeyStore};
use sortes_node::NodeConfig;
use sortes_types::u256_to_word;
use sortes_vrf::{solidity_precalculations, verify_solidity_proof};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(clap::Subcommand)]
pub enum KeysAction {
    /// Generate a new key and store it encrypted.
    Create {
        #[arg(long, env = "SORTES_KEY_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
    },
    /// List stored keys.
    List,
    /// Import an encrypted key file.
    Import {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, env = "SORTES_KEY_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
    },
    /// Export a key as an encrypted key file.
    Export {
        #[arg(long)]
        public_key: PublicKey,
        #[arg(long, env = "SORTES_KEY_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
        /// Write here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete a key, or move it to the archive with `--archive`.
    Delete {
        #[arg(long)]
        public_key: PublicKey,
        #[arg(long)]
        archive: bool,
    },
}

#[derive(clap::Subcommand)]
pub enum ProofAction {
    /// Prove a seed with a stored key and print the on-chain proof.
    Generate {
        #[arg(long)]
        public_key: PublicKey,
        /// Seed as decimal or 0x-prefixed hex.
        #[arg(long, value_parser = parse_u256)]
        seed: U256,
        #[arg(long, env = "SORTES_KEY_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
    },
    /// Check a 416-byte hex proof and print its output.
    Verify {
        #[arg(long)]
        proof: String,
    },
}

fn parse_u256(s: &str) -> Result<U256, String> {
    match s.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => U256::from_dec_str(s).map_err(|e| e.to_string()),
    }
}

fn open_keystore(config: &NodeConfig) -> anyhow::Result<VrfKeyStore> {
    let backend = FileBackend::open(&config.keystore_dir)
        .with_context(|| format!("opening keystore {}", config.keystore_dir.display()))?;
    Ok(VrfKeyStore::new(Arc::new(backend), config.kdf))
}

fn word_hex(value: &U256) -> String {
    format!("0x{}", hex::encode(u256_to_word(value)))
}

pub fn run_keys(config: &NodeConfig, action: KeysAction) -> anyhow::Result<()> {
    let keystore = open_keystore(config)?;
    match action {
        KeysAction::Create { passphrase } => {
            let public_key = keystore.create(&passphrase)?;
            println!("{public_key}");
        }
        KeysAction::List => {
            for public_key in keystore.list()? {
                println!("{public_key}");
            }
        }
        KeysAction::Import { file, passphrase } => {
            let json = std::fs::read(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let public_key = keystore.import(&json, &passphrase)?;
            println!("{public_key}");
        }
        KeysAction::Export {
            public_key,
            passphrase,
            out,
        } => {
            keystore.unlock(&passphrase)?;
            let json = keystore.export(&public_key, &passphrase)?;
            match out {
                Some(path) => std::fs::write(&path, &json)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{}", String::from_utf8_lossy(&json)),
            }
        }
        KeysAction::Delete {
            public_key,
            archive,
        } => {
            if archive {
                keystore.archive(&public_key)?;
            } else {
                keystore.delete(&public_key)?;
            }
        }
    }
    Ok(())
}

pub fn run_proof(config: &NodeConfig, action: ProofAction) -> anyhow::Result<()> {
    match action {
        ProofAction::Generate {
            public_key,
            seed,
            passphrase,
        } => {
            let keystore = open_keystore(config)?;
            keystore.unlock(&passphrase)?;
            let proof = keystore.prove(&public_key, seed)?;
            let encoded = solidity_precalculations(&proof)?.marshal_for_solidity_verifier();
            let report = json!({
                "public_key": public_key.to_string(),
                "seed": word_hex(&seed),
                "output": word_hex(&proof.output),
                "proof": format!("0x{}", hex::encode(encoded)),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        ProofAction::Verify { proof } => {
            let bytes = hex::decode(proof.strip_prefix("0x").unwrap_or(&proof))
                .context("proof is not valid hex")?;
            let output = verify_solidity_proof(&bytes)?;
            println!("{}", word_hex(&output));
        }
    }
    Ok(())
}
