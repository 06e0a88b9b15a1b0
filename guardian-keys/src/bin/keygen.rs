// Guardian Key Generation Tool
// Generates the Secp256k1 guardian signing key and the Ed25519 node key

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keygen")]
#[command(about = "Generate key files for a guardian node", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the guardian signing key (Secp256k1)
    Guardian {
        /// Output file path for the generated key
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Generate the node identity key (Ed25519)
    Node {
        /// Output file path for the generated key
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Examine an existing key file
    Examine {
        /// Path to the key file to examine
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Guardian { output } => {
            println!("Generating guardian signing key (Secp256k1)...");
            guardian_keys::keygen::generate_guardian_key_and_write_to_file(&output)?;
            println!("\n✓ Guardian key generated successfully!");
            println!("  File: {:?}", output);

            // Print derived guardian address so automation can parse it.
            // Format is intentionally stable: "Guardian address: 0x..."
            examine_key_file(&output)?;

            println!("\nIMPORTANT:");
            println!("  1. Keep this key file secure and backed up");
            println!("  2. Point the node's --guardian-key flag at this file");
        }
        Commands::Node { output } => {
            println!("Generating node identity key (Ed25519)...");
            guardian_keys::keygen::generate_node_key_and_write_to_file(&output)?;
            println!("\n✓ Node key generated successfully!");
            println!("  File: {:?}", output);
        }
        Commands::Examine { path } => {
            println!("Examining key file: {:?}", path);
            examine_key_file(&path)?;
        }
    }

    Ok(())
}

fn examine_key_file(path: &PathBuf) -> Result<()> {
    use fastcrypto::traits::{KeyPair, ToFromBytes};
    use guardian_keys::keypair_file::read_key;
    use guardian_keys::GuardianKey;

    let key = read_key(path, false)?;

    match key {
        GuardianKey::Secp256k1(kp) => {
            println!("Key type: Secp256k1");
            println!("Public key (hex): {}", hex::encode(kp.public().as_bytes()));
            let addr = guardian_keys::keygen::calculate_eth_address(kp.public());
            println!("Guardian address: 0x{}", hex::encode(addr));
        }
        GuardianKey::Ed25519(kp) => {
            println!("Key type: Ed25519");
            println!("Public key (hex): {}", hex::encode(kp.public().as_bytes()));
        }
    }

    Ok(())
}
