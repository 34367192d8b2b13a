//! Key commands - provision and list signer identities

use colored::*;
use parley_crypto::KeyStore;

use crate::display;

pub const DEFAULT_SIGNERS: [&str; 5] = ["Alice", "Bob", "Charlie", "Diana", "Eve"];

/// Generate identities for names not already in the store
pub fn generate(store: &KeyStore, names: &[String]) -> anyhow::Result<()> {
    display::section("Generating Signer Identities");

    let names: Vec<&str> = if names.is_empty() {
        DEFAULT_SIGNERS.to_vec()
    } else {
        names.iter().map(String::as_str).collect()
    };

    let created = store.seed_signers(names.iter().copied())?;
    for identity in &created {
        display::success(&format!("{} generated", identity.name.bright_white()));
        display::kv("Public key", &identity.public_key.key);
    }
    for name in names.iter().filter(|n| !created.iter().any(|c| c.name == **n)) {
        display::info(&format!("{} already present", name));
    }

    println!();
    display::labeled("Signers in store", &store.list_signers().len().to_string());
    Ok(())
}

pub fn list(store: &KeyStore) -> anyhow::Result<()> {
    display::section("Signer Identities");

    let signers = store.list_signers();
    if signers.is_empty() {
        display::warning("No signers. Run `parley keys generate` first.");
        return Ok(());
    }

    for name in signers {
        let key = store
            .get_public(&name)
            .map(|k| k.key)
            .unwrap_or_else(|| "unavailable".to_string());
        println!("  {:<12} {}", name.bright_white(), key.bright_cyan());
    }
    Ok(())
}
