//! File-backed key store for signer identities
//!
//! **Security Invariant: Private keys never leave the store.**
//!
//! Public and private material live in two separate files inside the store
//! directory, each a JSON map of `name -> hex`. The private file is written
//! owner-only on Unix. Every change rewrites both files as one batch while
//! the store lock is held, so concurrent `generate_identity` calls cannot
//! interleave their writes or lose each other's updates.

use crate::{signature, CryptoError, CryptoResult, KeyPair, PublicKey, SignerIdentity};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// File holding `name -> public key hex`
pub const PUBLIC_KEYS_FILE: &str = "public_keys.json";
/// File holding `name -> private key hex`
pub const PRIVATE_KEYS_FILE: &str = "private_keys.json";

/// Owns every signer identity and its private key
pub struct KeyStore {
    entries: Mutex<BTreeMap<String, KeyPair>>,
    location: Option<StoreLocation>,
}

#[derive(Debug, Clone)]
struct StoreLocation {
    public_path: PathBuf,
    private_path: PathBuf,
}

impl KeyStore {
    /// A store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            location: None,
        }
    }

    /// Open (or create) a store rooted at `dir`.
    ///
    /// An unreadable or inconsistent store is reported as
    /// [`CryptoError::StoreCorrupted`]; no partial recovery is attempted.
    pub fn open(dir: impl AsRef<Path>) -> CryptoResult<Self> {
        let dir = dir.as_ref();
        create_private_dir(dir)?;

        let location = StoreLocation {
            public_path: dir.join(PUBLIC_KEYS_FILE),
            private_path: dir.join(PRIVATE_KEYS_FILE),
        };

        let public = read_key_map(&location.public_path)?;
        let private = read_key_map(&location.private_path)?;

        let mut entries = BTreeMap::new();
        for (name, secret_hex) in &private {
            let keypair = KeyPair::from_hex(secret_hex).map_err(|e| corrupted(&location.private_path, e))?;

            match public.get(name) {
                Some(public_hex) if *public_hex == keypair.public_key_hex() => {}
                Some(_) => {
                    return Err(corrupted(
                        &location.public_path,
                        format!("public key for {} does not match its private key", name),
                    ))
                }
                None => {
                    return Err(corrupted(
                        &location.public_path,
                        format!("missing public key for {}", name),
                    ))
                }
            }
            entries.insert(name.clone(), keypair);
        }

        if let Some(orphan) = public.keys().find(|name| !private.contains_key(*name)) {
            return Err(corrupted(
                &location.private_path,
                format!("missing private key for {}", orphan),
            ));
        }

        tracing::info!(
            signers = entries.len(),
            dir = %dir.display(),
            "Key store opened"
        );

        Ok(Self {
            entries: Mutex::new(entries),
            location: Some(location),
        })
    }

    /// Generate and persist a new identity
    pub fn generate_identity(&self, name: &str) -> CryptoResult<SignerIdentity> {
        let mut entries = self.lock()?;

        if entries.contains_key(name) {
            return Err(CryptoError::DuplicateName {
                name: name.to_string(),
            });
        }

        let keypair = KeyPair::generate()?;
        let public_key = PublicKey::from_keypair(&keypair);
        entries.insert(name.to_string(), keypair);

        if let Err(e) = self.persist(&entries) {
            entries.remove(name);
            return Err(e);
        }

        tracing::info!(signer = name, "Signer identity generated");

        Ok(SignerIdentity {
            name: name.to_string(),
            public_key,
        })
    }

    /// Generate identities for every name not already present
    pub fn seed_signers<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> CryptoResult<Vec<SignerIdentity>> {
        let mut created = Vec::new();
        for name in names {
            match self.generate_identity(name) {
                Ok(identity) => created.push(identity),
                Err(CryptoError::DuplicateName { .. }) => {
                    tracing::debug!(signer = name, "Signer already present, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }

    /// Remove an identity. Returns whether it existed.
    pub fn remove_identity(&self, name: &str) -> CryptoResult<bool> {
        let mut entries = self.lock()?;
        let Some(keypair) = entries.remove(name) else {
            return Ok(false);
        };

        if let Err(e) = self.persist(&entries) {
            entries.insert(name.to_string(), keypair);
            return Err(e);
        }
        Ok(true)
    }

    /// Public key for a signer, if known
    pub fn get_public(&self, name: &str) -> Option<PublicKey> {
        let entries = self.lock().ok()?;
        entries.get(name).map(PublicKey::from_keypair)
    }

    /// Full identity for a signer, if known
    pub fn identity(&self, name: &str) -> Option<SignerIdentity> {
        self.get_public(name).map(|public_key| SignerIdentity {
            name: name.to_string(),
            public_key,
        })
    }

    /// Private key for a signer. Crate-private: callers sign through [`KeyStore::sign`].
    pub(crate) fn get_private(&self, name: &str) -> Option<KeyPair> {
        let entries = self.lock().ok()?;
        entries.get(name).cloned()
    }

    /// Sign `message` with the named signer's key (the key never leaves the store)
    pub fn sign(&self, name: &str, message: &[u8]) -> CryptoResult<String> {
        let keypair = self.get_private(name).ok_or_else(|| CryptoError::UnknownSigner {
            name: name.to_string(),
        })?;
        signature::sign_message(&keypair, message)
    }

    /// Whether a signer exists
    pub fn contains(&self, name: &str) -> bool {
        self.lock().map(|e| e.contains_key(name)).unwrap_or(false)
    }

    /// All signer names, sorted
    pub fn list_signers(&self) -> Vec<String> {
        self.lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Uniformly pick one signer name
    pub fn pick_random_signer(&self) -> Option<String> {
        self.pick_random_signer_with(&mut rand::thread_rng())
    }

    /// Uniformly pick one signer name using the given RNG
    pub fn pick_random_signer_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        self.list_signers().choose(rng).cloned()
    }

    fn lock(&self) -> CryptoResult<MutexGuard<'_, BTreeMap<String, KeyPair>>> {
        self.entries.lock().map_err(|_| CryptoError::StoreCorrupted {
            path: self.describe(),
            message: "key store lock poisoned".to_string(),
        })
    }

    fn describe(&self) -> String {
        self.location
            .as_ref()
            .map(|l| l.private_path.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string())
    }

    fn persist(&self, entries: &BTreeMap<String, KeyPair>) -> CryptoResult<()> {
        let Some(location) = &self.location else {
            return Ok(());
        };

        let public: BTreeMap<&str, String> = entries
            .iter()
            .map(|(name, kp)| (name.as_str(), kp.public_key_hex()))
            .collect();
        let private: BTreeMap<&str, String> = entries
            .iter()
            .map(|(name, kp)| (name.as_str(), kp.secret_hex()))
            .collect();

        // Both files are staged before either replaces the live copy
        let public_tmp = stage_key_map(&location.public_path, &public, false)?;
        let private_tmp = match stage_key_map(&location.private_path, &private, true) {
            Ok(tmp) => tmp,
            Err(e) => {
                let _ = fs::remove_file(&public_tmp);
                return Err(e);
            }
        };

        fs::rename(&private_tmp, &location.private_path)?;
        fs::rename(&public_tmp, &location.public_path)?;
        Ok(())
    }
}

fn corrupted(path: &Path, message: impl ToString) -> CryptoError {
    CryptoError::StoreCorrupted {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

fn read_key_map(path: &Path) -> CryptoResult<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = fs::read_to_string(path).map_err(|e| corrupted(path, e))?;
    serde_json::from_str(&content).map_err(|e| corrupted(path, e))
}

/// Write `map` next to `path` as `<name>.json.tmp` and return the temp path
fn stage_key_map(path: &Path, map: &BTreeMap<&str, String>, private: bool) -> CryptoResult<PathBuf> {
    let json = serde_json::to_string_pretty(map).map_err(|e| corrupted(path, e))?;
    let tmp = path.with_extension("json.tmp");

    let written = fs::write(&tmp, json)
        .map_err(CryptoError::from)
        .and_then(|_| if private { restrict_to_owner(&tmp, 0o600) } else { Ok(()) });
    if let Err(e) = written {
        if tmp.is_file() {
            let _ = fs::remove_file(&tmp);
        }
        return Err(e);
    }
    Ok(tmp)
}

fn create_private_dir(dir: &Path) -> CryptoResult<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        restrict_to_owner(dir, 0o700)?;
    }
    Ok(())
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path, mode: u32) -> CryptoResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path, _mode: u32) -> CryptoResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sha256, verify_signature};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    #[test]
    fn test_generate_and_sign() {
        let store = KeyStore::in_memory();
        let identity = store.generate_identity("Alice").unwrap();

        let digest = sha256(b"payload");
        let signature = store.sign("Alice", &digest).unwrap();
        assert!(verify_signature(&identity.public_key, &digest, &signature));
    }

    #[test]
    fn test_failed_private_write_leaves_store_openable() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path()).unwrap();
        store.generate_identity("Alice").unwrap();

        let blocker = dir.path().join("private_keys.json.tmp");
        fs::create_dir(&blocker).unwrap();
        assert!(store.generate_identity("Bob").is_err());
        assert_eq!(store.list_signers(), vec!["Alice".to_string()]);
        assert!(!dir.path().join("public_keys.json.tmp").exists());

        fs::remove_dir(&blocker).unwrap();
        let reopened = KeyStore::open(dir.path()).unwrap();
        assert_eq!(reopened.list_signers(), vec!["Alice".to_string()]);
        reopened.generate_identity("Bob").unwrap();
        assert_eq!(KeyStore::open(dir.path()).unwrap().list_signers().len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let store = KeyStore::in_memory();
        store.generate_identity("Alice").unwrap();

        let result = store.generate_identity("Alice");
        assert!(matches!(result, Err(CryptoError::DuplicateName { .. })));
    }

    #[test]
    fn test_unknown_signer() {
        let store = KeyStore::in_memory();
        assert!(store.get_public("Nobody").is_none());
        assert!(matches!(
            store.sign("Nobody", b"x"),
            Err(CryptoError::UnknownSigner { .. })
        ));
    }

    #[test]
    fn test_list_and_pick() {
        let store = KeyStore::in_memory();
        assert!(store.pick_random_signer().is_none());

        store.seed_signers(["Charlie", "Alice", "Bob"]).unwrap();
        assert_eq!(store.list_signers(), vec!["Alice", "Bob", "Charlie"]);

        let mut rng = StdRng::seed_from_u64(7);
        let picked = store.pick_random_signer_with(&mut rng).unwrap();
        assert!(store.contains(&picked));
    }

    #[test]
    fn test_seed_skips_existing() {
        let store = KeyStore::in_memory();
        store.generate_identity("Alice").unwrap();

        let created = store.seed_signers(["Alice", "Bob"]).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "Bob");
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();

        let alice = {
            let store = KeyStore::open(dir.path()).unwrap();
            store.generate_identity("Alice").unwrap()
        };

        let reopened = KeyStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get_public("Alice"), Some(alice.public_key));
        assert!(dir.path().join(PUBLIC_KEYS_FILE).exists());
        assert!(dir.path().join(PRIVATE_KEYS_FILE).exists());
    }

    #[test]
    fn test_remove_identity_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path()).unwrap();
        store.seed_signers(["Alice", "Bob"]).unwrap();

        assert!(store.remove_identity("Alice").unwrap());
        assert!(!store.remove_identity("Alice").unwrap());

        let reopened = KeyStore::open(dir.path()).unwrap();
        assert_eq!(reopened.list_signers(), vec!["Bob"]);
    }

    #[test]
    fn test_corrupted_store_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PRIVATE_KEYS_FILE), "{not json").unwrap();

        assert!(matches!(
            KeyStore::open(dir.path()),
            Err(CryptoError::StoreCorrupted { .. })
        ));
    }

    #[test]
    fn test_mismatched_public_key_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = KeyStore::open(dir.path()).unwrap();
            store.generate_identity("Alice").unwrap();
        }
        let other = KeyPair::generate().unwrap();
        let tampered = serde_json::json!({ "Alice": other.public_key_hex() });
        fs::write(dir.path().join(PUBLIC_KEYS_FILE), tampered.to_string()).unwrap();

        assert!(matches!(
            KeyStore::open(dir.path()),
            Err(CryptoError::StoreCorrupted { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_private_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path()).unwrap();
        store.generate_identity("Alice").unwrap();

        let mode = fs::metadata(dir.path().join(PRIVATE_KEYS_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_concurrent_generation_loses_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(KeyStore::open(dir.path()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.generate_identity(&format!("signer-{}", i)).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reopened = KeyStore::open(dir.path()).unwrap();
        assert_eq!(reopened.list_signers().len(), 8);
    }
}
