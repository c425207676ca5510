use crate::core::signature::{generate_secret_key, public_key_from_secret};
use crate::core::Signature;
use crate::error::{ChainError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub const IDENTITY_FILE: &str = "identity.json";

/// A node's secp256k1 keypair. The secret is wiped when the identity is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Identity {
    public_key: Vec<u8>,
    secret_key: [u8; 32],
}

// On-disk form, hex encoded
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct IdentityFile {
    public_key: String,
    secret_key: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &hex::encode(&self.public_key))
            .finish_non_exhaustive()
    }
}

impl Identity {
    pub fn generate() -> Result<Identity> {
        let secret_key = generate_secret_key()?;
        Self::from_secret_key(&secret_key)
    }

    pub fn from_secret_key(secret_key: &[u8]) -> Result<Identity> {
        let public_key = public_key_from_secret(secret_key)?;
        let mut secret = [0u8; 32];
        secret.copy_from_slice(secret_key);
        Ok(Identity {
            public_key,
            secret_key: secret,
        })
    }

    /// Load the identity stored in `keystore_dir`, creating and persisting a new
    /// one the first time. Later calls return the same keypair.
    pub fn load_or_create(keystore_dir: &Path) -> Result<Identity> {
        let path = Self::path(keystore_dir);
        if path.exists() {
            return Self::read_from_file(&path);
        }

        let identity = Self::generate()?;
        identity.write_to_file(&path)?;
        info!("Created node identity at {}", path.display());
        Ok(identity)
    }

    pub fn read_from_file(path: &Path) -> Result<Identity> {
        let contents = Zeroizing::new(fs::read_to_string(path)?);
        let file: IdentityFile = serde_json::from_str(&contents)?;

        let secret_key = Zeroizing::new(hex::decode(&file.secret_key)?);
        if secret_key.len() != 32 {
            return Err(ChainError::Crypto(format!(
                "Secret key in {} has {} bytes, expected 32",
                path.display(),
                secret_key.len()
            )));
        }

        let identity = Self::from_secret_key(&secret_key)?;
        if hex::decode(&file.public_key)? != identity.public_key {
            return Err(ChainError::Crypto(format!(
                "Public key in {} does not match its secret key",
                path.display()
            )));
        }
        Ok(identity)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = IdentityFile {
            public_key: hex::encode(&self.public_key),
            secret_key: hex::encode(self.secret_key),
        };
        let contents = Zeroizing::new(serde_json::to_string_pretty(&file)?);

        let mut options = OpenOptions::new();
        options.create(true).truncate(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut writer = BufWriter::new(options.open(path)?);
        writer.write_all(contents.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    pub fn path(keystore_dir: &Path) -> PathBuf {
        keystore_dir.join(IDENTITY_FILE)
    }

    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        Signature::sign(message, &self.secret_key)
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn secret_key(&self) -> &[u8; 32] {
        &self.secret_key
    }
}
