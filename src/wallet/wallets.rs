use crate::error::Result;
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const WALLET_FILE: &str = "wallet.dat";

/// Wallet file keyed by voter id.
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
    path: PathBuf,
}

impl Wallets {
    /// Open the wallet file at `path`; a missing or unreadable file starts empty.
    pub fn open(path: &Path) -> Wallets {
        let mut wallets = Wallets {
            wallets: HashMap::new(),
            path: path.to_path_buf(),
        };
        wallets.load_from_file();
        wallets
    }

    /// `wallet.dat` inside `dir`
    pub fn open_in(dir: &Path) -> Wallets {
        Self::open(&dir.join(WALLET_FILE))
    }

    pub fn create_wallet(&mut self, display_name: Option<String>) -> Result<String> {
        let wallet = Wallet::new(display_name)?;
        let voter_id = wallet.get_voter_id();
        self.wallets.insert(voter_id.clone(), wallet);
        self.save_to_file()?;
        Ok(voter_id)
    }

    pub fn get_voter_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.wallets.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn get_wallet(&self, voter_id: &str) -> Option<&Wallet> {
        self.wallets.get(voter_id)
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    fn load_from_file(&mut self) {
        if let Err(e) = self.load_from_file_safe() {
            log::warn!("Could not load wallets from {}: {e}", self.path.display());
        }
    }

    fn load_from_file_safe(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut file = File::open(&self.path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        self.wallets = deserialize(&buf)?;
        Ok(())
    }

    fn save_to_file(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&serialize(&self.wallets)?)?;
        writer.flush()?;
        Ok(())
    }
}
