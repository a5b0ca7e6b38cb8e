//! NAMESTATE_META.json — crash-recovery anchor for the engine.
//!
//! Rules:
//! - Update only after a block is fully applied (all DB writes committed).
//! - Writes MUST be atomic: write temp → fsync → rename.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use eponym_consensus::{hex_decode_strict, Network, NetworkType};

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateMeta {
    pub schema_version: u32,
    pub network: String,
    pub tip_height: u32,
    pub tree_root: String,
}

fn network_name(network: &Network) -> &'static str {
    match network.net {
        NetworkType::Main => "main",
        NetworkType::Test => "test",
        NetworkType::Regtest => "regtest",
    }
}

impl StateMeta {
    /// Fresh meta for an empty engine.
    pub fn genesis(network: &Network) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            network: network_name(network).to_string(),
            tip_height: 0,
            tree_root: "00".repeat(32),
        }
    }

    /// Load meta from a JSON file, rejecting newer schemas and a network
    /// mismatch (opening a mainnet state dir with regtest params corrupts
    /// the trie).
    pub fn load(path: &Path, network: &Network) -> Result<Self, String> {
        let data = fs::read_to_string(path).map_err(|e| format!("read meta: {e}"))?;
        let m: StateMeta = serde_json::from_str(&data).map_err(|e| format!("parse meta: {e}"))?;
        if m.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(format!(
                "meta schema_version {} is newer than supported {}",
                m.schema_version, CURRENT_SCHEMA_VERSION,
            ));
        }
        if m.network != network_name(network) {
            return Err(format!(
                "meta network {} does not match configured {}",
                m.network,
                network_name(network),
            ));
        }
        Ok(m)
    }

    /// Atomically save meta: write to temp file → fsync → rename.
    pub fn save_atomic(&self, path: &Path) -> Result<(), String> {
        let dir = path
            .parent()
            .ok_or_else(|| "meta path has no parent dir".to_string())?;

        // Unique tmp name to avoid cross-test/process collisions.
        let pid = std::process::id();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let tmp_path = dir.join(format!(".NAMESTATE_META.json.tmp.{pid}.{nanos}"));

        let json =
            serde_json::to_string_pretty(self).map_err(|e| format!("serialize meta: {e}"))?;

        let mut f = fs::File::create(&tmp_path).map_err(|e| format!("create meta tmp: {e}"))?;
        f.write_all(json.as_bytes())
            .map_err(|e| format!("write meta tmp: {e}"))?;
        f.sync_all().map_err(|e| format!("fsync meta tmp: {e}"))?;
        drop(f);

        fs::rename(&tmp_path, path).map_err(|e| format!("rename meta: {e}"))?;

        // fsync parent directory for rename durability (POSIX requirement).
        if let Ok(dir_f) = fs::File::open(dir) {
            let _ = dir_f.sync_all();
        }

        Ok(())
    }

    /// Update tip fields after a block apply or revert.
    pub fn update(&mut self, tip_height: u32, tree_root: &[u8; 32]) {
        self.tip_height = tip_height;
        self.tree_root = hex::encode(tree_root);
    }

    /// Return the meta file path given a state directory.
    pub fn path_in(state_dir: &Path) -> PathBuf {
        state_dir.join("NAMESTATE_META.json")
    }

    /// Parse tree_root hex to 32 bytes.
    pub fn tree_root_bytes(&self) -> Result<[u8; 32], String> {
        let bytes = hex_decode_strict(&self.tree_root)?;
        if bytes.len() != 32 {
            return Err(format!("expected 32-byte hex, got {} bytes", bytes.len()));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(out)
    }
}
