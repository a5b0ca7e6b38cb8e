//! Shared fixtures: a flat commitment-trie double, in-memory coin and
//! chain views, and covenant transaction builders.

use std::collections::{BTreeMap, HashMap, HashSet};

use eponym_consensus::{
    blake2b256, hash_name, Covenant, Network, Tx, TxInput, TxOutPoint, TxOutput,
};
use eponym_namestate::{ChainEntry, ChainView, CoinView, CommitmentTrie, NameEngine, Store, WriteBatch};

// ---------------------------------------------------------------------------
// FlatTrie — authenticated-map double with internal buffering
// ---------------------------------------------------------------------------

/// Stores leaves directly in the trie bucket; the root is a digest over the
/// sorted leaf set. Buffers staged changes exactly as the engine expects:
/// `root_hash` sees them, `commit_to` lands them, `rollback` drops them.
pub struct FlatTrie {
    committed: BTreeMap<[u8; 32], [u8; 32]>,
    staged: BTreeMap<[u8; 32], Option<[u8; 32]>>,
}

impl FlatTrie {
    pub fn new() -> Self {
        Self {
            committed: BTreeMap::new(),
            staged: BTreeMap::new(),
        }
    }

    pub fn load(store: &Store) -> Result<Self, String> {
        let mut committed = BTreeMap::new();
        store.iter_trie(|k, v| {
            if k.len() == 32 && v.len() == 32 {
                let mut key = [0u8; 32];
                key.copy_from_slice(k);
                let mut value = [0u8; 32];
                value.copy_from_slice(v);
                committed.insert(key, value);
            }
        })?;
        Ok(Self {
            committed,
            staged: BTreeMap::new(),
        })
    }

    fn effective(&self) -> BTreeMap<[u8; 32], [u8; 32]> {
        let mut map = self.committed.clone();
        for (key, value) in &self.staged {
            match value {
                Some(value) => {
                    map.insert(*key, *value);
                }
                None => {
                    map.remove(key);
                }
            }
        }
        map
    }
}

impl CommitmentTrie for FlatTrie {
    fn insert(&mut self, key: [u8; 32], value: [u8; 32]) -> Result<(), String> {
        self.staged.insert(key, Some(value));
        Ok(())
    }

    fn remove(&mut self, key: [u8; 32]) -> Result<(), String> {
        self.staged.insert(key, None);
        Ok(())
    }

    fn root_hash(&self) -> [u8; 32] {
        root_of(&self.effective())
    }

    fn commit_to(&mut self, batch: &WriteBatch) -> Result<(), String> {
        for (key, value) in std::mem::take(&mut self.staged) {
            match value {
                Some(value) => {
                    batch.put_trie_node(&key, &value)?;
                    self.committed.insert(key, value);
                }
                None => {
                    batch.del_trie_node(&key)?;
                    self.committed.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn rollback(&mut self) {
        self.staged.clear();
    }
}

pub fn root_of(leaves: &BTreeMap<[u8; 32], [u8; 32]>) -> [u8; 32] {
    let mut buf = Vec::with_capacity(leaves.len() * 64);
    for (key, value) in leaves {
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);
    }
    blake2b256(&buf)
}

/// Root the engine must reach once `entries` (name, record) are the only
/// live commitments. Computed independently of the trie double's buffering.
pub fn expected_root(entries: &[(&[u8], &[u8])]) -> [u8; 32] {
    let mut leaves = BTreeMap::new();
    for (name, record) in entries {
        leaves.insert(hash_name(name), blake2b256(record));
    }
    root_of(&leaves)
}

// ---------------------------------------------------------------------------
// In-memory coin and chain views
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemCoins {
    outputs: HashMap<TxOutPoint, TxOutput>,
}

impl MemCoins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every output of `tx` so later blocks can spend them. Coins
    /// are never dropped, which is exactly the restore behavior disconnect
    /// relies on.
    pub fn index_tx(&mut self, tx: &Tx) {
        for (i, out) in tx.outputs.iter().enumerate() {
            self.outputs
                .insert(TxOutPoint::new(tx.hash, i as u32), out.clone());
        }
    }
}

impl CoinView for MemCoins {
    fn get_output(&self, prevout: &TxOutPoint) -> Result<Option<TxOutput>, String> {
        Ok(self.outputs.get(prevout).cloned())
    }
}

#[derive(Default)]
pub struct MemChain {
    entries: HashMap<[u8; 32], ChainEntry>,
    main: HashSet<[u8; 32]>,
}

impl MemChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, hash: [u8; 32], height: u32, on_main: bool) {
        self.entries.insert(hash, ChainEntry { hash, height });
        if on_main {
            self.main.insert(hash);
        }
    }
}

impl ChainView for MemChain {
    fn get_entry(&self, block_hash: &[u8; 32]) -> Result<Option<ChainEntry>, String> {
        Ok(self.entries.get(block_hash).copied())
    }

    fn is_main_chain(&self, entry: &ChainEntry) -> Result<bool, String> {
        Ok(self.main.contains(&entry.hash))
    }
}

// ---------------------------------------------------------------------------
// Transaction builders
// ---------------------------------------------------------------------------

pub fn txid(n: u8) -> [u8; 32] {
    [n; 32]
}

pub fn tx(hash_byte: u8, spends: Vec<TxOutPoint>, outputs: Vec<TxOutput>) -> Tx {
    Tx {
        hash: txid(hash_byte),
        inputs: spends
            .into_iter()
            .map(|prevout| TxInput { prevout })
            .collect(),
        outputs,
    }
}

pub fn outpoint(hash_byte: u8, vout: u32) -> TxOutPoint {
    TxOutPoint::new(txid(hash_byte), vout)
}

pub fn bid_output(name: &[u8], value: u64) -> TxOutput {
    TxOutput {
        value,
        covenant: Covenant::Bid {
            name: name.to_vec(),
        },
    }
}

pub fn reveal_output(name: &[u8], value: u64) -> TxOutput {
    TxOutput {
        value,
        covenant: Covenant::Reveal {
            name_hash: hash_name(name),
        },
    }
}

pub fn redeem_output(name: &[u8], value: u64) -> TxOutput {
    TxOutput {
        value,
        covenant: Covenant::Redeem {
            name_hash: hash_name(name),
        },
    }
}

pub fn update_output(name: &[u8], value: u64, data: &[u8]) -> TxOutput {
    TxOutput {
        value,
        covenant: Covenant::Update {
            name_hash: hash_name(name),
            data: data.to_vec(),
            renewal_block: None,
        },
    }
}

pub fn renewal_output(name: &[u8], value: u64, data: &[u8], block: [u8; 32]) -> TxOutput {
    TxOutput {
        value,
        covenant: Covenant::Update {
            name_hash: hash_name(name),
            data: data.to_vec(),
            renewal_block: Some(block),
        },
    }
}

pub fn transfer_output(name: &[u8], value: u64) -> TxOutput {
    TxOutput {
        value,
        covenant: Covenant::Transfer {
            name_hash: hash_name(name),
        },
    }
}

pub fn release_output(name: &[u8], value: u64) -> TxOutput {
    TxOutput {
        value,
        covenant: Covenant::Release {
            name_hash: hash_name(name),
        },
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub engine: NameEngine<FlatTrie>,
    pub coins: MemCoins,
    pub chain: MemChain,
    /// Blocks connected so far, oldest first, for replaying reorgs.
    pub blocks: Vec<(u32, Vec<Tx>)>,
}

impl Harness {
    pub fn new(network: Network) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let engine = NameEngine::open(dir.path(), network, FlatTrie::new()).unwrap();
        Self {
            dir,
            engine,
            coins: MemCoins::new(),
            chain: MemChain::new(),
            blocks: Vec::new(),
        }
    }

    pub fn regtest() -> Self {
        Self::new(Network::regtest())
    }

    /// Connect a block whose post-state commits exactly `committed`
    /// (name, record) pairs; panics if the engine rejects it.
    pub fn connect(&mut self, height: u32, txs: Vec<Tx>, committed: &[(&[u8], &[u8])]) {
        for tx in &txs {
            self.coins.index_tx(tx);
        }
        let root = expected_root(committed);
        let ok = self
            .engine
            .connect_block(&txs, height, &root, &self.coins, &self.chain)
            .unwrap();
        assert!(ok, "block at height {height} was rejected");
        self.blocks.push((height, txs));
    }

    /// Disconnect the most recently connected block.
    pub fn disconnect_tip(&mut self) {
        let (height, txs) = self.blocks.pop().expect("no block to disconnect");
        self.engine
            .disconnect_block(&txs, height, &self.coins)
            .unwrap();
    }

    /// Full dump of namestate keys, trie nodes and the live root.
    pub fn snapshot(&self) -> (Vec<(Vec<u8>, Vec<u8>)>, Vec<(Vec<u8>, Vec<u8>)>, [u8; 32]) {
        let mut kv = Vec::new();
        self.engine
            .store()
            .iter_all(|k, v| kv.push((k.to_vec(), v.to_vec())))
            .unwrap();
        let mut trie = Vec::new();
        self.engine
            .store()
            .iter_trie(|k, v| trie.push((k.to_vec(), v.to_vec())))
            .unwrap();
        (kv, trie, self.engine.tree_root())
    }
}
