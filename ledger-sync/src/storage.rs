//! Storage backend using RocksDB
//!
//! # Column Families
//!
//! - `state` - Key/value state table (last closed ledger pointer)
//! - `accounts` - Account rows (key: leaf key)
//! - `trust_lines` - Trust line rows (key: leaf key)
//! - `offers` - Offer rows (key: leaf key)
//! - `headers` - Ledger headers (key: ledger hash)
//! - `ledgers` - Per-ledger leaf index (key: ledger hash)
//! - `nodes` - Leaf bodies (key: leaf hash)

use crate::{
    config::RocksDBConfig,
    database::{Backend, EntryTable, Space, WriteOp},
    error::{Error, Result},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use std::sync::Arc;

/// Exclusive upper bound used when clearing a column family
const CLEAR_UPPER_BOUND: [u8; 33] = [0xff; 33];

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    sync_writes: bool,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let db_opts = Self::db_options(&config.rocksdb);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = Space::ALL
            .iter()
            .map(|space| ColumnFamilyDescriptor::new(space.name(), Self::cf_options(*space)))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            column_families = Space::ALL.len(),
            sync_writes = config.rocksdb.sync_writes,
            "Opened RocksDB"
        );

        Ok(Self {
            db: Arc::new(db),
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    fn db_options(config: &RocksDBConfig) -> Options {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            config.level0_file_num_compaction_trigger,
        );

        // Full imports rewrite every row; universal compaction handles the bursts
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.enable_statistics {
            db_opts.enable_statistics();
        }
        db_opts
    }

    fn cf_options(space: Space) -> Options {
        let mut opts = Options::default();
        match space {
            // Rows and state are read on every sync, use LZ4 for speed
            Space::State | Space::Accounts | Space::TrustLines | Space::Offers => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            }
            // History is only read back on restart
            Space::Headers | Space::Ledgers => {
                opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
            }
            Space::Nodes => {
                opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
                let mut block_opts = rocksdb::BlockBasedOptions::default();
                block_opts.set_bloom_filter(10.0, false); // point reads while rebuilding a ledger
                opts.set_block_based_table_factory(&block_opts);
            }
        }
        opts
    }

    fn cf_handle(&self, space: Space) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(space.name())
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", space.name())))
    }

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            accounts: self.approximate_count(EntryTable::Accounts.space())?,
            trust_lines: self.approximate_count(EntryTable::TrustLines.space())?,
            offers: self.approximate_count(EntryTable::Offers.space())?,
            stored_ledgers: self.approximate_count(Space::Headers)?,
        })
    }

    fn approximate_count(&self, space: Space) -> Result<u64> {
        let cf = self.cf_handle(space)?;
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

impl Backend for Storage {
    fn get(&self, space: Space, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(space)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    fn scan(&self, space: Space) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf_handle(space)?;
        let mut pairs = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            pairs.push((key.to_vec(), value.to_vec()));
        }
        Ok(pairs)
    }

    fn apply(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for op in &ops {
            match op {
                WriteOp::Put { space, key, value } => {
                    batch.put_cf(self.cf_handle(*space)?, key, value);
                }
                WriteOp::Delete { space, key } => {
                    batch.delete_cf(self.cf_handle(*space)?, key);
                }
                WriteOp::Clear { space } => {
                    batch.delete_range_cf(
                        self.cf_handle(*space)?,
                        Vec::new(),
                        CLEAR_UPPER_BOUND.to_vec(),
                    );
                }
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);

        // Atomic commit
        self.db.write_opt(batch, &write_opts)?;

        tracing::trace!(ops = ops.len(), "Write batch applied");
        Ok(())
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate account rows
    pub accounts: u64,
    /// Approximate trust line rows
    pub trust_lines: u64,
    /// Approximate offer rows
    pub offers: u64,
    /// Approximate stored ledger headers (at most one, the last closed ledger)
    pub stored_ledgers: u64,
}
