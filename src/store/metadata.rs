//! Persistent index metadata on an embedded fjall keyspace
//!
//! Four logical buckets, one partition each:
//!
//! - `segments`: single `list` key with the segment ids in commit order
//! - `deletions`: segment id -> serialized deletion bitmap
//! - `docids`: external id -> (segment id, docnum), maintained at merge
//! - `meta`: the monotonic `epoch` counter
//!
//! All mutations go through [`MetadataStore::update`], which stages them in
//! one atomic write batch. The index coordinator serializes writers, so
//! reads issued while building a batch observe a stable state. Every
//! mutating batch must advance the epoch exactly once.

use std::path::Path;

use fjall::{Batch, Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SkaldError};

const PARTITION_SEGMENTS: &str = "segments";
const PARTITION_DELETIONS: &str = "deletions";
const PARTITION_DOCIDS: &str = "docids";
const PARTITION_META: &str = "meta";

const KEY_SEGMENT_LIST: &str = "list";
const KEY_EPOCH: &str = "epoch";

/// Location of a document after a merge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMapping {
    #[serde(rename = "s")]
    pub segment_id: String,
    #[serde(rename = "d")]
    pub doc_num: u64,
}

/// Transactional metadata store
pub struct MetadataStore {
    keyspace: Keyspace,
    segments: PartitionHandle,
    deletions: PartitionHandle,
    docids: PartitionHandle,
    meta: PartitionHandle,
}

impl MetadataStore {
    /// Open or create the metadata store under `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        let keyspace = Config::new(dir.join("meta")).open()?;

        let segments = keyspace.open_partition(PARTITION_SEGMENTS, PartitionCreateOptions::default())?;
        let deletions = keyspace.open_partition(PARTITION_DELETIONS, PartitionCreateOptions::default())?;
        let docids = keyspace.open_partition(PARTITION_DOCIDS, PartitionCreateOptions::default())?;
        let meta = keyspace.open_partition(PARTITION_META, PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            segments,
            deletions,
            docids,
            meta,
        })
    }

    /// Segment ids in commit order
    pub fn segments(&self) -> Result<Vec<String>> {
        match self.segments.get(KEY_SEGMENT_LIST)? {
            Some(data) => Ok(serde_json::from_slice(data.as_ref())?),
            None => Ok(Vec::new()),
        }
    }

    /// Deletion bitmap for a segment; empty if none has been persisted
    pub fn deletions(&self, segment_id: &str) -> Result<RoaringBitmap> {
        match self.deletions.get(segment_id)? {
            Some(data) => RoaringBitmap::deserialize_from(data.as_ref())
                .map_err(|e| SkaldError::CorruptSegment(format!("bad deletion bitmap: {e}"))),
            None => Ok(RoaringBitmap::new()),
        }
    }

    /// Post-merge location of an external id, if recorded
    pub fn doc_mapping(&self, external_id: &str) -> Result<Option<DocMapping>> {
        match self.docids.get(external_id)? {
            Some(data) => Ok(Some(serde_json::from_slice(data.as_ref())?)),
            None => Ok(None),
        }
    }

    /// Current epoch, 0 before the first mutation
    pub fn epoch(&self) -> Result<u64> {
        match self.meta.get(KEY_EPOCH)? {
            Some(data) if data.len() == 8 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(data.as_ref());
                Ok(u64::from_be_bytes(buf))
            }
            _ => Ok(0),
        }
    }

    /// Run `f` inside a single atomic write transaction.
    ///
    /// Nothing is visible to readers until the batch commits; a failed
    /// closure or commit leaves the store untouched. Callers must call
    /// `increment_epoch` exactly once per transaction.
    pub fn update<T>(&self, f: impl FnOnce(&mut Tx) -> Result<T>) -> Result<T> {
        let mut tx = Tx {
            batch: self.keyspace.batch(),
            store: self,
        };
        let out = f(&mut tx)?;

        tx.batch.commit()?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(out)
    }
}

/// Write operations staged within one metadata transaction
pub struct Tx<'a> {
    batch: Batch,
    store: &'a MetadataStore,
}

impl Tx<'_> {
    /// Replace the segment list
    pub fn set_segments(&mut self, segment_ids: &[String]) -> Result<()> {
        let data = serde_json::to_vec(segment_ids)?;
        self.batch.insert(&self.store.segments, KEY_SEGMENT_LIST, data);
        Ok(())
    }

    /// Read the persisted deletion bitmap for a segment
    pub fn deletions(&self, segment_id: &str) -> Result<RoaringBitmap> {
        self.store.deletions(segment_id)
    }

    /// Stage a deletion bitmap for a segment
    pub fn set_deletions(&mut self, segment_id: &str, bitmap: &RoaringBitmap) -> Result<()> {
        let mut data = Vec::with_capacity(bitmap.serialized_size());
        bitmap
            .serialize_into(&mut data)
            .map_err(SkaldError::Io)?;
        self.batch.insert(&self.store.deletions, segment_id, data);
        Ok(())
    }

    /// Remove the deletion bitmap of a merged-away segment
    pub fn delete_deletions(&mut self, segment_id: &str) {
        self.batch.remove(&self.store.deletions, segment_id);
    }

    /// Record where an external id lives after a merge
    pub fn set_doc_mapping(&mut self, external_id: &str, segment_id: &str, doc_num: u64) -> Result<()> {
        let mapping = DocMapping {
            segment_id: segment_id.to_string(),
            doc_num,
        };
        let data = serde_json::to_vec(&mapping)?;
        self.batch.insert(&self.store.docids, external_id, data);
        Ok(())
    }

    /// Advance the epoch and return its new value
    pub fn increment_epoch(&mut self) -> Result<u64> {
        let epoch = self.store.epoch()? + 1;
        self.batch
            .insert(&self.store.meta, KEY_EPOCH, epoch.to_be_bytes().to_vec());
        Ok(epoch)
    }
}
