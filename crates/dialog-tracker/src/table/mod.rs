//! Sharded dialog table
//!
//! A fixed vector of buckets, each guarded by its own mutex and holding the
//! dialogs whose Call-ID hashes to it. The table never resizes.
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬─────┬──────────┐
//! │ bucket 0 │ bucket 1 │ bucket 2 │ ... │ bucket N │   hash(call_id) mod N
//! └────┬─────┴──────────┴────┬─────┴─────┴──────────┘
//!      │                     │
//!   [dlg 7]               [dlg 3, dlg 4]                slot ids unique per bucket
//! ```
//!
//! Each linked dialog is owned by its bucket through one `Arc` clone;
//! removing it from the bucket drops that reference. Bucket locks are held
//! only for the structural operation and never across callbacks.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tracing::{error, trace};

use crate::dialog::{Dialog, DialogFlags, DialogKey};
use crate::routing::Direction;

#[derive(Debug, Default)]
struct BucketInner {
    dialogs: Vec<Arc<Dialog>>,
    next_id: u32,
}

#[derive(Debug, Default)]
struct Bucket {
    inner: Mutex<BucketInner>,
}

/// Hash table of live dialogs
#[derive(Debug)]
pub struct DialogTable {
    buckets: Vec<Bucket>,
}

impl DialogTable {
    /// Create a table with `size` buckets
    pub fn new(size: u32) -> Self {
        let size = size.max(1);
        let mut rng = rand::thread_rng();
        let seed_range = size.saturating_mul(3);
        let buckets = (0..size)
            .map(|_| Bucket {
                inner: Mutex::new(BucketInner {
                    dialogs: Vec::new(),
                    next_id: rng.gen_range(0..seed_range),
                }),
            })
            .collect();
        Self { buckets }
    }

    /// Number of buckets
    pub fn size(&self) -> u32 {
        self.buckets.len() as u32
    }

    /// Bucket a Call-ID belongs to
    pub fn hash_entry(&self, call_id: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        call_id.hash(&mut hasher);
        (hasher.finish() % self.buckets.len() as u64) as u32
    }

    /// Link a dialog into its bucket, assigning its slot id
    pub fn insert(&self, dialog: &Arc<Dialog>) -> DialogKey {
        let mut bucket = self.bucket(dialog.entry()).inner.lock();
        let slot = Self::allocate_slot(&mut bucket);
        dialog.assign_slot(slot);
        dialog.lock().flags.insert(DialogFlags::INSERTED);
        bucket.dialogs.push(dialog.clone());
        trace!("linked dialog {} into table", dialog.key());
        dialog.key()
    }

    /// Slot ids are never 0 and never shared by two linked dialogs
    fn allocate_slot(bucket: &mut BucketInner) -> u32 {
        loop {
            bucket.next_id = bucket.next_id.wrapping_add(1);
            let slot = bucket.next_id;
            if slot != 0 && !bucket.dialogs.iter().any(|d| d.slot() == slot) {
                return slot;
            }
        }
    }

    /// Find a dialog by its table address
    pub fn lookup_by_id(&self, key: DialogKey) -> Option<Arc<Dialog>> {
        if key.entry >= self.size() || key.slot == 0 {
            return None;
        }
        let bucket = self.bucket(key.entry).inner.lock();
        bucket.dialogs.iter().find(|d| d.slot() == key.slot).cloned()
    }

    /// Find a dialog by Call-ID and tags, reporting the request direction
    pub fn lookup_by_key(
        &self,
        call_id: &str,
        from_tag: &str,
        to_tag: Option<&str>,
        allow_missing_to_tag: bool,
    ) -> Option<(Arc<Dialog>, Direction)> {
        let entry = self.hash_entry(call_id);
        let bucket = self.bucket(entry).inner.lock();
        for dialog in bucket.dialogs.iter().filter(|d| d.call_id() == call_id) {
            let inner = dialog.lock();
            if let Some(direction) = dialog.direction_for(&inner, from_tag, to_tag, allow_missing_to_tag) {
                return Some((dialog.clone(), direction));
            }
        }
        None
    }

    /// Unlink a dialog, returning false if it was not linked
    pub fn remove(&self, dialog: &Arc<Dialog>) -> bool {
        let removed = {
            let mut bucket = self.bucket(dialog.entry()).inner.lock();
            match bucket.dialogs.iter().position(|d| Arc::ptr_eq(d, dialog)) {
                Some(pos) => Some(bucket.dialogs.remove(pos)),
                None => None,
            }
        };
        match removed {
            Some(_link) => {
                dialog.lock().flags.remove(DialogFlags::INSERTED);
                trace!("unlinked dialog {} from table", dialog.key());
                true
            }
            None => {
                error!("dialog {} (call_id={}) is not linked, refusing double unlink", dialog.key(), dialog.call_id());
                false
            }
        }
    }

    /// Number of linked dialogs
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.inner.lock().dialogs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles to every linked dialog, one bucket lock at a time
    pub fn dialogs(&self) -> Vec<Arc<Dialog>> {
        self.buckets
            .iter()
            .flat_map(|b| b.inner.lock().dialogs.clone())
            .collect()
    }

    fn bucket(&self, entry: u32) -> &Bucket {
        &self.buckets[entry as usize % self.buckets.len()]
    }
}
