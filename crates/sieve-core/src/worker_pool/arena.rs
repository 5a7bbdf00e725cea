//! Content arena
//!
//! Workers never hold document text in ordinary heap strings. Each worker
//! checks out one byte slot, the fragment's segments are copied into it, and
//! on release the slot is overwritten with zeros before it returns to the
//! free list.

use parking_lot::Mutex;
use sieve_model::{ContentHash, Document, Fragment, Span};

/// One worker's content buffer
#[derive(Debug, Default)]
pub(crate) struct ContentSlot {
    bytes: Vec<u8>,
    bounds: Vec<(usize, usize)>,
}

/// Result of wiping a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Wipe {
    pub(crate) bytes_wiped: u64,
    pub(crate) residue_digest: ContentHash,
}

impl Wipe {
    /// True when the residue is all zeros
    pub(crate) fn is_zeroed(&self) -> bool {
        let len = usize::try_from(self.bytes_wiped).unwrap_or(usize::MAX);
        self.residue_digest == ContentHash::compute(&vec![0u8; len])
    }
}

impl Default for Wipe {
    fn default() -> Self {
        Self {
            bytes_wiped: 0,
            residue_digest: ContentHash::compute(&[]),
        }
    }
}

impl ContentSlot {
    /// Copy the fragment's segments in presentation order
    ///
    /// Returns the first segment the document cannot supply.
    pub(crate) fn load(&mut self, document: &Document, fragment: &Fragment) -> Result<(), Span> {
        let total: usize = fragment.segments.iter().map(Span::len).sum();
        // Reserve up front so loading never reallocates a buffer holding content
        self.bytes.reserve_exact(total);
        for span in &fragment.segments {
            let text = document.slice(span).ok_or(*span)?;
            let start = self.bytes.len();
            self.bytes.extend_from_slice(text.as_bytes());
            self.bounds.push((start, self.bytes.len()));
        }
        Ok(())
    }

    /// Segment texts borrowed from the slot
    pub(crate) fn segments(&self) -> Result<Vec<&str>, std::str::Utf8Error> {
        self.bounds
            .iter()
            .map(|&(start, end)| std::str::from_utf8(&self.bytes[start..end]))
            .collect()
    }

    /// Bytes currently held
    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    fn wipe(&mut self) -> Wipe {
        let bytes_wiped = self.bytes.len() as u64;
        self.bytes.fill(0);
        let residue_digest = ContentHash::compute(&self.bytes);
        self.bytes.clear();
        self.bounds.clear();
        Wipe {
            bytes_wiped,
            residue_digest,
        }
    }
}

/// Free list of content slots
#[derive(Debug)]
pub(crate) struct ContentArena {
    free: Mutex<Vec<ContentSlot>>,
}

impl ContentArena {
    /// Arena with `slots` pre-created buffers
    pub(crate) fn new(slots: usize) -> Self {
        Self {
            free: Mutex::new((0..slots).map(|_| ContentSlot::default()).collect()),
        }
    }

    /// Take a slot, creating one if the free list is empty
    pub(crate) fn checkout(&self) -> ContentSlot {
        self.free.lock().pop().unwrap_or_default()
    }

    /// Zero the slot and return it to the free list
    pub(crate) fn release(&self, mut slot: ContentSlot) -> Wipe {
        let wipe = slot.wipe();
        self.free.lock().push(slot);
        wipe
    }

    /// Slots waiting on the free list
    pub(crate) fn available(&self) -> usize {
        self.free.lock().len()
    }
}
