use image::RgbaImage;
use std::collections::VecDeque;

// ============================================================================
// SESSION SNAPSHOT
// ============================================================================

/// A full copy of the two mutable surfaces (ink + mask), captured together so
/// undo restores them in lock step.  The background never changes between
/// loads, so it is not part of the snapshot.
#[derive(Clone)]
pub struct SessionSnapshot {
    pub ink: RgbaImage,
    pub mask: RgbaImage,
}

impl SessionSnapshot {
    pub fn capture(ink: &RgbaImage, mask: &RgbaImage) -> Self {
        Self {
            ink: ink.clone(),
            mask: mask.clone(),
        }
    }

    pub fn restore_into(&self, ink: &mut RgbaImage, mask: &mut RgbaImage) {
        *ink = self.ink.clone();
        *mask = self.mask.clone();
    }

    pub fn memory_bytes(&self) -> usize {
        self.ink.as_raw().len() + self.mask.as_raw().len()
    }
}

/// One undo/redo step: the surfaces as they were before a labelled edit.
struct HistoryEntry {
    label: String,
    snapshot: SessionSnapshot,
}

// ============================================================================
// HISTORY MANAGER - undo/redo stacks with count and memory limits
// ============================================================================

/// Undo/redo history over surface snapshots.
///
/// `push` records the state *before* an edit; `undo` swaps the current
/// surfaces with the most recent entry, moving the displaced state onto the
/// redo stack, so undo ×k followed by redo ×k is an exact round trip.
pub struct HistoryManager {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: VecDeque<HistoryEntry>,
    max_entries: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(50)
    }
}

impl HistoryManager {
    pub fn new(max_entries: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_entries,
            max_memory_bytes: Some(100 * 1024 * 1024), // 100 MB default limit
            total_memory: 0,
        }
    }

    /// Change the entry cap, pruning immediately if the stacks already
    /// exceed it.  A cap of zero is treated as one.
    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries.max(1);
        self.prune();
    }

    /// Record the pre-edit state.  Clears the redo stack: once a new edit
    /// lands, the redone future is gone.
    pub fn push(&mut self, label: &str, snapshot: SessionSnapshot) {
        for entry in self.redo_stack.drain(..) {
            self.total_memory = self
                .total_memory
                .saturating_sub(entry.snapshot.memory_bytes());
        }

        self.total_memory += snapshot.memory_bytes();
        self.undo_stack.push_back(HistoryEntry {
            label: label.to_string(),
            snapshot,
        });

        self.prune();
    }

    /// Restore the most recent entry into the given surfaces; the displaced
    /// state goes onto the redo stack.  Returns the entry's label.
    pub fn undo(&mut self, ink: &mut RgbaImage, mask: &mut RgbaImage) -> Option<String> {
        let entry = self.undo_stack.pop_back()?;
        let displaced = SessionSnapshot::capture(ink, mask);
        self.total_memory = self
            .total_memory
            .saturating_sub(entry.snapshot.memory_bytes())
            + displaced.memory_bytes();
        entry.snapshot.restore_into(ink, mask);
        let label = entry.label;
        self.redo_stack.push_back(HistoryEntry {
            label: label.clone(),
            snapshot: displaced,
        });
        Some(label)
    }

    /// Inverse of [`undo`](Self::undo).
    pub fn redo(&mut self, ink: &mut RgbaImage, mask: &mut RgbaImage) -> Option<String> {
        let entry = self.redo_stack.pop_back()?;
        let displaced = SessionSnapshot::capture(ink, mask);
        self.total_memory = self
            .total_memory
            .saturating_sub(entry.snapshot.memory_bytes())
            + displaced.memory_bytes();
        entry.snapshot.restore_into(ink, mask);
        let label = entry.label;
        self.undo_stack.push_back(HistoryEntry {
            label: label.clone(),
            snapshot: displaced,
        });
        Some(label)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.label.as_str())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.redo_stack.back().map(|e| e.label.as_str())
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Current memory held by both stacks (O(1) via cached total).
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    /// Drop oldest undo entries to stay within the count and memory limits.
    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_entries {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self
                    .total_memory
                    .saturating_sub(removed.snapshot.memory_bytes());
            }
        }

        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self
                        .total_memory
                        .saturating_sub(removed.snapshot.memory_bytes());
                }
            }
        }
    }

    #[cfg(test)]
    fn with_memory_limit(max_entries: usize, max_memory_bytes: usize) -> Self {
        Self {
            max_memory_bytes: Some(max_memory_bytes),
            ..Self::new(max_entries)
        }
    }
}
