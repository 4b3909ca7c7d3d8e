use std::collections::VecDeque;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use rayon::prelude::*;
use uuid::Uuid;

use crate::canvas::{Layer, LayerStack, PixelBuffer};
use crate::error::EditorError;
use crate::io::{decode_png, encode_png};

/// Undo depth used when settings don't override it.
pub const DEFAULT_MAX_UNDO_STEPS: usize = 40;

// ============================================================================
// SNAPSHOT – immutable, independently owned copy of every layer
// ============================================================================

/// One layer's content at capture time.
///
/// The pixels are PNG-encoded and shared behind an `Arc`, so a snapshot can
/// sit on both the undo and redo stacks without copying and can never alias
/// a live buffer.
#[derive(Clone, Debug)]
struct SnapshotSlot {
    id: Uuid,
    name: String,
    visible: bool,
    encoded: Arc<[u8]>,
}

/// Full-stack snapshot, slots ordered bottom to top like the stack was.
#[derive(Clone, Debug)]
pub struct HistorySnapshot {
    width: u32,
    height: u32,
    active_layer_index: usize,
    slots: Vec<SnapshotSlot>,
}

impl HistorySnapshot {
    pub fn capture(stack: &LayerStack) -> Result<Self, EditorError> {
        let slots = stack
            .layers()
            .par_iter()
            .map(|layer| -> Result<SnapshotSlot, EditorError> {
                Ok(SnapshotSlot {
                    id: layer.id,
                    name: layer.name.clone(),
                    visible: layer.visible,
                    encoded: Arc::from(encode_png(&layer.pixels)?),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            width: stack.width(),
            height: stack.height(),
            active_layer_index: stack.active_index(),
            slots,
        })
    }

    pub fn memory_bytes(&self) -> usize {
        self.slots.iter().map(|s| s.encoded.len() + s.name.len()).sum()
    }

    /// Start decoding every slot. The returned future resolves once all of
    /// them are done.
    pub fn restore(self) -> PendingRestore {
        PendingRestore::spawn(self)
    }
}

// ============================================================================
// PENDING RESTORE – per-slot decodes joined into one future
// ============================================================================

struct RestoreShared {
    results: Vec<Option<Result<PixelBuffer, EditorError>>>,
    remaining: usize,
    waker: Option<Waker>,
}

/// A snapshot whose slots are being decoded on the rayon pool.
///
/// Decodes finish in any order; the future only resolves after the last one,
/// so callers never observe a partially restored stack.
pub struct PendingRestore {
    snapshot: HistorySnapshot,
    shared: Arc<Mutex<RestoreShared>>,
}

impl PendingRestore {
    fn spawn(snapshot: HistorySnapshot) -> Self {
        let count = snapshot.slots.len();
        let shared = Arc::new(Mutex::new(RestoreShared {
            results: (0..count).map(|_| None).collect(),
            remaining: count,
            waker: None,
        }));

        for (index, slot) in snapshot.slots.iter().enumerate() {
            let bytes = Arc::clone(&slot.encoded);
            let shared = Arc::clone(&shared);
            let (width, height) = (snapshot.width, snapshot.height);
            rayon::spawn(move || {
                let decoded = panic::catch_unwind(AssertUnwindSafe(|| decode_png(&bytes, width, height)))
                    .unwrap_or_else(|_| Err(EditorError::decode("snapshot decode panicked")));
                let waker = {
                    let mut state = shared.lock().unwrap_or_else(|e| e.into_inner());
                    state.results[index] = Some(decoded);
                    state.remaining -= 1;
                    if state.remaining == 0 { state.waker.take() } else { None }
                };
                if let Some(waker) = waker {
                    waker.wake();
                }
            });
        }

        Self { snapshot, shared }
    }

    /// True once every slot has finished decoding.
    pub fn is_ready(&self) -> bool {
        self.shared.lock().unwrap_or_else(|e| e.into_inner()).remaining == 0
    }

    /// Block the current thread until the restore resolves.
    pub fn wait(self) -> Result<RestoredSnapshot, EditorError> {
        pollster::block_on(self)
    }
}

impl Future for PendingRestore {
    type Output = Result<RestoredSnapshot, EditorError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let results = {
            let mut state = this.shared.lock().unwrap_or_else(|e| e.into_inner());
            if state.remaining > 0 {
                state.waker = Some(cx.waker().clone());
                return Poll::Pending;
            }
            std::mem::take(&mut state.results)
        };

        if results.len() != this.snapshot.slots.len() {
            return Poll::Ready(Err(EditorError::decode("restore polled after completion")));
        }

        let mut layers = Vec::with_capacity(results.len());
        for (slot, result) in this.snapshot.slots.iter().zip(results) {
            let pixels = match result {
                Some(Ok(pixels)) => pixels,
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => return Poll::Ready(Err(EditorError::decode("snapshot slot never decoded"))),
            };
            layers.push(RestoredLayer {
                id: slot.id,
                name: slot.name.clone(),
                visible: slot.visible,
                pixels,
            });
        }

        Poll::Ready(Ok(RestoredSnapshot {
            active_layer_index: this.snapshot.active_layer_index,
            layers,
        }))
    }
}

struct RestoredLayer {
    id: Uuid,
    name: String,
    visible: bool,
    pixels: PixelBuffer,
}

/// A fully decoded snapshot, ready to be written into a stack in one step.
pub struct RestoredSnapshot {
    active_layer_index: usize,
    layers: Vec<RestoredLayer>,
}

impl RestoredSnapshot {
    /// Rebuild `stack` in snapshot order.
    ///
    /// A slot whose layer still exists overwrites that layer's pixels and
    /// keeps its current name and visibility. A slot whose layer is gone is
    /// recreated from the slot. Live layers absent from the snapshot are
    /// dropped.
    pub fn apply_to(self, stack: &mut LayerStack) {
        let layers = self
            .layers
            .into_iter()
            .map(|restored| match stack.position_of(restored.id).and_then(|i| stack.layer(i)) {
                Some(live) => Layer {
                    id: restored.id,
                    name: live.name.clone(),
                    visible: live.visible,
                    pixels: restored.pixels,
                },
                None => Layer {
                    id: restored.id,
                    name: restored.name,
                    visible: restored.visible,
                    pixels: restored.pixels,
                },
            })
            .collect();
        stack.replace_layers(layers, self.active_layer_index);
    }
}

// ============================================================================
// HISTORY MANAGER – bounded undo stack + redo stack
// ============================================================================

pub struct HistoryManager {
    undo_stack: VecDeque<HistorySnapshot>,
    redo_stack: Vec<HistorySnapshot>,
    max_history_size: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNDO_STEPS)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_history_size: max_history_size.max(1),
        }
    }

    /// Capture the stack before a mutating action. Clears the redo stack.
    pub fn record(&mut self, stack: &LayerStack) -> Result<(), EditorError> {
        let snapshot = HistorySnapshot::capture(stack)?;
        self.push(snapshot);
        Ok(())
    }

    /// Push an already captured snapshot as a new action.
    pub fn push(&mut self, snapshot: HistorySnapshot) {
        self.redo_stack.clear();
        self.undo_stack.push_back(snapshot);
        self.prune();
    }

    /// Pop the latest snapshot and start restoring it. The stack's current
    /// state moves to the redo stack. `Ok(None)` when there is nothing to undo.
    pub fn undo(&mut self, stack: &LayerStack) -> Result<Option<PendingRestore>, EditorError> {
        if self.undo_stack.is_empty() {
            return Ok(None);
        }
        let current = HistorySnapshot::capture(stack)?;
        let Some(previous) = self.undo_stack.pop_back() else {
            return Ok(None);
        };
        self.redo_stack.push(current);
        Ok(Some(previous.restore()))
    }

    /// Mirror of [`undo`](Self::undo).
    pub fn redo(&mut self, stack: &LayerStack) -> Result<Option<PendingRestore>, EditorError> {
        if self.redo_stack.is_empty() {
            return Ok(None);
        }
        let current = HistorySnapshot::capture(stack)?;
        let Some(next) = self.redo_stack.pop() else {
            return Ok(None);
        };
        self.undo_stack.push_back(current);
        self.prune();
        Ok(Some(next.restore()))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_history_size(&self) -> usize {
        self.max_history_size
    }

    /// Encoded bytes held by both stacks.
    pub fn memory_usage(&self) -> usize {
        self.undo_stack.iter().chain(self.redo_stack.iter()).map(|s| s.memory_bytes()).sum()
    }

    /// Replace the first slot of the newest undo entry with bytes that will
    /// not decode.
    #[cfg(test)]
    pub(crate) fn corrupt_newest_undo(&mut self) {
        if let Some(slot) = self.undo_stack.back_mut().and_then(|s| s.slots.first_mut()) {
            slot.encoded = Arc::from(&b"not a png"[..]);
        }
    }

    /// Drop the oldest entries beyond the depth limit.
    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            self.undo_stack.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn undo(history: &mut HistoryManager, stack: &mut LayerStack) -> bool {
        match history.undo(stack).unwrap() {
            Some(pending) => {
                pending.wait().unwrap().apply_to(stack);
                true
            }
            None => false,
        }
    }

    fn redo(history: &mut HistoryManager, stack: &mut LayerStack) -> bool {
        match history.redo(stack).unwrap() {
            Some(pending) => {
                pending.wait().unwrap().apply_to(stack);
                true
            }
            None => false,
        }
    }

    #[test]
    fn undo_then_redo_is_byte_identical() {
        let mut stack = LayerStack::new(64, 32);
        let mut history = HistoryManager::default();
        stack.active_layer_mut().pixels.paint_square(5, 5, 3, BLUE);
        let before = stack.active_layer().pixels.clone();

        history.record(&stack).unwrap();
        stack.active_layer_mut().pixels.paint_square(20, 10, 5, RED);
        let after = stack.active_layer().pixels.clone();
        assert_ne!(before, after);

        assert!(undo(&mut history, &mut stack));
        assert_eq!(stack.active_layer().pixels, before);
        assert!(history.can_redo());

        assert!(redo(&mut history, &mut stack));
        assert_eq!(stack.active_layer().pixels, after);
        assert!(!history.can_redo());
    }

    #[test]
    fn snapshot_is_independent_of_later_edits() {
        let mut stack = LayerStack::new(8, 8);
        let snapshot = HistorySnapshot::capture(&stack).unwrap();
        stack.active_layer_mut().pixels.paint_square(0, 0, 8, RED);
        let restored = snapshot.restore().wait().unwrap();
        restored.apply_to(&mut stack);
        assert!(stack.active_layer().pixels.is_blank());
    }

    #[test]
    fn undo_stack_is_capped() {
        let mut stack = LayerStack::new(8, 8);
        let mut history = HistoryManager::default();
        for i in 0..41 {
            stack.active_layer_mut().pixels.put(i % 8, i / 8, RED);
            history.record(&stack).unwrap();
        }
        assert_eq!(history.undo_count(), DEFAULT_MAX_UNDO_STEPS);

        let mut undone = 0;
        while undo(&mut history, &mut stack) {
            undone += 1;
        }
        assert_eq!(undone, 40);
        // The first recorded state (one red pixel) was evicted; the oldest
        // surviving one has two.
        let red = stack
            .active_layer()
            .pixels
            .as_rgba_image()
            .pixels()
            .filter(|p| **p == RED)
            .count();
        assert_eq!(red, 2);
    }

    #[test]
    fn recording_clears_redo() {
        let mut stack = LayerStack::new(8, 8);
        let mut history = HistoryManager::default();
        history.record(&stack).unwrap();
        stack.active_layer_mut().pixels.put(1, 1, RED);
        assert!(undo(&mut history, &mut stack));
        assert_eq!(history.redo_count(), 1);
        history.record(&stack).unwrap();
        assert_eq!(history.redo_count(), 0);
    }

    #[test]
    fn empty_stacks_are_silent_noops() {
        let mut stack = LayerStack::new(8, 8);
        let mut history = HistoryManager::default();
        assert!(history.undo(&stack).unwrap().is_none());
        assert!(history.redo(&stack).unwrap().is_none());
        assert!(!undo(&mut history, &mut stack));
    }

    #[test]
    fn undo_across_add_layer_restores_structure() {
        let mut stack = LayerStack::new(8, 8);
        let mut history = HistoryManager::default();
        let base_id = stack.active_layer().id;

        history.record(&stack).unwrap();
        stack.add_layer("Layer 2");
        stack.active_layer_mut().pixels.put(2, 2, RED);
        let added_id = stack.active_layer().id;

        assert!(undo(&mut history, &mut stack));
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.active_layer().id, base_id);
        assert_eq!(stack.active_index(), 0);

        assert!(redo(&mut history, &mut stack));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.active_index(), 1);
        let recreated = stack.active_layer();
        assert_eq!(recreated.id, added_id);
        assert_eq!(recreated.name, "Layer 2");
        assert_eq!(recreated.pixels.get(2, 2), Some(RED));
    }

    #[test]
    fn undo_across_delete_recreates_layer() {
        let mut stack = LayerStack::new(8, 8);
        stack.add_layer("Layer 2");
        stack.active_layer_mut().pixels.put(0, 0, BLUE);
        let mut history = HistoryManager::default();

        history.record(&stack).unwrap();
        stack.delete_layer(1).unwrap();
        assert!(undo(&mut history, &mut stack));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.layer(1).and_then(|l| l.pixels.get(0, 0)), Some(BLUE));
    }

    #[test]
    fn live_visibility_survives_restore() {
        let mut stack = LayerStack::new(8, 8);
        let mut history = HistoryManager::default();
        history.record(&stack).unwrap();
        stack.active_layer_mut().pixels.put(0, 0, RED);
        stack.toggle_visibility(0).unwrap();
        assert!(undo(&mut history, &mut stack));
        assert!(!stack.active_layer().visible);
        assert!(stack.active_layer().pixels.is_blank());
    }

    #[test]
    fn corrupt_slot_fails_without_touching_stack() {
        let mut stack = LayerStack::new(8, 8);
        stack.add_layer("Layer 2");
        let mut snapshot = HistorySnapshot::capture(&stack).unwrap();
        snapshot.slots[1].encoded = Arc::from(&b"garbage"[..]);

        stack.active_layer_mut().pixels.put(3, 3, RED);
        let before = stack.clone();
        let result = snapshot.restore().wait();
        assert!(matches!(result, Err(EditorError::DecodeFailure(_))));
        assert_eq!(stack.layer(1).map(|l| &l.pixels), before.layer(1).map(|l| &l.pixels));
    }

    #[test]
    fn pending_restore_reports_readiness() {
        let stack = LayerStack::new(8, 8);
        let pending = HistorySnapshot::capture(&stack).unwrap().restore();
        while !pending.is_ready() {
            std::thread::yield_now();
        }
        let mut target = LayerStack::new(8, 8);
        target.add_layer("Layer 2");
        pending.wait().unwrap().apply_to(&mut target);
        assert_eq!(target.len(), 1);
    }

    #[test]
    fn memory_usage_tracks_both_stacks() {
        let mut stack = LayerStack::new(8, 8);
        let mut history = HistoryManager::default();
        assert_eq!(history.memory_usage(), 0);
        history.record(&stack).unwrap();
        let one = history.memory_usage();
        assert!(one > 0);
        assert!(undo(&mut history, &mut stack));
        // The entry was swapped for a capture of the identical current state.
        assert_eq!(history.memory_usage(), one);
    }
}
