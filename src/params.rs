//! Parameter Storage
//!
//! Every trainable tensor lives in a [`ParamStore`] next to its gradient
//! accumulator. Layers never hold tensors directly; they hold [`ParamId`] handles
//! into the store. The optimizer walks the same handles, so it never aliases a
//! layer's fields and the pairing of a weight with its gradient is structural.
//!
//! ## Write discipline
//!
//! ```text
//! weight    written by: optimizer update (and gradient checking, restored exactly)
//! gradient  written by: owning layer's backward (+=), reset (= 0)
//! ```
//!
//! A `ParamId` is only meaningful for the store that issued it (or a clone of
//! that store). Each handle carries the tag of its store, so the checked
//! accessors reject a handle from another store instead of reading a
//! different slot.

use crate::error::{MinetError, Result};
use crate::tensor::Tensor;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_STORE: AtomicUsize = AtomicUsize::new(0);

/// Handle to one parameter slot in a [`ParamStore`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId {
    store: usize,
    index: usize,
}

impl ParamId {
    /// Position of the slot in registration order
    pub fn index(self) -> usize {
        self.index
    }
}

#[derive(Clone, Debug)]
struct ParamSlot {
    weight: Tensor,
    gradient: Tensor,
}

/// Arena of parameter tensors and their gradient accumulators
///
/// The unchecked accessors (`weight`, `gradient` and their `_mut` forms) panic
/// on a handle this store did not issue. Layers and the optimizer go through
/// [`ParamStore::get`], [`ParamStore::accumulate`] and
/// [`ParamStore::weight_and_gradient_mut`], which return `ProtocolViolation`.
#[derive(Clone, Debug)]
pub struct ParamStore {
    tag: usize,
    slots: Vec<ParamSlot>,
}

impl Default for ParamStore {
    fn default() -> Self {
        Self {
            tag: NEXT_STORE.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
        }
    }
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter tensor and allocate a zeroed gradient of the same shape
    pub fn register(&mut self, weight: Tensor) -> ParamId {
        let gradient = Tensor::zeros(weight.rows, weight.cols);
        self.slots.push(ParamSlot { weight, gradient });
        ParamId {
            store: self.tag,
            index: self.slots.len() - 1,
        }
    }

    fn foreign(&self, id: ParamId) -> MinetError {
        MinetError::ProtocolViolation(format!(
            "parameter {} of store {} used with store {} ({} parameters)",
            id.index,
            id.store,
            self.tag,
            self.slots.len()
        ))
    }

    fn slot(&self, id: ParamId) -> Result<&ParamSlot> {
        if id.store != self.tag {
            return Err(self.foreign(id));
        }
        self.slots.get(id.index).ok_or_else(|| self.foreign(id))
    }

    fn slot_mut(&mut self, id: ParamId) -> Result<&mut ParamSlot> {
        if id.store != self.tag || id.index >= self.slots.len() {
            return Err(self.foreign(id));
        }
        Ok(&mut self.slots[id.index])
    }

    /// Weight of `id`
    ///
    /// # Errors
    ///
    /// `ProtocolViolation` if `id` was issued by a different store.
    pub fn get(&self, id: ParamId) -> Result<&Tensor> {
        self.slot(id).map(|slot| &slot.weight)
    }

    pub fn weight(&self, id: ParamId) -> &Tensor {
        &self.slots[id.index].weight
    }

    pub fn weight_mut(&mut self, id: ParamId) -> &mut Tensor {
        &mut self.slots[id.index].weight
    }

    pub fn gradient(&self, id: ParamId) -> &Tensor {
        &self.slots[id.index].gradient
    }

    pub fn gradient_mut(&mut self, id: ParamId) -> &mut Tensor {
        &mut self.slots[id.index].gradient
    }

    /// Borrow a weight mutably together with its gradient
    pub fn weight_and_gradient_mut(&mut self, id: ParamId) -> Result<(&mut Tensor, &Tensor)> {
        let slot = self.slot_mut(id)?;
        Ok((&mut slot.weight, &slot.gradient))
    }

    /// Add `delta` into the gradient accumulator of `id`
    ///
    /// # Errors
    ///
    /// `ProtocolViolation` if `id` was issued by a different store,
    /// `ShapeMismatch` if `delta` is not shaped like the parameter.
    pub fn accumulate(&mut self, id: ParamId, delta: &Tensor) -> Result<()> {
        self.slot_mut(id)?.gradient.add_assign(delta)
    }

    /// Zero the gradient accumulators of the given slots
    pub fn zero_gradients(&mut self, ids: &[ParamId]) {
        for &id in ids {
            self.slots[id.index].gradient.fill(0.0);
        }
    }

    /// Number of registered parameter tensors
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total number of trainable scalars
    pub fn num_scalars(&self) -> usize {
        self.slots.iter().map(|s| s.weight.len()).sum()
    }
}
