//! Processing stages and the ordered chain that runs them.

use std::any::Any;

use super::AudioBuffers;

/// A unit of per-block processing.
///
/// Called once per block from the audio thread, after the outputs have been
/// cleared (if auto-zero is on) and after every stage ahead of it in the
/// chain. Implementations read inputs and busses and accumulate into outputs.
/// They must not allocate, block, or log.
pub trait AudioStage: Send {
    fn process(&mut self, io: &mut AudioBuffers);

    /// Concrete access for stages that stay configurable once registered.
    ///
    /// Returning `Some(self)` lets [`StageChain::get_mut`] hand the stage
    /// back as its own type. Closures keep the default and stay opaque.
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
}

impl<F> AudioStage for F
where
    F: FnMut(&mut AudioBuffers) + Send,
{
    fn process(&mut self, io: &mut AudioBuffers) {
        self(io)
    }
}

/// Opaque handle to a stage registered in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(u64);

/// Ordered list of stages. Position in the list is invocation order.
#[derive(Default)]
pub struct StageChain {
    stages: Vec<(StageId, Box<dyn AudioStage>)>,
    next_id: u64,
}

impl StageChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn contains(&self, id: StageId) -> bool {
        self.position(id).is_some()
    }

    /// Stage handles in invocation order.
    pub fn ids(&self) -> impl Iterator<Item = StageId> + '_ {
        self.stages.iter().map(|(id, _)| *id)
    }

    pub fn append(&mut self, stage: Box<dyn AudioStage>) -> StageId {
        let id = self.allocate_id();
        self.stages.push((id, stage));
        id
    }

    pub fn prepend(&mut self, stage: Box<dyn AudioStage>) -> StageId {
        let id = self.allocate_id();
        self.stages.insert(0, (id, stage));
        id
    }

    /// Insert directly before `reference`, or at the front if it is not in
    /// the chain.
    pub fn insert_before(&mut self, reference: StageId, stage: Box<dyn AudioStage>) -> StageId {
        let index = self.position(reference).unwrap_or(0);
        let id = self.allocate_id();
        self.stages.insert(index, (id, stage));
        id
    }

    /// Insert directly after `reference`, or at the back if it is not in the
    /// chain.
    pub fn insert_after(&mut self, reference: StageId, stage: Box<dyn AudioStage>) -> StageId {
        let index = self.position(reference).map_or(self.stages.len(), |i| i + 1);
        let id = self.allocate_id();
        self.stages.insert(index, (id, stage));
        id
    }

    pub fn remove(&mut self, id: StageId) -> Option<Box<dyn AudioStage>> {
        let index = self.position(id)?;
        Some(self.stages.remove(index).1)
    }

    /// The stage registered as `id`, if it is a `T`.
    pub fn get_mut<T: AudioStage + 'static>(&mut self, id: StageId) -> Option<&mut T> {
        let index = self.position(id)?;
        self.stages[index].1.as_any_mut()?.downcast_mut::<T>()
    }

    pub fn clear(&mut self) {
        self.stages.clear();
    }

    #[inline]
    pub fn process(&mut self, io: &mut AudioBuffers) {
        for (_, stage) in self.stages.iter_mut() {
            stage.process(io);
        }
    }

    fn position(&self, id: StageId) -> Option<usize> {
        self.stages.iter().position(|(existing, _)| *existing == id)
    }

    fn allocate_id(&mut self) -> StageId {
        let id = StageId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl std::fmt::Debug for StageChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageChain")
            .field("stages", &self.ids().collect::<Vec<_>>())
            .finish()
    }
}
