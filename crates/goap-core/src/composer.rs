use crate::{ActionStatus, AtomHandle, ResolverHandle, TickContext, WorldMut};

/// A possibly multi-tick unit of work answering "is this condition
/// currently true for this agent". Returns `None` while still running.
/// Single-use: the owning resolver record is destroyed after the answer
/// is read once.
pub trait ResolverTask<W: WorldMut>: 'static {
    fn tick(&mut self, ctx: &TickContext, agent: W::Agent, world: &W) -> Option<bool>;
}

/// The runtime body of one atom step. Ticked until it reports a terminal
/// status. A task that never terminates stalls its agent; termination is
/// the author's obligation, not the engine's.
pub trait AtomTask<W: WorldMut>: 'static {
    fn tick(&mut self, ctx: &TickContext, agent: W::Agent, world: &mut W) -> ActionStatus;

    /// Invoked when the atom is torn down while still running (agent
    /// despawn, plan teardown). Release held world state here.
    fn cancel(&mut self, _ctx: &TickContext, _agent: W::Agent, _world: &mut W) {}
}

/// Factory for condition resolvers, registered per condition id on a
/// [`Domain`](crate::Domain). `prepare` attaches the task that the
/// resolver stage will tick; attachment goes through the deferred queue so
/// composers never mutate engine records mid-scan.
pub trait ConditionResolverComposer<W: WorldMut>: 'static {
    fn prepare(
        &self,
        ctx: &TickContext,
        agent: W::Agent,
        resolver: ResolverHandle,
        queue: &mut DeferredQueue<W>,
    );
}

/// Factory for one ordered atom step of an action.
///
/// `prepare` attaches the forward task. When a later step of the same
/// action fails, steps that already succeeded and report
/// `has_on_fail_action` get `prepare_on_fail_action` called, in reverse
/// execution order, to attach their compensation task.
pub trait AtomActionComposer<W: WorldMut>: 'static {
    fn prepare(
        &self,
        ctx: &TickContext,
        agent: W::Agent,
        atom: AtomHandle,
        queue: &mut DeferredQueue<W>,
    );

    fn has_on_fail_action(&self) -> bool {
        false
    }

    fn prepare_on_fail_action(
        &self,
        _ctx: &TickContext,
        _agent: W::Agent,
        _atom: AtomHandle,
        _queue: &mut DeferredQueue<W>,
    ) {
    }
}

/// Deferred mutations enqueued by composers, applied by the runtime at the
/// end of the stage that collected them.
pub enum DeferredOp<W: WorldMut> {
    ResolverTask(ResolverHandle, Box<dyn ResolverTask<W>>),
    AtomTask(AtomHandle, Box<dyn AtomTask<W>>),
}

/// Command list for composer-side mutations.
///
/// Stages hand one of these to every `prepare` call they make and commit
/// the collected entries in one single-threaded step after the scan, so
/// in-flight records never observe each other's writes within a stage.
pub struct DeferredQueue<W: WorldMut> {
    ops: Vec<DeferredOp<W>>,
}

impl<W: WorldMut> DeferredQueue<W> {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn set_resolver_task(&mut self, resolver: ResolverHandle, task: Box<dyn ResolverTask<W>>) {
        self.ops.push(DeferredOp::ResolverTask(resolver, task));
    }

    pub fn set_atom_task(&mut self, atom: AtomHandle, task: Box<dyn AtomTask<W>>) {
        self.ops.push(DeferredOp::AtomTask(atom, task));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<DeferredOp<W>> {
        self.ops
    }
}

impl<W: WorldMut> Default for DeferredQueue<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolver composer for conditions cheaply computable from the world:
/// the attached task answers on its first tick.
pub struct InstantResolver<W: WorldMut>(pub fn(&W, W::Agent) -> bool);

impl<W: WorldMut + 'static> ConditionResolverComposer<W> for InstantResolver<W> {
    fn prepare(
        &self,
        _ctx: &TickContext,
        _agent: W::Agent,
        resolver: ResolverHandle,
        queue: &mut DeferredQueue<W>,
    ) {
        queue.set_resolver_task(resolver, Box::new(InstantResolverTask(self.0)));
    }
}

struct InstantResolverTask<W: WorldMut>(fn(&W, W::Agent) -> bool);

impl<W: WorldMut + 'static> ResolverTask<W> for InstantResolverTask<W> {
    fn tick(&mut self, _ctx: &TickContext, agent: W::Agent, world: &W) -> Option<bool> {
        Some((self.0)(world, agent))
    }
}
