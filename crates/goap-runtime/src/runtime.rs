use std::collections::BTreeMap;

use goap_core::handle::marker;
use goap_core::{
    ActionId, ActionStatus, AgentHandle, Arena, AtomHandle, Condition, ConditionSet, DeferredOp,
    DeferredQueue, Domain, DomainId, GoalList, PlanExecHandle, PlanOutcome, RequestHandle,
    RequestStatus, SearchHandle, TargetList, TickContext, WorldMut,
};
use goap_tools::{TraceEvent, TraceLog, TraceSink};

use crate::records::{
    AgentRecord, AtomRecord, AtomSetExec, OnFailExec, PlanExec, PlanRequest, ResolverRecord,
    SearchFrame, Wait,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoapRuntimeConfig {
    /// Max child frames spawned per plan request before the offending
    /// branch is abandoned as failed (loop protection).
    pub max_search_expansions: u32,

    /// Minimum interval, in ticks, between issuing plan requests for one
    /// agent. Zero replans immediately on completion.
    pub replan_interval_ticks: u32,
}

impl Default for GoapRuntimeConfig {
    fn default() -> Self {
        Self {
            max_search_expansions: 4096,
            replan_interval_ticks: 0,
        }
    }
}

/// Live record totals, for tests and debug tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordCounts {
    pub agents: usize,
    pub requests: usize,
    pub searches: usize,
    pub resolvers: usize,
    pub plan_execs: usize,
    pub atom_set_execs: usize,
    pub atoms: usize,
    pub on_fails: usize,
}

impl RecordCounts {
    /// Everything except the agent records themselves.
    pub fn descendants(&self) -> usize {
        self.requests
            + self.searches
            + self.resolvers
            + self.plan_execs
            + self.atom_set_execs
            + self.atoms
            + self.on_fails
    }
}

/// The tick-driven planning and execution engine.
///
/// Owns every record arena and the registered domains. `tick` runs the
/// five fixed stages once, in order: agents, resolvers, search,
/// execution, atoms. Each stage scans the records that existed when it
/// began; structural changes land either directly from the
/// single-threaded stage loop or through the composer-facing deferred
/// queue committed when the stage ends.
pub struct GoapRuntime<W: WorldMut> {
    pub(crate) domains: BTreeMap<DomainId, Domain<W>>,
    pub(crate) config: GoapRuntimeConfig,
    pub(crate) agents: Arena<marker::Agent, AgentRecord<W>>,
    pub(crate) requests: Arena<marker::Request, PlanRequest>,
    pub(crate) searches: Arena<marker::Search, SearchFrame>,
    pub(crate) resolvers: Arena<marker::Resolver, ResolverRecord<W>>,
    pub(crate) plan_execs: Arena<marker::PlanExec, PlanExec>,
    pub(crate) atom_execs: Arena<marker::AtomSetExec, AtomSetExec>,
    pub(crate) atoms: Arena<marker::Atom, AtomRecord<W>>,
    pub(crate) on_fails: Arena<marker::OnFail, OnFailExec>,
    trace_log: Option<TraceLog>,
    trace_sink: Option<Box<dyn TraceSink>>,
}

impl<W: WorldMut + 'static> GoapRuntime<W> {
    pub fn new() -> Self {
        Self {
            domains: BTreeMap::new(),
            config: GoapRuntimeConfig::default(),
            agents: Arena::new(),
            requests: Arena::new(),
            searches: Arena::new(),
            resolvers: Arena::new(),
            plan_execs: Arena::new(),
            atom_execs: Arena::new(),
            atoms: Arena::new(),
            on_fails: Arena::new(),
            trace_log: None,
            trace_sink: None,
        }
    }

    pub fn with_config(mut self, config: GoapRuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a domain. The domain must already be sorted
    /// ([`Domain::sort_actions`]) and its id must be unused.
    pub fn add_domain(&mut self, domain: Domain<W>) {
        assert!(
            domain.is_sorted(),
            "Domain::sort_actions must be called before the domain is registered"
        );
        let id = domain.id();
        let previous = self.domains.insert(id, domain);
        assert!(previous.is_none(), "domain {:?} registered twice", id);
    }

    pub fn domain(&self, id: DomainId) -> Option<&Domain<W>> {
        self.domains.get(&id)
    }

    pub fn spawn_agent(&mut self, external: W::Agent, domain: DomainId) -> AgentHandle {
        assert!(
            self.domains.contains_key(&domain),
            "domain {:?} is not registered",
            domain
        );
        self.agents.insert(AgentRecord {
            external,
            domain,
            goals: GoalList::new(),
            fallback_goals: GoalList::new(),
            current_request: None,
            last_outcome: None,
            last_request_tick: None,
        })
    }

    /// Destroys the agent and, transitively, its in-flight request,
    /// search frames, resolvers, and execution records. Still-running
    /// atoms get their `cancel` hook.
    pub fn despawn_agent(&mut self, ctx: &TickContext, world: &mut W, agent: AgentHandle) {
        let Some(record) = self.agents.remove(agent) else {
            return;
        };
        if let Some(request) = record.current_request {
            self.destroy_request_tree(ctx, world, request);
        }
        self.emit(TraceEvent::new(ctx.tick, "goap.agent.despawn").with_a(agent.index() as u64));
    }

    /// Replaces the agent's goal set. Takes effect on the next plan
    /// request; an empty set stops the replanning loop.
    pub fn set_goals(&mut self, agent: AgentHandle, goals: &[Condition]) {
        let record = self.agents.get_mut(agent).expect("stale agent handle");
        record.goals = GoalList::from_slice(goals);
    }

    /// Secondary goal set, attempted once when the primary search fails.
    pub fn set_fallback_goals(&mut self, agent: AgentHandle, goals: &[Condition]) {
        let record = self.agents.get_mut(agent).expect("stale agent handle");
        record.fallback_goals = GoalList::from_slice(goals);
    }

    pub fn current_request(&self, agent: AgentHandle) -> Option<RequestHandle> {
        self.agents.get(agent)?.current_request
    }

    pub fn request_status(&self, request: RequestHandle) -> Option<RequestStatus> {
        Some(self.requests.get(request)?.status)
    }

    /// The finished plan, leaf-first: index 0 is the deepest dependency,
    /// the last entry satisfies the top-level goal directly.
    pub fn request_actions(&self, request: RequestHandle) -> Option<&[ActionId]> {
        Some(self.requests.get(request)?.actions.as_slice())
    }

    pub fn request_used_fallback(&self, request: RequestHandle) -> Option<bool> {
        Some(self.requests.get(request)?.fallback)
    }

    /// Terminal outcome of the agent's most recently completed request.
    /// Reading consumes it.
    pub fn take_last_outcome(&mut self, agent: AgentHandle) -> Option<PlanOutcome> {
        self.agents.get_mut(agent)?.last_outcome.take()
    }

    pub fn record_counts(&self) -> RecordCounts {
        RecordCounts {
            agents: self.agents.len(),
            requests: self.requests.len(),
            searches: self.searches.len(),
            resolvers: self.resolvers.len(),
            plan_execs: self.plan_execs.len(),
            atom_set_execs: self.atom_execs.len(),
            atoms: self.atoms.len(),
            on_fails: self.on_fails.len(),
        }
    }

    /// Starts collecting trace events into an in-memory log.
    pub fn enable_trace_log(&mut self) {
        if self.trace_log.is_none() {
            self.trace_log = Some(TraceLog::default());
        }
    }

    pub fn trace_log(&self) -> Option<&TraceLog> {
        self.trace_log.as_ref()
    }

    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.trace_sink = Some(sink);
    }

    pub(crate) fn emit(&mut self, event: TraceEvent) {
        if let Some(log) = self.trace_log.as_mut() {
            log.push(event.clone());
        }
        if let Some(sink) = self.trace_sink.as_mut() {
            sink.emit(event);
        }
    }

    /// Runs every processing stage once, in the fixed dependency order.
    pub fn tick(&mut self, ctx: &TickContext, world: &mut W) {
        self.run_agent_stage(ctx, world);
        self.run_resolver_stage(ctx, world);
        self.run_search_stage(ctx);
        self.run_execution_stage(ctx);
        self.run_atom_stage(ctx, world);
    }

    /// Issues requests for idle agents and consumes finished ones.
    fn run_agent_stage(&mut self, ctx: &TickContext, world: &mut W) {
        for agent in self.agents.handles() {
            let Some(record) = self.agents.get(agent) else {
                continue;
            };

            let Some(request) = record.current_request else {
                if record.goals.is_empty() {
                    continue;
                }
                let ready = match record.last_request_tick {
                    None => true,
                    Some(last) => {
                        ctx.tick.saturating_sub(last) >= self.config.replan_interval_ticks as u64
                    }
                };
                if ready {
                    self.issue_request(ctx, agent);
                }
                continue;
            };

            let Some(status) = self.request_status(request) else {
                continue;
            };
            match status {
                RequestStatus::Running => {}
                RequestStatus::Failed => {
                    self.finish_request(ctx, world, agent, request, PlanOutcome::Failure);
                }
                RequestStatus::Success => {
                    let execution = self.requests.get(request).and_then(|r| r.execution);
                    match execution {
                        None => self.start_execution(ctx, agent, request),
                        Some(exec) => {
                            let exec_done =
                                self.plan_execs.get(exec).map(|pe| pe.done).unwrap_or(false);
                            if exec_done {
                                self.finish_request(
                                    ctx,
                                    world,
                                    agent,
                                    request,
                                    PlanOutcome::Success,
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    fn issue_request(&mut self, ctx: &TickContext, agent: AgentHandle) {
        let Some(record) = self.agents.get(agent) else {
            return;
        };
        let goals = record.goals;

        let request = self.requests.insert(PlanRequest {
            agent,
            status: RequestStatus::Running,
            fallback: false,
            actions: Vec::new(),
            root: None,
            execution: None,
            expansions: 0,
        });
        let root = self.spawn_root(agent, request, goals.into());
        if let Some(r) = self.requests.get_mut(request) {
            r.root = Some(root);
        }
        if let Some(a) = self.agents.get_mut(agent) {
            a.current_request = Some(request);
            a.last_request_tick = Some(ctx.tick);
        }
        self.emit(TraceEvent::new(ctx.tick, "goap.request.spawn").with_a(agent.index() as u64));
    }

    pub(crate) fn spawn_root(
        &mut self,
        agent: AgentHandle,
        request: RequestHandle,
        targets: TargetList,
    ) -> SearchHandle {
        self.searches.insert(SearchFrame {
            agent,
            request,
            parent: None,
            root: None,
            targets,
            condition_index: 0,
            action_index: 0,
            probing: false,
            wait: Wait::None,
            done: false,
            success: false,
            actions: Vec::new(),
            resolved: ConditionSet::new(),
        })
    }

    fn start_execution(&mut self, ctx: &TickContext, agent: AgentHandle, request: RequestHandle) {
        let plan_len = self
            .requests
            .get(request)
            .map(|r| r.actions.len())
            .unwrap_or(0);
        let exec = self.plan_execs.insert(PlanExec {
            agent,
            request,
            action_index: 0,
            current_set: None,
            done: false,
        });
        if let Some(r) = self.requests.get_mut(request) {
            r.execution = Some(exec);
        }
        self.emit(TraceEvent::new(ctx.tick, "goap.exec.start").with_a(plan_len as u64));
    }

    fn finish_request(
        &mut self,
        ctx: &TickContext,
        world: &mut W,
        agent: AgentHandle,
        request: RequestHandle,
        outcome: PlanOutcome,
    ) {
        self.destroy_request_tree(ctx, world, request);
        if let Some(a) = self.agents.get_mut(agent) {
            a.current_request = None;
            a.last_outcome = Some(outcome);
        }
        let tag = match outcome {
            PlanOutcome::Success => "goap.request.outcome.success",
            PlanOutcome::Failure => "goap.request.outcome.failure",
        };
        self.emit(TraceEvent::new(ctx.tick, tag).with_a(agent.index() as u64));
    }

    /// Ticks resolver tasks. A task returning an answer marks its record
    /// `done`; the search stage consumes it afterwards.
    fn run_resolver_stage(&mut self, ctx: &TickContext, world: &mut W) {
        for handle in self.resolvers.handles() {
            let Some(record) = self.resolvers.get_mut(handle) else {
                continue;
            };
            if record.done {
                continue;
            }
            let external = record.external;
            let Some(task) = record.task.as_mut() else {
                continue;
            };
            if let Some(result) = task.tick(ctx, external, &*world) {
                record.result = result;
                record.done = true;
                record.task = None;
            }
        }
    }

    /// Ticks running atom tasks against the mutable world.
    fn run_atom_stage(&mut self, ctx: &TickContext, world: &mut W) {
        for handle in self.atoms.handles() {
            let mut start_of: Option<ActionId> = None;
            {
                let Some(record) = self.atoms.get_mut(handle) else {
                    continue;
                };
                if record.status != ActionStatus::Running {
                    continue;
                }
                let external = record.external;
                let parent = record.parent;
                let first = !record.started;
                let Some(task) = record.task.as_mut() else {
                    continue;
                };
                let status = task.tick(ctx, external, world);
                record.started = true;
                record.status = status;
                if first {
                    start_of = self.atom_execs.get(parent).map(|s| s.action);
                }
            }
            if let Some(action) = start_of {
                self.emit(TraceEvent::new(ctx.tick, "goap.atom.start").with_a(action.0 as u64));
            }
        }
    }

    /// Commits composer-enqueued task attachments after a stage scan.
    pub(crate) fn apply_queue(&mut self, queue: DeferredQueue<W>) {
        for op in queue.into_ops() {
            match op {
                DeferredOp::ResolverTask(handle, task) => {
                    if let Some(record) = self.resolvers.get_mut(handle) {
                        record.task = Some(task);
                    }
                }
                DeferredOp::AtomTask(handle, task) => {
                    if let Some(record) = self.atoms.get_mut(handle) {
                        record.task = Some(task);
                    }
                }
            }
        }
    }

    /// Destroys a request and every record reachable from it.
    pub(crate) fn destroy_request_tree(
        &mut self,
        ctx: &TickContext,
        world: &mut W,
        request: RequestHandle,
    ) {
        let Some(record) = self.requests.remove(request) else {
            return;
        };
        if let Some(root) = record.root {
            self.destroy_search_subtree(root);
        }
        if let Some(exec) = record.execution {
            self.destroy_execution(ctx, world, exec);
        }
    }

    pub(crate) fn destroy_search_subtree(&mut self, root: SearchHandle) {
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            let Some(frame) = self.searches.remove(handle) else {
                continue;
            };
            match frame.wait {
                Wait::Child(child) => stack.push(child),
                Wait::Resolver(resolver) => {
                    self.resolvers.remove(resolver);
                }
                Wait::None => {}
            }
        }
    }

    fn destroy_execution(&mut self, ctx: &TickContext, world: &mut W, exec: PlanExecHandle) {
        let Some(plan) = self.plan_execs.remove(exec) else {
            return;
        };
        let Some(set) = plan.current_set else {
            return;
        };
        let Some(set_record) = self.atom_execs.remove(set) else {
            return;
        };
        if let Some(atom) = set_record.current_atom {
            self.destroy_atom(ctx, world, atom);
        }
        if let Some(on_fail) = set_record.on_fail {
            if let Some(walk) = self.on_fails.remove(on_fail) {
                if let Some(atom) = walk.current_atom {
                    self.destroy_atom(ctx, world, atom);
                }
            }
        }
    }

    pub(crate) fn destroy_atom(&mut self, ctx: &TickContext, world: &mut W, atom: AtomHandle) {
        let Some(mut record) = self.atoms.remove(atom) else {
            return;
        };
        if record.status == ActionStatus::Running {
            let external = record.external;
            if let Some(task) = record.task.as_mut() {
                task.cancel(ctx, external, world);
            }
        }
    }
}

impl<W: WorldMut + 'static> Default for GoapRuntime<W> {
    fn default() -> Self {
        Self::new()
    }
}
