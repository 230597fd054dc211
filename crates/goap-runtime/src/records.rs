use goap_core::{
    ActionId, ActionStatus, AgentHandle, AtomHandle, AtomSetExecHandle, AtomTask, ConditionSet,
    DomainId, GoalList, OnFailHandle, PlanExecHandle, PlanOutcome, RequestHandle, RequestStatus,
    ResolverHandle, ResolverTask, SearchHandle, TargetList, WorldMut,
};

/// What a search frame is currently suspended on, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    None,
    Resolver(ResolverHandle),
    Child(SearchHandle),
}

pub(crate) struct AgentRecord<W: WorldMut> {
    pub external: W::Agent,
    pub domain: DomainId,
    pub goals: GoalList,
    pub fallback_goals: GoalList,
    pub current_request: Option<RequestHandle>,
    pub last_outcome: Option<PlanOutcome>,
    pub last_request_tick: Option<u64>,
}

/// One planning attempt. Owns the finished action list, leaf-first.
pub(crate) struct PlanRequest {
    pub agent: AgentHandle,
    pub status: RequestStatus,
    /// Set once the root search has been restarted on the fallback goals.
    pub fallback: bool,
    pub actions: Vec<ActionId>,
    pub root: Option<SearchHandle>,
    pub execution: Option<PlanExecHandle>,
    /// Child frames spawned under this request, for loop protection.
    pub expansions: u32,
}

/// One node of the backward-chaining search tree.
///
/// Frames persist across ticks instead of living on a call stack: a frame
/// suspends by recording what it waits on and resumes when the search
/// stage next scans it.
pub(crate) struct SearchFrame {
    pub agent: AgentHandle,
    pub request: RequestHandle,
    pub parent: Option<SearchHandle>,
    /// `None` on the root frame itself.
    pub root: Option<SearchHandle>,
    pub targets: TargetList,
    pub condition_index: usize,
    pub action_index: usize,
    /// True once the current target condition passed the dedup-set check;
    /// later steps on the same condition go straight to candidate
    /// iteration.
    pub probing: bool,
    pub wait: Wait,
    pub done: bool,
    pub success: bool,
    /// Actions chosen under this frame, dependencies first. Merged into
    /// the parent only on success, so a failed branch discards its picks
    /// wholesale.
    pub actions: Vec<ActionId>,
    /// Conditions this tree has taken on. Meaningful on the root only;
    /// child frames reach it through `root`.
    pub resolved: ConditionSet,
}

/// Transient "is this condition currently true" unit. Single-use: the
/// owning frame reads the answer once, then the record is destroyed.
pub(crate) struct ResolverRecord<W: WorldMut> {
    pub agent: AgentHandle,
    pub external: W::Agent,
    pub search: SearchHandle,
    pub done: bool,
    pub result: bool,
    pub task: Option<Box<dyn ResolverTask<W>>>,
}

/// Walks the request's action list strictly in order.
pub(crate) struct PlanExec {
    pub agent: AgentHandle,
    pub request: RequestHandle,
    pub action_index: usize,
    pub current_set: Option<AtomSetExecHandle>,
    pub done: bool,
}

/// Walks the ordered atom steps of the current action.
pub(crate) struct AtomSetExec {
    pub agent: AgentHandle,
    pub plan: PlanExecHandle,
    pub action: ActionId,
    pub atom_index: usize,
    pub atom_count: usize,
    pub current_atom: Option<AtomHandle>,
    pub on_fail: Option<OnFailHandle>,
}

/// One materialized atom step, forward or compensating.
pub(crate) struct AtomRecord<W: WorldMut> {
    pub agent: AgentHandle,
    pub external: W::Agent,
    pub parent: AtomSetExecHandle,
    pub started: bool,
    pub compensating: bool,
    pub status: ActionStatus,
    pub task: Option<Box<dyn AtomTask<W>>>,
}

/// Reverse walk over the already-succeeded atom steps of a failed action.
pub(crate) struct OnFailExec {
    pub agent: AgentHandle,
    pub set: AtomSetExecHandle,
    /// Composer indices still owed compensation, ascending. Popped from
    /// the back: the most recently succeeded step compensates first.
    pub remaining: Vec<usize>,
    pub current_atom: Option<AtomHandle>,
}
