use goap_core::{
    ActionId, ActionStatus, AtomActionComposer, AtomActionSet, AtomHandle, AtomTask, Condition,
    ConditionId, ConditionResolverComposer, DeferredQueue, Domain, DomainId, GoapAction,
    ResolverHandle, ResolverTask, TickContext, WorldMut, WorldView,
};
use goap_runtime::GoapRuntime;

const GOAL: u16 = 1;
const BLOCKED: u16 = 2;

#[derive(Default)]
struct Yard {
    log: Vec<&'static str>,
    canceled: Vec<&'static str>,
}

impl WorldView for Yard {
    type Agent = u64;
}

impl WorldMut for Yard {}

fn c(id: u16, value: bool) -> Condition {
    Condition::new(ConditionId(id), value)
}

/// Long-running atom that records its cancellation.
struct SlowAtom;

impl AtomActionComposer<Yard> for SlowAtom {
    fn prepare(
        &self,
        _ctx: &TickContext,
        _agent: u64,
        atom: AtomHandle,
        queue: &mut DeferredQueue<Yard>,
    ) {
        queue.set_atom_task(atom, Box::new(SlowTask));
    }
}

struct SlowTask;

impl AtomTask<Yard> for SlowTask {
    fn tick(&mut self, _ctx: &TickContext, _agent: u64, world: &mut Yard) -> ActionStatus {
        world.log.push("hauling");
        ActionStatus::Running
    }

    fn cancel(&mut self, _ctx: &TickContext, _agent: u64, world: &mut Yard) {
        world.canceled.push("haul");
    }
}

/// Resolver that never answers.
struct NeverResolver;

impl ConditionResolverComposer<Yard> for NeverResolver {
    fn prepare(
        &self,
        _ctx: &TickContext,
        _agent: u64,
        resolver: ResolverHandle,
        queue: &mut DeferredQueue<Yard>,
    ) {
        queue.set_resolver_task(resolver, Box::new(NeverTask));
    }
}

struct NeverTask;

impl ResolverTask<Yard> for NeverTask {
    fn tick(&mut self, _ctx: &TickContext, _agent: u64, _world: &Yard) -> Option<bool> {
        None
    }
}

fn yard_domain() -> Domain<Yard> {
    let mut domain = Domain::new(DomainId(0));
    domain
        .add_action(
            GoapAction::new(ActionId(1), 1.0, c(GOAL, true)),
            AtomActionSet::new(vec![Box::new(SlowAtom)]),
        )
        .unwrap();
    domain.add_resolver(ConditionId(BLOCKED), Box::new(NeverResolver));
    domain.sort_actions();
    domain
}

#[test]
fn despawn_mid_execution_destroys_every_descendant_and_cancels() {
    let mut runtime = GoapRuntime::new();
    runtime.add_domain(yard_domain());

    let mut world = Yard::default();
    let agent = runtime.spawn_agent(1, DomainId(0));
    runtime.set_goals(agent, &[c(GOAL, true)]);

    for tick in 0..8u64 {
        runtime.tick(&TickContext::new(tick, 0.1), &mut world);
    }
    assert!(
        world.log.contains(&"hauling"),
        "atom never started running"
    );
    let before = runtime.record_counts();
    assert!(before.descendants() > 0);

    runtime.despawn_agent(&TickContext::new(8, 0.1), &mut world, agent);

    let after = runtime.record_counts();
    assert_eq!(after.agents, 0);
    assert_eq!(after.descendants(), 0);
    assert_eq!(world.canceled, vec!["haul"]);
}

#[test]
fn despawn_mid_search_destroys_frames_and_pending_resolvers() {
    let mut runtime = GoapRuntime::new();
    runtime.add_domain(yard_domain());

    let mut world = Yard::default();
    let agent = runtime.spawn_agent(1, DomainId(0));
    runtime.set_goals(agent, &[c(BLOCKED, true)]);

    for tick in 0..5u64 {
        runtime.tick(&TickContext::new(tick, 0.1), &mut world);
    }
    let before = runtime.record_counts();
    assert!(before.searches > 0);
    assert!(before.resolvers > 0);

    runtime.despawn_agent(&TickContext::new(5, 0.1), &mut world, agent);

    let after = runtime.record_counts();
    assert_eq!(after.agents, 0);
    assert_eq!(after.descendants(), 0);
}

#[test]
fn stale_agent_handles_read_as_absent() {
    let mut runtime = GoapRuntime::new();
    runtime.add_domain(yard_domain());

    let mut world = Yard::default();
    let agent = runtime.spawn_agent(1, DomainId(0));
    runtime.despawn_agent(&TickContext::new(0, 0.1), &mut world, agent);

    assert_eq!(runtime.current_request(agent), None);
    assert_eq!(runtime.take_last_outcome(agent), None);

    // Despawning twice is harmless.
    runtime.despawn_agent(&TickContext::new(1, 0.1), &mut world, agent);
}

#[test]
#[should_panic(expected = "stale agent handle")]
fn setting_goals_on_a_stale_handle_fails_loudly() {
    let mut runtime = GoapRuntime::new();
    runtime.add_domain(yard_domain());

    let mut world = Yard::default();
    let agent = runtime.spawn_agent(1, DomainId(0));
    runtime.despawn_agent(&TickContext::new(0, 0.1), &mut world, agent);
    runtime.set_goals(agent, &[c(GOAL, true)]);
}
