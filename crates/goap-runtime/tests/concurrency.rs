use goap_core::{
    ActionId, ActionStatus, AtomActionComposer, AtomActionSet, AtomHandle, AtomTask, Condition,
    ConditionId, ConditionResolverComposer, DeferredQueue, Domain, DomainId, GoapAction,
    InstantResolver, PlanOutcome, RequestStatus, ResolverHandle, ResolverTask, TickContext,
    WorldMut, WorldView,
};
use goap_runtime::{GoapRuntime, GoapRuntimeConfig};

const GOAL: u16 = 1;
const BLOCKED: u16 = 2;
const EASY: u16 = 3;

#[derive(Default)]
struct Camp {
    log: Vec<(u64, &'static str)>,
}

impl WorldView for Camp {
    type Agent = u64;
}

impl WorldMut for Camp {}

fn c(id: u16, value: bool) -> Condition {
    Condition::new(ConditionId(id), value)
}

struct Step {
    name: &'static str,
}

impl AtomActionComposer<Camp> for Step {
    fn prepare(
        &self,
        _ctx: &TickContext,
        _agent: u64,
        atom: AtomHandle,
        queue: &mut DeferredQueue<Camp>,
    ) {
        let name = self.name;
        queue.set_atom_task(atom, Box::new(StepTask { name }));
    }
}

struct StepTask {
    name: &'static str,
}

impl AtomTask<Camp> for StepTask {
    fn tick(&mut self, _ctx: &TickContext, agent: u64, world: &mut Camp) -> ActionStatus {
        world.log.push((agent, self.name));
        ActionStatus::Success
    }
}

struct NeverResolver;

impl ConditionResolverComposer<Camp> for NeverResolver {
    fn prepare(
        &self,
        _ctx: &TickContext,
        _agent: u64,
        resolver: ResolverHandle,
        queue: &mut DeferredQueue<Camp>,
    ) {
        queue.set_resolver_task(resolver, Box::new(NeverTask));
    }
}

struct NeverTask;

impl ResolverTask<Camp> for NeverTask {
    fn tick(&mut self, _ctx: &TickContext, _agent: u64, _world: &Camp) -> Option<bool> {
        None
    }
}

/// Resolver that answers `false` only after a fixed number of ticks.
struct SlowResolver {
    delay: u32,
}

impl ConditionResolverComposer<Camp> for SlowResolver {
    fn prepare(
        &self,
        _ctx: &TickContext,
        _agent: u64,
        resolver: ResolverHandle,
        queue: &mut DeferredQueue<Camp>,
    ) {
        queue.set_resolver_task(
            resolver,
            Box::new(SlowTask {
                remaining: self.delay,
            }),
        );
    }
}

struct SlowTask {
    remaining: u32,
}

impl ResolverTask<Camp> for SlowTask {
    fn tick(&mut self, _ctx: &TickContext, _agent: u64, _world: &Camp) -> Option<bool> {
        if self.remaining > 0 {
            self.remaining -= 1;
            return None;
        }
        Some(false)
    }
}

fn camp_domain() -> Domain<Camp> {
    let mut domain = Domain::new(DomainId(0));
    domain
        .add_action(
            GoapAction::new(ActionId(1), 1.0, c(GOAL, true)),
            AtomActionSet::new(vec![Box::new(Step { name: "work" })]),
        )
        .unwrap();
    domain.add_resolver(ConditionId(BLOCKED), Box::new(NeverResolver));
    domain.sort_actions();
    domain
}

#[test]
fn a_stalled_resolver_only_suspends_its_own_agent() {
    let mut runtime = GoapRuntime::new();
    runtime.add_domain(camp_domain());

    let mut world = Camp::default();
    let worker = runtime.spawn_agent(1, DomainId(0));
    let stuck = runtime.spawn_agent(2, DomainId(0));
    runtime.set_goals(worker, &[c(GOAL, true)]);
    runtime.set_goals(stuck, &[c(BLOCKED, true)]);

    let mut worker_outcome = None;
    for tick in 0..60u64 {
        runtime.tick(&TickContext::new(tick, 0.1), &mut world);
        if worker_outcome.is_none() {
            worker_outcome = runtime.take_last_outcome(worker);
        }
    }

    assert_eq!(worker_outcome, Some(PlanOutcome::Success));
    assert!(world.log.contains(&(1, "work")));

    // The stalled agent is still waiting on its resolver, not failed.
    let request = runtime.current_request(stuck).expect("request dropped");
    assert_eq!(runtime.request_status(request), Some(RequestStatus::Running));
    assert_eq!(runtime.take_last_outcome(stuck), None);
}

#[test]
fn a_multi_tick_resolver_suspends_the_search_until_it_answers() {
    let mut domain = Domain::new(DomainId(0));
    domain
        .add_action(
            GoapAction::new(ActionId(1), 1.0, c(GOAL, true)),
            AtomActionSet::new(vec![Box::new(Step { name: "work" })]),
        )
        .unwrap();
    domain.add_resolver(ConditionId(GOAL), Box::new(SlowResolver { delay: 6 }));
    domain.sort_actions();

    let mut runtime = GoapRuntime::new();
    runtime.add_domain(domain);

    let mut world = Camp::default();
    let agent = runtime.spawn_agent(1, DomainId(0));
    runtime.set_goals(agent, &[c(GOAL, true)]);

    let mut finished_at = None;
    for tick in 0..60u64 {
        runtime.tick(&TickContext::new(tick, 0.1), &mut world);
        if runtime.take_last_outcome(agent).is_some() {
            finished_at = Some(tick);
            break;
        }
    }

    let finished_at = finished_at.expect("request never finished");
    assert!(finished_at >= 6, "resolver delay was not respected");
    assert_eq!(world.log, vec![(1, "work")]);
}

#[test]
fn two_agents_interleave_within_the_same_ticks() {
    let mut runtime = GoapRuntime::new();
    runtime.add_domain(camp_domain());

    let mut world = Camp::default();
    let a = runtime.spawn_agent(1, DomainId(0));
    let b = runtime.spawn_agent(2, DomainId(0));
    runtime.set_goals(a, &[c(GOAL, true)]);
    runtime.set_goals(b, &[c(GOAL, true)]);

    let mut a_done = false;
    let mut b_done = false;
    for tick in 0..60u64 {
        runtime.tick(&TickContext::new(tick, 0.1), &mut world);
        a_done |= runtime.take_last_outcome(a) == Some(PlanOutcome::Success);
        b_done |= runtime.take_last_outcome(b) == Some(PlanOutcome::Success);
        if a_done && b_done {
            break;
        }
    }

    assert!(a_done && b_done);
    assert!(world.log.contains(&(1, "work")));
    assert!(world.log.contains(&(2, "work")));
}

#[test]
fn replan_interval_spaces_out_requests() {
    const REST: u16 = 7;

    let mut domain: Domain<Camp> = Domain::new(DomainId(0));
    domain.add_resolver(
        ConditionId(REST),
        Box::new(InstantResolver::<Camp>(|_, _| true)),
    );
    domain.sort_actions();

    let mut runtime = GoapRuntime::new().with_config(GoapRuntimeConfig {
        max_search_expansions: 4096,
        replan_interval_ticks: 10,
    });
    runtime.add_domain(domain);
    runtime.enable_trace_log();

    let mut world = Camp::default();
    let agent = runtime.spawn_agent(1, DomainId(0));
    runtime.set_goals(agent, &[c(REST, true)]);

    for tick in 0..40u64 {
        runtime.tick(&TickContext::new(tick, 0.1), &mut world);
    }

    let spawns: Vec<u64> = runtime
        .trace_log()
        .unwrap()
        .with_tag("goap.request.spawn")
        .map(|e| e.tick)
        .collect();
    assert!(spawns.len() >= 2, "expected repeated replanning");
    assert!(spawns.windows(2).all(|w| w[1] - w[0] >= 10));
}
