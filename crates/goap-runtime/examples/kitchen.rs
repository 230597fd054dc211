//! Plans and executes a three-action cooking chain, printing the plan and
//! the trace as it goes.
//!
//! Run with `cargo run -p goap-runtime --example kitchen`.

use goap_core::{
    ActionId, ActionStatus, AtomActionComposer, AtomActionSet, AtomHandle, AtomTask, Condition,
    ConditionId, DeferredQueue, Domain, DomainId, GoapAction, InstantResolver, RequestStatus,
    TickContext, WorldMut, WorldView,
};
use goap_runtime::GoapRuntime;

const HAS_COCOA: u16 = 1;
const HAS_CHOCOLATE: u16 = 2;
const HAS_ICING: u16 = 3;

#[derive(Default)]
struct Kitchen {
    log: Vec<&'static str>,
}

impl WorldView for Kitchen {
    type Agent = u64;
}

impl WorldMut for Kitchen {}

fn c(id: u16, value: bool) -> Condition {
    Condition::new(ConditionId(id), value)
}

struct Step {
    name: &'static str,
}

impl AtomActionComposer<Kitchen> for Step {
    fn prepare(
        &self,
        _ctx: &TickContext,
        _agent: u64,
        atom: AtomHandle,
        queue: &mut DeferredQueue<Kitchen>,
    ) {
        let name = self.name;
        queue.set_atom_task(atom, Box::new(StepTask { name }));
    }
}

struct StepTask {
    name: &'static str,
}

impl AtomTask<Kitchen> for StepTask {
    fn tick(&mut self, _ctx: &TickContext, _agent: u64, world: &mut Kitchen) -> ActionStatus {
        world.log.push(self.name);
        ActionStatus::Success
    }
}

fn step(name: &'static str) -> AtomActionSet<Kitchen> {
    AtomActionSet::new(vec![Box::new(Step { name })])
}

fn main() {
    let mut domain = Domain::new(DomainId(0));
    domain
        .add_action(
            GoapAction::new(ActionId(1), 10.0, c(HAS_COCOA, true)),
            step("buy_cocoa"),
        )
        .expect("register buy_cocoa");
    domain
        .add_action(
            GoapAction::new(ActionId(2), 1.0, c(HAS_CHOCOLATE, true))
                .with_precondition(c(HAS_COCOA, true)),
            step("make_chocolate"),
        )
        .expect("register make_chocolate");
    domain
        .add_action(
            GoapAction::new(ActionId(3), 1.0, c(HAS_ICING, true))
                .with_precondition(c(HAS_CHOCOLATE, true)),
            step("make_icing"),
        )
        .expect("register make_icing");
    domain.add_resolver(
        ConditionId(HAS_COCOA),
        Box::new(InstantResolver::<Kitchen>(|_, _| false)),
    );
    domain.add_resolver(
        ConditionId(HAS_CHOCOLATE),
        Box::new(InstantResolver::<Kitchen>(|_, _| false)),
    );
    domain.sort_actions();

    let mut runtime = GoapRuntime::new();
    runtime.add_domain(domain);
    runtime.enable_trace_log();

    let mut world = Kitchen::default();
    let agent = runtime.spawn_agent(1, DomainId(0));
    runtime.set_goals(agent, &[c(HAS_ICING, true)]);

    let mut printed_plan = false;
    for tick in 0..100u64 {
        runtime.tick(&TickContext::new(tick, 0.1), &mut world);
        if !printed_plan {
            if let Some(request) = runtime.current_request(agent) {
                if runtime.request_status(request) == Some(RequestStatus::Success) {
                    if let Some(actions) = runtime.request_actions(request) {
                        println!("plan: {actions:?}");
                        printed_plan = true;
                    }
                }
            }
        }
        if runtime.take_last_outcome(agent).is_some() {
            break;
        }
    }

    println!("executed: {:?}", world.log);
    if let Some(trace) = runtime.trace_log() {
        for event in &trace.events {
            println!("[{:>3}] {} a={} b={}", event.tick, event.tag, event.a, event.b);
        }
    }
}
