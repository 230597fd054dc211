//! The execution stage: walks each successful request's action list in
//! order, materializes atom steps through their composers, and runs the
//! reverse on-fail compensation walk when a step fails.

use goap_core::{
    ActionStatus, AtomSetExecHandle, DeferredQueue, OnFailHandle, PlanExecHandle, RequestStatus,
    TickContext, WorldMut,
};
use goap_tools::TraceEvent;

use crate::records::{AtomRecord, AtomSetExec, OnFailExec};
use crate::runtime::GoapRuntime;

impl<W: WorldMut + 'static> GoapRuntime<W> {
    pub(crate) fn run_execution_stage(&mut self, ctx: &TickContext) {
        let mut queue = DeferredQueue::new();
        for handle in self.plan_execs.handles() {
            self.step_plan_exec(ctx, handle, &mut queue);
        }
        self.apply_queue(queue);
    }

    fn step_plan_exec(
        &mut self,
        ctx: &TickContext,
        handle: PlanExecHandle,
        queue: &mut DeferredQueue<W>,
    ) {
        let Some(plan) = self.plan_execs.get(handle) else {
            return;
        };
        if plan.done {
            // Consumed by the agent stage.
            return;
        }
        let agent = plan.agent;
        let request = plan.request;

        let Some(set) = plan.current_set else {
            // Move to the next action, or finish the plan.
            let action = self
                .requests
                .get(request)
                .and_then(|r| r.actions.get(plan.action_index).copied());
            let Some(action) = action else {
                let count = plan.action_index;
                if let Some(plan) = self.plan_execs.get_mut(handle) {
                    plan.done = true;
                }
                self.emit(TraceEvent::new(ctx.tick, "goap.exec.done").with_a(count as u64));
                return;
            };

            let domain_id = match self.agents.get(agent) {
                Some(a) => a.domain,
                None => return,
            };
            let atom_count = self
                .domains
                .get(&domain_id)
                .and_then(|d| d.atom_set(action))
                .map(|s| s.len())
                .unwrap_or(0);

            let set = self.atom_execs.insert(AtomSetExec {
                agent,
                plan: handle,
                action,
                atom_index: 0,
                atom_count,
                current_atom: None,
                on_fail: None,
            });
            if let Some(plan) = self.plan_execs.get_mut(handle) {
                plan.current_set = Some(set);
            }
            self.emit(TraceEvent::new(ctx.tick, "goap.exec.action").with_a(action.0 as u64));
            return;
        };

        self.step_atom_set(ctx, handle, set, queue);
    }

    fn step_atom_set(
        &mut self,
        ctx: &TickContext,
        plan: PlanExecHandle,
        set: AtomSetExecHandle,
        queue: &mut DeferredQueue<W>,
    ) {
        let Some(record) = self.atom_execs.get(set) else {
            return;
        };
        let on_fail = record.on_fail;
        let current_atom = record.current_atom;
        let atom_index = record.atom_index;
        let atom_count = record.atom_count;

        if let Some(on_fail) = on_fail {
            self.step_on_fail(ctx, plan, set, on_fail, queue);
            return;
        }

        match current_atom {
            None => {
                if atom_index >= atom_count {
                    // Action complete; advance the plan walk.
                    self.atom_execs.remove(set);
                    if let Some(plan) = self.plan_execs.get_mut(plan) {
                        plan.current_set = None;
                        plan.action_index += 1;
                    }
                    return;
                }
                self.spawn_atom(ctx, set, queue, false, atom_index);
            }
            Some(atom) => {
                let status = self
                    .atoms
                    .get(atom)
                    .map(|a| a.status)
                    .unwrap_or(ActionStatus::Failure);
                match status {
                    ActionStatus::Running => {}
                    ActionStatus::Success => {
                        self.atoms.remove(atom);
                        let Some(record) = self.atom_execs.get_mut(set) else {
                            return;
                        };
                        let action = record.action;
                        let index = record.atom_index;
                        record.current_atom = None;
                        record.atom_index += 1;
                        self.emit(
                            TraceEvent::new(ctx.tick, "goap.atom.success")
                                .with_a(action.0 as u64)
                                .with_b(index as u64),
                        );
                    }
                    ActionStatus::Failure => {
                        self.atoms.remove(atom);
                        self.begin_on_fail(ctx, plan, set);
                    }
                }
            }
        }
    }

    /// Collects the already-succeeded steps that declared compensation and
    /// starts the reverse walk; with nothing to compensate the action
    /// fails immediately.
    fn begin_on_fail(&mut self, ctx: &TickContext, plan: PlanExecHandle, set: AtomSetExecHandle) {
        let Some(record) = self.atom_execs.get_mut(set) else {
            return;
        };
        record.current_atom = None;
        let agent = record.agent;
        let action = record.action;
        let failed_index = record.atom_index;
        self.emit(
            TraceEvent::new(ctx.tick, "goap.atom.failed")
                .with_a(action.0 as u64)
                .with_b(failed_index as u64),
        );

        let domain_id = match self.agents.get(agent) {
            Some(a) => a.domain,
            None => return,
        };
        let remaining: Vec<usize> = match self.domains.get(&domain_id).and_then(|d| d.atom_set(action))
        {
            Some(atoms) => (0..failed_index)
                .filter(|&i| {
                    atoms
                        .composer(i)
                        .map(|c| c.has_on_fail_action())
                        .unwrap_or(false)
                })
                .collect(),
            None => Vec::new(),
        };

        if remaining.is_empty() {
            self.fail_action(ctx, plan, set);
            return;
        }

        let count = remaining.len();
        let on_fail = self.on_fails.insert(OnFailExec {
            agent,
            set,
            remaining,
            current_atom: None,
        });
        if let Some(record) = self.atom_execs.get_mut(set) {
            record.on_fail = Some(on_fail);
        }
        self.emit(TraceEvent::new(ctx.tick, "goap.onfail.start").with_a(count as u64));
    }

    fn step_on_fail(
        &mut self,
        ctx: &TickContext,
        plan: PlanExecHandle,
        set: AtomSetExecHandle,
        on_fail: OnFailHandle,
        queue: &mut DeferredQueue<W>,
    ) {
        let Some(walk) = self.on_fails.get_mut(on_fail) else {
            return;
        };

        match walk.current_atom {
            Some(atom) => {
                let status = self
                    .atoms
                    .get(atom)
                    .map(|a| a.status)
                    .unwrap_or(ActionStatus::Failure);
                if status.is_terminal() {
                    // A compensation step runs to completion either way;
                    // its own failure does not cascade further.
                    self.atoms.remove(atom);
                    if let Some(walk) = self.on_fails.get_mut(on_fail) {
                        walk.current_atom = None;
                    }
                }
            }
            None => {
                let Some(index) = walk.remaining.pop() else {
                    // Compensation finished; the action, and with it the
                    // plan, has failed.
                    self.on_fails.remove(on_fail);
                    self.fail_action(ctx, plan, set);
                    return;
                };
                self.spawn_atom(ctx, set, queue, true, index);
                self.emit(TraceEvent::new(ctx.tick, "goap.onfail.step").with_a(index as u64));
            }
        }
    }

    /// Materializes one atom record and lets its composer attach the task
    /// (forward or compensating) through the deferred queue.
    fn spawn_atom(
        &mut self,
        ctx: &TickContext,
        set: AtomSetExecHandle,
        queue: &mut DeferredQueue<W>,
        compensating: bool,
        index: usize,
    ) {
        let Some(record) = self.atom_execs.get(set) else {
            return;
        };
        let agent = record.agent;
        let action = record.action;
        let on_fail = record.on_fail;

        let Some(agent_record) = self.agents.get(agent) else {
            return;
        };
        let external = agent_record.external;
        let domain_id = agent_record.domain;

        let atom = self.atoms.insert(AtomRecord {
            agent,
            external,
            parent: set,
            started: false,
            compensating,
            status: ActionStatus::Running,
            task: None,
        });

        if let Some(atoms) = self.domains.get(&domain_id).and_then(|d| d.atom_set(action)) {
            if let Some(composer) = atoms.composer(index) {
                if compensating {
                    composer.prepare_on_fail_action(ctx, external, atom, queue);
                } else {
                    composer.prepare(ctx, external, atom, queue);
                }
            }
        }

        if compensating {
            if let Some(walk) = on_fail.and_then(|h| self.on_fails.get_mut(h)) {
                walk.current_atom = Some(atom);
            }
        } else if let Some(record) = self.atom_execs.get_mut(set) {
            record.current_atom = Some(atom);
        }
    }

    /// Marks the whole plan failed after an action could not complete.
    fn fail_action(&mut self, ctx: &TickContext, plan: PlanExecHandle, set: AtomSetExecHandle) {
        let action = self.atom_execs.remove(set).map(|s| s.action);
        let request = self.plan_execs.get(plan).map(|p| p.request);
        if let Some(record) = self.plan_execs.get_mut(plan) {
            record.current_set = None;
            record.done = true;
        }
        if let Some(req) = request.and_then(|r| self.requests.get_mut(r)) {
            req.status = RequestStatus::Failed;
        }
        self.emit(
            TraceEvent::new(ctx.tick, "goap.exec.failed")
                .with_a(action.map(|a| a.0 as u64).unwrap_or(0)),
        );
    }
}
