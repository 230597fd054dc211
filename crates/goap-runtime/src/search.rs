//! The search stage: advances every live frame of every agent's
//! backward-chaining tree by at most one condition/action step per tick.

use goap_core::{
    Condition, ConditionSet, DeferredQueue, GoapAction, RequestStatus, ResolverHandle,
    SearchHandle, TickContext, WorldMut,
};
use goap_tools::TraceEvent;

use crate::records::{ResolverRecord, SearchFrame, Wait};
use crate::runtime::GoapRuntime;

impl<W: WorldMut + 'static> GoapRuntime<W> {
    pub(crate) fn run_search_stage(&mut self, ctx: &TickContext) {
        let mut queue = DeferredQueue::new();
        for handle in self.searches.handles() {
            self.step_search(ctx, handle, &mut queue);
        }
        self.apply_queue(queue);
    }

    fn step_search(&mut self, ctx: &TickContext, handle: SearchHandle, queue: &mut DeferredQueue<W>) {
        let Some(frame) = self.searches.get(handle) else {
            return;
        };

        if frame.done {
            // Child results are consumed by the waiting parent; only a
            // finished root moves the request forward.
            if frame.parent.is_none() {
                self.finalize_root(ctx, handle);
            }
            return;
        }

        match frame.wait {
            Wait::Resolver(resolver) => self.consume_resolver(ctx, handle, resolver),
            Wait::Child(child) => self.consume_child(handle, child),
            Wait::None => self.step_condition(ctx, handle, queue),
        }
    }

    /// Processes the frame's current target condition: dedup-set check,
    /// then resolver spawn or candidate-action iteration.
    fn step_condition(
        &mut self,
        ctx: &TickContext,
        handle: SearchHandle,
        queue: &mut DeferredQueue<W>,
    ) {
        let Some(frame) = self.searches.get(handle) else {
            return;
        };
        let agent = frame.agent;
        let probing = frame.probing;
        let root = frame.root.unwrap_or(handle);

        let Some(condition) = frame.targets.get(frame.condition_index) else {
            // Every target condition is satisfied.
            let Some(frame) = self.searches.get_mut(handle) else {
                return;
            };
            frame.done = true;
            frame.success = true;
            return;
        };

        if !probing {
            let seen = {
                let Some(root_frame) = self.searches.get_mut(root) else {
                    return;
                };
                !root_frame.resolved.insert(condition)
            };
            if seen {
                // Already taken on elsewhere in this tree: skip.
                if let Some(frame) = self.searches.get_mut(handle) {
                    frame.condition_index += 1;
                }
                return;
            }
            if let Some(frame) = self.searches.get_mut(handle) {
                frame.probing = true;
            }

            let domain = self.agents.get(agent).map(|a| a.domain);
            let has_resolver = domain
                .and_then(|d| self.domains.get(&d))
                .map(|d| d.resolver(condition.id).is_some())
                .unwrap_or(false);
            if has_resolver {
                self.spawn_resolver(ctx, handle, condition, queue);
                return;
            }
        }

        self.try_next_action(ctx, handle, condition);
    }

    fn spawn_resolver(
        &mut self,
        ctx: &TickContext,
        handle: SearchHandle,
        condition: Condition,
        queue: &mut DeferredQueue<W>,
    ) {
        let Some(frame) = self.searches.get(handle) else {
            return;
        };
        let agent = frame.agent;
        let Some(record) = self.agents.get(agent) else {
            return;
        };
        let external = record.external;
        let domain_id = record.domain;

        let resolver = self.resolvers.insert(ResolverRecord {
            agent,
            external,
            search: handle,
            done: false,
            result: false,
            task: None,
        });
        if let Some(domain) = self.domains.get(&domain_id) {
            if let Some(composer) = domain.resolver(condition.id) {
                composer.prepare(ctx, external, resolver, queue);
            }
        }
        if let Some(frame) = self.searches.get_mut(handle) {
            frame.wait = Wait::Resolver(resolver);
        }
        self.emit(TraceEvent::new(ctx.tick, "goap.resolver.spawn").with_a(condition.key() as u64));
    }

    fn consume_resolver(
        &mut self,
        ctx: &TickContext,
        handle: SearchHandle,
        resolver: ResolverHandle,
    ) {
        let done = self.resolvers.get(resolver).map(|r| r.done).unwrap_or(false);
        if !done {
            return;
        }
        let Some(record) = self.resolvers.remove(resolver) else {
            return;
        };
        let Some(frame) = self.searches.get_mut(handle) else {
            return;
        };
        frame.wait = Wait::None;
        let Some(condition) = frame.targets.get(frame.condition_index) else {
            return;
        };

        if record.result == condition.value {
            // The world already agrees; move on to the next condition.
            frame.condition_index += 1;
            frame.action_index = 0;
            frame.probing = false;
            self.emit(
                TraceEvent::new(ctx.tick, "goap.resolver.done")
                    .with_a(condition.key() as u64)
                    .with_b(1),
            );
        } else {
            // Disagreement: an action has to change the world instead.
            self.emit(
                TraceEvent::new(ctx.tick, "goap.resolver.done")
                    .with_a(condition.key() as u64)
                    .with_b(0),
            );
            self.try_next_action(ctx, handle, condition);
        }
    }

    fn consume_child(&mut self, handle: SearchHandle, child: SearchHandle) {
        let done = self.searches.get(child).map(|c| c.done).unwrap_or(false);
        if !done {
            return;
        }
        let Some(child_frame) = self.searches.remove(child) else {
            return;
        };

        if child_frame.success {
            let chosen = self.current_candidate(handle);
            let Some(frame) = self.searches.get_mut(handle) else {
                return;
            };
            frame.wait = Wait::None;
            let Some(action) = chosen else {
                return;
            };
            // Dependencies first, then the action they enable.
            frame.actions.extend(child_frame.actions);
            frame.actions.push(action.id);
            frame.condition_index += 1;
            frame.action_index = 0;
            frame.probing = false;
        } else {
            // Branch failed: drop its picks and try the next candidate.
            let Some(frame) = self.searches.get_mut(handle) else {
                return;
            };
            frame.wait = Wait::None;
            frame.action_index += 1;
        }
    }

    /// Takes the next untried candidate for `condition`, cheapest first.
    /// No candidate left means this branch cannot satisfy the goal.
    fn try_next_action(&mut self, ctx: &TickContext, handle: SearchHandle, condition: Condition) {
        let Some(candidate) = self.current_candidate_for(handle, condition) else {
            self.fail_frame(ctx, handle, condition);
            return;
        };

        if candidate.preconditions.is_empty() {
            let Some(frame) = self.searches.get_mut(handle) else {
                return;
            };
            frame.actions.push(candidate.id);
            frame.condition_index += 1;
            frame.action_index = 0;
            frame.probing = false;
            return;
        }

        let Some(frame) = self.searches.get(handle) else {
            return;
        };
        let agent = frame.agent;
        let request = frame.request;
        let root = frame.root.unwrap_or(handle);

        // Loop protection: abandon the branch instead of growing forever.
        let over_budget = {
            let Some(req) = self.requests.get_mut(request) else {
                return;
            };
            req.expansions += 1;
            req.expansions > self.config.max_search_expansions
        };
        if over_budget {
            self.emit(TraceEvent::new(ctx.tick, "goap.search.budget"));
            if let Some(frame) = self.searches.get_mut(handle) {
                frame.done = true;
                frame.success = false;
            }
            return;
        }

        let child = self.searches.insert(SearchFrame {
            agent,
            request,
            parent: Some(handle),
            root: Some(root),
            targets: candidate.preconditions,
            condition_index: 0,
            action_index: 0,
            probing: false,
            wait: Wait::None,
            done: false,
            success: false,
            actions: Vec::new(),
            resolved: ConditionSet::new(),
        });
        if let Some(frame) = self.searches.get_mut(handle) {
            frame.wait = Wait::Child(child);
        }
    }

    /// The candidate currently pointed at by the frame's action cursor.
    fn current_candidate(&self, handle: SearchHandle) -> Option<GoapAction> {
        let frame = self.searches.get(handle)?;
        let condition = frame.targets.get(frame.condition_index)?;
        self.current_candidate_for(handle, condition)
    }

    fn current_candidate_for(
        &self,
        handle: SearchHandle,
        condition: Condition,
    ) -> Option<GoapAction> {
        let frame = self.searches.get(handle)?;
        let domain_id = self.agents.get(frame.agent)?.domain;
        let domain = self.domains.get(&domain_id)?;
        domain
            .actions_for(condition)?
            .get(frame.action_index)
            .copied()
    }

    fn fail_frame(&mut self, ctx: &TickContext, handle: SearchHandle, condition: Condition) {
        if let Some(frame) = self.searches.get_mut(handle) {
            frame.done = true;
            frame.success = false;
        }
        self.emit(TraceEvent::new(ctx.tick, "goap.search.exhausted").with_a(condition.key() as u64));
    }

    /// A finished root either hands its plan to the request, restarts on
    /// the fallback goals, or fails the request outright.
    fn finalize_root(&mut self, ctx: &TickContext, handle: SearchHandle) {
        let Some(mut root) = self.searches.remove(handle) else {
            return;
        };
        let request = root.request;
        let agent = root.agent;

        if root.success {
            let plan_len = root.actions.len();
            let fallback = self.requests.get(request).map(|r| r.fallback).unwrap_or(false);
            if let Some(req) = self.requests.get_mut(request) {
                req.actions = std::mem::take(&mut root.actions);
                req.status = RequestStatus::Success;
                req.root = None;
            }
            self.emit(
                TraceEvent::new(ctx.tick, "goap.plan.success")
                    .with_a(plan_len as u64)
                    .with_b(fallback as u64),
            );
            return;
        }

        let tried_fallback = self.requests.get(request).map(|r| r.fallback).unwrap_or(true);
        let fallback_goals = self
            .agents
            .get(agent)
            .map(|a| a.fallback_goals)
            .unwrap_or_default();

        if !tried_fallback && !fallback_goals.is_empty() {
            let new_root = self.spawn_root(agent, request, fallback_goals.into());
            if let Some(req) = self.requests.get_mut(request) {
                req.fallback = true;
                req.root = Some(new_root);
            }
            self.emit(TraceEvent::new(ctx.tick, "goap.plan.fallback"));
        } else {
            if let Some(req) = self.requests.get_mut(request) {
                req.status = RequestStatus::Failed;
                req.root = None;
            }
            self.emit(TraceEvent::new(ctx.tick, "goap.plan.failed"));
        }
    }
}
