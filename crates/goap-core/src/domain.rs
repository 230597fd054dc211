use std::collections::BTreeMap;

use crate::{
    ActionId, AtomActionComposer, Condition, ConditionId, ConditionResolverComposer, DomainError,
    DomainId, TargetList, WorldMut,
};

/// One action in the graph: a single effect condition, up to ten
/// preconditions, and a cost used for candidate ordering.
#[derive(Debug, Clone, Copy)]
pub struct GoapAction {
    pub id: ActionId,
    pub cost: f32,
    pub preconditions: TargetList,
    pub effect: Condition,
}

impl GoapAction {
    pub fn new(id: ActionId, cost: f32, effect: Condition) -> Self {
        Self {
            id,
            cost,
            preconditions: TargetList::new(),
            effect,
        }
    }

    /// Adds a precondition. Panics past the ten-condition capacity.
    pub fn with_precondition(mut self, condition: Condition) -> Self {
        self.preconditions.push(condition);
        self
    }
}

/// The ordered atom steps of one action.
pub struct AtomActionSet<W: WorldMut> {
    composers: Vec<Box<dyn AtomActionComposer<W>>>,
}

impl<W: WorldMut> AtomActionSet<W> {
    pub fn new(composers: Vec<Box<dyn AtomActionComposer<W>>>) -> Self {
        Self { composers }
    }

    pub fn len(&self) -> usize {
        self.composers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.composers.is_empty()
    }

    pub fn composer(&self, index: usize) -> Option<&dyn AtomActionComposer<W>> {
        self.composers.get(index).map(|c| c.as_ref())
    }
}

/// Candidate actions for one effect condition id, split by effect value.
/// Each list is cost-ascending after [`Domain::sort_actions`]; ties keep
/// insertion order.
#[derive(Debug, Clone, Default)]
struct ActionSet {
    when_true: Vec<GoapAction>,
    when_false: Vec<GoapAction>,
}

impl ActionSet {
    fn insert(&mut self, action: GoapAction) {
        if action.effect.value {
            self.when_true.push(action);
        } else {
            self.when_false.push(action);
        }
    }

    fn candidates(&self, value: bool) -> &[GoapAction] {
        if value {
            &self.when_true
        } else {
            &self.when_false
        }
    }

    fn sort(&mut self) {
        self.when_true.sort_by(|a, b| a.cost.total_cmp(&b.cost));
        self.when_false.sort_by(|a, b| a.cost.total_cmp(&b.cost));
    }
}

/// Immutable-after-build knowledge base for one class of agent: effect
/// condition -> cost-sorted candidate actions, condition id -> resolver
/// factory, action id -> atom steps.
///
/// Built once at load time, then only read; searches share it without
/// locking.
pub struct Domain<W: WorldMut> {
    id: DomainId,
    action_sets: BTreeMap<ConditionId, ActionSet>,
    actions_by_id: BTreeMap<ActionId, GoapAction>,
    resolvers: BTreeMap<ConditionId, Box<dyn ConditionResolverComposer<W>>>,
    atom_sets: BTreeMap<ActionId, AtomActionSet<W>>,
    sorted: bool,
}

impl<W: WorldMut> Domain<W> {
    pub fn new(id: DomainId) -> Self {
        Self {
            id,
            action_sets: BTreeMap::new(),
            actions_by_id: BTreeMap::new(),
            resolvers: BTreeMap::new(),
            atom_sets: BTreeMap::new(),
            sorted: true,
        }
    }

    pub fn id(&self) -> DomainId {
        self.id
    }

    /// Registers an action together with its ordered atom steps.
    ///
    /// Fails on a duplicate action id, an empty atom set, or (debug
    /// builds) a precondition chain that cycles back onto the action's
    /// own effect.
    pub fn add_action(
        &mut self,
        action: GoapAction,
        atoms: AtomActionSet<W>,
    ) -> Result<(), DomainError> {
        if self.actions_by_id.contains_key(&action.id) {
            return Err(DomainError::DuplicateAction(action.id));
        }
        if atoms.is_empty() {
            return Err(DomainError::EmptyAtomSet(action.id));
        }
        #[cfg(debug_assertions)]
        if self.has_effect_cycle(&action) {
            return Err(DomainError::PreconditionCycle(action.id));
        }

        self.action_sets
            .entry(action.effect.id)
            .or_default()
            .insert(action);
        self.atom_sets.insert(action.id, atoms);
        self.actions_by_id.insert(action.id, action);
        self.sorted = false;
        Ok(())
    }

    /// Registers (or overwrites) the resolver factory for a condition id.
    /// Conditions without a resolver can only be satisfied by an action.
    pub fn add_resolver(
        &mut self,
        condition: ConditionId,
        composer: Box<dyn ConditionResolverComposer<W>>,
    ) {
        self.resolvers.insert(condition, composer);
    }

    /// Sorts every candidate list by ascending cost. Must be called after
    /// the last `add_action` and before the domain is handed to a runtime.
    pub fn sort_actions(&mut self) {
        for set in self.action_sets.values_mut() {
            set.sort();
        }
        self.sorted = true;
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Cost-ordered candidates whose effect equals `condition` (id and
    /// value both). `None` when no action produces that effect.
    pub fn actions_for(&self, condition: Condition) -> Option<&[GoapAction]> {
        let candidates = self.action_sets.get(&condition.id)?.candidates(condition.value);
        if candidates.is_empty() {
            None
        } else {
            Some(candidates)
        }
    }

    pub fn action(&self, id: ActionId) -> Option<&GoapAction> {
        self.actions_by_id.get(&id)
    }

    pub fn resolver(&self, condition: ConditionId) -> Option<&dyn ConditionResolverComposer<W>> {
        self.resolvers.get(&condition).map(|c| c.as_ref())
    }

    pub fn atom_set(&self, action: ActionId) -> Option<&AtomActionSet<W>> {
        self.atom_sets.get(&action)
    }

    pub fn action_count(&self) -> usize {
        self.actions_by_id.len()
    }

    /// Depth-first walk from the new action's preconditions through the
    /// existing graph, looking for a path back to its own effect.
    #[cfg(debug_assertions)]
    fn has_effect_cycle(&self, action: &GoapAction) -> bool {
        use std::collections::BTreeSet;

        let mut stack: Vec<Condition> = action.preconditions.as_slice().to_vec();
        let mut visited: BTreeSet<u32> = BTreeSet::new();

        while let Some(condition) = stack.pop() {
            if condition == action.effect {
                return true;
            }
            if !visited.insert(condition.key()) {
                continue;
            }
            if let Some(set) = self.action_sets.get(&condition.id) {
                for producer in set.candidates(condition.value) {
                    stack.extend(producer.preconditions.iter());
                }
            }
        }
        false
    }
}
