use core::fmt::Debug;

/// Stable identifier for a game-side agent.
///
/// Deterministic simulation requires stable ordering and a stable numeric
/// id for seeding and trace output.
pub trait AgentId: Copy + Ord + Eq + Debug + 'static {
    fn stable_id(self) -> u64;
}

impl AgentId for u64 {
    fn stable_id(self) -> u64 {
        self
    }
}

impl AgentId for u32 {
    fn stable_id(self) -> u64 {
        self as u64
    }
}

impl AgentId for usize {
    fn stable_id(self) -> u64 {
        self as u64
    }
}

/// Read-only world access.
///
/// The kernel does not prescribe which queries a world exposes; condition
/// resolvers and atom actions define what they need against the concrete
/// world type.
pub trait WorldView {
    type Agent: AgentId;
}

/// Write access / effect sink for atom actions.
pub trait WorldMut: WorldView {}

/// Per-tick scheduling context handed to every stage, task, and composer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickContext {
    pub tick: u64,
    pub dt_seconds: f32,
}

impl TickContext {
    pub fn new(tick: u64, dt_seconds: f32) -> Self {
        Self { tick, dt_seconds }
    }
}
