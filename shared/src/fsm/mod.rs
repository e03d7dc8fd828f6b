//! State graph primitives and the replicated state machine.
//!
//! Nothing in here knows about fighters. A machine is generic over a context
//! type `C` that every state hook and transition predicate receives.

mod machine;

pub use machine::StateMachine;

use serde::{Deserialize, Serialize};

/// Which side of the network this machine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Role {
    /// Evaluates transitions and mutates canonical state.
    #[default]
    Authority,
    /// Only reacts to replicated state ids.
    Replica,
}

impl Role {
    pub fn is_authority(self) -> bool {
        self == Role::Authority
    }
}

/// Replicated discriminator of a registered state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub u8);

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What goes over the wire: the state id plus an entry counter.
///
/// The counter is bumped on every entry, so a self-transition that keeps the
/// id unchanged is still visible to replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatedState {
    pub id: StateId,
    pub entry_seq: u8,
}

impl ReplicatedState {
    pub fn new(id: StateId) -> Self {
        Self { id, entry_seq: 0 }
    }

    /// The value published after entering `id`.
    pub fn next(self, id: StateId) -> Self {
        Self {
            id,
            entry_seq: self.entry_seq.wrapping_add(1),
        }
    }
}

/// A node's behavior. All hooks default to doing nothing.
///
/// `fixed_update` only runs on the authority; `update` runs every frame on
/// every side and should only touch presentation data.
pub trait State<C>: 'static {
    fn name(&self) -> &'static str;

    fn enter(&self, _ctx: &mut C) {}

    fn exit(&self, _ctx: &mut C) {}

    fn fixed_update(&self, _ctx: &mut C) {}

    fn update(&self, _ctx: &mut C) {}
}

pub type Predicate<C> = Box<dyn Fn(&C) -> bool>;

/// Edge of the state graph.
pub struct Transition<C> {
    pub to: StateId,
    predicate: Predicate<C>,
}

impl<C> Transition<C> {
    pub fn new(to: StateId, predicate: impl Fn(&C) -> bool + 'static) -> Self {
        Self {
            to,
            predicate: Box::new(predicate),
        }
    }

    pub fn is_satisfied(&self, ctx: &C) -> bool {
        (self.predicate)(ctx)
    }
}

impl<C> std::fmt::Debug for Transition<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition").field("to", &self.to).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsmError {
    #[error("state {0} is not registered")]
    UnknownState(StateId),
    #[error("only the authority may {0}")]
    NotAuthority(&'static str),
    #[error("the authority publishes state, it cannot apply a replicated one")]
    NotReplica,
    #[error("state machine was already initialized")]
    AlreadyInitialized,
    #[error("state machine has not been initialized")]
    NotInitialized,
    #[error("no more than {} states can be registered", u8::MAX as usize + 1)]
    TooManyStates,
}
