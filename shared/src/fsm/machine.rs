use std::any::TypeId;

use tracing::{debug, error};

use super::{FsmError, ReplicatedState, Role, State, StateId, Transition};

struct StateNode<C> {
    type_id: TypeId,
    state: Box<dyn State<C>>,
    transitions: Vec<Transition<C>>,
}

/// Finite-state machine whose only replicated value is the current state id.
///
/// Transition order is registration order: any-transitions first, then the
/// current node's transitions. The first satisfied predicate wins.
pub struct StateMachine<C> {
    role: Role,
    nodes: Vec<StateNode<C>>,
    any_transitions: Vec<Transition<C>>,
    current: Option<StateId>,
    /// Value published by the authority, or last received by a replica.
    replicated: Option<ReplicatedState>,
    /// Value whose enter hook has already run on this side.
    observed: Option<ReplicatedState>,
}

impl<C: 'static> StateMachine<C> {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            nodes: Vec::new(),
            any_transitions: Vec::new(),
            current: None,
            replicated: None,
            observed: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Registers `state` and returns its id. Registering the same type twice
    /// returns the id assigned the first time and keeps the first instance.
    pub fn register_state<S: State<C>>(&mut self, state: S) -> Result<StateId, FsmError> {
        let type_id = TypeId::of::<S>();
        if let Some(index) = self.nodes.iter().position(|n| n.type_id == type_id) {
            return Ok(StateId(index as u8));
        }
        if self.nodes.len() > u8::MAX as usize {
            return Err(FsmError::TooManyStates);
        }
        self.nodes.push(StateNode {
            type_id,
            state: Box::new(state),
            transitions: Vec::new(),
        });
        Ok(StateId((self.nodes.len() - 1) as u8))
    }

    pub fn add_transition(
        &mut self,
        from: StateId,
        to: StateId,
        predicate: impl Fn(&C) -> bool + 'static,
    ) -> Result<(), FsmError> {
        self.ensure_registered(to)?;
        let node = self
            .nodes
            .get_mut(from.0 as usize)
            .ok_or(FsmError::UnknownState(from))?;
        node.transitions.push(Transition::new(to, predicate));
        Ok(())
    }

    pub fn add_any_transition(
        &mut self,
        to: StateId,
        predicate: impl Fn(&C) -> bool + 'static,
    ) -> Result<(), FsmError> {
        self.ensure_registered(to)?;
        self.any_transitions.push(Transition::new(to, predicate));
        Ok(())
    }

    /// Enters the first state. Call exactly once, after all registration.
    pub fn initialize(&mut self, initial: StateId, ctx: &mut C) -> Result<(), FsmError> {
        if self.replicated.is_some() {
            return Err(FsmError::AlreadyInitialized);
        }
        self.ensure_registered(initial)?;
        let value = ReplicatedState::new(initial);
        self.current = Some(initial);
        self.replicated = Some(value);
        self.observed = Some(value);
        self.nodes[initial.0 as usize].state.enter(ctx);
        Ok(())
    }

    /// Re-attaches to a state that was entered in an earlier tick, without
    /// running its enter hook. Used when state is rebuilt from storage.
    pub fn resume(&mut self, value: ReplicatedState) -> Result<(), FsmError> {
        if self.replicated.is_some() {
            return Err(FsmError::AlreadyInitialized);
        }
        self.ensure_registered(value.id)?;
        self.current = Some(value.id);
        self.replicated = Some(value);
        self.observed = Some(value);
        Ok(())
    }

    /// Forces a transition. No-op (returns `false`) when already in `to`.
    pub fn change_state(&mut self, to: StateId, ctx: &mut C) -> Result<bool, FsmError> {
        if !self.role.is_authority() {
            return Err(FsmError::NotAuthority("change state"));
        }
        let current = self.current.ok_or(FsmError::NotInitialized)?;
        self.ensure_registered(to)?;
        if to == current {
            return Ok(false);
        }
        self.transition(current, to, ctx);
        Ok(true)
    }

    /// Authoritative tick: evaluate transitions, or run the current state's
    /// fixed update when none fires. Returns the entered state, if any.
    pub fn fixed_tick(&mut self, ctx: &mut C) -> Result<Option<StateId>, FsmError> {
        if !self.role.is_authority() {
            return Err(FsmError::NotAuthority("tick the state machine"));
        }
        let current = self.current.ok_or(FsmError::NotInitialized)?;

        let next = self.select_any(current, ctx).or_else(|| {
            self.nodes[current.0 as usize]
                .transitions
                .iter()
                .find(|t| t.is_satisfied(ctx))
                .map(|t| t.to)
        });

        match next {
            Some(to) => {
                self.transition(current, to, ctx);
                Ok(Some(to))
            }
            None => {
                self.nodes[current.0 as usize].state.fixed_update(ctx);
                Ok(None)
            }
        }
    }

    /// Evaluates only the any-transitions, immediately. Used to force a
    /// preemptive state (hit, death) in the middle of a tick.
    pub fn preempt(&mut self, ctx: &mut C) -> Result<Option<StateId>, FsmError> {
        if !self.role.is_authority() {
            return Err(FsmError::NotAuthority("preempt the state machine"));
        }
        let current = self.current.ok_or(FsmError::NotInitialized)?;
        let next = self.select_any(current, ctx);
        if let Some(to) = next {
            self.transition(current, to, ctx);
        }
        Ok(next)
    }

    /// Replica ingest of the wire value. Validated on the next `frame_update`.
    pub fn apply_replicated(&mut self, value: ReplicatedState) -> Result<(), FsmError> {
        if self.role.is_authority() {
            return Err(FsmError::NotReplica);
        }
        self.replicated = Some(value);
        Ok(())
    }

    /// Per-frame hook for every side. Replicas replay exit/enter when the
    /// replicated value moved; predicates are never evaluated here.
    pub fn frame_update(&mut self, ctx: &mut C) -> Result<(), FsmError> {
        let mut result = Ok(());

        if !self.role.is_authority() && self.replicated != self.observed {
            if let Some(target) = self.replicated {
                if self.is_registered(target.id) {
                    if let Some(old) = self.observed {
                        self.nodes[old.id.0 as usize].state.exit(ctx);
                    }
                    self.observed = Some(target);
                    self.current = Some(target.id);
                    self.nodes[target.id.0 as usize].state.enter(ctx);
                } else {
                    error!(state = %target.id, "replica observed an unregistered state, refusing");
                    self.replicated = self.observed;
                    result = Err(FsmError::UnknownState(target.id));
                }
            }
        }

        if let Some(current) = self.current {
            self.nodes[current.0 as usize].state.update(ctx);
        }
        result
    }

    pub fn current(&self) -> Option<StateId> {
        self.current
    }

    pub fn current_name(&self) -> Option<&'static str> {
        self.current.and_then(|id| self.state_name(id))
    }

    pub fn replicated(&self) -> Option<ReplicatedState> {
        self.replicated
    }

    pub fn state_name(&self, id: StateId) -> Option<&'static str> {
        self.nodes.get(id.0 as usize).map(|n| n.state.name())
    }

    pub fn id_of<S: State<C>>(&self) -> Option<StateId> {
        let type_id = TypeId::of::<S>();
        self.nodes
            .iter()
            .position(|n| n.type_id == type_id)
            .map(|i| StateId(i as u8))
    }

    pub fn is_in<S: State<C>>(&self) -> bool {
        self.current.is_some() && self.current == self.id_of::<S>()
    }

    pub fn is_registered(&self, id: StateId) -> bool {
        (id.0 as usize) < self.nodes.len()
    }

    fn ensure_registered(&self, id: StateId) -> Result<(), FsmError> {
        if self.is_registered(id) {
            Ok(())
        } else {
            error!(state = %id, "transition to an unregistered state refused");
            Err(FsmError::UnknownState(id))
        }
    }

    /// Any-transitions never re-enter the state they target.
    fn select_any(&self, current: StateId, ctx: &C) -> Option<StateId> {
        self.any_transitions
            .iter()
            .filter(|t| t.to != current)
            .find(|t| t.is_satisfied(ctx))
            .map(|t| t.to)
    }

    fn transition(&mut self, from: StateId, to: StateId, ctx: &mut C) {
        self.nodes[from.0 as usize].state.exit(ctx);
        let value = match self.replicated {
            Some(previous) => previous.next(to),
            None => ReplicatedState::new(to),
        };
        self.current = Some(to);
        self.replicated = Some(value);
        self.observed = Some(value);
        self.nodes[to.0 as usize].state.enter(ctx);
        debug!(
            from = self.nodes[from.0 as usize].state.name(),
            to = self.nodes[to.0 as usize].state.name(),
            "state transition"
        );
    }
}
