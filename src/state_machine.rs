//! Finite state machine abstraction
//!
//! Workflow lifecycles in this crate are modeled as typed state machines:
//! transitions are pure functions from `(State, Input)` to
//! `(State, Output)`, with every valid combination written out explicitly
//! and everything else rejected. The certificate sub-workflow drives its
//! progression through this trait so an out-of-order step is an error, not
//! a silent no-op.

/// Result of a state transition
pub type TransitionResult<S> = Result<S, TransitionError>;

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Transition from current state to target state is not allowed
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Trait for finite state machines with typed inputs and outputs
pub trait StateMachine: Sized + Clone {
    /// Input type that triggers transitions
    type Input;

    /// Output type produced by transitions (use () if none)
    type Output;

    /// Attempt to transition to a new state given an input.
    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Check whether a transition is valid without performing it.
    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }
}

/// Record of one transition, for auditing a workflow after the fact
#[derive(Debug, Clone)]
pub struct Transition<S, I> {
    pub from: S,
    pub to: S,
    pub input: I,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A state machine that keeps its transition history
#[derive(Debug, Clone)]
pub struct StateMachineWithHistory<FSM: StateMachine> {
    current: FSM,
    history: Vec<Transition<FSM, FSM::Input>>,
}

impl<FSM: StateMachine> StateMachineWithHistory<FSM> {
    pub fn new(initial: FSM) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    /// Transition, recording the step with its timestamp.
    pub fn apply(&mut self, input: FSM::Input) -> TransitionResult<FSM::Output>
    where
        FSM::Input: Clone,
    {
        let from = self.current.clone();
        let (to, output) = self.current.transition(&input)?;
        self.history.push(Transition {
            from,
            to: to.clone(),
            input,
            timestamp: chrono::Utc::now(),
        });
        self.current = to;
        Ok(output)
    }

    pub fn current_state(&self) -> &FSM {
        &self.current
    }

    pub fn history(&self) -> &[Transition<FSM, FSM::Input>] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Door {
        Open,
        Closed,
    }

    #[derive(Debug, Clone)]
    enum DoorInput {
        Toggle,
    }

    impl StateMachine for Door {
        type Input = DoorInput;
        type Output = ();

        fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
            match (self, input) {
                (Door::Open, DoorInput::Toggle) => Ok((Door::Closed, ())),
                (Door::Closed, DoorInput::Toggle) => Ok((Door::Open, ())),
            }
        }
    }

    #[test]
    fn transitions_apply() {
        let door = Door::Closed;
        let (next, _) = door.transition(&DoorInput::Toggle).unwrap();
        assert_eq!(next, Door::Open);
        assert!(door.can_transition(&DoorInput::Toggle));
    }

    #[test]
    fn history_records_each_step() {
        let mut fsm = StateMachineWithHistory::new(Door::Closed);
        fsm.apply(DoorInput::Toggle).unwrap();
        fsm.apply(DoorInput::Toggle).unwrap();

        assert_eq!(*fsm.current_state(), Door::Closed);
        assert_eq!(fsm.history().len(), 2);
        assert_eq!(fsm.history()[0].to, Door::Open);
    }
}
