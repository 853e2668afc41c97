use std::fmt;

/// Which screen of a multi-step operation is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    Form,
    Confirm,
    Result,
}

impl FlowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStep::Form => "form",
            FlowStep::Confirm => "confirm",
            FlowStep::Result => "result",
        }
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Linear `form -> confirm -> result` flow.
///
/// `Confirm` can go back to `Form`; `Result` only leaves through [`Flow::reset`].
/// A rejected transition leaves the flow where it was.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Flow<D, R> {
    #[default]
    Form,
    Confirm(D),
    Result(R),
}

impl<D, R> Flow<D, R> {
    pub fn new() -> Self {
        Flow::Form
    }

    pub fn step(&self) -> FlowStep {
        match self {
            Flow::Form => FlowStep::Form,
            Flow::Confirm(_) => FlowStep::Confirm,
            Flow::Result(_) => FlowStep::Result,
        }
    }

    /// Draft awaiting confirmation.
    pub fn draft(&self) -> Option<&D> {
        match self {
            Flow::Confirm(draft) => Some(draft),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Option<&R> {
        match self {
            Flow::Result(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn submit(&mut self, draft: D) -> Result<(), FlowError> {
        self.expect(FlowStep::Form, "submit")?;
        *self = Flow::Confirm(draft);
        Ok(())
    }

    /// Return to the form, handing the draft back for editing.
    pub fn back(&mut self) -> Result<D, FlowError> {
        self.expect(FlowStep::Confirm, "back")?;
        match std::mem::replace(self, Flow::Form) {
            Flow::Confirm(draft) => Ok(draft),
            _ => unreachable!("step checked above"),
        }
    }

    pub fn complete(&mut self, outcome: R) -> Result<(), FlowError> {
        self.expect(FlowStep::Confirm, "complete")?;
        *self = Flow::Result(outcome);
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), FlowError> {
        self.expect(FlowStep::Result, "reset")?;
        *self = Flow::Form;
        Ok(())
    }

    fn expect(&self, step: FlowStep, action: &'static str) -> Result<(), FlowError> {
        if self.step() != step {
            return Err(FlowError::InvalidTransition {
                from: self.step(),
                action,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    InvalidTransition {
        from: FlowStep,
        action: &'static str,
    },
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowError::InvalidTransition { from, action } => {
                write!(f, "Cannot {} from the {} step", action, from)
            }
        }
    }
}

impl std::error::Error for FlowError {}
