use crate::error::NavigationError;
use crate::target::{Target, TargetCatalog};

/// A navigation request coming from the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavCommand {
    Next,
    Prev,
    Goto(String),
    NextError { reverse: bool },
}

/// What a navigation step did to the current position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    Moved(usize),
    /// Request was valid but the position did not change (e.g. prev at index 0)
    Unchanged,
    /// Ran off the end of the catalog with cyclic retry disabled
    EndOfTargets,
    /// Every target is marked OK
    AllTargetsOk,
    /// The current target is the only one not yet OK
    OnlyCurrentRemaining,
}

/// Tracks the current target and the skip-ok traversal mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigator {
    current: Option<usize>,
    skip_ok: bool,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn skip_ok(&self) -> bool {
        self.skip_ok
    }

    /// Operator-level "forward": next non-OK target once skip-ok mode is on.
    pub fn forward(&mut self, targets: &[Target], cyclic: bool) -> NavOutcome {
        if self.skip_ok {
            self.next_error(targets, false)
        } else {
            self.next(targets, cyclic)
        }
    }

    /// Operator-level "backward", mirroring [`Navigator::forward`].
    pub fn backward(&mut self, targets: &[Target]) -> NavOutcome {
        if self.skip_ok {
            self.next_error(targets, true)
        } else {
            self.prev()
        }
    }

    pub fn apply(
        &mut self,
        command: &NavCommand,
        catalog: &TargetCatalog,
        cyclic: bool,
    ) -> Result<NavOutcome, NavigationError> {
        let targets = catalog.targets();
        Ok(match command {
            NavCommand::Next => self.forward(targets, cyclic),
            NavCommand::Prev => self.backward(targets),
            NavCommand::Goto(id) => self.goto(catalog, id)?,
            NavCommand::NextError { reverse } => self.next_error(targets, *reverse),
        })
    }

    pub fn next(&mut self, targets: &[Target], cyclic: bool) -> NavOutcome {
        let next = self.current.map_or(0, |i| i + 1);
        if next < targets.len() {
            self.current = Some(next);
            return NavOutcome::Moved(next);
        }
        if cyclic {
            self.skip_ok = true;
            self.next_error(targets, false)
        } else {
            NavOutcome::EndOfTargets
        }
    }

    pub fn prev(&mut self) -> NavOutcome {
        match self.current {
            Some(i) if i > 0 => {
                self.current = Some(i - 1);
                NavOutcome::Moved(i - 1)
            }
            _ => NavOutcome::Unchanged,
        }
    }

    /// Jump straight to a target, regardless of its result code.
    pub fn goto(
        &mut self,
        catalog: &TargetCatalog,
        id: &str,
    ) -> Result<NavOutcome, NavigationError> {
        let index = catalog.find_index_by_id(id)?;
        self.current = Some(index);
        Ok(NavOutcome::Moved(index))
    }

    /// Circular scan for the next target not marked OK, starting right after
    /// the current one (or right before it when `reverse`). The current target
    /// is never picked.
    pub fn next_error(&mut self, targets: &[Target], reverse: bool) -> NavOutcome {
        let found = circular_order(targets.len(), self.current, reverse)
            .find(|&i| !targets[i].is_ok());

        match found {
            Some(i) => {
                self.current = Some(i);
                NavOutcome::Moved(i)
            }
            None => match self.current.and_then(|i| targets.get(i)) {
                Some(current) if !current.is_ok() => NavOutcome::OnlyCurrentRemaining,
                _ => NavOutcome::AllTargetsOk,
            },
        }
    }
}

/// Indices visited by a circular scan, excluding `current`.
/// Forward from `i`: i+1, .., n-1, 0, .., i-1. Reverse: i-1, .., 0, n-1, .., i+1.
/// Without a current target the scan covers the whole catalog from the
/// matching end.
fn circular_order(
    len: usize,
    current: Option<usize>,
    reverse: bool,
) -> impl Iterator<Item = usize> {
    let (start, steps) = match current {
        Some(i) => (i, len.saturating_sub(1)),
        None if reverse => (0, len),
        None => (len.saturating_sub(1), len),
    };
    (1..=steps).map(move |k| {
        if reverse {
            (start + len * k - k) % len
        } else {
            (start + k) % len
        }
    })
}
