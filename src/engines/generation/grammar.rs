use crate::functions::registry::OperatorRegistry;

/// Decoder position: values on the stack and tokens emitted so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeState {
    pub depth: usize,
    pub length: usize,
}

/// Per-step action mask over `vocabulary + STOP`.
///
/// A token is offered only if, after emitting it, the stack can still be
/// reduced to a single value within the remaining length budget. Every
/// decode that follows the mask therefore ends in a well-formed program.
#[derive(Debug, Clone)]
pub struct Grammar {
    arities: Vec<usize>,
    max_seq_len: usize,
    closing_cost: Vec<usize>,
}

impl Grammar {
    pub fn new(registry: &OperatorRegistry, max_seq_len: usize) -> Self {
        let arities = registry
            .operators()
            .iter()
            .map(|op| op.arity())
            .collect::<Vec<_>>();
        let closing_cost = closing_costs(&registry.arities(), max_seq_len + registry.max_arity());
        Self {
            arities,
            max_seq_len,
            closing_cost,
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.arities.len()
    }

    /// Size of the action space, STOP included.
    pub fn num_actions(&self) -> usize {
        self.arities.len() + 1
    }

    pub fn stop_action(&self) -> usize {
        self.arities.len()
    }

    pub fn max_seq_len(&self) -> usize {
        self.max_seq_len
    }

    /// Fewest tokens that bring `depth` down to one.
    pub fn closing_cost(&self, depth: usize) -> Option<usize> {
        self.closing_cost
            .get(depth)
            .copied()
            .filter(|&c| c != usize::MAX)
    }

    pub fn mask(&self, state: DecodeState) -> Vec<bool> {
        let mut mask = vec![false; self.num_actions()];

        if state.length < self.max_seq_len {
            let remaining = self.max_seq_len - state.length - 1;
            for (action, &arity) in self.arities.iter().enumerate() {
                if state.depth < arity {
                    continue;
                }
                let next_depth = state.depth - arity + 1;
                mask[action] = self
                    .closing_cost(next_depth)
                    .map_or(false, |cost| cost <= remaining);
            }
        }

        mask[self.stop_action()] = state.depth == 1 && state.length >= 1;
        mask
    }

    /// State after emitting `action`; `None` for STOP or an action the
    /// stack cannot take.
    pub fn advance(&self, state: DecodeState, action: usize) -> Option<DecodeState> {
        let arity = *self.arities.get(action)?;
        Some(DecodeState {
            depth: (state.depth + 1).checked_sub(arity)?,
            length: state.length + 1,
        })
    }
}

/// Shortest-path relaxation over stack depths `0..=limit`, where a token of
/// arity `k` moves depth `d` to `d - k + 1`.
fn closing_costs(arities: &[usize], limit: usize) -> Vec<usize> {
    let mut cost = vec![usize::MAX; limit + 1];
    if limit >= 1 {
        cost[1] = 0;
    }

    let mut changed = true;
    while changed {
        changed = false;
        for depth in 1..=limit {
            for &arity in arities {
                if depth < arity {
                    continue;
                }
                let next = depth - arity + 1;
                if next > limit || cost[next] == usize::MAX {
                    continue;
                }
                let candidate = cost[next] + 1;
                if candidate < cost[depth] {
                    cost[depth] = candidate;
                    changed = true;
                }
            }
        }
    }
    cost
}
