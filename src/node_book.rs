//! Bookkeeping of which nodes participate in the unknown vector.
//!
//! Each node is either *enabled* (owns exactly one position in the unknown
//! vector), *disabled* (carries an explicitly prescribed value and is
//! condensed into the right-hand side), or *excluded* (belongs to no
//! computable element and appears in neither). The book is rebuilt whenever
//! the computable-element set or the explicit-condition set changes.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Excluded,
    Disabled,
    Enabled(usize),
}

#[derive(Debug, Clone)]
pub struct NodeBook {
    states: Vec<NodeState>,
    n_enabled: usize,
}

impl NodeBook {
    /// Build the book from per-node flags. A node is enabled iff it is
    /// computable and not explicitly prescribed; enabled positions are
    /// assigned in ascending node order.
    pub fn build(computable: &[bool], disabled: &[bool]) -> Self {
        assert_eq!(computable.len(), disabled.len());
        let mut states = Vec::with_capacity(computable.len());
        let mut n_enabled = 0;
        for (&c, &d) in computable.iter().zip(disabled) {
            let state = if d {
                NodeState::Disabled
            } else if c {
                let s = NodeState::Enabled(n_enabled);
                n_enabled += 1;
                s
            } else {
                NodeState::Excluded
            };
            states.push(state);
        }
        Self { states, n_enabled }
    }

    pub fn n_nodes(&self) -> usize {
        self.states.len()
    }

    pub fn n_enabled(&self) -> usize {
        self.n_enabled
    }

    pub fn state(&self, node: usize) -> NodeState {
        self.states[node]
    }

    pub fn enabled_position(&self, node: usize) -> Option<usize> {
        match self.states[node] {
            NodeState::Enabled(pos) => Some(pos),
            _ => None,
        }
    }

    pub fn is_disabled(&self, node: usize) -> bool {
        self.states[node] == NodeState::Disabled
    }

    /// Node owning the given unknown-vector position.
    pub fn node_of_position(&self, position: usize) -> Option<usize> {
        // Positions are assigned in node order, so a linear scan suffices
        // for the rare reverse lookups.
        self.states
            .iter()
            .position(|s| *s == NodeState::Enabled(position))
    }

    pub fn iter_enabled(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.states.iter().enumerate().filter_map(|(node, s)| match s {
            NodeState::Enabled(pos) => Some((node, *pos)),
            _ => None,
        })
    }
}
