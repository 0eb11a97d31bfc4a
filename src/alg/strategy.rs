/// One direction in which messages flow along an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Direction {
    pub source: usize,
    pub target: usize,
    // Set when the source is the second endpoint, so pairwise costs take (target label, source label)
    pub swap: bool,
}

/// Selects how edges are wired into messages.
///
/// `Undirected` sends a message each way along every edge.
/// `Directed` sends one message from the first endpoint to the second and never swaps cost arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropagationKind {
    #[default]
    Undirected,
    Directed,
}

impl PropagationKind {
    // Message directions carried by an edge with endpoints (i, j)
    pub fn directions(self, (i, j): (usize, usize)) -> Vec<Direction> {
        let forward = Direction {
            source: i,
            target: j,
            swap: false,
        };
        match self {
            PropagationKind::Undirected => vec![
                forward,
                Direction {
                    source: j,
                    target: i,
                    swap: true,
                },
            ],
            PropagationKind::Directed => vec![forward],
        }
    }
}
