//! DAG builder and runtime (C7/C8).

pub mod builder;
pub mod node;
pub mod runtime;

pub use builder::{build_dag, prepare_node_inputs};
pub use node::{node_id, Node, NodeState, NodeStatus};
pub use runtime::{Dag, DagStats};
