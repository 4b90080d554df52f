//! Workflow graphs: where they come from and how they are ordered

mod sorter;
mod source;

pub use sorter::{SortError, sort_nodes, topological_order};
pub use source::{
    FileGraphSource, GraphSource, GraphSourceError, InMemoryGraphSource, load_workflow_file,
};
