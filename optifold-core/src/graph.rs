use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::task::{BASS,DynRun};

static GLOBAL_HANDLE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Interface for providing inputs into the graph, such as a partition of records
pub trait Input: Send + Sync {
    /// Produces the value, once per run
    fn read(&self) -> BASS;
}

/// Unique values representing a task in a Graph
#[derive(Debug,Clone,PartialEq,Eq,Hash)]
pub struct Handle(String, usize);

impl Handle {
    /// Creates a new handle.
    fn new(name: String) -> Self {
        Handle(name, GLOBAL_HANDLE_COUNT.fetch_add(1, Ordering::SeqCst))
    }

    /// Human readable name of the node
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.0, self.1)
    }
}

/// ADT for handling either Tasks or reading data into the graph
pub enum Task {

    /// Node which consumes down stream data to produce new data
    Function(Box<dyn DynRun>),

    /// Node which generates data
    Input(Box<dyn Input>)
}

/// Holds references to the number of arguments to pass into a Task
#[derive(Debug,Clone)]
pub enum FnArgs {

    /// Single argument
    Single(Arc<Handle>),

    /// Used for joining two separate task outputs
    Join(Arc<Handle>, Arc<Handle>)
}

impl FnArgs {
    /// Handles this node reads from
    pub fn handles(&self) -> Vec<&Arc<Handle>> {
        match self {
            FnArgs::Single(h) => vec![h],
            FnArgs::Join(l, r) => vec![l, r]
        }
    }
}

/// Graphs contain the computational pieces needed to represent the data flow
/// between multiple different tasks, their combination, and eventual output.
#[derive(Clone,Default)]
pub struct Graph {

    /// Output handle to task
    pub tasks: HashMap<Arc<Handle>, Arc<Task>>,

    /// Dependencies between tasks
    pub dependencies: HashMap<Arc<Handle>, Option<Arc<FnArgs>>>
}

impl Graph {

    /// Creates a new Graph
    pub fn new() -> Self {
        Graph::default()
    }

    /// Adds a new input into the Graph
    pub fn add_input<I: Input + 'static>(&mut self, input: I, name: &str) -> Arc<Handle> {
        let i_name = format!("Input<id={},name={}>", self.tasks.len(), name);
        let handle = Arc::new(Handle::new(i_name));
        self.dependencies.insert(handle.clone(), None);
        self.tasks.insert(handle.clone(), Arc::new(Task::Input(Box::new(input))));
        handle
    }

    /// Adds a task to the graph with the given inputs.  No effort is made to ensure the
    /// handles exist within the graph.
    pub fn add_task<D: 'static + DynRun>(&mut self, inputs: FnArgs, t: D, name: &str) -> Arc<Handle> {
        let h_name = format!("Task<id={},name={}>", self.tasks.len(), name);
        let handle = Arc::new(Handle::new(h_name));
        self.dependencies.insert(handle.clone(), Some(Arc::new(inputs)));
        self.tasks.insert(handle.clone(), Arc::new(Task::Function(Box::new(t))));
        handle
    }

    /// Given two graphs, merge all tasks and dependencies.
    pub fn merge(&self, other: &Graph) -> Graph {
        let mut merged = self.clone();
        for (handle, input) in other.dependencies.iter() {
            merged.dependencies.entry(handle.clone()).or_insert_with(|| input.clone());
        }
        for (handle, task) in other.tasks.iter() {
            merged.tasks.entry(handle.clone()).or_insert_with(|| task.clone());
        }
        merged
    }

    /// Number of nodes in the graph
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when the graph holds no nodes
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
