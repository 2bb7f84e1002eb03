//! Task listing command.

use ashlar_graph::{Node, TaskGraph};

/// One line per registered name: leaves with their title, composites with
/// the names they reference.
pub fn describe(graph: &TaskGraph) -> Vec<String> {
    graph
        .names()
        .filter_map(|name| {
            let detail = match graph.get(name)? {
                Node::Task(task) => task.title().to_string(),
                Node::Composite(step) => step.references().join(", "),
            };
            Some(format!("{:<20}{}", name, detail))
        })
        .collect()
}

/// Print the registered task names.
pub fn run(graph: &TaskGraph) {
    for line in describe(graph) {
        println!("{}", line);
    }
}
