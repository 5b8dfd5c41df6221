// src/pipelines/graph.rs: task records and the validated dependency DAG

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;

use crate::config::defs::PipelineError;
use crate::manifest::ReadRole;

/// Structured subprocess descriptor: executable plus typed argument list.
/// Never passed through a shell.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> CommandSpec {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> CommandSpec {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Prepends a submit wrapper (e.g. `srun -p queue -c N`) in cluster mode.
    pub fn wrap(self, prefix: &[String]) -> CommandSpec {
        let mut iter = prefix.iter();
        let Some(program) = iter.next() else {
            return self;
        };
        let mut args: Vec<String> = iter.cloned().collect();
        args.push(self.program);
        args.extend(self.args);
        CommandSpec {
            program: program.clone(),
            args,
        }
    }

    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// What the executor does when a task is stale.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskAction {
    /// Copy each (source, dest) stage pair into scratch, run a subprocess,
    /// then rename each (scratch, final) publish pair into place. An empty
    /// publish list means the command writes the output directly.
    Command {
        spec: CommandSpec,
        stage: Vec<(PathBuf, PathBuf)>,
        publish: Vec<(PathBuf, PathBuf)>,
    },
    /// Built-in scaffold length filter: keep records of length >= min_len
    /// from inputs[0], write atomically to the declared output.
    FilterScaffolds { min_len: u64 },
}

/// One schedulable unit: a (rule, sample, read-role) triple mapped to
/// exactly one declared output path.
#[derive(Debug, Clone)]
pub struct Task {
    pub rule: &'static str,
    pub sample: Option<String>,
    pub read_role: Option<ReadRole>,
    pub output: PathBuf,
    pub inputs: Vec<PathBuf>,
    pub threads: u64,
    pub mem_mb: u64,
    pub action: TaskAction,
}

impl Task {
    /// Stable human-readable identity, used in logs and error reports.
    pub fn id(&self) -> String {
        match (&self.sample, &self.read_role) {
            (Some(sample), Some(role)) => format!("{}:{}_{}", self.rule, sample, role.tag()),
            (Some(sample), None) => format!("{}:{}", self.rule, sample),
            (None, _) => self.rule.to_string(),
        }
    }
}

/// The full dependency DAG for one run, validated at construction:
/// no output collisions, every input has a producer (or is a raw manifest
/// file), and no cycles.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: Vec<Task>,
}

impl TaskGraph {
    pub fn new(tasks: Vec<Task>, raw_inputs: &HashSet<PathBuf>) -> Result<TaskGraph, PipelineError> {
        let mut producers: HashMap<&PathBuf, usize> = HashMap::new();
        for (index, task) in tasks.iter().enumerate() {
            if let Some(existing) = producers.insert(&task.output, index) {
                return Err(PipelineError::GraphExpansion(format!(
                    "output path collision: tasks '{}' and '{}' both declare {}",
                    tasks[existing].id(),
                    task.id(),
                    task.output.display()
                )));
            }
        }

        for task in &tasks {
            for input in &task.inputs {
                if !raw_inputs.contains(input) && !producers.contains_key(input) {
                    return Err(PipelineError::GraphExpansion(format!(
                        "input {} of task '{}' is neither a manifest file nor another task's output",
                        input.display(),
                        task.id()
                    )));
                }
            }
        }

        let graph = TaskGraph { tasks };
        graph.topo_order()?;
        Ok(graph)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.tasks.iter().map(|t| t.output.clone()).collect()
    }

    /// Edges from each producer task to the tasks consuming its output.
    pub fn dependents(&self) -> Vec<Vec<usize>> {
        let producers: HashMap<&PathBuf, usize> = self
            .tasks
            .iter()
            .enumerate()
            .map(|(index, task)| (&task.output, index))
            .collect();
        let mut dependents = vec![Vec::new(); self.tasks.len()];
        for (index, task) in self.tasks.iter().enumerate() {
            for input in &task.inputs {
                if let Some(&producer) = producers.get(input) {
                    dependents[producer].push(index);
                }
            }
        }
        dependents
    }

    /// Number of in-graph dependencies per task.
    pub fn indegrees(&self) -> Vec<usize> {
        let producers: HashSet<&PathBuf> = self.tasks.iter().map(|t| &t.output).collect();
        self.tasks
            .iter()
            .map(|task| task.inputs.iter().filter(|i| producers.contains(i)).count())
            .collect()
    }

    /// Kahn ordering over the task indices; a leftover task means a cycle.
    pub fn topo_order(&self) -> Result<Vec<usize>, PipelineError> {
        let dependents = self.dependents();
        let mut indegrees = self.indegrees();
        let mut queue: VecDeque<usize> = indegrees
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(index) = queue.pop_front() {
            order.push(index);
            for &dependent in &dependents[index] {
                indegrees[dependent] -= 1;
                if indegrees[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if order.len() != self.tasks.len() {
            let stuck: Vec<String> = indegrees
                .iter()
                .enumerate()
                .filter(|&(_, &d)| d > 0)
                .map(|(i, _)| self.tasks[i].id())
                .collect();
            return Err(PipelineError::GraphExpansion(format!(
                "dependency cycle involving: {}",
                stuck.join(", ")
            )));
        }
        Ok(order)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn sh_task(rule: &'static str, output: &str, inputs: &[&str]) -> Task {
        Task {
            rule,
            sample: None,
            read_role: None,
            output: PathBuf::from(output),
            inputs: inputs.iter().map(PathBuf::from).collect(),
            threads: 1,
            mem_mb: 128,
            action: TaskAction::Command {
                spec: CommandSpec::new("true"),
                stage: vec![],
                publish: vec![],
            },
        }
    }

    #[test]
    fn collision_on_output_path_is_rejected() {
        let raw = HashSet::from([PathBuf::from("in")]);
        let tasks = vec![sh_task("a", "out", &["in"]), sh_task("b", "out", &["in"])];
        let err = TaskGraph::new(tasks, &raw).unwrap_err();
        assert!(err.to_string().contains("collision"));
    }

    #[test]
    fn orphan_input_is_rejected() {
        let raw = HashSet::new();
        let tasks = vec![sh_task("a", "out", &["nowhere"])];
        let err = TaskGraph::new(tasks, &raw).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn cycle_is_rejected() {
        let raw = HashSet::new();
        let tasks = vec![sh_task("a", "x", &["y"]), sh_task("b", "y", &["x"])];
        let err = TaskGraph::new(tasks, &raw).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn topo_order_respects_edges() {
        let raw = HashSet::from([PathBuf::from("in")]);
        let tasks = vec![
            sh_task("c", "third", &["second"]),
            sh_task("a", "first", &["in"]),
            sh_task("b", "second", &["first"]),
        ];
        let graph = TaskGraph::new(tasks, &raw).unwrap();
        let order = graph.topo_order().unwrap();
        let position = |i: usize| order.iter().position(|&x| x == i).unwrap();
        assert!(position(1) < position(2));
        assert!(position(2) < position(0));
    }

    #[test]
    fn wrap_prepends_submit_prefix() {
        let spec = CommandSpec::new("quast.py").arg("-t").arg("4");
        let wrapped = spec.wrap(&["srun".to_string(), "-p".to_string(), "short".to_string()]);
        assert_eq!(wrapped.program, "srun");
        assert_eq!(wrapped.args, vec!["-p", "short", "quast.py", "-t", "4"]);
    }
}
