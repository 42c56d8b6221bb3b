//! Job specifications and dependency-ordered submission
//!
//! A job is a set of commands plus dependency edges between them. Jobs enter
//! the system as [`CommandSpec`] records (the shape an HTTP layer submits),
//! get linked into [`Command`] graphs by [`build_job`], and are ordered by
//! [`topological_sort`] before they are queued, so a finite pool can never
//! deadlock on a dependency that sits behind its depender in the queue.

use crate::command::Command;
use crate::error::{RconError, Result};
use crate::issuer::Issuer;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Wire-level specification of one command within a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Unique command identifier within the job
    pub id: i32,
    /// The RCON command string
    pub cmd: String,
    /// Ids of commands that must complete before this one
    #[serde(default)]
    pub dependencies: Vec<i32>,
    /// Whether the submitter intends to await this command's outcome.
    /// Settlement happens either way; this only tells the boundary layer
    /// which commands to hand back result handles for.
    #[serde(default = "default_require_result")]
    pub require_result: bool,
}

fn default_require_result() -> bool {
    true
}

/// Build linked commands from a job specification
///
/// Fails with [`RconError::DuplicateId`] when two specs share an id and with
/// [`RconError::UnknownDependency`] when a spec references an id outside the
/// job. Cycle detection is deferred to [`topological_sort`] at submission.
pub fn build_job(specs: &[CommandSpec], issuer: Option<Issuer>) -> Result<Vec<Arc<Command>>> {
    let mut by_id: HashMap<i32, Arc<Command>> = HashMap::with_capacity(specs.len());
    let mut commands = Vec::with_capacity(specs.len());

    for spec in specs {
        let command = Command::with_details(spec.cmd.clone(), issuer.clone(), spec.id);
        if by_id.insert(spec.id, Arc::clone(&command)).is_some() {
            return Err(RconError::DuplicateId(spec.id));
        }
        commands.push(command);
    }

    for (spec, depender) in specs.iter().zip(&commands) {
        for dependency_id in &spec.dependencies {
            let dependee = by_id
                .get(dependency_id)
                .ok_or(RconError::UnknownDependency(*dependency_id))?;
            depender.add_dependency(dependee);
        }
    }

    Ok(commands)
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

struct Frame {
    node: Arc<Command>,
    deps: Vec<Arc<Command>>,
    next: usize,
}

// Commands are identified by pointer, not by id: ids are only required to be
// unique when nonzero, and standalone commands all carry 0.
fn identity(command: &Arc<Command>) -> usize {
    Arc::as_ptr(command) as usize
}

/// Order commands so that every dependee precedes its dependers
///
/// Depth-first search with three-coloring. The order among independent
/// commands is the input order restricted to visitation order, so repeated
/// sorts of the same job are stable.
///
/// Fails with [`RconError::DuplicateId`] if two commands share a nonzero id
/// and [`RconError::CycleDetected`] if the dependency graph has a cycle.
pub fn topological_sort(commands: &[Arc<Command>]) -> Result<Vec<Arc<Command>>> {
    let mut ids = HashSet::new();
    for command in commands {
        if command.id() != 0 && !ids.insert(command.id()) {
            return Err(RconError::DuplicateId(command.id()));
        }
    }

    let mut marks: HashMap<usize, Mark> = HashMap::with_capacity(commands.len());
    let mut sorted = Vec::with_capacity(commands.len());

    for root in commands {
        if marks.contains_key(&identity(root)) {
            continue;
        }
        marks.insert(identity(root), Mark::Visiting);
        let mut stack = vec![Frame {
            node: Arc::clone(root),
            deps: root.dependencies(),
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            if frame.next < frame.deps.len() {
                let child = Arc::clone(&frame.deps[frame.next]);
                frame.next += 1;
                match marks.get(&identity(&child)) {
                    Some(Mark::Visiting) => return Err(RconError::CycleDetected),
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(identity(&child), Mark::Visiting);
                        let deps = child.dependencies();
                        stack.push(Frame {
                            node: child,
                            deps,
                            next: 0,
                        });
                    }
                }
            } else {
                marks.insert(identity(&frame.node), Mark::Done);
                sorted.push(Arc::clone(&frame.node));
                stack.pop();
            }
        }
    }

    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(sorted: &[Arc<Command>], command: &Arc<Command>) -> usize {
        sorted
            .iter()
            .position(|c| Arc::ptr_eq(c, command))
            .expect("command missing from sort output")
    }

    #[test]
    fn chain_sorts_dependees_first() {
        let a = Command::with_details("a", None, 1);
        let b = Command::with_details("b", None, 2);
        let c = Command::with_details("c", None, 3);
        b.add_dependency(&a);
        c.add_dependency(&b);

        let sorted = topological_sort(&[c.clone(), b.clone(), a.clone()]).unwrap();
        assert_eq!(sorted.len(), 3);
        assert!(position(&sorted, &a) < position(&sorted, &b));
        assert!(position(&sorted, &b) < position(&sorted, &c));
    }

    #[test]
    fn diamond_respects_every_edge() {
        let a = Command::with_details("a", None, 1);
        let b = Command::with_details("b", None, 2);
        let c = Command::with_details("c", None, 3);
        let d = Command::with_details("d", None, 4);
        b.add_dependency(&a);
        c.add_dependency(&a);
        d.add_dependency(&b);
        d.add_dependency(&c);

        let sorted = topological_sort(&[d.clone(), c.clone(), b.clone(), a.clone()]).unwrap();
        assert!(position(&sorted, &a) < position(&sorted, &b));
        assert!(position(&sorted, &a) < position(&sorted, &c));
        assert!(position(&sorted, &b) < position(&sorted, &d));
        assert!(position(&sorted, &c) < position(&sorted, &d));
    }

    #[test]
    fn independent_commands_keep_input_order() {
        let a = Command::with_details("a", None, 1);
        let b = Command::with_details("b", None, 2);
        let c = Command::with_details("c", None, 3);

        let sorted = topological_sort(&[b.clone(), a.clone(), c.clone()]).unwrap();
        assert!(Arc::ptr_eq(&sorted[0], &b));
        assert!(Arc::ptr_eq(&sorted[1], &a));
        assert!(Arc::ptr_eq(&sorted[2], &c));
    }

    #[test]
    fn cycle_is_rejected() {
        let a = Command::with_details("a", None, 1);
        let b = Command::with_details("b", None, 2);
        a.add_dependency(&b);
        b.add_dependency(&a);

        assert!(matches!(
            topological_sort(&[a, b]),
            Err(RconError::CycleDetected)
        ));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let a = Command::with_details("a", None, 1);
        a.add_dependency(&a);

        assert!(matches!(
            topological_sort(std::slice::from_ref(&a)),
            Err(RconError::CycleDetected)
        ));
    }

    #[test]
    fn duplicate_nonzero_ids_are_rejected() {
        let a = Command::with_details("a", None, 7);
        let b = Command::with_details("b", None, 7);

        assert!(matches!(
            topological_sort(&[a, b]),
            Err(RconError::DuplicateId(7))
        ));
    }

    #[test]
    fn zero_ids_may_repeat() {
        let a = Command::new("a");
        let b = Command::new("b");

        let sorted = topological_sort(&[a, b]).unwrap();
        assert_eq!(sorted.len(), 2);
    }

    #[test]
    fn empty_input_sorts_to_empty() {
        assert!(topological_sort(&[]).unwrap().is_empty());
    }

    #[test]
    fn build_job_links_dependencies() {
        let specs = vec![
            CommandSpec {
                id: 1,
                cmd: "save-off".into(),
                dependencies: vec![],
                require_result: true,
            },
            CommandSpec {
                id: 2,
                cmd: "save-all".into(),
                dependencies: vec![1],
                require_result: true,
            },
        ];

        let commands = build_job(&specs, None).unwrap();
        assert_eq!(commands.len(), 2);
        let deps = commands[1].dependencies();
        assert_eq!(deps.len(), 1);
        assert!(Arc::ptr_eq(&deps[0], &commands[0]));
    }

    #[test]
    fn build_job_rejects_duplicate_ids() {
        let specs = vec![
            CommandSpec {
                id: 3,
                cmd: "list".into(),
                dependencies: vec![],
                require_result: true,
            },
            CommandSpec {
                id: 3,
                cmd: "seed".into(),
                dependencies: vec![],
                require_result: true,
            },
        ];

        assert!(matches!(
            build_job(&specs, None),
            Err(RconError::DuplicateId(3))
        ));
    }

    #[test]
    fn build_job_rejects_unknown_dependency() {
        let specs = vec![CommandSpec {
            id: 1,
            cmd: "list".into(),
            dependencies: vec![99],
            require_result: true,
        }];

        assert!(matches!(
            build_job(&specs, None),
            Err(RconError::UnknownDependency(99))
        ));
    }

    #[test]
    fn spec_deserializes_with_defaults() {
        let spec: CommandSpec = serde_json::from_str(r#"{"id": 4, "cmd": "list"}"#).unwrap();
        assert_eq!(spec.id, 4);
        assert_eq!(spec.cmd, "list");
        assert!(spec.dependencies.is_empty());
        assert!(spec.require_result);
    }
}
