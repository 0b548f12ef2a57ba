//! Shared three-color DFS topological sort.
//!
//! Used identically by the [`crate::container::DependencyContainer`] (over
//! registered components) and the [`crate::module::ModuleManager`] (over
//! registered modules) so both cycle/missing-link detectors live in one
//! place instead of two copies of the same DFS.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Error raised while computing a topological order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopoError {
    /// A node depends (directly or transitively) on itself.
    Circular { path: Vec<String> },
    /// A node declares a dependency that was never registered.
    MissingDependency { node: String, dependency: String },
}

/// Compute a dependency-respecting order over `nodes`, where
/// `deps_of(name)` returns the declared dependency names for `name`.
///
/// `leading` is a sequence of node names that, if present in `nodes`, are
/// placed first (in the given order, subject to their own dependencies
/// already being satisfied by earlier entries) before the remaining nodes
/// are appended in dependency-respecting order. This implements the
/// Container's "prefers the fixed leading sequence" rule; callers with no
/// such preference (the Module Manager) pass an empty slice.
pub fn topological_order<'a, F>(
    nodes: &[&'a str],
    deps_of: F,
    leading: &[&str],
) -> Result<Vec<String>, TopoError>
where
    F: Fn(&str) -> Vec<String>,
{
    let known: HashMap<&str, ()> = nodes.iter().map(|n| (*n, ())).collect();
    let mut colors: HashMap<String, Color> = nodes.iter().map(|n| (n.to_string(), Color::White)).collect();
    let mut order: Vec<String> = Vec::with_capacity(nodes.len());

    fn visit(
        name: &str,
        known: &HashMap<&str, ()>,
        colors: &mut HashMap<String, Color>,
        deps_of: &dyn Fn(&str) -> Vec<String>,
        order: &mut Vec<String>,
        stack: &mut Vec<String>,
    ) -> Result<(), TopoError> {
        match colors.get(name).copied() {
            Some(Color::Black) => return Ok(()),
            Some(Color::Gray) => {
                let mut path = stack.clone();
                path.push(name.to_string());
                return Err(TopoError::Circular { path });
            }
            _ => {}
        }

        colors.insert(name.to_string(), Color::Gray);
        stack.push(name.to_string());

        for dep in deps_of(name) {
            if !known.contains_key(dep.as_str()) {
                return Err(TopoError::MissingDependency {
                    node: name.to_string(),
                    dependency: dep,
                });
            }
            visit(&dep, known, colors, deps_of, order, stack)?;
        }

        stack.pop();
        colors.insert(name.to_string(), Color::Black);
        order.push(name.to_string());
        Ok(())
    }

    let mut stack = Vec::new();
    for name in leading {
        if known.contains_key(name) {
            visit(name, &known, &mut colors, &deps_of, &mut order, &mut stack)?;
        }
    }
    for name in nodes {
        visit(name, &known, &mut colors, &deps_of, &mut order, &mut stack)?;
    }

    Ok(order)
}
