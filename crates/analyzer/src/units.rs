use context_code_scanner::{
    Entity, EntityId, EntityKind, FileScan, LineSpan, ModuleItemKind, StateMutability,
};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Module attributes whose value changes when code moves to another module
const MODULE_METADATA: &[&str] = &[
    "__all__",
    "__author__",
    "__builtins__",
    "__doc__",
    "__file__",
    "__loader__",
    "__name__",
    "__package__",
    "__path__",
    "__spec__",
    "__version__",
];

/// Top-level entity together with its members; the smallest thing that moves
#[derive(Debug, Clone)]
pub(crate) struct Unit<'a> {
    pub entity: &'a Entity,
    /// Lines including decorators and attached comments
    pub span: LineSpan,
    pub uses: &'a BTreeSet<String>,
    /// The entity itself and everything nested in it
    pub members: Vec<&'a EntityId>,
}

impl Unit<'_> {
    pub fn name(&self) -> &str {
        &self.entity.name
    }

    pub fn line_count(&self) -> usize {
        self.span.end + 1 - self.span.start
    }
}

/// Units of one file with their name-level dependencies and pinning.
///
/// `deps[u]` holds the units whose names `u` reads; each such pair needs an
/// import when the two end up in different files.
#[derive(Debug)]
pub(crate) struct UnitGraph<'a> {
    pub units: Vec<Unit<'a>>,
    pub by_name: HashMap<&'a str, usize>,
    pub deps: Vec<BTreeSet<usize>>,
    /// Pairs that must share a file (mutable state and its accessors)
    pub bundles: Vec<(usize, usize)>,
    pub pinned: Vec<Option<String>>,
}

impl<'a> UnitGraph<'a> {
    pub fn build(scan: &'a FileScan) -> Self {
        let mut units = Vec::new();
        let mut unit_of: HashMap<&EntityId, usize> = HashMap::new();
        for item in &scan.items {
            let ModuleItemKind::Entity(id) = &item.kind else {
                continue;
            };
            let Some(entity) = scan.entity(id) else {
                continue;
            };
            if !entity.is_top_level() {
                continue;
            }
            unit_of.insert(&entity.id, units.len());
            units.push(Unit {
                entity,
                span: item.span,
                uses: &item.uses,
                members: vec![&entity.id],
            });
        }
        // parents precede their members in declaration order
        for entity in &scan.entities {
            let Some(parent) = &entity.parent else {
                continue;
            };
            if let Some(&unit) = unit_of.get(parent) {
                unit_of.insert(&entity.id, unit);
                units[unit].members.push(&entity.id);
            }
        }

        let mut by_name = HashMap::new();
        for (index, unit) in units.iter().enumerate() {
            by_name.entry(unit.entity.name.as_str()).or_insert(index);
        }
        let deps: Vec<BTreeSet<usize>> = units
            .iter()
            .enumerate()
            .map(|(index, unit)| {
                unit.uses
                    .iter()
                    .filter_map(|name| by_name.get(name.as_str()).copied())
                    .filter(|&target| target != index)
                    .collect()
            })
            .collect();

        let mut bundles = Vec::new();
        for (state, unit) in units.iter().enumerate() {
            if unit.entity.mutability != Some(StateMutability::Mutable) {
                continue;
            }
            for (accessor, targets) in deps.iter().enumerate() {
                if targets.contains(&state) {
                    bundles.push((accessor, state));
                }
            }
        }

        let mut graph = Self {
            pinned: vec![None; units.len()],
            units,
            by_name,
            deps,
            bundles,
        };
        graph.pin(scan);
        graph
    }

    pub fn is_pinned(&self, unit: usize) -> bool {
        self.pinned[unit].is_some()
    }

    pub fn movable(&self) -> Vec<usize> {
        (0..self.units.len()).filter(|&u| !self.is_pinned(u)).collect()
    }

    /// Units that must stay in the original file, closed over bundles and
    /// over referrers so extracted code never imports from the aggregator
    fn pin(&mut self, scan: &FileScan) {
        let other_binds: HashSet<&str> = scan
            .items
            .iter()
            .filter(|item| item.kind == ModuleItemKind::Other)
            .flat_map(|item| item.binds.iter().map(String::as_str))
            .collect();

        for (index, unit) in self.units.iter().enumerate() {
            let reason = if unit.entity.kind == EntityKind::State
                && unit.entity.mutability == Some(StateMutability::Rebound)
            {
                Some("module state re-bound after definition".to_string())
            } else if let Some(name) = unit.uses.iter().find(|name| MODULE_METADATA.contains(&name.as_str())) {
                Some(format!("reads module metadata `{name}`"))
            } else {
                unit.uses
                    .iter()
                    .find(|name| other_binds.contains(name.as_str()) && !self.by_name.contains_key(name.as_str()))
                    .map(|name| format!("uses `{name}` bound by module-level code"))
            };
            self.pinned[index] = reason;
        }

        loop {
            let mut changed = false;
            for &(a, b) in &self.bundles {
                for (from, to) in [(a, b), (b, a)] {
                    if self.pinned[from].is_some() && self.pinned[to].is_none() {
                        self.pinned[to] = Some(format!(
                            "shares mutable state with pinned `{}`",
                            self.units[from].name()
                        ));
                        changed = true;
                    }
                }
            }
            for unit in 0..self.units.len() {
                if self.pinned[unit].is_some() {
                    continue;
                }
                if let Some(&target) = self.deps[unit].iter().find(|&&t| self.pinned[t].is_some()) {
                    self.pinned[unit] =
                        Some(format!("references pinned `{}`", self.units[target].name()));
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_code_scanner::Scanner;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"import json

__version__ = "1.0"

CACHE = {}
counter = 0
LIMIT = 10


def version():
    return __version__


def bump():
    global counter
    counter += 1
    return counter


def report():
    return bump()


def remember(key, value):
    CACHE[key] = value


def recall(key):
    return CACHE.get(key)


def clamp(value):
    return min(value, LIMIT)


class Codec:
    def encode(self, value):
        return json.dumps(clamp(value))
"#;

    #[test]
    fn pins_rebound_state_metadata_and_referrers() {
        let scan = Scanner::default().scan_source("store.py", SOURCE).unwrap();
        let graph = UnitGraph::build(&scan);
        let names: Vec<&str> = graph.units.iter().map(Unit::name).collect();
        assert_eq!(
            names,
            vec!["CACHE", "counter", "LIMIT", "version", "bump", "report", "remember", "recall", "clamp", "Codec"]
        );

        let pinned: Vec<&str> = (0..graph.units.len())
            .filter(|&u| graph.is_pinned(u))
            .map(|u| graph.units[u].name())
            .collect();
        assert_eq!(pinned, vec!["counter", "version", "bump", "report"]);

        let movable: Vec<&str> = graph.movable().into_iter().map(|u| graph.units[u].name()).collect();
        assert_eq!(movable, vec!["CACHE", "LIMIT", "remember", "recall", "clamp", "Codec"]);
    }

    #[test]
    fn mutable_state_is_bundled_with_accessors() {
        let scan = Scanner::default().scan_source("store.py", SOURCE).unwrap();
        let graph = UnitGraph::build(&scan);
        let cache = graph.by_name["CACHE"];
        let mut accessors: Vec<&str> = graph
            .bundles
            .iter()
            .filter(|(_, state)| *state == cache)
            .map(|(accessor, _)| graph.units[*accessor].name())
            .collect();
        accessors.sort_unstable();
        assert_eq!(accessors, vec!["recall", "remember"]);

        let codec = graph.by_name["Codec"];
        assert_eq!(graph.units[codec].members.len(), 2);
        assert!(graph.deps[codec].contains(&graph.by_name["clamp"]));
    }
}
