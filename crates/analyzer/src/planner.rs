use crate::error::{AnalyzerError, PlanInfeasibleError, Result};
use crate::layout::{
    future_imports, is_package_member, join_path, module_line_count, original_imports,
    render_aggregator, render_group, render_plan_aggregator, sibling_import, split_path,
    unique_module_name,
};
use crate::metrics::{boundary_weights, file_metrics, local_subgraph, weighted_edges, WeightedEdge};
use crate::partition::{pair_key, partition, PairWeights};
use crate::types::{
    AggregatorPlan, CutEdge, EntityGroup, PinnedEntity, Reexport, SplitDecision, SplitPlan,
};
use crate::units::UnitGraph;
use context_code_scanner::{EntityId, EntityKind, FileScan, ModuleItemKind};
use context_graph::GraphArena;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Proposes split boundaries for oversized files.
///
/// Planning is deterministic: the same graph, scan and limit always produce
/// the same plan, with groups and their members in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Analyzer;

/// File content produced from a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedFile {
    pub path: String,
    pub content: String,
}

impl RenderedFile {
    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedSplit {
    /// Extracted modules, in group order
    pub modules: Vec<RenderedFile>,
    /// New content of the original file
    pub aggregator: RenderedFile,
}

impl RenderedSplit {
    pub fn files(&self) -> impl Iterator<Item = &RenderedFile> {
        self.modules.iter().chain(std::iter::once(&self.aggregator))
    }
}

/// Original imports a group needs plus the units it reads from other groups
fn group_imports(scan: &FileScan, units: &UnitGraph<'_>, group: &[usize]) -> (Vec<String>, Vec<usize>) {
    let members: HashSet<usize> = group.iter().copied().collect();
    let uses: BTreeSet<&str> = group
        .iter()
        .flat_map(|&unit| units.units[unit].uses.iter().map(String::as_str))
        .collect();
    let external: BTreeSet<usize> = group
        .iter()
        .flat_map(|&unit| units.deps[unit].iter().copied())
        .filter(|target| !members.contains(target))
        .collect();
    (original_imports(scan, &uses), external.into_iter().collect())
}

/// Agglomeration weights between units: `1 + (1 - confidence)` per graph
/// edge, and 1 for a name dependency the graph has no edge for
fn pair_weights(units: &UnitGraph<'_>, unit_of: &HashMap<&EntityId, usize>, edges: &[WeightedEdge<'_>]) -> PairWeights {
    let mut weights = PairWeights::new();
    for edge in edges {
        let (Some(&a), Some(&b)) = (unit_of.get(edge.from), unit_of.get(edge.to)) else {
            continue;
        };
        if a != b {
            *weights.entry(pair_key(a, b)).or_insert(0.0) += 1.0 + (1.0 - edge.confidence);
        }
    }
    for (unit, targets) in units.deps.iter().enumerate() {
        for &target in targets {
            weights.entry(pair_key(unit, target)).or_insert(1.0);
        }
    }
    weights
}

impl Analyzer {
    pub fn new() -> Self {
        Self
    }

    /// Plan a split of `scan` (whose text is `source`) so that every output
    /// file has at most `max_lines` lines.
    ///
    /// `graph` supplies reference confidences and cross-file edges;
    /// `project_files` is used to pick unused module names and to decide
    /// between package-relative and sibling imports.
    pub fn plan_split(
        &self,
        graph: &GraphArena,
        scan: &FileScan,
        source: &str,
        max_lines: usize,
        project_files: &BTreeSet<String>,
    ) -> Result<SplitDecision> {
        if scan.line_count <= max_lines {
            return Ok(SplitDecision::NotNeeded {
                file: scan.path.clone(),
                line_count: scan.line_count,
                max_lines,
            });
        }
        if !scan.language.supports_split() {
            return Err(AnalyzerError::UnsupportedLanguage {
                file: scan.path.clone(),
                language: scan.language,
            });
        }

        let units = UnitGraph::build(scan);
        let subgraph = local_subgraph(graph, &scan.path);
        let metrics = file_metrics(&subgraph, &scan.path);
        let edges = weighted_edges(&subgraph);
        let mut unit_of: HashMap<&EntityId, usize> = HashMap::new();
        for (index, unit) in units.units.iter().enumerate() {
            for member in &unit.members {
                unit_of.insert(*member, index);
            }
        }
        let weights = pair_weights(&units, &unit_of, &edges);

        let future = future_imports(scan).len();
        let size = |group: &[usize]| {
            let (imports, external) = group_imports(scan, &units, group);
            module_line_count(
                future,
                imports.len() + external.len(),
                group.iter().map(|&unit| units.units[unit].line_count()),
            )
        };
        let infeasible = |entity: Option<String>, estimated_lines: usize, reason: &str| PlanInfeasibleError {
            file: scan.path.clone(),
            entity,
            estimated_lines,
            max_lines,
            reason: reason.to_string(),
        };

        let groups = partition(&units, &weights, max_lines, &size).map_err(|oversized| {
            infeasible(
                Some(units.units[oversized.unit].entity.qualified_name.clone()),
                oversized.estimated_lines,
                "mutually dependent entities do not fit in one module",
            )
        })?;

        let (dir, stem) = split_path(&scan.path);
        let mut taken = project_files.clone();
        taken.insert(scan.path.clone());
        let modules: Vec<String> = groups
            .iter()
            .map(|group| {
                let lead = group
                    .iter()
                    .find(|&&unit| units.units[unit].entity.is_public())
                    .or(group.first())
                    .map_or("part", |&unit| units.units[unit].name());
                unique_module_name(dir, stem, lead, &mut taken)
            })
            .collect();
        let mut group_of: HashMap<usize, usize> = HashMap::new();
        for (index, group) in groups.iter().enumerate() {
            for &unit in group {
                group_of.insert(unit, index);
            }
        }
        let package_relative = is_package_member(&scan.path, project_files);

        let mut entity_groups = Vec::with_capacity(groups.len());
        for (index, group) in groups.iter().enumerate() {
            let (mut imports, external) = group_imports(scan, &units, group);
            for &target in &external {
                if let Some(&owner) = group_of.get(&target) {
                    imports.push(sibling_import(&modules[owner], units.units[target].name(), package_relative));
                }
            }
            let mut cut_set = Vec::new();
            for &unit in group {
                for &target in &units.deps[unit] {
                    match group_of.get(&target) {
                        Some(&owner) if owner != index => cut_set.push(CutEdge {
                            from: units.units[unit].entity.id.clone(),
                            to: units.units[target].entity.id.clone(),
                            name: units.units[target].name().to_string(),
                            module: modules[owner].clone(),
                        }),
                        _ => {}
                    }
                }
            }
            let members: HashSet<&EntityId> = group
                .iter()
                .flat_map(|&unit| units.units[unit].members.iter().copied())
                .collect();
            let (cohesion, coupling) = boundary_weights(&edges, &members);
            entity_groups.push(EntityGroup {
                module: modules[index].clone(),
                path: join_path(dir, &format!("{}.py", modules[index])),
                entities: group.iter().map(|&unit| units.units[unit].entity.id.clone()).collect(),
                names: group.iter().map(|&unit| units.units[unit].name().to_string()).collect(),
                imports,
                cut_set,
                relocated_state: group
                    .iter()
                    .map(|&unit| units.units[unit].entity)
                    .filter(|entity| entity.kind == EntityKind::State)
                    .map(|entity| entity.name.clone())
                    .collect(),
                estimated_lines: size(group),
                cohesion,
                coupling,
            });
        }

        // names the aggregator must still bind
        let retained: Vec<usize> = (0..units.units.len()).filter(|unit| !group_of.contains_key(unit)).collect();
        let mut needed: HashSet<&str> = retained
            .iter()
            .flat_map(|&unit| units.units[unit].uses.iter().map(String::as_str))
            .collect();
        needed.extend(
            scan.items
                .iter()
                .filter(|item| !matches!(item.kind, ModuleItemKind::Entity(_)))
                .flat_map(|item| item.uses.iter().map(String::as_str)),
        );
        let exports = scan.exports.as_deref().unwrap_or_default();
        let file_members: HashSet<&EntityId> = unit_of.keys().copied().collect();
        let used_elsewhere: HashSet<&EntityId> = edges
            .iter()
            .filter(|edge| !file_members.contains(edge.from))
            .map(|edge| edge.to)
            .collect();

        let mut moved: Vec<usize> = group_of.keys().copied().collect();
        moved.sort_unstable();
        let reexports: Vec<Reexport> = moved
            .iter()
            .filter(|&&unit| {
                let entity = units.units[unit].entity;
                entity.is_public()
                    || !entity.name.starts_with('_')
                    || exports.contains(&entity.name)
                    || needed.contains(entity.name.as_str())
                    || used_elsewhere.contains(&entity.id)
            })
            .filter_map(|&unit| {
                let owner = group_of.get(&unit)?;
                Some(Reexport {
                    name: units.units[unit].name().to_string(),
                    module: modules[*owner].clone(),
                })
            })
            .collect();

        let removed: Vec<_> = moved.iter().map(|&unit| units.units[unit].span).collect();
        let reexport_lines: Vec<String> = reexports
            .iter()
            .map(|reexport| sibling_import(&reexport.module, &reexport.name, package_relative))
            .collect();
        let aggregator_lines = render_aggregator(scan, source, &removed, &reexport_lines).lines().count();
        if aggregator_lines > max_lines {
            let heaviest = retained
                .iter()
                .filter(|&&unit| units.is_pinned(unit))
                .max_by_key(|&&unit| (units.units[unit].line_count(), std::cmp::Reverse(unit)))
                .map(|&unit| units.units[unit].entity.qualified_name.clone());
            return Err(infeasible(
                heaviest,
                aggregator_lines,
                "code that must stay in the original file exceeds the limit",
            )
            .into());
        }

        let bucket = |id: &EntityId| unit_of.get(id).map(|unit| group_of.get(unit).copied());
        let cut_weight = edges
            .iter()
            .filter_map(|edge| match (bucket(edge.from), bucket(edge.to)) {
                (Some(a), Some(b)) if a != b => Some(edge.confidence),
                _ => None,
            })
            .sum::<f32>();

        let aggregator = AggregatorPlan {
            path: scan.path.clone(),
            retained: retained.iter().map(|&unit| units.units[unit].entity.id.clone()).collect(),
            pinned: retained
                .iter()
                .filter_map(|&unit| {
                    let reason = units.pinned[unit].as_ref()?;
                    Some(PinnedEntity {
                        id: units.units[unit].entity.id.clone(),
                        name: units.units[unit].name().to_string(),
                        reason: reason.clone(),
                    })
                })
                .collect(),
            reexports,
            estimated_lines: aggregator_lines,
        };
        log::debug!(
            "Planned split of {} ({} lines) into {} modules, aggregator {} lines",
            scan.path,
            scan.line_count,
            entity_groups.len(),
            aggregator_lines
        );
        Ok(SplitDecision::Split(SplitPlan {
            file: scan.path.clone(),
            content_hash: scan.content_hash.clone(),
            max_lines,
            original_lines: scan.line_count,
            package_relative,
            groups: entity_groups,
            aggregator,
            metrics,
            cut_weight,
        }))
    }

    /// Render every file of `plan` from the content it was planned against
    pub fn render_split(&self, scan: &FileScan, source: &str, plan: &SplitPlan) -> Result<RenderedSplit> {
        let missing = || AnalyzerError::Other(format!("plan for {} names entities missing from the scan", plan.file));
        let mut modules = Vec::with_capacity(plan.groups.len());
        for group in &plan.groups {
            modules.push(RenderedFile {
                path: group.path.clone(),
                content: render_group(scan, source, group).ok_or_else(missing)?,
            });
        }
        let aggregator = RenderedFile {
            path: plan.aggregator.path.clone(),
            content: render_plan_aggregator(scan, source, plan).ok_or_else(missing)?,
        };
        Ok(RenderedSplit { modules, aggregator })
    }
}
