//! Pipeline graph assembly: declarations to a checked, runnable DAG.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use sheetflow_types::ids::{BlockName, PipelineId};
use sheetflow_types::io::IoType;

use crate::blocks::{self, Block, BuildContext};
use crate::config::types::PipelineDecl;

/// One built block and its edge types.
pub struct BlockNode {
    pub name: BlockName,
    pub kind: &'static str,
    pub input: IoType,
    pub output: IoType,
    pub block: Arc<dyn Block>,
}

impl fmt::Debug for BlockNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockNode")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// A validated pipeline.
///
/// Acyclic. Every non-source block has exactly one inbound edge and every
/// edge joins identical IO types.
#[derive(Debug)]
pub struct PipelineGraph {
    id: PipelineId,
    nodes: Vec<BlockNode>,
    successors: Vec<Vec<usize>>,
    predecessor: Vec<Option<usize>>,
    order: Vec<usize>,
}

impl PipelineGraph {
    /// Build every block of `decl` and check its pipes.
    ///
    /// # Errors
    ///
    /// Returns every problem found, each prefixed with the pipeline name.
    pub fn build(decl: &PipelineDecl, ctx: &BuildContext<'_>) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();
        let prefix = format!("pipeline '{}'", decl.name);

        if decl.blocks.is_empty() {
            errors.push(format!("{prefix}: must declare at least one block"));
        }

        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut built: Vec<Option<BlockNode>> = Vec::with_capacity(decl.blocks.len());
        for block in &decl.blocks {
            if block.name.trim().is_empty() {
                errors.push(format!("{prefix}: block name must not be empty"));
            }
            if index.insert(block.name.as_str(), built.len()).is_some() {
                errors.push(format!("{prefix}: duplicate block name '{}'", block.name));
            }
            match blocks::build(&block.kind, ctx) {
                Ok(runnable) => built.push(Some(BlockNode {
                    name: BlockName::new(&block.name),
                    kind: block.kind.type_name(),
                    input: block.kind.input_type(),
                    output: block.kind.output_type(),
                    block: runnable,
                })),
                Err(e) => {
                    errors.push(format!(
                        "{prefix}: block '{}' ({}): {e}",
                        block.name,
                        block.kind.type_name()
                    ));
                    built.push(None);
                }
            }
        }

        let n = decl.blocks.len();
        let mut edges: Vec<(usize, usize)> = Vec::new();
        let mut seen = HashSet::new();
        for pipe in &decl.pipes {
            if pipe.chain.len() < 2 {
                errors.push(format!(
                    "{prefix}: pipe '{}' must connect at least two blocks",
                    pipe.chain.join(" -> ")
                ));
                continue;
            }
            for (from, to) in pipe.edges() {
                let (Some(&a), Some(&b)) = (index.get(from), index.get(to)) else {
                    for name in [from, to] {
                        if !index.contains_key(name) {
                            errors.push(format!("{prefix}: pipe references unknown block '{name}'"));
                        }
                    }
                    continue;
                };
                if seen.insert((a, b)) {
                    edges.push((a, b));
                }
            }
        }

        let mut successors = vec![Vec::new(); n];
        let mut inbound = vec![Vec::new(); n];
        for &(a, b) in &edges {
            successors[a].push(b);
            inbound[b].push(a);
        }

        let kinds: Vec<(IoType, IoType)> = decl
            .blocks
            .iter()
            .map(|b| (b.kind.input_type(), b.kind.output_type()))
            .collect();
        for &(a, b) in &edges {
            let produced = kinds[a].1;
            let expected = kinds[b].0;
            if produced != expected {
                errors.push(format!(
                    "{prefix}: pipe {} -> {}: '{}' produces {produced} but '{}' expects {expected}",
                    decl.blocks[a].name, decl.blocks[b].name, decl.blocks[a].name, decl.blocks[b].name
                ));
            }
        }

        for (i, block) in decl.blocks.iter().enumerate() {
            let (input, output) = kinds[i];
            let count = inbound[i].len();
            if input == IoType::None {
                if count > 0 {
                    errors.push(format!(
                        "{prefix}: source block '{}' cannot receive a pipe",
                        block.name
                    ));
                }
            } else if count == 0 {
                errors.push(format!(
                    "{prefix}: block '{}' has no inbound pipe (expects {input})",
                    block.name
                ));
            } else if count > 1 {
                errors.push(format!(
                    "{prefix}: block '{}' has {count} inbound pipes, expected exactly one",
                    block.name
                ));
            }
            if output == IoType::None && !successors[i].is_empty() {
                errors.push(format!(
                    "{prefix}: block '{}' produces no output but has outbound pipes",
                    block.name
                ));
            }
        }

        let order = match topological_order(&successors, &inbound) {
            Ok(order) => order,
            Err(cyclic) => {
                let names: Vec<&str> = cyclic
                    .iter()
                    .map(|&i| decl.blocks[i].name.as_str())
                    .collect();
                errors.push(format!(
                    "{prefix}: pipes form a cycle through {}",
                    names.join(", ")
                ));
                Vec::new()
            }
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        let nodes: Vec<BlockNode> = built.into_iter().flatten().collect();
        let predecessor = inbound.iter().map(|p| p.first().copied()).collect();
        Ok(Self {
            id: PipelineId::new(&decl.name),
            nodes,
            successors,
            predecessor,
            order,
        })
    }

    #[must_use]
    pub fn id(&self) -> &PipelineId {
        &self.id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn node(&self, index: usize) -> &BlockNode {
        &self.nodes[index]
    }

    #[must_use]
    pub fn successors(&self, index: usize) -> &[usize] {
        &self.successors[index]
    }

    #[must_use]
    pub fn predecessor(&self, index: usize) -> Option<usize> {
        self.predecessor[index]
    }

    /// Blocks without an inbound pipe.
    pub fn sources(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len()).filter(|&i| self.predecessor[i].is_none())
    }

    /// Node indices in a dependency-respecting order.
    #[must_use]
    pub fn topological_order(&self) -> &[usize] {
        &self.order
    }

    /// Nodes in the order a sequential run would execute them.
    pub fn execution_order(&self) -> impl Iterator<Item = &BlockNode> {
        self.order.iter().map(|&i| &self.nodes[i])
    }

    /// Every block reachable from `index`, excluding `index` itself.
    #[must_use]
    pub fn descendants(&self, index: usize) -> Vec<usize> {
        let mut found = Vec::new();
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<usize> = self.successors[index].clone();
        while let Some(i) = stack.pop() {
            if std::mem::replace(&mut visited[i], true) {
                continue;
            }
            found.push(i);
            stack.extend(&self.successors[i]);
        }
        found
    }
}

/// Kahn's algorithm. On a cycle, returns the blocks left unordered.
fn topological_order(
    successors: &[Vec<usize>],
    inbound: &[Vec<usize>],
) -> Result<Vec<usize>, Vec<usize>> {
    let mut remaining: Vec<usize> = inbound.iter().map(Vec::len).collect();
    let mut queue: VecDeque<usize> = (0..remaining.len()).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(remaining.len());
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &s in &successors[i] {
            remaining[s] -= 1;
            if remaining[s] == 0 {
                queue.push_back(s);
            }
        }
    }
    if order.len() == remaining.len() {
        Ok(order)
    } else {
        Err((0..remaining.len()).filter(|&i| remaining[i] > 0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::testing::build_context;
    use crate::valuetype::ValueTypeRegistry;
    use std::path::Path;

    fn pipeline(yaml: &str) -> PipelineDecl {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn build(yaml: &str) -> Result<PipelineGraph, Vec<String>> {
        let registry = ValueTypeRegistry::default();
        PipelineGraph::build(&pipeline(yaml), &build_context(&registry, Path::new(".")))
    }

    const CHAIN: &str = r"
name: Stops
blocks:
  - { name: Fetch, type: LocalFileExtractor, path: stops.csv }
  - { name: Text, type: TextFileInterpreter }
  - { name: Csv, type: CSVInterpreter, delimiter: ',' }
  - name: Table
    type: TableInterpreter
    columns: [{ stop_id: integer }]
  - { name: Load, type: SQLiteLoader, table: stops, file: out.sqlite }
pipes:
  - Fetch -> Text -> Csv -> Table -> Load
";

    #[test]
    fn linear_chain_orders_blocks() {
        let graph = build(CHAIN).unwrap();
        let order: Vec<&str> = graph.execution_order().map(|n| n.name.as_str()).collect();
        assert_eq!(order, ["Fetch", "Text", "Csv", "Table", "Load"]);
        assert_eq!(graph.sources().collect::<Vec<_>>(), [0]);
        assert_eq!(graph.predecessor(4), Some(3));
        assert_eq!(graph.descendants(2), vec![3, 4]);
    }

    #[test]
    fn fan_out_is_allowed() {
        let graph = build(
            r"
name: Fan
blocks:
  - { name: Fetch, type: LocalFileExtractor, path: book.xlsx }
  - { name: Book, type: XLSXInterpreter }
  - { name: A, type: SheetPicker, sheetName: A }
  - { name: B, type: SheetPicker, sheetName: B }
pipes:
  - Fetch -> Book -> A
  - [Book, B]
",
        )
        .unwrap();
        assert_eq!(graph.successors(1), &[2, 3]);
        let mut desc = graph.descendants(0);
        desc.sort_unstable();
        assert_eq!(desc, vec![1, 2, 3]);
    }

    #[test]
    fn duplicate_pipes_collapse_to_one_edge() {
        let yaml = CHAIN.replace(
            "  - Fetch -> Text -> Csv -> Table -> Load",
            "  - Fetch -> Text -> Csv -> Table -> Load\n  - Fetch -> Text",
        );
        let graph = build(&yaml).unwrap();
        assert_eq!(graph.successors(0), &[1]);
    }

    #[test]
    fn type_mismatch_is_reported() {
        let yaml = CHAIN.replace("Fetch -> Text -> Csv", "Fetch -> Csv -> Text");
        let errors = build(&yaml).unwrap_err();
        assert!(
            errors.iter().any(|e| e.contains("'Fetch' produces file but 'Csv' expects text_file")),
            "{errors:?}"
        );
    }

    #[test]
    fn missing_inbound_pipe_is_reported() {
        let yaml = CHAIN.replace("Fetch -> Text -> Csv -> Table -> Load", "Fetch -> Text -> Csv");
        let errors = build(&yaml).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("'Table' has no inbound pipe")));
        assert!(errors.iter().any(|e| e.contains("'Load' has no inbound pipe")));
    }

    #[test]
    fn unknown_block_and_duplicate_name_are_reported() {
        let yaml = CHAIN
            .replace("-> Load", "-> Loader")
            .replace("name: Csv,", "name: Text,");
        let errors = build(&yaml).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("unknown block 'Loader'")));
        assert!(errors.iter().any(|e| e.contains("duplicate block name 'Text'")));
        assert!(errors.iter().all(|e| e.starts_with("pipeline 'Stops': ")));
    }

    #[test]
    fn cycle_is_reported() {
        let errors = build(
            r"
name: Loop
blocks:
  - { name: Fetch, type: LocalFileExtractor, path: s.csv }
  - { name: Text, type: TextFileInterpreter }
  - { name: Csv, type: CSVInterpreter, delimiter: ',' }
  - { name: A, type: CellRangeSelector, select: 'A1:B2' }
  - { name: B, type: CellRangeSelector, select: 'A1:B2' }
pipes:
  - Fetch -> Text -> Csv
  - A -> B -> A
",
        )
        .unwrap_err();
        assert!(
            errors.iter().any(|e| e.contains("cycle through A, B")),
            "{errors:?}"
        );
    }

    #[test]
    fn loader_cannot_feed_another_block() {
        let yaml = CHAIN.replace(
            "  - Fetch -> Text -> Csv -> Table -> Load",
            "  - Fetch -> Text -> Csv -> Table -> Load -> Fetch",
        );
        let errors = build(&yaml).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("'Load' produces no output")));
        assert!(errors.iter().any(|e| e.contains("source block 'Fetch'")));
    }

    #[test]
    fn block_build_errors_are_collected() {
        let yaml = CHAIN.replace("columns: [{ stop_id: integer }]", "columns: [{ stop_id: Zone }]");
        let errors = build(&yaml).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.contains("block 'Table' (TableInterpreter)") && e.contains("'Zone'")));
    }
}
