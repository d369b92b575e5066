use std::path::Path;

use anyhow::Result;

use sheetflow_engine::graph::PipelineGraph;
use sheetflow_engine::Project;

/// Execute the `graph` command: print each pipeline's execution order.
pub fn execute(project_path: &Path) -> Result<()> {
    let project = Project::load(project_path)?;
    for graph in project.graphs() {
        print!("{}", render(graph));
    }
    Ok(())
}

fn render(graph: &PipelineGraph) -> String {
    let mut out = format!("Pipeline '{}':\n", graph.id());
    for (step, &index) in graph.topological_order().iter().enumerate() {
        let node = graph.node(index);
        let from = graph
            .predecessor(index)
            .map(|p| format!(" <- {}", graph.node(p).name))
            .unwrap_or_default();
        out.push_str(&format!(
            "  {:>2}. {} [{}] {} -> {}{from}\n",
            step + 1,
            node.name,
            node.kind,
            node.input,
            node.output
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetflow_engine::config::parser::parse_project_str;

    #[test]
    fn render_lists_blocks_in_dependency_order() {
        let config = parse_project_str(
            r#"
version: "1.0"
pipelines:
  - name: Stops
    blocks:
      - { name: Load, type: SQLiteLoader, table: stops, file: gtfs.sqlite }
      - { name: Table, type: TableInterpreter, columns: [{ stop_id: integer }] }
      - { name: Csv, type: CSVInterpreter, delimiter: "," }
      - { name: Text, type: TextFileInterpreter }
      - { name: Read, type: LocalFileExtractor, path: stops.txt }
    pipes:
      - Read -> Text -> Csv -> Table -> Load
"#,
        )
        .unwrap();
        let project = Project::from_config(config).unwrap();
        let text = render(&project.graphs()[0]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Pipeline 'Stops':");
        assert!(lines[1].contains("Read [LocalFileExtractor] none -> file"));
        assert!(lines[5].contains("Load [SQLiteLoader] table -> none <- Table"));
    }
}
