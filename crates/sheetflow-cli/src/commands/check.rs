use std::path::Path;

use anyhow::Result;

use sheetflow_engine::Project;

/// Execute the `check` command: validate the project and assemble every
/// pipeline graph without running anything.
pub fn execute(project_path: &Path) -> Result<()> {
    let project = Project::load(project_path)?;
    println!("Project structure: OK");
    println!(
        "{:18} {}",
        "Value types:",
        project.config().valuetypes.len()
    );
    println!(
        "{:18} {}",
        "Constraints:",
        project.config().constraints.len()
    );
    for graph in project.graphs() {
        println!(
            "{:18} OK ({} blocks)",
            format!("Pipeline {}:", graph.id()),
            graph.len()
        );
    }
    println!("\nAll checks passed.");
    Ok(())
}
