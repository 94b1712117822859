//! Interactive HTML rendering of a [`Subgraph`].
//!
//! The page loads the vis-network browser library from a CDN and embeds the
//! nodes and edges as JSON. Nodes are grouped (coloured) by entity type and
//! edges are directed and labelled with the relation type.

use crate::error::KgError;
use crate::model::Subgraph;
use serde_json::json;
use std::path::Path;
use tracing::info;

const VIS_NETWORK_JS: &str =
    "https://unpkg.com/vis-network@9.1.9/standalone/umd/vis-network.min.js";

/// Serialise a JSON value for inclusion inside a `<script>` element.
fn script_json(value: &serde_json::Value) -> String {
    // `</` would close the script element early.
    value.to_string().replace("</", "<\\/")
}

/// Build the HTML document for `subgraph`.
pub fn subgraph_html(subgraph: &Subgraph) -> String {
    let nodes: Vec<_> = subgraph
        .nodes
        .iter()
        .map(|n| {
            json!({
                "id": n.id,
                "label": n.name,
                "title": format!("{} ({})", n.name, n.node_type),
                "group": n.node_type,
            })
        })
        .collect();
    let edges: Vec<_> = subgraph
        .edges
        .iter()
        .map(|e| {
            json!({
                "from": e.source,
                "to": e.target,
                "label": e.edge_type,
                "arrows": "to",
            })
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Knowledge subgraph</title>
<script src="{js}"></script>
<style>
  html, body {{ margin: 0; height: 100%; background: #ffffff; }}
  #graph {{ width: 100%; height: 800px; }}
</style>
</head>
<body>
<div id="graph"></div>
<script>
  const nodes = new vis.DataSet({nodes});
  const edges = new vis.DataSet({edges});
  new vis.Network(
    document.getElementById("graph"),
    {{ nodes: nodes, edges: edges }},
    {{
      nodes: {{ shape: "dot", size: 16, font: {{ color: "black" }} }},
      edges: {{ font: {{ align: "middle" }}, smooth: {{ type: "dynamic" }} }},
      physics: {{ stabilization: true }}
    }}
  );
</script>
</body>
</html>
"#,
        js = VIS_NETWORK_JS,
        nodes = script_json(&serde_json::Value::Array(nodes)),
        edges = script_json(&serde_json::Value::Array(edges)),
    )
}

/// Write the HTML view of `subgraph` to `path`, creating parent directories.
pub fn render_subgraph_html(subgraph: &Subgraph, path: &Path) -> Result<(), KgError> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| KgError::io(dir, e))?;
    }
    std::fs::write(path, subgraph_html(subgraph)).map_err(|e| KgError::io(path, e))?;
    info!(
        "Subgraph with {} nodes, {} edges written to {}",
        subgraph.nodes.len(),
        subgraph.edges.len(),
        path.display()
    );
    Ok(())
}
