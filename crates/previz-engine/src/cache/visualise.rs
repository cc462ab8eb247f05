//! Graphviz DOT output of the current graph's priorities.
//!
//! One node per cache entry: variant name, effective priority, cached
//! frame count, flags. Hotnodes are filled red, hotnode predecessors
//! blue. Handy when tuning the priority formula against a real script.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use previz_core::Result;

use crate::cache::store::FrameCache;
use crate::graph::GraphHandle;
use crate::node::{Clip, Source};

impl FrameCache {
    /// Render `graph` with per-entry priorities as a DOT digraph.
    pub fn priorities_dot(&self, graph: &GraphHandle) -> String {
        let mut out = String::from("digraph priorities {\n");
        let mut ids: HashMap<uuid::Uuid, usize> = HashMap::new();
        let mut next_id = 0usize;
        for leaf in graph.leaves() {
            emit(&mut out, &leaf, None, &mut ids, &mut next_id);
        }
        out.push_str("}\n");
        out
    }

    /// Write the DOT rendering to `path`.
    pub fn write_priorities_dot(&self, graph: &GraphHandle, path: &Path) -> Result<()> {
        std::fs::write(path, self.priorities_dot(graph))?;
        Ok(())
    }
}

fn emit(
    out: &mut String,
    node: &Clip,
    successor: Option<usize>,
    ids: &mut HashMap<uuid::Uuid, usize>,
    next_id: &mut usize,
) {
    let Some(entry) = node.cache_entry() else {
        return;
    };
    if let Some(&existing) = ids.get(&entry.id()) {
        if let Some(successor) = successor {
            let _ = writeln!(out, "  n{existing} -> n{successor};");
        }
        return;
    }

    let id = *next_id;
    *next_id += 1;
    ids.insert(entry.id(), id);

    let (is_hot, precedes_hot, is_indirection) = {
        let state = entry.state.lock();
        (state.is_hotnode, state.precedes_hotnode, state.is_indirection)
    };
    let fill = if is_hot {
        "#ff5555"
    } else if precedes_hot {
        "#8888ff"
    } else {
        "#ffffff"
    };
    let frames = if is_indirection {
        format!("n/a ({})", entry.cached_frame_count())
    } else {
        entry.cached_frame_count().to_string()
    };
    let _ = writeln!(
        out,
        "  n{id} [label=\"{}\\np={:.1}\\nframes={}\\nindirection={}\\nconstant={}\\nchildren={}\" \
         style=filled fillcolor=\"{fill}\"];",
        node.kind().name(),
        entry.priority(),
        frames,
        is_indirection,
        node.is_constant(),
        node.child_count(),
    );
    if let Some(successor) = successor {
        let _ = writeln!(out, "  n{id} -> n{successor};");
    }
    if let Source::Parents(parents) = node.source() {
        for parent in parents.iter() {
            emit(out, parent, Some(id), ids, next_id);
        }
    }
}
