//! Loader for the processed-ICFG dot file emitted by the pointer analysis.
//!
//! One statement per line. Node lines carry `kind`, `function`, `loc`,
//! `corres` and optional boolean flags; edge lines are `A -> B;`. Unknown
//! attributes are ignored so the upstream emitter can grow new ones.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::{Icfg, IcfgBuilder, IcfgError, IcfgNode, NodeId, NodeKind, Result};

/// Load an ICFG from a dot file on disk.
pub fn load_icfg(path: &Path) -> Result<Icfg> {
    let text = std::fs::read_to_string(path).map_err(|source| IcfgError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let icfg = parse_icfg(&text, path)?;
    debug!(path = %path.display(), nodes = icfg.len(), "loaded ICFG");
    Ok(icfg)
}

/// Parse an ICFG from dot text; `path` is used for diagnostics only.
pub fn parse_icfg(text: &str, path: &Path) -> Result<Icfg> {
    let node_re = Regex::new(r"^(Node0x[0-9a-fA-F]+)\s*\[(.*)\]\s*;?$").unwrap();
    let edge_re =
        Regex::new(r"^(Node0x[0-9a-fA-F]+)\s*->\s*(Node0x[0-9a-fA-F]+)\s*(\[[^\]]*\])?\s*;?$")
            .unwrap();

    let mut builder = IcfgBuilder::new();
    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty()
            || line.starts_with("digraph")
            || line.starts_with("label")
            || line == "{"
            || line == "}"
        {
            continue;
        }

        if let Some(caps) = edge_re.captures(line) {
            let from = parse_node_id(&caps[1], path, lineno)?;
            let to = parse_node_id(&caps[2], path, lineno)?;
            builder.add_edge(from, to);
            continue;
        }
        if let Some(caps) = node_re.captures(line) {
            let id = parse_node_id(&caps[1], path, lineno)?;
            let node = parse_node(id, &caps[2], path, lineno)?;
            builder.add_node(node)?;
            continue;
        }
        return Err(malformed(path, lineno, line));
    }

    builder.finish()
}

fn parse_node_id(token: &str, path: &Path, lineno: usize) -> Result<NodeId> {
    let hex = token
        .strip_prefix("Node0x")
        .ok_or_else(|| malformed(path, lineno, token))?;
    NodeId::from_str_radix(hex, 16).map_err(|_| malformed(path, lineno, token))
}

fn parse_node(id: NodeId, attrs: &str, path: &Path, lineno: usize) -> Result<IcfgNode> {
    let mut kind = None;
    let mut function = String::new();
    let mut loc = None;
    let mut corres = None;
    let mut is_extern = false;
    let mut is_intrinsic = false;
    let mut is_uncalled = false;

    for (key, value) in split_attrs(attrs).ok_or_else(|| malformed(path, lineno, attrs))? {
        match key.as_str() {
            "kind" => {
                kind = Some(match value.as_str() {
                    "Global" => NodeKind::Global,
                    "FunEntry" => NodeKind::FunEntry,
                    "FunExit" => NodeKind::FunExit,
                    "FunCall" => NodeKind::FunCall,
                    "FunRet" => NodeKind::FunRet,
                    "Intra" => NodeKind::Intra,
                    other => {
                        return Err(IcfgError::UnknownKind {
                            path: path.to_path_buf(),
                            line: lineno + 1,
                            kind: other.to_string(),
                        });
                    }
                });
            }
            "function" => function = value,
            "loc" => loc = Some(value),
            "corres" => corres = Some(parse_node_id(&value, path, lineno)?),
            "extern" => is_extern = value == "true",
            "intrinsic" => is_intrinsic = value == "true",
            "uncalled" => is_uncalled = value == "true",
            _ => {}
        }
    }

    let kind = kind.ok_or_else(|| malformed(path, lineno, attrs))?;
    Ok(IcfgNode {
        id,
        kind,
        function,
        loc,
        corres,
        is_extern,
        is_intrinsic,
        is_uncalled,
    })
}

/// Split a dot attribute list on commas, honoring quoted values.
///
/// Returns `None` on unbalanced quotes or a missing `=`.
fn split_attrs(attrs: &str) -> Option<Vec<(String, String)>> {
    let mut result = Vec::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in attrs.chars() {
        if in_quotes {
            if escaped {
                value.push(ch);
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_quotes = false;
            } else {
                value.push(ch);
            }
            continue;
        }
        match ch {
            '=' if !in_value => in_value = true,
            '"' if in_value => in_quotes = true,
            ',' => {
                if !in_value {
                    return None;
                }
                result.push((
                    std::mem::take(&mut key).trim().to_string(),
                    std::mem::take(&mut value).trim().to_string(),
                ));
                in_value = false;
            }
            _ => {
                if in_value {
                    value.push(ch);
                } else {
                    key.push(ch);
                }
            }
        }
    }
    if in_quotes || escaped {
        return None;
    }
    if !key.trim().is_empty() {
        if !in_value {
            return None;
        }
        result.push((key.trim().to_string(), value.trim().to_string()));
    }
    Some(result)
}

fn malformed(path: &Path, lineno: usize, text: &str) -> IcfgError {
    IcfgError::MalformedLine {
        path: path.to_path_buf(),
        line: lineno + 1,
        text: text.to_string(),
    }
}

/// Render an ICFG back to the dot shape the loader accepts.
///
/// Used by tests and by graph dumps; output is line-per-statement with
/// nodes in ascending id order.
pub fn render_icfg(icfg: &Icfg) -> String {
    let mut out = String::from("digraph \"ICFG\" {\n");
    for id in icfg.node_ids() {
        let node = icfg.node(id).expect("iterating known ids");
        let kind = match node.kind {
            NodeKind::Global => "Global",
            NodeKind::FunEntry => "FunEntry",
            NodeKind::FunExit => "FunExit",
            NodeKind::FunCall => "FunCall",
            NodeKind::FunRet => "FunRet",
            NodeKind::Intra => "Intra",
        };
        out.push_str(&format!("    Node0x{id:x} [kind={kind}"));
        if !node.function.is_empty() {
            out.push_str(&format!(",function=\"{}\"", node.function));
        }
        if let Some(loc) = &node.loc {
            out.push_str(&format!(",loc=\"{}\"", escape(loc)));
        }
        if let Some(corres) = node.corres {
            out.push_str(&format!(",corres=Node0x{corres:x}"));
        }
        if node.is_extern {
            out.push_str(",extern=true");
        }
        if node.is_intrinsic {
            out.push_str(",intrinsic=true");
        }
        if node.is_uncalled {
            out.push_str(",uncalled=true");
        }
        out.push_str("];\n");
    }
    for id in icfg.node_ids() {
        for &succ in icfg.out_edges(id) {
            out.push_str(&format!("    Node0x{id:x} -> Node0x{succ:x};\n"));
        }
    }
    out.push_str("}\n");
    out
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Location;

    #[test]
    fn test_parse_small_graph() {
        let text = r#"digraph "ICFG" {
    label="ICFG";

    Node0x1 [kind=Global];
    Node0x2 [kind=FunEntry,function="main",loc="{ \"ln\": 3, \"fl\": \"src/main.c\" }",corres=Node0x5];
    Node0x3 [kind=Intra,function="main",loc="{ \"ln\": 4, \"cl\": 2, \"fl\": \"src/main.c\" }"];
    Node0x5 [kind=FunExit,function="main",loc="{ \"ln\": 6, \"fl\": \"src/main.c\" }"];
    Node0x1 -> Node0x2;
    Node0x2 -> Node0x3;
    Node0x3 -> Node0x5;
}
"#;
        let icfg = parse_icfg(text, Path::new("test.dot")).unwrap();
        assert_eq!(icfg.len(), 4);
        assert_eq!(icfg.global(), 1);
        assert_eq!(icfg.entry_of("main"), Some(2));
        assert_eq!(icfg.exit_of("main"), Some(5));

        let intra = icfg.node(3).unwrap();
        assert_eq!(intra.kind, NodeKind::Intra);
        let loc = Location::parse(intra.loc.as_deref().unwrap());
        assert_eq!(loc, Location::new("src/main.c", 4, 2));
    }

    #[test]
    fn test_parse_flags_and_pairing() {
        let text = r#"
Node0x1 [kind=Global];
Node0x2 [kind=FunEntry,function="llvm.memcpy",intrinsic=true,uncalled=true];
Node0x3 [kind=FunCall,function="main",corres=Node0x4];
Node0x4 [kind=FunRet,function="main"];
Node0x3 -> Node0x4;
"#;
        let icfg = parse_icfg(text, Path::new("test.dot")).unwrap();
        let entry = icfg.node(2).unwrap();
        assert!(entry.is_intrinsic);
        assert!(entry.is_uncalled);
        assert!(!entry.is_extern);
        assert_eq!(icfg.ret_of_call(3), Some(4));
        assert_eq!(icfg.call_of_ret(4), Some(3));
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let text = "Node0x1 [kind=Global];\nwhat is this\n";
        let err = parse_icfg(text, Path::new("bad.dot")).unwrap_err();
        match err {
            IcfgError::MalformedLine { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let text = "Node0x1 [kind=Wobble];\n";
        assert!(matches!(
            parse_icfg(text, Path::new("bad.dot")),
            Err(IcfgError::UnknownKind { .. })
        ));
    }

    #[test]
    fn test_unknown_attrs_ignored() {
        let text = "Node0x1 [kind=Global,shape=box,color=red];\n";
        let icfg = parse_icfg(text, Path::new("test.dot")).unwrap();
        assert_eq!(icfg.len(), 1);
    }

    #[test]
    fn test_render_round_trip() {
        let text = r#"
Node0x1 [kind=Global];
Node0x2 [kind=FunEntry,function="f",loc="{ \"ln\": 1, \"fl\": \"f.c\" }"];
Node0x3 [kind=FunExit,function="f"];
Node0x1 -> Node0x2;
Node0x2 -> Node0x3;
"#;
        let icfg = parse_icfg(text, Path::new("a.dot")).unwrap();
        let rendered = render_icfg(&icfg);
        let again = parse_icfg(&rendered, Path::new("b.dot")).unwrap();
        assert_eq!(again.len(), icfg.len());
        assert_eq!(again.out_edges(2), icfg.out_edges(2));
        assert_eq!(
            again.node(2).unwrap().loc,
            icfg.node(2).unwrap().loc
        );
    }
}
