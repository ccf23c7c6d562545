//! Declaration scanner for GLSL ES sources.
//!
//! The software device does not execute GLSL; it only needs the interface a
//! real driver would report after linking: which attributes and uniforms a
//! program declares, in declaration order.

use crate::gpu::api::{ActiveVariable, VariableKind};

const PRECISION_QUALIFIERS: [&str; 3] = ["lowp", "mediump", "highp"];

/// Interface of one linked program.
#[derive(Debug, Default)]
pub(crate) struct ProgramInterface {
    pub(crate) attributes: Vec<ActiveVariable>,
    pub(crate) uniforms: Vec<ActiveVariable>,
}

/// Reject sources no driver would accept.
pub(crate) fn check_stage(source: &str) -> Result<(), String> {
    let code = strip_comments(source);
    if code.trim().is_empty() {
        return Err("empty shader source".to_owned());
    }
    if !code.contains("void main") {
        return Err("missing entry point `void main`".to_owned());
    }
    Ok(())
}

/// Collect the attributes of the vertex stage and the uniforms of both
/// stages. A uniform declared in both stages is reported once.
pub(crate) fn scan_program(vertex: &str, fragment: &str) -> ProgramInterface {
    let mut interface = ProgramInterface::default();

    for (qualifier, kind, name) in declarations(vertex) {
        match qualifier {
            "attribute" | "in" => push_unique(&mut interface.attributes, name, kind),
            "uniform" => push_unique(&mut interface.uniforms, name, kind),
            _ => {}
        }
    }
    for (qualifier, kind, name) in declarations(fragment) {
        if qualifier == "uniform" {
            push_unique(&mut interface.uniforms, name, kind);
        }
    }

    interface
}

fn push_unique(list: &mut Vec<ActiveVariable>, name: &str, kind: VariableKind) {
    if list.iter().any(|v| v.name == name) {
        return;
    }
    list.push(ActiveVariable {
        name: name.to_owned(),
        location: list.len() as u32,
        kind,
    });
}

/// `(qualifier, type, name)` triples of global declarations.
fn declarations(source: &str) -> Vec<(&'static str, VariableKind, &str)> {
    let mut out = Vec::new();
    for statement in source.lines().map(|line| {
        line.split("//").next().unwrap_or_default().trim()
    }) {
        let Some(statement) = statement.strip_suffix(';') else {
            continue;
        };
        let mut tokens = statement
            .split_whitespace()
            .filter(|t| !PRECISION_QUALIFIERS.contains(t));
        let qualifier = match tokens.next() {
            Some("attribute") => "attribute",
            Some("in") => "in",
            Some("uniform") => "uniform",
            _ => continue,
        };
        let (Some(kind), Some(name)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        let name = name.split('[').next().unwrap_or(name);
        out.push((qualifier, VariableKind::from_glsl(kind), name));
    }
    out
}

fn strip_comments(source: &str) -> String {
    let mut code = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("/*") {
        code.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        rest = after.find("*/").map_or("", |end| &after[end + 2..]);
    }
    code.push_str(rest);
    code.lines()
        .map(|line| line.split("//").next().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
}
