//! Turtle serializer

use super::ontology::{PREFIXES, RDF_TYPE};
use super::{Graph, RdfContext, Term};

/// Escape a string for a double-quoted Turtle literal
pub fn escape_turtle(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

/// Percent-encode the characters an IRIREF may not contain
fn escape_iri(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c <= ' ' || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\') {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

fn is_simple_local(local: &str) -> bool {
    !local.is_empty()
        && !local.starts_with('-')
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Prefixed name when a declared prefix covers the IRI, `<iri>` otherwise
fn iri(value: &str, ctx: &RdfContext) -> String {
    if value == RDF_TYPE {
        return "a".to_string();
    }
    let own = ctx.ontology_namespace();
    if let Some(local) = value.strip_prefix(own.as_str()) {
        if is_simple_local(local) {
            return format!(":{}", local);
        }
    }
    for (prefix, namespace) in PREFIXES {
        if let Some(local) = value.strip_prefix(namespace) {
            if is_simple_local(local) {
                return format!("{}:{}", prefix, local);
            }
        }
    }
    format!("<{}>", escape_iri(value))
}

fn term(term: &Term, ctx: &RdfContext) -> String {
    match term {
        Term::Iri(value) => iri(value, ctx),
        Term::Literal { value, datatype } => match datatype {
            Some(datatype) => format!("\"{}\"^^{}", escape_turtle(value), iri(datatype, ctx)),
            None => format!("\"{}\"", escape_turtle(value)),
        },
    }
}

/// Serialize a graph, grouping triples by subject
pub fn to_turtle(graph: &Graph, ctx: &RdfContext) -> String {
    let mut out = String::new();
    out.push_str(&format!("@prefix : <{}> .\n", ctx.ontology_namespace()));
    for (prefix, namespace) in PREFIXES {
        out.push_str(&format!("@prefix {}: <{}> .\n", prefix, namespace));
    }

    for (subject, triples) in graph.by_subject() {
        out.push('\n');
        out.push_str(&iri(subject, ctx));
        for (i, triple) in triples.iter().enumerate() {
            let separator = if i == 0 { " " } else { " ;\n    " };
            out.push_str(separator);
            out.push_str(&iri(&triple.predicate, ctx));
            out.push(' ');
            out.push_str(&term(&triple.object, ctx));
        }
        out.push_str(" .\n");
    }
    out
}
