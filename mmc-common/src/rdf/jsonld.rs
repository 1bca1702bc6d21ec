//! JSON-LD serializer
//!
//! Emits expanded IRIs as keys under a `@context` carrying the same prefixes
//! as the Turtle output, one `@graph` node per subject.

use super::ontology::{PREFIXES, RDF_TYPE};
use super::{Graph, RdfContext, Term};
use serde_json::{json, Map, Value};

fn object(term: &Term) -> Value {
    match term {
        Term::Iri(iri) => json!({ "@id": iri }),
        Term::Literal {
            value,
            datatype: Some(datatype),
        } => json!({ "@value": value, "@type": datatype }),
        Term::Literal {
            value,
            datatype: None,
        } => json!({ "@value": value }),
    }
}

pub fn to_jsonld_value(graph: &Graph, ctx: &RdfContext) -> Value {
    let mut context = Map::new();
    context.insert("@vocab".to_string(), json!(ctx.ontology_namespace()));
    for (prefix, namespace) in PREFIXES {
        context.insert(prefix.to_string(), json!(namespace));
    }

    let nodes: Vec<Value> = graph
        .by_subject()
        .into_iter()
        .map(|(subject, triples)| {
            let mut node = Map::new();
            node.insert("@id".to_string(), json!(subject));
            for triple in triples {
                if triple.predicate == RDF_TYPE {
                    if let Term::Iri(class) = &triple.object {
                        push_value(&mut node, "@type", json!(class));
                        continue;
                    }
                }
                push_value(&mut node, &triple.predicate, object(&triple.object));
            }
            Value::Object(node)
        })
        .collect();

    json!({ "@context": context, "@graph": nodes })
}

fn push_value(node: &mut Map<String, Value>, key: &str, value: Value) {
    match node.get_mut(key) {
        Some(Value::Array(values)) => values.push(value),
        _ => {
            node.insert(key.to_string(), Value::Array(vec![value]));
        }
    }
}

pub fn to_jsonld(graph: &Graph, ctx: &RdfContext) -> String {
    to_jsonld_value(graph, ctx).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::graph_from_rows;
    use crate::rdf::tests::row;

    #[test]
    fn test_graph_nodes() {
        let ctx = RdfContext::new("http://mm.example").unwrap();
        let rows = vec![
            row(1, Some("composer"), Some("Lennon, McCartney")),
            row(2, None, None),
        ];
        let doc = to_jsonld_value(&graph_from_rows(&rows, &ctx), &ctx);

        assert_eq!(doc["@context"]["mo"], "http://purl.org/ontology/mo/");
        let graph = doc["@graph"].as_array().unwrap();
        // ontology header node plus two tracks
        assert_eq!(graph.len(), 3);

        let track = &graph[1];
        assert_eq!(track["@id"], "http://mm.example/tracks/1");
        assert_eq!(track["@type"][0], "http://purl.org/ontology/mo/Track");
        let composers = track["http://purl.org/ontology/mo/composer"].as_array().unwrap();
        assert_eq!(composers.len(), 2);
        assert_eq!(graph[2]["@id"], "http://mm.example/tracks/2");
    }
}
