//! RDF view of the catalog
//!
//! [`graph_from_rows`] maps the tag-joined track stream onto a fixed ontology
//! ([`ontology`]); the graph is then serialized as Turtle or JSON-LD.

pub mod jsonld;
pub mod ontology;
pub mod turtle;

use crate::db::models::TagRow;
use crate::{Error, Result};
use reqwest::Url;

/// Object of a triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Iri(String),
    Literal {
        value: String,
        datatype: Option<String>,
    },
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: &str) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: Some(datatype.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

/// Ordered list of triples
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    pub triples: Vec<Triple>,
}

impl Graph {
    pub fn push(&mut self, subject: &str, predicate: &str, object: Term) {
        self.triples.push(Triple {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object,
        });
    }

    /// Subjects in first-seen order, each with its triples
    pub fn by_subject(&self) -> Vec<(&str, Vec<&Triple>)> {
        let mut groups: Vec<(&str, Vec<&Triple>)> = Vec::new();
        for triple in &self.triples {
            match groups.iter_mut().find(|(s, _)| *s == triple.subject) {
                Some((_, triples)) => triples.push(triple),
                None => groups.push((&triple.subject, vec![triple])),
            }
        }
        groups
    }
}

/// Where the catalog's own URIs live
#[derive(Debug, Clone)]
pub struct RdfContext {
    media_manager: String,
    search: Url,
}

impl RdfContext {
    /// `media_manager` is the canonical origin, without a trailing slash
    pub fn new(media_manager: &str) -> Result<Self> {
        let media_manager = media_manager.trim_end_matches('/').to_string();
        let search = Url::parse(&format!("{}/search", media_manager))
            .map_err(|e| Error::Config(format!("invalid media manager url: {}", e)))?;
        Ok(Self {
            media_manager,
            search,
        })
    }

    pub fn track_uri(&self, id: i64) -> String {
        format!("{}/tracks/{}", self.media_manager, id)
    }

    /// Term in the catalog's own ontology
    pub fn ontology(&self, term: &str) -> String {
        format!("{}/ontology#{}", self.media_manager, term)
    }

    pub fn ontology_namespace(&self) -> String {
        format!("{}/ontology#", self.media_manager)
    }

    /// Search page listing tracks with `predicate = value`
    pub fn search_uri(&self, predicate: &str, value: &str) -> String {
        let mut url = self.search.clone();
        url.query_pairs_mut()
            .append_pair(&format!("p.{}", predicate), value);
        url.to_string()
    }
}

/// Serialization format for an RDF response or export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfFormat {
    Turtle,
    JsonLd,
}

impl RdfFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            RdfFormat::Turtle => "text/turtle; charset=utf-8",
            RdfFormat::JsonLd => "application/ld+json",
        }
    }

    /// Format implied by a file extension; unknown extensions are Turtle
    pub fn from_extension(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonld") | Some("json") => RdfFormat::JsonLd,
            _ => RdfFormat::Turtle,
        }
    }

    /// Format for a media type, if it is an RDF type we serialize
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "text/turtle" | "application/x-turtle" => Some(RdfFormat::Turtle),
            "application/ld+json" => Some(RdfFormat::JsonLd),
            _ => None,
        }
    }

    pub fn render(&self, graph: &Graph, ctx: &RdfContext) -> String {
        match self {
            RdfFormat::Turtle => turtle::to_turtle(graph, ctx),
            RdfFormat::JsonLd => jsonld::to_jsonld(graph, ctx),
        }
    }
}

/// Build the graph for a tag-joined row stream ordered by track id
pub fn graph_from_rows(rows: &[TagRow], ctx: &RdfContext) -> Graph {
    let mut graph = Graph::default();
    ontology::header_triples(&mut graph, ctx);

    let mut current: Option<i64> = None;
    for row in rows {
        let subject = ctx.track_uri(row.track_id);
        if current != Some(row.track_id) {
            ontology::track_triples(&mut graph, ctx, &subject, row);
            current = Some(row.track_id);
        }
        if let (Some(predicate), Some(value)) = (&row.predicate, &row.value) {
            ontology::tag_triples(&mut graph, ctx, &subject, predicate, value);
        }
    }
    graph
}
