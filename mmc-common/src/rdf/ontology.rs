//! Predicate → RDF mapping
//!
//! The table is part of the published contract: consumers parse the Turtle
//! export, so changing a mapping is a visible change. Some mappings simplify
//! the Music Ontology (composer hangs directly off the track rather than a
//! composition node; lyrics and rating are plain literals).

use super::{Graph, RdfContext, Term};
use crate::db::models::TagRow;

pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
pub const SKOS: &str = "http://www.w3.org/2004/02/skos/core#";
pub const FOAF: &str = "http://xmlns.com/foaf/0.1/";
pub const DC: &str = "http://purl.org/dc/terms/";
pub const MO: &str = "http://purl.org/ontology/mo/";
pub const SCHEMA: &str = "http://schema.org/";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

const MUSICBRAINZ: &str = "https://musicbrainz.org/";
const LEXVO: &str = "http://lexvo.org/id/iso639-1/";

/// Fixed prefixes, in the order they are declared
pub const PREFIXES: &[(&str, &str)] = &[
    ("rdf", RDF),
    ("rdfs", RDFS),
    ("xsd", XSD),
    ("skos", SKOS),
    ("foaf", FOAF),
    ("dc", DC),
    ("mo", MO),
    ("schema", SCHEMA),
];

/// How a tag value becomes the object of a triple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Object {
    Literal,
    Typed(&'static str),
    /// Link to the search page for this exact value
    Search,
    /// Comma-separated values, one search link each
    CsvSearch,
    /// Comma-separated ISO 639-1 codes
    Language,
    /// MusicBrainz entity of the given kind
    MusicBrainz(&'static str),
}

/// Where a predicate id points
enum Property {
    Vocab(&'static str, &'static str),
    Own(&'static str),
}

fn mapping(predicate: &str) -> Option<(Property, Object)> {
    use Object::*;
    use Property::*;

    let mapped = match predicate {
        "added" => (Own("dateAdded"), Typed("dateTime")),
        "title" => (Vocab(SKOS, "prefLabel"), Literal),
        "artist" => (Vocab(FOAF, "maker"), Search),
        "album" => (Vocab(DC, "isPartOf"), Search),
        "genre" => (Vocab(MO, "genre"), Search),
        "composer" => (Vocab(MO, "composer"), CsvSearch),
        "producer" => (Vocab(MO, "producer"), CsvSearch),
        "language" => (Vocab(DC, "language"), Language),
        "offence" => (Own("trigger"), CsvSearch),
        "mbid_artist" => (Vocab(DC, "creator"), MusicBrainz("artist")),
        "mbid_recording" => (Vocab(DC, "identifier"), MusicBrainz("recording")),
        "mbid_release" => (Vocab(DC, "isPartOf"), MusicBrainz("release")),
        "comment" => (Vocab(SCHEMA, "comment"), Literal),
        "lyrics" => (Vocab(MO, "lyrics"), Literal),
        "rating" => (Vocab(SCHEMA, "ratingValue"), Literal),
        "provenance" => (Vocab(DC, "source"), Search),
        "memory" => (Own("memory"), Literal),
        "soundtrack" => (Own("soundtrack"), CsvSearch),
        "theme_tune" => (Own("themeTune"), CsvSearch),
        "availability" => (Own("availability"), Literal),
        "about" => (Own("about"), CsvSearch),
        "mentions" => (Own("mentions"), CsvSearch),
        "year" => (Vocab(DC, "date"), Typed("gYear")),
        _ => return None,
    };
    Some(mapped)
}

/// Ontology statements emitted once per graph
pub fn header_triples(graph: &mut Graph, ctx: &RdfContext) {
    graph.push(
        &ctx.ontology("about"),
        &format!("{}subPropertyOf", RDFS),
        Term::iri(ctx.ontology("mentions")),
    );
}

/// Base facts about a track, independent of its tags
pub fn track_triples(graph: &mut Graph, ctx: &RdfContext, subject: &str, row: &TagRow) {
    graph.push(subject, RDF_TYPE, Term::iri(format!("{}Track", MO)));
    if row.duration > 0 {
        // mo:duration is in milliseconds
        graph.push(
            subject,
            &format!("{}duration", MO),
            Term::typed(
                row.duration.saturating_mul(1000).to_string(),
                &format!("{}integer", XSD),
            ),
        );
    }
    if !row.fingerprint.is_empty() {
        graph.push(
            subject,
            &ctx.ontology("fingerprint"),
            Term::literal(row.fingerprint.as_str()),
        );
    }
    if !row.url.is_empty() {
        graph.push(
            subject,
            &format!("{}available_as", MO),
            Term::iri(row.url.as_str()),
        );
    }
}

/// Triples for one tag
pub fn tag_triples(graph: &mut Graph, ctx: &RdfContext, subject: &str, predicate: &str, value: &str) {
    let Some((property, object)) = mapping(predicate) else {
        graph.push(subject, &ctx.ontology(predicate), Term::literal(value));
        return;
    };

    let property = match property {
        Property::Vocab(namespace, local) => format!("{}{}", namespace, local),
        Property::Own(local) => ctx.ontology(local),
    };

    match object {
        Object::Literal => graph.push(subject, &property, Term::literal(value)),
        Object::Typed(datatype) => graph.push(
            subject,
            &property,
            Term::typed(value, &format!("{}{}", XSD, datatype)),
        ),
        Object::Search => graph.push(
            subject,
            &property,
            Term::iri(ctx.search_uri(predicate, value)),
        ),
        Object::CsvSearch => {
            for part in split_csv(value) {
                graph.push(subject, &property, Term::iri(ctx.search_uri(predicate, part)));
            }
        }
        Object::Language => {
            for code in split_csv(value) {
                graph.push(
                    subject,
                    &property,
                    Term::iri(format!("{}{}", LEXVO, code.to_ascii_lowercase())),
                );
            }
        }
        Object::MusicBrainz(kind) => graph.push(
            subject,
            &property,
            Term::iri(format!("{}{}/{}", MUSICBRAINZ, kind, value.trim())),
        ),
    }
}

fn split_csv(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}
