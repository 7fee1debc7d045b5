//! Named annotation modes.

use serde::Serialize;

/// A prebaked annotator pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mode {
    pub name: &'static str,
    pub annotators: &'static str,
    pub description: &'static str,
}

pub const MODES: &[Mode] = &[
    Mode {
        name: "ssplit",
        annotators: "tokenize, ssplit",
        description: "tokenization and sentence splitting (included in all subsequent ones)",
    },
    Mode {
        name: "pos",
        annotators: "tokenize, ssplit, pos, lemma",
        description: "POS (and lemmas)",
    },
    Mode {
        name: "ner",
        annotators: "tokenize, ssplit, pos, lemma, ner, entitymentions",
        description: "POS and NER (and lemmas)",
    },
    Mode {
        name: "parse",
        annotators: "tokenize, ssplit, pos, lemma, parse",
        description: "fairly basic parsing with POS, lemmas, trees, dependencies",
    },
    Mode {
        name: "nerparse",
        annotators: "tokenize, ssplit, pos, lemma, ner, entitymentions, parse",
        description: "parsing with NER, POS, lemmas, dependencies",
    },
    Mode {
        name: "coref",
        annotators: "tokenize, ssplit, pos, lemma, ner, entitymentions, parse, dcoref",
        description: "coreference, including constituent parsing",
    },
];

/// Look up a mode by name.
pub fn find_mode(name: &str) -> Option<&'static Mode> {
    MODES.iter().find(|mode| mode.name == name)
}
