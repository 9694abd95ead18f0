use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a letter string is a real word or a pronounceable non-word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lexicality {
    Word,
    Pseudoword,
}

/// Canonical participant decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Word,
    Nonword,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown lexicality {0:?} (expected \"word\" or \"pseudoword\")")]
pub struct ParseLexicalityError(String);

impl Lexicality {
    pub const ALL: [Lexicality; 2] = [Lexicality::Word, Lexicality::Pseudoword];

    /// The decision a correct response gives for this lexicality.
    pub fn expected_decision(self) -> Decision {
        match self {
            Lexicality::Word => Decision::Word,
            Lexicality::Pseudoword => Decision::Nonword,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Lexicality::Word => "word",
            Lexicality::Pseudoword => "pseudoword",
        }
    }
}

impl fmt::Display for Lexicality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lexicality {
    type Err = ParseLexicalityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "word" => Ok(Lexicality::Word),
            "pseudoword" => Ok(Lexicality::Pseudoword),
            other => Err(ParseLexicalityError(other.to_string())),
        }
    }
}

impl Decision {
    /// Numeric code used by the sink and the exported table.
    pub fn code(self) -> u8 {
        match self {
            Decision::Word => 1,
            Decision::Nonword => 0,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Decision::Word),
            0 => Some(Decision::Nonword),
            _ => None,
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StimulusItem {
    pub text: String,
    pub lexicality: Lexicality,
}

impl StimulusItem {
    pub fn new(text: impl Into<String>, lexicality: Lexicality) -> Self {
        Self {
            text: text.into(),
            lexicality,
        }
    }

    pub fn word(text: impl Into<String>) -> Self {
        Self::new(text, Lexicality::Word)
    }

    pub fn pseudoword(text: impl Into<String>) -> Self {
        Self::new(text, Lexicality::Pseudoword)
    }
}

/// Mask matched to the stimulus length, one glyph per character.
pub fn mask_for(text: &str, glyph: char) -> String {
    std::iter::repeat_n(glyph, text.chars().count()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_decisions() {
        assert_eq!(Lexicality::Word.expected_decision(), Decision::Word);
        assert_eq!(Lexicality::Pseudoword.expected_decision(), Decision::Nonword);
    }

    #[test]
    fn mask_matches_length() {
        assert_eq!(mask_for("garden", '#'), "######");
        assert_eq!(mask_for("", '#'), "");
    }

    #[test]
    fn lexicality_parses_its_own_output() {
        for lex in Lexicality::ALL {
            assert_eq!(lex.to_string().parse::<Lexicality>().ok(), Some(lex));
        }
        assert!("nonword".parse::<Lexicality>().is_err());
    }

    #[test]
    fn decision_codes() {
        assert_eq!(Decision::Word.code(), 1);
        assert_eq!(Decision::from_code(0), Some(Decision::Nonword));
        assert_eq!(Decision::from_code(7), None);
    }
}
