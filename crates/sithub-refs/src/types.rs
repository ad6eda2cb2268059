//! Core reference types.

use std::fmt;

use serde::{Deserialize, Serialize};
use sithub_types::ObjectId;

use crate::error::{RefError, RefResult};

const SYMBOLIC_PREFIX: &str = "ref: ";

/// What a named reference points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefTarget {
    /// Points directly at an object (normally a commit).
    Direct(ObjectId),
    /// Points at another reference by full name, e.g. HEAD -> refs/heads/main.
    Symbolic(String),
}

impl RefTarget {
    pub fn is_symbolic(&self) -> bool {
        matches!(self, Self::Symbolic(_))
    }

    pub fn as_direct(&self) -> Option<&ObjectId> {
        match self {
            Self::Direct(id) => Some(id),
            Self::Symbolic(_) => None,
        }
    }

    pub fn as_symbolic(&self) -> Option<&str> {
        match self {
            Self::Symbolic(name) => Some(name),
            Self::Direct(_) => None,
        }
    }

    /// Text form stored in ref files: `ref: <name>` or the hex id.
    pub fn encode(&self) -> String {
        match self {
            Self::Direct(id) => id.to_hex(),
            Self::Symbolic(name) => format!("{SYMBOLIC_PREFIX}{name}"),
        }
    }

    /// Parse the contents of the ref file for `name`.
    pub fn decode(name: &str, text: &str) -> RefResult<Self> {
        let text = text.trim_end_matches(['\n', '\r']);
        if let Some(target) = text.strip_prefix(SYMBOLIC_PREFIX) {
            return Ok(Self::Symbolic(target.to_string()));
        }
        ObjectId::from_hex(text)
            .map(Self::Direct)
            .map_err(|e| RefError::Corrupt {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }
}

impl fmt::Display for RefTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(id) => write!(f, "{}", id.short_hex()),
            Self::Symbolic(name) => write!(f, "-> {name}"),
        }
    }
}

impl From<ObjectId> for RefTarget {
    fn from(id: ObjectId) -> Self {
        Self::Direct(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_text_forms() {
        let id = ObjectId::from_bytes(b"commit");
        let direct = RefTarget::Direct(id);
        assert_eq!(direct.encode(), id.to_hex());
        assert_eq!(
            RefTarget::decode("refs/heads/main", &format!("{}\n", direct.encode())).unwrap(),
            direct
        );

        let sym = RefTarget::Symbolic("refs/heads/main".into());
        assert_eq!(sym.encode(), "ref: refs/heads/main");
        assert_eq!(RefTarget::decode("HEAD", "ref: refs/heads/main\n").unwrap(), sym);
        assert_eq!(sym.as_symbolic(), Some("refs/heads/main"));
        assert!(sym.as_direct().is_none());
    }

    #[test]
    fn garbage_is_corrupt() {
        assert!(matches!(
            RefTarget::decode("refs/heads/x", "not a hash"),
            Err(RefError::Corrupt { .. })
        ));
    }
}
