//! Requester identity and the accessible-document policy.
//!
//! | Role | Sees | May upload |
//! |------|------|------------|
//! | `admin` | every document | yes |
//! | `auditor` | every document | no |
//! | `doctor` | own + shareable | yes |
//! | `researcher` | own + shareable | yes |

use std::collections::HashSet;

use crate::models::DocumentAccess;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Doctor,
    Researcher,
    Auditor,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Doctor, Role::Researcher, Role::Auditor, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Doctor => "doctor",
            Role::Researcher => "researcher",
            Role::Auditor => "auditor",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == s)
    }

    /// Administrative or compliance-audit capability.
    pub fn has_elevated_visibility(&self) -> bool {
        matches!(self, Role::Admin | Role::Auditor)
    }

    pub fn can_upload(&self) -> bool {
        matches!(self, Role::Doctor | Role::Researcher | Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated caller, as reported by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: String,
    pub role: Role,
}

impl Requester {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// The documents a requester may retrieve from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    All,
    /// Exactly these document ids. Empty means nothing is retrievable.
    Only(HashSet<String>),
}

impl AccessScope {
    /// The restriction to hand to [`find_similar`](crate::store::VectorIndex::find_similar).
    pub fn as_filter(&self) -> Option<&HashSet<String>> {
        match self {
            AccessScope::All => None,
            AccessScope::Only(ids) => Some(ids),
        }
    }

    pub fn permits(&self, document_id: &str) -> bool {
        match self {
            AccessScope::All => true,
            AccessScope::Only(ids) => ids.contains(document_id),
        }
    }
}

/// Compute the access scope of `requester` over the given documents.
pub fn accessible_document_ids(
    requester: &Requester,
    documents: &[DocumentAccess],
) -> AccessScope {
    if requester.role.has_elevated_visibility() {
        return AccessScope::All;
    }
    AccessScope::Only(
        documents
            .iter()
            .filter(|d| d.shareable || d.owner_id == requester.id)
            .map(|d| d.document_id.clone())
            .collect(),
    )
}
