use serde::{Serialize, de::DeserializeOwned};

use crate::store::DocRef;

/// A struct stored as one document of a collection.
///
/// Implemented by `#[derive(Document)]`.
pub trait Document: Serialize + DeserializeOwned {
    /// Collection the document lives in (`users`, `posts`).
    const COLLECTION: &'static str;
    /// JSON field carrying the document id.
    const ID_FIELD: &'static str;

    fn id(&self) -> &str;

    fn doc_ref(&self) -> DocRef {
        DocRef::new(Self::COLLECTION, self.id())
    }

    /// Reference to the document `id` of this type's collection.
    fn reference(id: impl Into<String>) -> DocRef {
        DocRef::new(Self::COLLECTION, id)
    }
}

/// An entry of a list field whose identity is a single key.
///
/// Implemented by `#[derive(Member)]`. Two entries with the same key are the same member,
/// whatever the rest of their content.
pub trait Member: Serialize {
    /// JSON field carrying the key inside a stored entry.
    const KEY_FIELD: &'static str;

    fn member_key(&self) -> &str;
}
