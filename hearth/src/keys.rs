/// Redis key construction for the Redis document backend.
#[derive(Debug, Clone)]
pub struct KeyContext<'a> {
    pub prefix: &'a str,
}

impl<'a> KeyContext<'a> {
    pub fn new(prefix: &'a str) -> Self {
        Self { prefix }
    }

    pub fn document(&self, collection: &str, document_id: &str) -> String {
        format!("{}:docs:{}:{}", self.prefix, collection, document_id)
    }

    /// SCAN pattern matching every document of a collection.
    pub fn collection_pattern(&self, collection: &str) -> String {
        format!("{}:docs:{}:*", self.prefix, collection)
    }

    /// Pub/Sub channel on which writes to `collection` announce the touched document id.
    pub fn changes_channel(&self, collection: &str) -> String {
        format!("{}:changes:{}", self.prefix, collection)
    }

    /// Recovers the document id from a key produced by [`KeyContext::document`].
    pub fn document_id_from_key<'k>(&self, collection: &str, key: &'k str) -> Option<&'k str> {
        let head = format!("{}:docs:{}:", self.prefix, collection);
        key.strip_prefix(head.as_str()).filter(|id| !id.is_empty() && !id.contains(':'))
    }
}
