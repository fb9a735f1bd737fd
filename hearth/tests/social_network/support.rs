pub(crate) use hearth::{
    DocumentStoreExt, MemoryStore, StoreError, ToggleOutcome,
    model::{Post, User},
    social::Social,
};

/// A store holding `ann` and `bob` and one post by `ann`.
pub(crate) struct Network {
    pub(crate) social: Social<MemoryStore>,
    pub(crate) ann: User,
    pub(crate) bob: User,
    pub(crate) post: Post,
}

impl Network {
    pub(crate) async fn seed() -> Self {
        let store = MemoryStore::new();
        let ann = User::new("ann", "Ann");
        let bob = User::new("bob", "Bob");
        store.create_document(&ann).await.expect("create ann");
        store.create_document(&bob).await.expect("create bob");
        let social = Social::new(store);
        let post = social
            .create_post(&ann.summary(), "first post", Vec::new())
            .await
            .expect("create post");
        Self { social, ann, bob, post }
    }

    /// Another client over the same backend.
    pub(crate) fn second_client(&self) -> Social<MemoryStore> {
        Social::new(self.social.store().clone())
    }

    pub(crate) async fn post(&self) -> Post {
        self.social
            .store()
            .require_document(&self.post.id)
            .await
            .expect("post exists")
    }

    pub(crate) async fn user(&self, uid: &str) -> User {
        self.social.store().require_document(uid).await.expect("user exists")
    }
}
