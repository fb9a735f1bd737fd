use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod keyed;

use keyed::{KeyedKind, ParsedKeyed};

/// Derives `hearth::Document` for a struct stored as one document of a collection.
///
/// ```text
/// #[derive(Document, Serialize, Deserialize)]
/// #[document(collection = "posts")]
/// struct Post {
///     #[document(id)]
///     id: String,
///     ...
/// }
/// ```
#[proc_macro_derive(Document, attributes(document))]
pub fn derive_document(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match ParsedKeyed::from_input(&input, KeyedKind::Document) {
        Ok(parsed) => parsed.emit().into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derives `hearth::Member` for an entry of a list field whose identity is one key field.
///
/// ```text
/// #[derive(Member, Serialize, Deserialize)]
/// struct Like {
///     #[member(key)]
///     uid: String,
///     ...
/// }
/// ```
#[proc_macro_derive(Member, attributes(member))]
pub fn derive_member(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match ParsedKeyed::from_input(&input, KeyedKind::Member) {
        Ok(parsed) => parsed.emit().into(),
        Err(err) => err.to_compile_error().into(),
    }
}
