//! Shared parsing for the `Document` and `Member` derives.
//!
//! Both derives point at exactly one `String` field that identifies a value: the document id
//! for `Document`, the list-membership key for `Member`. The wire name of that field honours
//! `#[serde(rename = "...")]` and container-level `#[serde(rename_all = "...")]`, because the
//! generated constant is used to look the key up inside stored JSON.

use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Error, Expr, Fields, Ident, LitStr, Result, Token, Type, meta::ParseNestedMeta,
    parenthesized, spanned::Spanned,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyedKind {
    Document,
    Member,
}

impl KeyedKind {
    fn attr_name(self) -> &'static str {
        match self {
            KeyedKind::Document => "document",
            KeyedKind::Member => "member",
        }
    }

    fn key_flag(self) -> &'static str {
        match self {
            KeyedKind::Document => "id",
            KeyedKind::Member => "key",
        }
    }
}

pub struct ParsedKeyed {
    kind: KeyedKind,
    ident: Ident,
    generics: syn::Generics,
    collection: Option<String>,
    key_field: Ident,
    key_wire_name: String,
}

impl ParsedKeyed {
    pub fn from_input(input: &DeriveInput, kind: KeyedKind) -> Result<Self> {
        let Data::Struct(data) = &input.data else {
            return Err(Error::new(
                input.ident.span(),
                format!("#[derive] with #[{}] only supports structs", kind.attr_name()),
            ));
        };
        let Fields::Named(fields) = &data.fields else {
            return Err(Error::new(input.ident.span(), "expected a struct with named fields"));
        };

        let collection = parse_container_attrs(&input.attrs, kind)?;
        if kind == KeyedKind::Document && collection.is_none() {
            return Err(Error::new(
                input.ident.span(),
                "missing #[document(collection = \"...\")] on the struct",
            ));
        }
        let rename_all = parse_serde_rename_all(&input.attrs)?;

        let mut key: Option<(Ident, String)> = None;
        for field in &fields.named {
            let Some(field_ident) = field.ident.clone() else {
                continue;
            };
            if !has_key_flag(&field.attrs, kind)? {
                continue;
            }
            if key.is_some() {
                return Err(Error::new(
                    field.span(),
                    format!("only one field may carry #[{}({})]", kind.attr_name(), kind.key_flag()),
                ));
            }
            if !is_string_type(&field.ty) {
                return Err(Error::new(
                    field.ty.span(),
                    format!("#[{}({})] field must be a String", kind.attr_name(), kind.key_flag()),
                ));
            }
            let wire_name = match parse_serde_rename(&field.attrs)? {
                Some(explicit) => explicit,
                None => apply_rename_all(&field_ident.to_string(), rename_all.as_deref()),
            };
            key = Some((field_ident, wire_name));
        }

        let Some((key_field, key_wire_name)) = key else {
            return Err(Error::new(
                input.ident.span(),
                format!("missing a field marked #[{}({})]", kind.attr_name(), kind.key_flag()),
            ));
        };

        Ok(Self {
            kind,
            ident: input.ident.clone(),
            generics: input.generics.clone(),
            collection,
            key_field,
            key_wire_name,
        })
    }

    pub fn emit(&self) -> TokenStream2 {
        let ident = &self.ident;
        let (impl_generics, ty_generics, where_clause) = self.generics.split_for_impl();
        let key_field = &self.key_field;
        let key_wire_name = &self.key_wire_name;

        match self.kind {
            KeyedKind::Document => {
                let collection = self.collection.clone().unwrap_or_default();
                quote! {
                    impl #impl_generics ::hearth::Document for #ident #ty_generics #where_clause {
                        const COLLECTION: &'static str = #collection;
                        const ID_FIELD: &'static str = #key_wire_name;

                        fn id(&self) -> &str {
                            &self.#key_field
                        }
                    }
                }
            }
            KeyedKind::Member => quote! {
                impl #impl_generics ::hearth::Member for #ident #ty_generics #where_clause {
                    const KEY_FIELD: &'static str = #key_wire_name;

                    fn member_key(&self) -> &str {
                        &self.#key_field
                    }
                }
            },
        }
    }
}

fn parse_container_attrs(attrs: &[Attribute], kind: KeyedKind) -> Result<Option<String>> {
    let mut collection = None;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident(kind.attr_name())) {
        attr.parse_nested_meta(|meta| {
            if kind == KeyedKind::Document && meta.path.is_ident("collection") {
                let value: LitStr = meta.value()?.parse()?;
                if value.value().trim().is_empty() {
                    return Err(meta.error("collection name must not be empty"));
                }
                collection = Some(value.value());
                Ok(())
            } else {
                Err(meta.error(format!("unknown #[{}] container attribute", kind.attr_name())))
            }
        })?;
    }
    Ok(collection)
}

fn has_key_flag(attrs: &[Attribute], kind: KeyedKind) -> Result<bool> {
    let mut flagged = false;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident(kind.attr_name())) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(kind.key_flag()) {
                flagged = true;
                Ok(())
            } else {
                Err(meta.error(format!("unknown #[{}] field attribute", kind.attr_name())))
            }
        })?;
    }
    Ok(flagged)
}

fn parse_serde_rename_all(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut rename_all = None;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") && meta.input.peek(Token![=]) {
                let value: LitStr = meta.value()?.parse()?;
                rename_all = Some(value.value());
                Ok(())
            } else {
                skip_meta_value(&meta)
            }
        })?;
    }
    Ok(rename_all)
}

fn parse_serde_rename(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut rename = None;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") && meta.input.peek(Token![=]) {
                let value: LitStr = meta.value()?.parse()?;
                rename = Some(value.value());
                Ok(())
            } else {
                skip_meta_value(&meta)
            }
        })?;
    }
    Ok(rename)
}

/// Consumes whatever follows a serde meta item we do not interpret (`= expr` or `( ... )`).
fn skip_meta_value(meta: &ParseNestedMeta<'_>) -> Result<()> {
    if meta.input.peek(Token![=]) {
        let _: Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        let _content;
        parenthesized!(_content in meta.input);
    }
    Ok(())
}

fn is_string_type(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident == "String" && segment.arguments.is_empty())
            .unwrap_or(false),
        _ => false,
    }
}

fn apply_rename_all(field: &str, rule: Option<&str>) -> String {
    match rule {
        Some("camelCase") => {
            let pascal = to_pascal_case(field);
            let mut chars = pascal.chars();
            match chars.next() {
                Some(first) => first.to_lowercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        Some("PascalCase") => to_pascal_case(field),
        Some("lowercase") => field.to_lowercase(),
        Some("UPPERCASE") => field.to_uppercase(),
        Some("SCREAMING_SNAKE_CASE") => field.to_uppercase(),
        Some("kebab-case") => field.replace('_', "-"),
        Some("SCREAMING-KEBAB-CASE") => field.replace('_', "-").to_uppercase(),
        _ => field.to_string(),
    }
}

fn to_pascal_case(field: &str) -> String {
    field
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_matches_serde() {
        assert_eq!(apply_rename_all("display_name", Some("camelCase")), "displayName");
        assert_eq!(apply_rename_all("uid", Some("camelCase")), "uid");
        assert_eq!(apply_rename_all("post_id", None), "post_id");
        assert_eq!(apply_rename_all("post_id", Some("kebab-case")), "post-id");
    }

    #[test]
    fn document_requires_collection() {
        let input: DeriveInput = syn::parse_quote! {
            struct Post {
                #[document(id)]
                id: String,
            }
        };
        assert!(ParsedKeyed::from_input(&input, KeyedKind::Document).is_err());
    }

    #[test]
    fn member_key_honours_serde_rename() {
        let input: DeriveInput = syn::parse_quote! {
            #[serde(rename_all = "camelCase", deny_unknown_fields)]
            struct Like {
                #[member(key)]
                #[serde(rename = "UID", default)]
                user_id: String,
                display_name: String,
            }
        };
        let parsed = ParsedKeyed::from_input(&input, KeyedKind::Member).expect("valid member");
        assert_eq!(parsed.key_wire_name, "UID");
    }

    #[test]
    fn rejects_non_string_key() {
        let input: DeriveInput = syn::parse_quote! {
            struct Comment {
                #[member(key)]
                id: u64,
            }
        };
        assert!(ParsedKeyed::from_input(&input, KeyedKind::Member).is_err());
    }
}
