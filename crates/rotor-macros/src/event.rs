//! Event derive macro implementation (**parent-in-child** design).
//!
//! # Overview
//!
//! `#[derive(Event)]` generates:
//!
//! 1. `impl TypedEvent`: kind name, internal flag and the `KindSpec` schema
//! 2. `impl Deref[Mut]`: auto-generated when a parent field exists
//!
//! # Struct-level attributes `#[event(...)]`
//!
//! | Key | Example | Required | Description |
//! |-----|---------|----------|-------------|
//! | `name` | `"ObjectTapped"` | No | Kind name (default: struct name) |
//! | `internal` | `internal` | No | Marks the kind as internal |
//!
//! # Field-level attributes `#[event(...)]`
//!
//! | Key | Description |
//! |-----|-------------|
//! | `parent` | Marks this field as the parent kind (type is auto-detected) |
//!
//! Documentation is read from `///` comments. A missing struct doc comment is
//! not a compile error: the registry rejects the kind at declaration time
//! with `MissingDocumentation`, the same as for kinds declared at runtime.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Expr, ExprLit, Fields, Ident, Lit, Meta, Type,
    spanned::Spanned,
};

// ============================================================================
// Attribute structures
// ============================================================================

/// Struct-level `#[event(…)]` settings.
#[derive(Default)]
struct KindAttrs {
    name: Option<String>,
    internal: bool,
}

/// Per-field `#[event(…)]` markers.
#[derive(Default)]
struct FieldAttrs {
    is_parent: bool,
}

/// A declared (non-parent) field.
struct DeclaredField {
    name: String,
    doc: String,
}

// ============================================================================
// Entry point
// ============================================================================

pub fn derive_event(input: &DeriveInput) -> syn::Result<TokenStream> {
    let attrs = parse_struct_attrs(&input.attrs)?;
    let name = &input.ident;

    match &input.data {
        Data::Struct(data) => generate_struct_impl(name, &input.attrs, &attrs, &data.fields),
        Data::Enum(_) => Err(syn::Error::new(
            input.span(),
            "Event does not support enums. Use structs with a parent field instead.",
        )),
        Data::Union(_) => Err(syn::Error::new(
            input.span(),
            "Event cannot be derived for unions",
        )),
    }
}

// ============================================================================
// Attribute parsing
// ============================================================================

fn parse_struct_attrs(attrs: &[Attribute]) -> syn::Result<KindAttrs> {
    let mut result = KindAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("event") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                result.name = Some(meta.value()?.parse::<syn::LitStr>()?.value());
            } else if meta.path.is_ident("internal") {
                result.internal = true;
            } else {
                return Err(meta.error("unknown #[event] key; expected `name` or `internal`"));
            }
            Ok(())
        })?;
    }

    Ok(result)
}

fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("event") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("parent") {
                result.is_parent = true;
                Ok(())
            } else {
                Err(meta.error("unknown #[event] field key; expected `parent`"))
            }
        })?;
    }

    Ok(result)
}

/// Joins the `#[doc = "..."]` lines of an item into one trimmed string.
fn doc_string(attrs: &[Attribute]) -> String {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(nv) => match &nv.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(s), ..
                }) => Some(s.value().trim().to_string()),
                _ => None,
            },
            _ => None,
        })
        .collect();
    lines.join("\n").trim().to_string()
}

fn has_serde_flatten(attrs: &[Attribute]) -> bool {
    attrs.iter().any(|attr| {
        attr.path().is_ident("serde")
            && attr
                .meta
                .require_list()
                .map(|list| list.tokens.to_string().contains("flatten"))
                .unwrap_or(false)
    })
}

fn is_option(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|seg| seg.ident == "Option"),
        _ => false,
    }
}

// ============================================================================
// Code generation
// ============================================================================

fn generate_struct_impl(
    name: &Ident,
    struct_attrs: &[Attribute],
    attrs: &KindAttrs,
    fields: &Fields,
) -> syn::Result<TokenStream> {
    let Fields::Named(named) = fields else {
        return Err(syn::Error::new(
            name.span(),
            "Event can only be derived for structs with named fields",
        ));
    };

    let mut parent_field: Option<(Ident, Type)> = None;
    let mut declared: Vec<DeclaredField> = Vec::new();

    for f in &named.named {
        let Some(ident) = f.ident.as_ref() else {
            continue;
        };
        let fa = parse_field_attrs(&f.attrs)?;
        if fa.is_parent {
            if parent_field.is_some() {
                return Err(syn::Error::new(
                    f.span(),
                    "an event can have only one #[event(parent)] field",
                ));
            }
            if !has_serde_flatten(&f.attrs) {
                return Err(syn::Error::new(
                    f.span(),
                    "the #[event(parent)] field must also be marked #[serde(flatten)]",
                ));
            }
            parent_field = Some((ident.clone(), f.ty.clone()));
            continue;
        }
        if !is_option(&f.ty) {
            return Err(syn::Error::new(
                f.ty.span(),
                "event fields must be Option<T> so that unset fields are absent",
            ));
        }
        declared.push(DeclaredField {
            name: ident.to_string().trim_start_matches("r#").to_string(),
            doc: doc_string(&f.attrs),
        });
    }

    let kind_name = attrs.name.clone().unwrap_or_else(|| name.to_string());
    let kind_name_lit = syn::LitStr::new(&kind_name, name.span());
    let doc_lit = syn::LitStr::new(&doc_string(struct_attrs), name.span());
    let internal = attrs.internal;

    let field_calls = declared.iter().map(|f| {
        let field_name = syn::LitStr::new(&f.name, name.span());
        let field_doc = syn::LitStr::new(&f.doc, name.span());
        quote! { .field(#field_name, #field_doc) }
    });

    let parent_call = match &parent_field {
        Some((_, pf_ty)) => quote! {
            .parent(<#pf_ty as ::rotor_core::event::TypedEvent>::NAME)
        },
        None => quote! {},
    };

    let event_impl = quote! {
        impl ::rotor_core::event::TypedEvent for #name {
            const NAME: &'static str = #kind_name_lit;
            const INTERNAL: bool = #internal;

            fn schema() -> ::rotor_core::event::KindSpec {
                ::rotor_core::event::KindSpec::new(Self::NAME)
                    .doc(#doc_lit)
                    .internal(Self::INTERNAL)
                    #parent_call
                    #(#field_calls)*
            }
        }
    };

    // ── Deref / DerefMut ──
    let deref_impls = match parent_field {
        Some((pf_ident, pf_ty)) => quote! {
            impl ::std::ops::Deref for #name {
                type Target = #pf_ty;
                #[inline]
                fn deref(&self) -> &Self::Target {
                    &self.#pf_ident
                }
            }

            impl ::std::ops::DerefMut for #name {
                #[inline]
                fn deref_mut(&mut self) -> &mut Self::Target {
                    &mut self.#pf_ident
                }
            }
        },
        None => quote! {},
    };

    Ok(quote! {
        #event_impl
        #deref_impls
    })
}
