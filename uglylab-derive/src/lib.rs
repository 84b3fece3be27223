//! Derive macros for UglyLab.
//!
//! This crate provides [`Agent`], which implements `uglylab::Agent` for a
//! struct with a position field.
//!
//! # Usage
//!
//! The macro is re-exported from the main `uglylab` crate. You don't need to
//! add this crate directly:
//!
//! ```ignore
//! use uglylab::prelude::*;
//!
//! #[derive(Agent)]
//! #[agent(species = 7)]
//! struct Ant {
//!     position: Vec3,
//!     carrying: bool,
//! }
//! ```
//!
//! # The Position Field
//!
//! The position is read from the field marked `#[position]`, or from the
//! field named `position` when none is marked. Its type is either `Vec3`
//! (always positioned) or `Option<Vec3>` (left out of snapshots while
//! `None`).

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Expr, Fields, Type};

/// Derive macro for simulated agents.
///
/// # Attributes
///
/// - `#[agent(species = N)]` on the struct (required): the species
///   identifier published with every agent of this type. Any constant `i32`
///   expression is accepted.
/// - `#[position]` on a field (optional): use this field as the position
///   instead of the one named `position`.
///
/// # Example
///
/// ```ignore
/// #[derive(Agent)]
/// #[agent(species = 2)]
/// struct Seed {
///     #[position]
///     at: Option<Vec3>,
///     energy: f32,
/// }
/// ```
///
/// # Panics
///
/// The macro panics at compile time if:
/// - Applied to anything but a struct with named fields
/// - No position field can be found, or more than one is marked
#[proc_macro_derive(Agent, attributes(agent, position))]
pub fn derive_agent(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => panic!("Agent derive only supports structs with named fields"),
        },
        _ => panic!("Agent derive only supports structs"),
    };

    let species = match species_id(&input) {
        Ok(species) => species,
        Err(err) => return err.to_compile_error().into(),
    };

    // An explicitly marked field wins over one named `position`
    let marked: Vec<_> = fields
        .iter()
        .filter(|f| f.attrs.iter().any(|a| a.path().is_ident("position")))
        .collect();
    if marked.len() > 1 {
        panic!("Agent derive: only one field may be marked #[position]");
    }
    let position_field = marked
        .first()
        .copied()
        .or_else(|| {
            fields
                .iter()
                .find(|f| f.ident.as_ref().is_some_and(|ident| ident == "position"))
        })
        .unwrap_or_else(|| {
            panic!(
                "Agent derive: '{}' needs a `position` field or a field marked #[position]",
                name
            )
        });

    let field_name = &position_field.ident;
    let position = if is_option(&position_field.ty) {
        quote! { self.#field_name }
    } else {
        quote! { Some(self.#field_name) }
    };

    let expanded = quote! {
        impl #impl_generics ::uglylab::Agent for #name #ty_generics #where_clause {
            const SPECIES_ID: i32 = #species;

            fn position(&self) -> Option<::uglylab::Vec3> {
                #position
            }
        }
    };

    TokenStream::from(expanded)
}

/// Parse `#[agent(species = ...)]`.
fn species_id(input: &DeriveInput) -> syn::Result<Expr> {
    let mut species = None;
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("agent")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("species") {
                species = Some(meta.value()?.parse::<Expr>()?);
                Ok(())
            } else {
                Err(meta.error("unknown agent attribute, expected `species`"))
            }
        })?;
    }
    species.ok_or_else(|| {
        syn::Error::new_spanned(
            &input.ident,
            "Agent derive requires #[agent(species = N)] on the struct",
        )
    })
}

fn is_option(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Option"),
        _ => false,
    }
}
