extern crate proc_macro;

#[macro_use]
extern crate syn;
#[macro_use]
extern crate quote;

use proc_macro2::{Span, TokenStream};
use syn::{DeriveInput, Ident, Lit, Meta, NestedMeta};

/// Implements `phecs::Component` for a type.
///
/// The storage kind defaults to per-entity and can be chosen with
/// `#[component(storage = "per_entity" | "static" | "shared")]`.
#[proc_macro_derive(Component, attributes(component))]
pub fn derive_component(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input: DeriveInput = parse_macro_input!(input as DeriveInput);

    match storage_kind(&input) {
        Ok(kind) => expand(&input, kind).into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput, kind: Ident) -> TokenStream {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    quote! {
        impl #impl_generics ::phecs::Component for #name #ty_generics #where_clause {
            const STORAGE: ::phecs::StorageKind = ::phecs::StorageKind::#kind;
        }
    }
}

/// Finds the `StorageKind` variant named by a `#[component(storage = "...")]`
/// attribute, falling back to `PerEntity`.
fn storage_kind(input: &DeriveInput) -> syn::Result<Ident> {
    let mut kind = Ident::new("PerEntity", Span::call_site());

    for attr in input.attrs.iter().filter(|attr| attr.path.is_ident("component")) {
        let list = match attr.parse_meta()? {
            Meta::List(list) => list,
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "expected #[component(storage = \"...\")]",
                ))
            }
        };

        for nested in list.nested {
            let pair = match nested {
                NestedMeta::Meta(Meta::NameValue(pair)) if pair.path.is_ident("storage") => pair,
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "unknown component option; expected `storage`",
                    ))
                }
            };

            let value = match &pair.lit {
                Lit::Str(value) => value,
                other => return Err(syn::Error::new_spanned(other, "expected a string")),
            };

            let variant = match value.value().as_str() {
                "per_entity" => "PerEntity",
                "static" => "Static",
                "shared" => "Shared",
                _ => {
                    return Err(syn::Error::new_spanned(
                        value,
                        "storage must be one of \"per_entity\", \"static\" or \"shared\"",
                    ))
                }
            };
            kind = Ident::new(variant, value.span());
        }
    }

    Ok(kind)
}
