//! Procedural macros for mring.
//!
//! This crate provides the `#[derive(RingRecord)]` macro which decomposes
//! a named-field struct into one ring buffer per field.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, parse_macro_input};

/// Derives the `Record` trait plus the three companion types a
/// struct-of-arrays ring needs.
///
/// For a struct `Sample { x: f64, y: f64 }` this emits:
/// - `SampleRings<H>` — one `Ring<field type, H>` per field
/// - `SampleSlice<'a>` — one `&'a [field type]` per field
/// - `SamplePushed` — one post-push element count per field
///
/// Every field type must be `Pod`. Sub-rings are named `"<base>-<field>"`.
///
/// # Example
/// ```ignore
/// use mring::RingRecord;
///
/// #[derive(Clone, Copy, RingRecord)]
/// pub struct Sample {
///     pub x: f64,
///     pub y: f64,
///     pub timestamp: u64,
/// }
/// ```
#[proc_macro_derive(RingRecord)]
pub fn derive_ring_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let vis = &input.vis;

    let mut errors = Vec::new();

    if !input.generics.params.is_empty() {
        errors.push("RingRecord: generic record types are not supported".to_string());
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) if !named.named.is_empty() => named.named.iter().collect(),
            Fields::Named(_) => {
                errors.push("RingRecord: the record needs at least one field".to_string());
                Vec::new()
            }
            _ => {
                errors.push("RingRecord: only structs with named fields are supported".to_string());
                Vec::new()
            }
        },
        _ => {
            errors.push("RingRecord: only structs are supported".to_string());
            Vec::new()
        }
    };

    if !errors.is_empty() {
        let errors_tokens: Vec<_> = errors.iter().map(|err| quote! { compile_error!(#err); }).collect();
        return TokenStream::from(quote! { #(#errors_tokens)* });
    }

    let idents: Vec<_> = fields.iter().map(|f| f.ident.as_ref().unwrap()).collect();
    let types: Vec<_> = fields.iter().map(|f| &f.ty).collect();
    let field_vis: Vec<_> = fields.iter().map(|f| &f.vis).collect();
    let names: Vec<_> = idents.iter().map(|i| i.to_string()).collect();
    let first = idents[0];
    let rest = &idents[1..];

    let rings_ident = format_ident!("{}Rings", name);
    let slice_ident = format_ident!("{}Slice", name);
    let pushed_ident = format_ident!("{}Pushed", name);

    let rings_doc = format!("Parallel ring buffers for [`{name}`], one per field.");
    let slice_doc = format!("Per-field contiguous views over a window of [`{name}`] records.");
    let pushed_doc = format!("Per-field element counts after pushing a [`{name}`].");

    let expanded = quote! {
        #[doc = #rings_doc]
        #vis struct #rings_ident<H: ::mring::bytemuck::Pod = ()> {
            #(#field_vis #idents: ::mring::Ring<#types, H>,)*
        }

        #[doc = #slice_doc]
        #[derive(Debug, Clone, Copy)]
        #vis struct #slice_ident<'a> {
            #(#field_vis #idents: &'a [#types],)*
        }

        #[doc = #pushed_doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #vis struct #pushed_ident {
            #(#field_vis #idents: u64,)*
        }

        impl ::mring::Record for #name {
            type Rings<H: ::mring::bytemuck::Pod> = #rings_ident<H>;
            type Slice<'a> = #slice_ident<'a>;
            type Pushed = #pushed_ident;

            const FIELD_NAMES: &'static [&'static str] = &[#(#names),*];
            const FIELD_SIZES: &'static [usize] = &[#(::std::mem::size_of::<#types>()),*];

            fn create_rings<H: ::mring::bytemuck::Pod>(
                base: &str,
                len: u64,
            ) -> ::mring::RingResult<Self::Rings<H>> {
                Ok(#rings_ident {
                    #(#idents: ::mring::Ring::create(
                        &::mring::subring_name(base, #names),
                        len,
                    )?,)*
                })
            }

            fn open_rings<H: ::mring::bytemuck::Pod>(
                base: &str,
            ) -> ::mring::RingResult<Self::Rings<H>> {
                let rings = #rings_ident {
                    #(#idents: ::mring::Ring::open(&::mring::subring_name(base, #names))?,)*
                };
                let len = rings.#first.len();
                #(if rings.#rest.len() != len {
                    return Err(::mring::RingError::Platform(format!(
                        "Sub-ring element counts diverge under {base}"
                    )));
                })*
                Ok(rings)
            }

            fn close_rings<H: ::mring::bytemuck::Pod>(
                rings: Self::Rings<H>,
            ) -> ::mring::RingResult<()> {
                #(rings.#idents.close()?;)*
                Ok(())
            }

            fn rings_len<H: ::mring::bytemuck::Pod>(rings: &Self::Rings<H>) -> u64 {
                rings.#first.len()
            }

            fn reset_rings<H: ::mring::bytemuck::Pod>(
                rings: &mut Self::Rings<H>,
            ) -> ::mring::RingResult<()> {
                #(rings.#idents.reset()?;)*
                Ok(())
            }

            fn push_record<H: ::mring::bytemuck::Pod>(
                rings: &mut Self::Rings<H>,
                record: Self,
            ) -> ::mring::RingResult<Self::Pushed> {
                Ok(#pushed_ident {
                    #(#idents: rings.#idents.push(record.#idents)?,)*
                })
            }

            fn push_columns<H: ::mring::bytemuck::Pod>(
                rings: &mut Self::Rings<H>,
                columns: Self::Slice<'_>,
            ) -> ::mring::RingResult<()> {
                #(rings.#idents.push_values(columns.#idents)?;)*
                Ok(())
            }

            fn slice_rings<'a, H: ::mring::bytemuck::Pod>(
                rings: &'a Self::Rings<H>,
                start: u64,
                stop: u64,
            ) -> ::mring::RingResult<Self::Slice<'a>> {
                Ok(#slice_ident {
                    #(#idents: rings.#idents.slice(start, stop)?,)*
                })
            }

            fn slice_rings_from_tail<'a, H: ::mring::bytemuck::Pod>(
                rings: &'a Self::Rings<H>,
                k: u64,
            ) -> ::mring::RingResult<Self::Slice<'a>> {
                Ok(#slice_ident {
                    #(#idents: rings.#idents.slice_from_tail(k)?,)*
                })
            }

            fn slice_rings_to_head<'a, H: ::mring::bytemuck::Pod>(
                rings: &'a Self::Rings<H>,
                k: u64,
            ) -> ::mring::RingResult<Self::Slice<'a>> {
                Ok(#slice_ident {
                    #(#idents: rings.#idents.slice_to_head(k)?,)*
                })
            }
        }
    };

    TokenStream::from(expanded)
}
