//! Derive macros for the `ward-codec` Encode/Decode traits.
//!
//! Both derives walk the struct's fields in declaration order, which is
//! the order the wire format fixes: reordering fields changes the
//! encoding. Only structs are accepted. The wire format carries no
//! discriminants, so deriving on an enum is refused rather than
//! inventing one silently.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote, ToTokens};
use syn::{parse_macro_input, spanned::Spanned, Data, DeriveInput, Fields};

/// One field of the deriving struct: how it is reached on `self`, and
/// the declared type the codec impl is delegated to.
struct FieldSpec {
    accessor: TokenStream2,
    ty: syn::Type,
}

/// Flatten named, tuple, and unit structs into one field list so the
/// two derives share a single code path.
fn field_specs(fields: &Fields) -> Vec<FieldSpec> {
    match fields {
        Fields::Named(named) => named
            .named
            .iter()
            .map(|field| FieldSpec {
                accessor: field.ident.to_token_stream(),
                ty: field.ty.clone(),
            })
            .collect(),
        Fields::Unnamed(unnamed) => unnamed
            .unnamed
            .iter()
            .enumerate()
            .map(|(index, field)| FieldSpec {
                accessor: syn::Index::from(index).to_token_stream(),
                ty: field.ty.clone(),
            })
            .collect(),
        Fields::Unit => Vec::new(),
    }
}

fn struct_fields<'a>(input: &'a DeriveInput, trait_name: &str) -> syn::Result<&'a Fields> {
    match &input.data {
        Data::Struct(data) => Ok(&data.fields),
        Data::Enum(_) | Data::Union(_) => Err(syn::Error::new(
            input.span(),
            format!("{trait_name} can only be derived for structs; the wire format carries no discriminants"),
        )),
    }
}

#[proc_macro_derive(Encode)]
pub fn derive_encode(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_encode(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_encode(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let fields = struct_fields(input, "Encode")?;
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let writes = field_specs(fields).into_iter().map(|spec| {
        let FieldSpec { accessor, ty } = spec;
        quote! {
            <#ty as ward_codec::Encode>::encode(&self.#accessor, writer)?;
        }
    });

    Ok(quote! {
        impl #impl_generics ward_codec::Encode for #name #ty_generics #where_clause {
            fn encode<W: std::io::Write>(&self, writer: &mut W) -> ward_codec::Result<()> {
                #(#writes)*
                Ok(())
            }
        }
    })
}

#[proc_macro_derive(Decode)]
pub fn derive_decode(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_decode(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_decode(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let fields = struct_fields(input, "Decode")?;
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let specs = field_specs(fields);

    // Each field decodes into a local first; the locals keep named and
    // tuple structs on the same path and make the read order explicit.
    let locals: Vec<syn::Ident> = (0..specs.len())
        .map(|index| format_ident!("field_{index}"))
        .collect();
    let reads = specs.iter().zip(&locals).map(|(spec, local)| {
        let ty = &spec.ty;
        quote! {
            let #local = <#ty as ward_codec::Decode>::decode(reader)?;
        }
    });
    let construct = match fields {
        Fields::Named(_) => {
            let pairs = specs.iter().zip(&locals).map(|(spec, local)| {
                let accessor = &spec.accessor;
                quote! { #accessor: #local }
            });
            quote! { Self { #(#pairs),* } }
        }
        Fields::Unnamed(_) => quote! { Self(#(#locals),*) },
        Fields::Unit => quote! { Self },
    };

    Ok(quote! {
        impl #impl_generics ward_codec::Decode for #name #ty_generics #where_clause {
            fn decode<R: std::io::Read>(reader: &mut R) -> ward_codec::Result<Self> {
                #(#reads)*
                Ok(#construct)
            }
        }
    })
}
