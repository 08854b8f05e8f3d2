extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Fields, GenericArgument, Ident, LitStr, PathArguments, Type,
    parse_macro_input,
};

/// Derives `nocturne::Shape`.
///
/// Struct attributes:
/// - `#[shape(immutable)]`: build through one constructor call instead of
///   `Default` plus assignments. Every field must then be supplied by the
///   result set, in declared order.
/// - `#[shape(name = "...")]`: name used in error messages.
///
/// Field attributes:
/// - `#[shape(column = "LABEL")]`: map this column label to the field,
///   bypassing name mapping.
/// - `#[shape(sql_type = Varchar)]`: bind the field as this `SqlType`
///   variant instead of through the type's default writer.
/// - `#[shape(skip)]`: leave the field out; it keeps its default value.
///
/// Field types without a conversion table are read through `FromStr` (or
/// `From<String>`) and bound through `Display` when they implement them.
#[proc_macro_derive(Shape, attributes(shape))]
pub fn derive_shape(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct ShapeField {
    ident: Ident,
    ty: Type,
    column: Option<String>,
    sql_type: Option<Ident>,
    skip: bool,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Shape cannot be derived for generic types",
        ));
    }

    let mut immutable = false;
    let mut display_name = name.to_string();
    for attr in &input.attrs {
        if attr.path().is_ident("shape") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("immutable") {
                    immutable = true;
                    Ok(())
                } else if meta.path.is_ident("name") {
                    let s: LitStr = meta.value()?.parse()?;
                    display_name = s.value();
                    Ok(())
                } else {
                    Err(meta.error("expected `immutable` or `name`"))
                }
            })?;
        }
    }

    let named = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Shape can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Shape can only be derived for structs with named fields",
            ));
        }
    };

    let mut fields = Vec::new();
    for f in named {
        let Some(ident) = f.ident.clone() else {
            return Err(syn::Error::new_spanned(f, "All fields must have names"));
        };
        let mut column = None;
        let mut sql_type = None;
        let mut skip = false;
        for attr in &f.attrs {
            if attr.path().is_ident("shape") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("column") {
                        let s: LitStr = meta.value()?.parse()?;
                        column = Some(s.value());
                        Ok(())
                    } else if meta.path.is_ident("sql_type") {
                        sql_type = Some(meta.value()?.parse::<Ident>()?);
                        Ok(())
                    } else if meta.path.is_ident("skip") {
                        skip = true;
                        Ok(())
                    } else {
                        Err(meta.error("expected `column`, `sql_type` or `skip`"))
                    }
                })?;
            }
        }
        fields.push(ShapeField {
            ident,
            ty: f.ty.clone(),
            column,
            sql_type,
            skip,
        });
    }

    let descriptors = fields
        .iter()
        .filter(|f| !f.skip)
        .map(|f| field_descriptor(name, f, immutable))
        .collect::<Vec<_>>();

    let construction = if immutable {
        let mut index = 0usize;
        let inits: Vec<_> = fields.iter().map(|f| {
            let ident = &f.ident;
            let ty = &f.ty;
            if f.skip {
                quote! { #ident: ::std::default::Default::default() }
            } else {
                let i = index;
                index += 1;
                quote! { #ident: args.take::<#ty>(#i)? }
            }
        }).collect();
        quote! {
            fn construct(
                args: &mut ::nocturne::shape::ShapeArgs,
            ) -> ::nocturne::Result<#name> {
                ::std::result::Result::Ok(#name { #(#inits),* })
            }
            ::nocturne::shape::ShapeDescriptor::immutable(
                #display_name,
                construct,
                ::std::vec![#(#descriptors),*],
            )
        }
    } else {
        quote! {
            ::nocturne::shape::ShapeDescriptor::mutable(
                #display_name,
                <#name as ::std::default::Default>::default,
                ::std::vec![#(#descriptors),*],
            )
        }
    };

    Ok(quote! {
        const _: () = {
            #[allow(unused_imports)]
            use ::nocturne::shape::probe::{
                NoFormatter as _, NoParser as _, ViaDisplay as _, ViaFromStr as _,
                ViaFromString as _,
            };

            impl ::nocturne::shape::Shape for #name {
                fn descriptor() -> &'static ::nocturne::shape::ShapeDescriptor<Self> {
                    static DESCRIPTOR: ::std::sync::OnceLock<
                        ::nocturne::shape::ShapeDescriptor<#name>,
                    > = ::std::sync::OnceLock::new();
                    DESCRIPTOR.get_or_init(|| { #construction })
                }
            }
        };
    })
}

fn field_descriptor(shape: &Ident, field: &ShapeField, immutable: bool) -> TokenStream2 {
    let ident = &field.ident;
    let ty = &field.ty;
    let field_name = ident.to_string();

    let setter = if immutable {
        quote! {}
    } else {
        quote! { .setter(|s: &mut #shape, v: #ty| s.#ident = v) }
    };
    let column = match &field.column {
        Some(label) => quote! { .column(#label) },
        None => quote! {},
    };
    let sql_type = match &field.sql_type {
        Some(variant) => quote! { .sql_type(::nocturne::nocturne_sql::SqlType::#variant) },
        None => quote! {},
    };
    let factories = match option_inner(ty) {
        Some(inner) => quote! {
            .parse_inner_with((&&&::nocturne::shape::probe::Probe::<#inner>::new()).parser())
            .format_inner_with((&&::nocturne::shape::probe::Probe::<#inner>::new()).formatter())
        },
        None => quote! {
            .parse_with((&&&::nocturne::shape::probe::Probe::<#ty>::new()).parser())
            .format_with((&&::nocturne::shape::probe::Probe::<#ty>::new()).formatter())
        },
    };

    quote! {
        ::nocturne::shape::Field::<#shape, #ty>::new(#field_name, |s: &#shape| &s.#ident)
            #setter
            #column
            #sql_type
            #factories
            .build()
    }
}

/// `T` when `ty` is spelled `Option<T>` (or a path ending in it).
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let last = path.path.segments.last()?;
    if last.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &last.arguments else {
        return None;
    };
    match args.args.first() {
        Some(GenericArgument::Type(inner)) if args.args.len() == 1 => Some(inner),
        _ => None,
    }
}
