// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use std::{collections::HashMap, fmt};

use proc_macro::TokenStream;
use quote::quote;

enum Visibility {
    Public(proc_macro2::Span),
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public(..) => "public",
            Self::Private => "private",
        }
        .fmt(f)
    }
}

impl syn::parse::Parse for Visibility {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let identifier = input.parse::<syn::Ident>()?;
        match identifier.to_string().as_str() {
            "public" => Ok(Self::Public(identifier.span())),
            "private" => Ok(Self::Private),
            _ => Err(syn::Error::new_spanned(
                identifier,
                "Unexpected visibility: expected `public` or `private`",
            )),
        }
    }
}

struct EnumTagsArgs {
    visibility: Visibility,
    repr_type: syn::Type,
}

impl syn::parse::Parse for EnumTagsArgs {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        mod kw {
            use syn::custom_keyword;

            custom_keyword!(repr);
        }

        let visibility = input.parse()?;

        input.parse::<syn::Token![,]>().map_err(|mut error| {
            error.combine(syn::Error::new(
                input.span(),
                format!("Missing comma after `{}` visibility", visibility),
            ));
            error
        })?;

        input.parse::<kw::repr>().map_err(|mut error| {
            error.combine(syn::Error::new(
                input.span(),
                format!("Missing `repr` after `{},`", visibility),
            ));
            error
        })?;

        let content;
        syn::parenthesized!(content in input);
        let repr_type = content.parse()?;

        Ok(Self {
            visibility,
            repr_type,
        })
    }
}

/// `NativeExec` becomes `NATIVE_EXEC`, `Ldi` becomes `LDI`.
fn screaming_snake_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    let mut previous_was_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() && previous_was_lower {
            result.push('_');
        }
        previous_was_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        result.push(c.to_ascii_uppercase());
    }
    result
}

fn parse_discriminant(expr: &syn::Expr) -> syn::Result<usize> {
    match expr {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Int(int_literal),
            ..
        }) => int_literal.base10_parse::<usize>(),
        other => Err(syn::Error::new_spanned(
            other,
            "Only literal discriminants are allowed",
        )),
    }
}

fn impl_enum_tags(
    enum_visibility: syn::Visibility,
    enum_name: syn::Ident,
    repr_type: syn::Type,
    variants: impl Iterator<Item = syn::Variant>,
) -> proc_macro2::TokenStream {
    let mut tag_idents = vec![];
    let mut tag_names = vec![];
    let mut match_cases = vec![];
    let mut seen: HashMap<usize, syn::Ident> = HashMap::new();
    let mut discriminant = 0;

    for variant in variants {
        let variant_name = variant.ident;
        let tag_name = quote::format_ident!(
            "{}_TAG",
            screaming_snake_case(&variant_name.to_string())
        );

        if let Some((_, custom_discriminant)) = &variant.discriminant {
            match parse_discriminant(custom_discriminant) {
                Ok(value) => discriminant = value,
                Err(error) => return error.into_compile_error(),
            }
        }

        if let Some(previous) = seen.insert(discriminant, variant_name.clone())
        {
            return syn::Error::new_spanned(
                &variant_name,
                format!(
                    "Tag {} of `{}` is already used by `{}`",
                    discriminant, variant_name, previous
                ),
            )
            .into_compile_error();
        }

        tag_idents.push(quote! {
            #[doc = concat!("`#[enum_tags]`-generated tag for the variant `Self::", stringify!(#variant_name), "`.")]
            #enum_visibility const #tag_name: #repr_type = #discriminant as _;
        });
        tag_names.push(tag_name);

        match variant.fields {
            syn::Fields::Named(_) => {
                match_cases.push(quote! {
                    Self::#variant_name { .. } => #discriminant as _
                });
            }
            syn::Fields::Unnamed(_) => {
                match_cases.push(quote! {
                    Self::#variant_name(..) => #discriminant as _
                });
            }
            syn::Fields::Unit => {
                match_cases.push(quote! {
                    Self::#variant_name => #discriminant as _
                });
            }
        }

        discriminant += 1;
    }

    quote! {
        impl #enum_name {
            #(#tag_idents)*

            #[doc = "`#[enum_tags]`-generated list of every tag, in declaration order."]
            #enum_visibility const TAGS: &'static [#repr_type] = &[#(Self::#tag_names),*];

            #[doc = "`#[enum_tags]`-generated getter for this variant's tag."]
            #enum_visibility const fn tag(&self) -> #repr_type {
                match self {
                    #(#match_cases),*
                }
            }
        }
    }
}

/// Constructs an `impl` for the given `enum` with constants for the
/// discriminant value of each variant.
///
/// Usage examples:
///
/// * `#[enum_tags(public, repr(u8))]`
/// * `#[enum_tags(private, repr(u32))]`
///
/// Tag constants are named after the variant in `SCREAMING_SNAKE_CASE`, so
/// `NativeExec` gets `NATIVE_EXEC_TAG`. Explicit discriminants may be decimal
/// or hexadecimal literals; two variants sharing a tag is a compile error.
///
/// Note that the `repr` type can be any numerical type to which a `usize` can
/// be casted to implicitly with the `as` keyword --- it is not the same as the
/// type for which you may `#[repr(...)]` the `enum`.
#[proc_macro_attribute]
pub fn enum_tags(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = syn::parse_macro_input!(args as EnumTagsArgs);

    let input_item = syn::parse_macro_input!(input as syn::DeriveInput);
    let input_item_cloned = input_item.clone();

    let data_enum = match input_item.data {
        syn::Data::Enum(data_enum) => data_enum,
        syn::Data::Struct(syn::DataStruct {
            struct_token: syn::token::Struct { span },
            ..
        })
        | syn::Data::Union(syn::DataUnion {
            union_token: syn::token::Union { span },
            ..
        }) => {
            return syn::Error::new(span, "Item must be an `enum`")
                .into_compile_error()
                .into();
        }
    };

    let visibility = match args.visibility {
        Visibility::Public(span) => {
            syn::Visibility::Public(syn::token::Pub { span })
        }
        Visibility::Private => syn::Visibility::Inherited,
    };

    let tags_impl = impl_enum_tags(
        visibility,
        input_item.ident,
        args.repr_type,
        data_enum.variants.into_iter(),
    );

    quote! {
        #input_item_cloned

        #tags_impl
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::screaming_snake_case;

    #[test]
    fn converts_variant_names() {
        assert_eq!("NOP", screaming_snake_case("Nop"));
        assert_eq!("NATIVE_EXEC", screaming_snake_case("NativeExec"));
        assert_eq!("ADDI", screaming_snake_case("Addi"));
        assert_eq!("MOV_I", screaming_snake_case("MovI"));
    }
}
