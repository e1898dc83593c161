use crate::prelude::*;
use proc_macro_crate::{FoundCrate, crate_name};

macro_rules! extract {
    ($val:expr, $pat:pat, $error_message: expr) => {
        let $pat = $val else {
            return Err(Error::new_spanned($val, $error_message));
        };
    };
}

pub(crate) use extract;

pub fn extract_named_fields(span: Span, data: Data) -> Result<FieldsNamed> {
    let Data::Struct(data_struct) = data else {
        return Err(Error::new(span, "expected struct"));
    };

    extract!(
        data_struct.fields,
        Fields::Named(named_fields),
        "expected named fields"
    );

    Ok(named_fields)
}

pub fn reject_generics(input: &DeriveInput) -> Result<()> {
    if input.generics.params.is_empty() {
        Ok(())
    } else {
        Err(Error::new_spanned(
            &input.generics,
            "generic document types are not supported",
        ))
    }
}

/// Container-level `rename_all` would make serde store names the generated
/// field paths do not know about.
pub fn reject_serde_rename_all(attrs: &[Attribute]) -> Result<()> {
    for attribute in attrs {
        if !attribute.path().is_ident("serde") {
            continue;
        }

        attribute.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                return Err(meta.error(
                    "`rename_all` is not supported, rename fields one by one with `#[serde(rename = \"...\")]`",
                ));
            }

            if meta.input.peek(Token![=]) {
                meta.value()?.parse::<Expr>()?;
            } else if meta.input.peek(syn::token::Paren) {
                let _content;
                syn::parenthesized!(_content in meta.input);
            }

            Ok(())
        })?;
    }

    Ok(())
}

/// `rename = "..."` from the field's serde attributes, skipping every other
/// serde option.
pub fn extract_serde_rename(field: &Field) -> Result<Option<String>> {
    let mut rename = None;

    for attribute in &field.attrs {
        if !attribute.path().is_ident("serde") {
            continue;
        }

        attribute.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") && meta.input.peek(Token![=]) {
                let lit = meta.value()?.parse::<LitStr>()?;
                rename = Some(lit.value());
            } else if meta.input.peek(Token![=]) {
                meta.value()?.parse::<Expr>()?;
            } else if meta.input.peek(syn::token::Paren) {
                let _content;
                syn::parenthesized!(_content in meta.input);
            }

            Ok(())
        })?;
    }

    Ok(rename)
}

#[derive(Default, FromAttributes)]
#[darling(attributes(field), default)]
pub struct FieldAttributes {
    nested: bool,
    required: Option<bool>,
    allow_none: Option<bool>,
}

pub struct FieldConfig {
    pub ident: Ident,
    pub ty: Type,
    pub rename: Option<String>,
    pub attributes: FieldAttributes,
}

impl FieldConfig {
    pub fn name(&self) -> String {
        self.ident.unraw().to_string()
    }

    pub fn db_field(&self) -> String {
        self.rename.clone().unwrap_or_else(|| self.name())
    }

    fn is_option(&self) -> bool {
        let Type::Path(type_path) = &self.ty else {
            return false;
        };

        type_path.qself.is_none()
            && type_path
                .path
                .segments
                .last()
                .is_some_and(|segment| segment.ident == "Option")
    }
}

pub fn extract_field_configs(fields_named: FieldsNamed) -> Result<Vec<FieldConfig>> {
    fields_named
        .named
        .into_iter()
        .map(|field| {
            let rename = extract_serde_rename(&field)?;
            let attributes = FieldAttributes::from_attributes(&field.attrs)?;

            extract!(field.ident, Some(ident), "expected named field");

            Ok(FieldConfig {
                ident,
                ty: field.ty,
                rename,
                attributes,
            })
        })
        .try_collect()
}

pub fn build_fields_enum(fields: &[FieldConfig]) -> TokenStream {
    let variants = fields
        .iter()
        .map(|field| Ident::new(&field.name().to_upper_camel_case(), Span::call_site()))
        .collect_vec();

    let field_lits = fields
        .iter()
        .map(|field| LitStr::new(&field.db_field(), Span::call_site()));

    quote! {
        #[derive(::std::clone::Clone, ::std::marker::Copy, ::std::fmt::Debug, ::std::cmp::PartialEq, ::std::cmp::Eq)]
        pub enum Fields {
            #( #variants ),*
        }

        impl ::std::fmt::Display for Fields {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::write!(
                    f,
                    "{}",
                    match self {
                        #(
                            Self::#variants => #field_lits
                        ),*
                    }
                )
            }
        }

        impl ::std::convert::From<Fields> for ::std::string::String {
            fn from(value: Fields) -> Self {
                ::std::string::ToString::to_string(&value)
            }
        }
    }
}

/// Helper module shared by `Entity` and `Embedded`: schema, typed field
/// handles, the `Fields` enum and the `filter!` macro. `collection` is set
/// for entities only.
pub fn build_helper_module(
    vis: &Visibility,
    ident: &Ident,
    fields: &[FieldConfig],
    collection: Option<&LitStr>,
) -> TokenStream {
    let krate = krate();

    let mod_ident = Ident::new(&ident.to_string().to_snake_case(), Span::call_site());
    let type_name = LitStr::new(&ident.to_string(), Span::call_site());

    let descriptors = fields.iter().map(|field| {
        let name = LitStr::new(&field.name(), Span::call_site());
        let db_field = LitStr::new(&field.db_field(), Span::call_site());
        let optional = field.is_option();

        let required = match field.attributes.required {
            Some(required) => quote! { ::std::option::Option::Some(#required) },
            None if optional => quote! { ::std::option::Option::Some(false) },
            None => quote! { ::std::option::Option::None },
        };

        let allow_none = match field.attributes.allow_none {
            Some(allow_none) => quote! { ::std::option::Option::Some(#allow_none) },
            None if optional => quote! { ::std::option::Option::Some(true) },
            None => quote! { ::std::option::Option::None },
        };

        let nested = if field.attributes.nested {
            let ty = &field.ty;
            quote! { ::std::option::Option::Some(<#ty as #krate::Nested>::nested_schema) }
        } else {
            quote! { ::std::option::Option::None }
        };

        quote! {
            #krate::FieldDescriptor {
                name: #name,
                db_field: #db_field,
                required: #required,
                allow_none: #allow_none,
                nested: #nested,
            }
        }
    });

    let field_fns = fields.iter().map(|field| {
        let field_ident = &field.ident;
        let ty = &field.ty;
        let db_field = LitStr::new(&field.db_field(), Span::call_site());

        quote! {
            pub fn #field_ident() -> #krate::Field<#ident, #ty> {
                #krate::Field::new(#db_field)
            }
        }
    });

    let entity_impl = collection.map(|collection_name| {
        let metadata = build_metadata(&krate, ident, collection_name);

        quote! {
            impl #krate::Entity for #ident {
                const COLLECTION_NAME: &'static str = #collection_name;
            }

            #metadata
        }
    });

    let fields_enum = build_fields_enum(fields);

    quote! {
        #vis mod #mod_ident {
            use super::*;

            impl #krate::Schematic for #ident {
                fn schema() -> &'static #krate::Schema {
                    static SCHEMA: #krate::Schema = #krate::Schema::new(
                        #type_name,
                        &[ #( #descriptors ),* ],
                    );

                    &SCHEMA
                }
            }

            impl #krate::Nested for #ident {
                type Inner = Self;
            }

            #entity_impl

            #( #field_fns )*

            #fields_enum

            #[allow(unused_macros)]
            macro_rules! filter {
                ($( $input: tt )*) => {
                   #krate::construct_filter!(#mod_ident, $( $input )*)
                };
            }

            #[allow(unused_imports)]
            pub(crate) use filter;
        }
    }
}

#[cfg(feature = "meta")]
fn build_metadata(krate: &TokenStream, ident: &Ident, collection_name: &LitStr) -> TokenStream {
    quote! {
        #krate::__private::inventory::submit! {
            #krate::meta::EntityMetadataWrapper(
                #krate::meta::EntityMetadata::new(
                    #collection_name,
                    <#ident as #krate::Schematic>::schema,
                )
            )
        }
    }
}

#[cfg(not(feature = "meta"))]
fn build_metadata(_krate: &TokenStream, _ident: &Ident, _collection_name: &LitStr) -> TokenStream {
    TokenStream::new()
}

pub fn krate() -> TokenStream {
    match crate_name("steppe") {
        Ok(FoundCrate::Itself) => quote! { crate },
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote! { ::#ident }
        }
        Err(_) => quote! { ::steppe },
    }
}
