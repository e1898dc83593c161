use crate::{
    prelude::*,
    utils::{
        build_helper_module, extract_field_configs, extract_named_fields, reject_generics,
        reject_serde_rename_all,
    },
};

#[derive(FromAttributes)]
#[darling(attributes(entity))]
struct Attributes {
    #[darling(default)]
    collection: Option<String>,
}

pub fn derive_entity(item: TokenStream) -> Result<TokenStream> {
    let input = parse2::<DeriveInput>(item)?;

    reject_generics(&input)?;
    reject_serde_rename_all(&input.attrs)?;

    let attributes = Attributes::from_attributes(&input.attrs)?;

    let fields_named = extract_named_fields(input.span(), input.data)?;
    let fields_span = fields_named.span();
    let fields = extract_field_configs(fields_named)?;

    let Some(id_field) = fields.iter().find(|field| field.ident == "id") else {
        return Err(Error::new(fields_span, "an entity must have an `id` field"));
    };

    if id_field.rename.as_deref() != Some("_id") {
        return Err(Error::new_spanned(
            &id_field.ident,
            "id field must have `#[serde(rename = \"_id\")]`",
        ));
    }

    let lowercase_entity = input.ident.to_string().to_snake_case();

    let collection_name = LitStr::new(
        attributes.collection.as_deref().unwrap_or_else(|| {
            lowercase_entity
                .strip_suffix("_entity")
                .unwrap_or(&lowercase_entity)
        }),
        Span::call_site(),
    );

    let output = build_helper_module(&input.vis, &input.ident, &fields, Some(&collection_name));

    Ok(output)
}
